//! Intra-group reduction and binary swap.
//!
//! Every transfer is a [`FragmentMessage`] envelope. The receiver checks the
//! envelope against the span it expects (stage, first pixel, pixel count,
//! format and payload kind) before merging, so peers that disagree about
//! the geometry fail with `ProtocolMismatch` instead of merging garbage.

use std::ops::Range;

use futures::future::{try_join, BoxFuture, FutureExt};
use tracing::debug;

use sortlast_net::{
    decode_fragment, encode_fragment, Communicator, FragmentMessage, PayloadEncoding, Tag,
};
use sortlast_types::{PixelFormat, Rect};

use crate::error::{CompositeError, Result};
use crate::merge::runs::encode_runs;
use crate::merge::{MergeKernel, MergeMode, Operand};

// ── Tags ──────────────────────────────────────────────────────────────────────

pub(crate) const REMAINDER_TAG: Tag = 0x10;
pub(crate) const REMAINDER_RESULT_TAG: Tag = 0x11;
pub(crate) const REDUCE_TAG_BASE: Tag = 0x100;
const SWAP_TAG_BASE: Tag = 0x200;

// ── Schedules ─────────────────────────────────────────────────────────────────

/// One step of the binomial reduction inside a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReductionStep {
    SendTo { level: u32, dest: usize },
    ReceiveFrom { level: u32, source: usize },
}

/// Binomial tree over group positions: at level `k` (stride `2^k`), position
/// `i` with `i mod 2^(k+1) == 2^k` sends everything it holds to `i - 2^k` and
/// leaves; positions divisible by `2^(k+1)` receive from `i + 2^k` if it
/// exists. Position 0 ends with the whole group.
pub fn reduction_schedule(index: usize, group_size: usize) -> Vec<ReductionStep> {
    let mut steps = Vec::new();
    let mut stride = 1;
    let mut level = 0;
    while stride < group_size {
        if index % (2 * stride) == stride {
            steps.push(ReductionStep::SendTo {
                level,
                dest: index - stride,
            });
            break;
        }
        if index % (2 * stride) == 0 && index + stride < group_size {
            steps.push(ReductionStep::ReceiveFrom {
                level,
                source: index + stride,
            });
        }
        stride *= 2;
        level += 1;
    }
    steps
}

/// One binary-swap round as seen by one representative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeRound {
    pub round: u32,
    /// Logical rank of the partner.
    pub partner: usize,
    /// Span kept and merged locally.
    pub keep: Range<usize>,
    /// Span handed to the partner.
    pub send: Range<usize>,
    pub local_operand: Operand,
}

/// Rounds for logical rank `logical` among `group_count` representatives,
/// halving `[0, padded_pixels)`.
///
/// Round `k` pairs ranks differing in bit `k`. The rank with the bit clear
/// keeps the lower half and is the farther operand. After the last round
/// the kept span is block `bitrev(logical)`.
pub fn binary_swap_schedule(
    logical: usize,
    group_count: usize,
    padded_pixels: usize,
) -> Vec<ExchangeRound> {
    let rounds = group_count.max(1).trailing_zeros();
    let mut span = 0..padded_pixels;
    let mut schedule = Vec::with_capacity(rounds as usize);
    for round in 0..rounds {
        let bit = 1 << round;
        let mid = span.start + span.len() / 2;
        let (lower, upper) = (span.start..mid, mid..span.end);
        let (keep, send, local_operand) = if logical & bit == 0 {
            (lower, upper, Operand::First)
        } else {
            (upper, lower, Operand::Second)
        };
        span = keep.clone();
        schedule.push(ExchangeRound {
            round,
            partner: logical ^ bit,
            keep,
            send,
            local_operand,
        });
    }
    schedule
}

// ── Pending exchange ──────────────────────────────────────────────────────────

/// A paired send and receive with one partner, in flight together.
pub struct PendingExchange<'a> {
    inner: BoxFuture<'a, sortlast_net::Result<Vec<u8>>>,
}

impl<'a> PendingExchange<'a> {
    pub fn post<C: Communicator>(comm: &'a C, partner: usize, tag: Tag, outgoing: Vec<u8>) -> Self {
        let inner = async move {
            let ((), incoming) =
                try_join(comm.send(partner, tag, outgoing), comm.recv(partner, tag)).await?;
            Ok(incoming)
        }
        .boxed();
        Self { inner }
    }

    /// Completes once both directions are done. Returns the partner's payload.
    pub async fn wait(self) -> sortlast_net::Result<Vec<u8>> {
        self.inner.await
    }
}

// ── Envelopes ─────────────────────────────────────────────────────────────────

pub(crate) fn dense_message(
    stage: Tag,
    format: PixelFormat,
    span: Range<usize>,
    data: Vec<u8>,
) -> FragmentMessage {
    FragmentMessage {
        stage,
        format_id: format.id(),
        first_pixel: span.start as u64,
        pixel_count: span.len() as u64,
        encoding: PayloadEncoding::Dense,
        data,
    }
}

fn check_header(
    msg: &FragmentMessage,
    stage: Tag,
    format: PixelFormat,
    span: &Range<usize>,
) -> Result<()> {
    if msg.stage != stage {
        return Err(CompositeError::ProtocolMismatch(format!(
            "expected stage {stage:#x}, got {:#x}",
            msg.stage
        )));
    }
    if msg.format_id != format.id() {
        return Err(CompositeError::ProtocolMismatch(format!(
            "expected {format} fragment, got format id {}",
            msg.format_id
        )));
    }
    if msg.first_pixel != span.start as u64 || msg.pixel_count != span.len() as u64 {
        return Err(CompositeError::ProtocolMismatch(format!(
            "expected pixels {}..{}, got {} pixels from {}",
            span.start, span.end, msg.pixel_count, msg.first_pixel
        )));
    }
    Ok(())
}

/// Decode and validate a dense fragment, returning its pixel bytes.
pub(crate) fn open_dense(
    bytes: &[u8],
    max_message_bytes: usize,
    stage: Tag,
    format: PixelFormat,
    span: Range<usize>,
) -> Result<Vec<u8>> {
    let msg = decode_fragment(bytes, max_message_bytes)?;
    check_header(&msg, stage, format, &span)?;
    let expected = span.len() * format.bytes_per_pixel();
    if msg.encoding != PayloadEncoding::Dense || msg.data.len() != expected {
        return Err(CompositeError::ProtocolMismatch(format!(
            "expected {expected} dense bytes, got {:?} payload of {} bytes",
            msg.encoding,
            msg.data.len()
        )));
    }
    Ok(msg.data)
}

// ── Exchange state ────────────────────────────────────────────────────────────

/// Traffic counters of one composition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExchangeStats {
    pub rounds: u32,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// Per-composition exchange context of one process.
///
/// Owns the merge kernel and the payload policy of the mode. In the ROI
/// modes it also tracks the rectangle covering every non-background pixel
/// held locally, which grows as partner rectangles are merged in.
#[derive(Debug)]
pub struct ExchangeState {
    kernel: MergeKernel,
    format: PixelFormat,
    mode: MergeMode,
    image_width: usize,
    regular: usize,
    roi: Rect,
    max_message_bytes: usize,
    stats: ExchangeStats,
}

impl ExchangeState {
    pub fn new(
        kernel: MergeKernel,
        format: PixelFormat,
        mode: MergeMode,
        image_width: usize,
        regular_pixels: usize,
        roi: Rect,
        max_message_bytes: usize,
    ) -> Self {
        Self {
            kernel,
            format,
            mode,
            image_width,
            regular: regular_pixels,
            roi,
            max_message_bytes,
            stats: ExchangeStats::default(),
        }
    }

    pub fn roi(&self) -> Rect {
        self.roi
    }

    pub fn stats(&self) -> ExchangeStats {
        self.stats
    }

    pub fn regular_pixels(&self) -> usize {
        self.regular
    }

    fn roi_span(&self, span: &Range<usize>) -> Range<usize> {
        span.start.min(self.regular)..span.end.min(self.regular)
    }

    /// Wrap pixels `span` of `work` for a partner.
    pub fn encode(&mut self, work: &[u8], span: Range<usize>, stage: Tag) -> Result<Vec<u8>> {
        let layout = self.format.layout();
        let pixels = &work[layout.byte_range(span.start, span.len())];

        let (encoding, data) = if self.mode.is_roi() {
            let mut packed = Vec::new();
            for seg in self.roi.segments(self.image_width, self.roi_span(&span)) {
                packed.extend_from_slice(&work[layout.byte_range(seg.start, seg.len())]);
            }
            (PayloadEncoding::Roi { roi: self.roi }, packed)
        } else if self.mode.is_compressed() {
            (PayloadEncoding::Runs, encode_runs(pixels, layout.bytes_per_pixel))
        } else {
            (PayloadEncoding::Dense, pixels.to_vec())
        };

        let bytes = encode_fragment(&FragmentMessage {
            stage,
            format_id: self.format.id(),
            first_pixel: span.start as u64,
            pixel_count: span.len() as u64,
            encoding,
            data,
        })?;
        self.stats.bytes_sent += bytes.len() as u64;
        Ok(bytes)
    }

    /// Validate a partner's envelope for `span` and merge it into `work`.
    pub fn absorb(
        &mut self,
        work: &mut [u8],
        span: Range<usize>,
        stage: Tag,
        incoming: &[u8],
        local_operand: Operand,
    ) -> Result<()> {
        self.stats.bytes_received += incoming.len() as u64;
        let msg = decode_fragment(incoming, self.max_message_bytes)?;
        check_header(&msg, stage, self.format, &span)?;

        let layout = self.format.layout();
        let local = &mut work[layout.byte_range(span.start, span.len())];
        match msg.encoding {
            PayloadEncoding::Dense if !self.mode.is_roi() && !self.mode.is_compressed() => {
                self.kernel.merge(local, &msg.data, local_operand)?;
            }
            PayloadEncoding::Roi { roi } if self.mode.is_roi() => {
                if roi.x1 as usize > self.image_width {
                    return Err(CompositeError::ProtocolMismatch(format!(
                        "partner ROI {roi} wider than the image ({} pixels)",
                        self.image_width
                    )));
                }
                let segments = roi.segments(self.image_width, self.roi_span(&span));
                self.kernel
                    .merge_segments(local, span.start, segments, &msg.data, local_operand)?;
                self.roi = self.roi.union(&roi);
            }
            PayloadEncoding::Runs if self.mode.is_compressed() => {
                self.kernel.merge_runs(local, &msg.data, local_operand)?;
            }
            other => {
                return Err(CompositeError::ProtocolMismatch(format!(
                    "{other:?} payload in {} mode",
                    self.mode
                )));
            }
        }
        self.stats.rounds += 1;
        Ok(())
    }
}

// ── Drivers ───────────────────────────────────────────────────────────────────

/// Fold a group into its representative (group position 0).
///
/// Non-representatives return after handing off their data. Spans cover
/// the regular region only.
pub async fn reduce_group<C: Communicator>(
    intra: &C,
    state: &mut ExchangeState,
    work: &mut [u8],
) -> Result<()> {
    let span = 0..state.regular_pixels();
    for step in reduction_schedule(intra.rank(), intra.size()) {
        match step {
            ReductionStep::SendTo { level, dest } => {
                let tag = REDUCE_TAG_BASE + level;
                let outgoing = state.encode(work, span.clone(), tag)?;
                debug!(position = intra.rank(), dest, level, bytes = outgoing.len(), "reduction send");
                intra.send(dest, tag, outgoing).await?;
            }
            ReductionStep::ReceiveFrom { level, source } => {
                let tag = REDUCE_TAG_BASE + level;
                let incoming = intra.recv(source, tag).await?;
                debug!(position = intra.rank(), source, level, bytes = incoming.len(), "reduction merge");
                state.absorb(work, span.clone(), tag, &incoming, Operand::First)?;
            }
        }
    }
    Ok(())
}

/// Run the binary-swap rounds among representatives.
pub async fn binary_swap<C: Communicator>(
    swap: &C,
    state: &mut ExchangeState,
    work: &mut [u8],
    schedule: &[ExchangeRound],
) -> Result<()> {
    for round in schedule {
        let tag = SWAP_TAG_BASE + round.round;
        let outgoing = state.encode(work, round.send.clone(), tag)?;
        let pending = PendingExchange::post(swap, round.partner, tag, outgoing);
        let incoming = pending.wait().await?;
        debug!(
            logical = swap.rank(),
            round = round.round,
            partner = round.partner,
            keep_start = round.keep.start,
            keep_len = round.keep.len(),
            "swap round"
        );
        state.absorb(work, round.keep.clone(), tag, &incoming, round.local_operand)?;
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
