//! Bit-reversal gather of the swapped fragments.
//!
//! After binary swap, logical rank `r` owns regular block `bitrev(r)`. Laying
//! the representatives out in a communicator whose position `p` holds
//! logical rank `bitrev(p)` makes a plain fixed-size gather deliver the
//! blocks in raster order. Remainder pixels travel separately and are
//! spliced in at the root.

use std::ops::Range;

use tracing::debug;

use sortlast_net::{encode_fragment, Communicator};
use sortlast_types::{PixelFormat, PixelLayout};

use crate::error::{CompositeError, Result};
use crate::exchange::{dense_message, open_dense, REMAINDER_RESULT_TAG};
use crate::remainder::RemainderPlan;

/// Rank that receives the final image.
pub const ROOT_RANK: usize = 0;

/// Reverse the low `nbits` bits of `value`.
pub const fn bitrev(value: usize, nbits: u32) -> usize {
    if nbits == 0 {
        return 0;
    }
    let mask = if nbits >= usize::BITS { usize::MAX } else { (1 << nbits) - 1 };
    (value & mask).reverse_bits() >> (usize::BITS - nbits)
}

/// `bitrev(p, nbits)` for every `p` in `[0, 2^nbits)`.
pub fn bitrev_table(nbits: u32) -> Vec<usize> {
    (0..1usize << nbits).map(|p| bitrev(p, nbits)).collect()
}

// ── GatherPlan ────────────────────────────────────────────────────────────────

/// Fragment geometry of one composition.
///
/// The regular region is padded to `fragment * group_count` pixels so every
/// representative contributes the same number of bytes. The padding is
/// never part of the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatherPlan {
    group_count: usize,
    nbits: u32,
    fragment: usize,
    remainder: RemainderPlan,
    blocks: Vec<usize>,
}

impl GatherPlan {
    pub fn new(pixels: usize, process_count: usize, group_count: usize) -> Self {
        let remainder = RemainderPlan::new(pixels, process_count);
        let group_count = group_count.max(1);
        let nbits = group_count.trailing_zeros();
        Self {
            group_count,
            nbits,
            fragment: remainder.regular_pixels().div_ceil(group_count),
            remainder,
            blocks: bitrev_table(nbits),
        }
    }

    pub fn nbits(&self) -> u32 {
        self.nbits
    }

    pub fn fragment_pixels(&self) -> usize {
        self.fragment
    }

    pub fn regular_pixels(&self) -> usize {
        self.remainder.regular_pixels()
    }

    pub fn padded_pixels(&self) -> usize {
        self.fragment * self.group_count
    }

    pub fn remainder(&self) -> &RemainderPlan {
        &self.remainder
    }

    /// Block owned by binary-swap logical rank `logical` after the last round.
    pub fn block_of(&self, logical: usize) -> usize {
        self.blocks[logical]
    }

    /// Padded pixel span of block `block`.
    pub fn block_span(&self, block: usize) -> Range<usize> {
        block * self.fragment..(block + 1) * self.fragment
    }

    /// Raster offsets of the remainder pixels.
    pub fn remainder_offsets(&self) -> Range<usize> {
        self.regular_pixels()..self.remainder.total_pixels()
    }

    /// Every fragment of the final image: the regular blocks clipped to the
    /// unpadded region, then one span per remainder pixel.
    pub fn fragments(&self) -> Vec<Range<usize>> {
        let regular = self.regular_pixels();
        (0..self.group_count)
            .map(|b| {
                let span = self.block_span(b);
                span.start.min(regular)..span.end.min(regular)
            })
            .chain(self.remainder_offsets().map(|i| i..i + 1))
            .collect()
    }
}

/// Gather the owned blocks at the root of the bit-reversed communicator.
///
/// `logical` is the caller's binary-swap rank. Returns the padded regular
/// region in raster order at the root, `None` elsewhere.
pub async fn gather_fragments<C: Communicator>(
    gather: &C,
    plan: &GatherPlan,
    layout: PixelLayout,
    work: &[u8],
    logical: usize,
) -> Result<Option<Vec<u8>>> {
    let block = plan.block_of(logical);
    let span = plan.block_span(block);
    debug!(logical, block, position = gather.rank(), "gathering fragment");

    let contribution = work[layout.byte_range(span.start, span.len())].to_vec();
    let gathered = gather.gather(ROOT_RANK, contribution).await?;

    if let Some(bytes) = &gathered {
        let expected = plan.padded_pixels() * layout.bytes_per_pixel;
        if bytes.len() != expected {
            return Err(CompositeError::ProtocolMismatch(format!(
                "gathered {} bytes, expected {expected}",
                bytes.len()
            )));
        }
    }
    Ok(gathered)
}

/// Hand merged remainder pixels to the root and splice them into `image`.
///
/// Only the root's `image` is written.
pub async fn collect_remainder<C: Communicator>(
    world: &C,
    plan: &RemainderPlan,
    format: PixelFormat,
    merged: Option<Vec<u8>>,
    image: &mut [u8],
    max_message_bytes: usize,
) -> Result<()> {
    let rank = world.rank();
    let layout = format.layout();

    if rank != ROOT_RANK {
        if let (Some(index), Some(pixel)) = (plan.owned_pixel(rank), merged) {
            let msg = dense_message(REMAINDER_RESULT_TAG, format, index..index + 1, pixel);
            world
                .send(ROOT_RANK, REMAINDER_RESULT_TAG, encode_fragment(&msg)?)
                .await?;
        }
        return Ok(());
    }

    let mut own = merged;
    for owner in 0..plan.count() {
        let index = plan.pixel_index(owner);
        let pixel = if owner == rank {
            own.take().ok_or_else(|| {
                CompositeError::ProtocolMismatch("root holds no merged remainder pixel".into())
            })?
        } else {
            let bytes = world.recv(owner, REMAINDER_RESULT_TAG).await?;
            open_dense(&bytes, max_message_bytes, REMAINDER_RESULT_TAG, format, index..index + 1)?
        };
        image[layout.byte_range(index, 1)].copy_from_slice(&pixel);
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
