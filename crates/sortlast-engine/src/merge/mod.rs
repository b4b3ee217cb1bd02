//! Per-pixel merge kernels.
//!
//! Every kernel combines two operands of the same format. The first operand
//! is farther from the viewer. Colors are premultiplied by alpha, so "over"
//! is `front + back * (1 - front_alpha)` per channel, saturating for 8-bit
//! channels and clamped to `[0, 1]` for float channels. A pixel with zero
//! alpha is the identity of "over": the other operand passes through
//! unchanged. When a format carries depth, "over" keeps the nearer depth.
//!
//! Depth merging keeps whichever operand has the smaller depth; equal
//! depths keep the first operand.

pub mod lut;
pub mod runs;

use std::fmt;
use std::ops::Range;

use rayon::prelude::*;

use sortlast_types::pixel::{read_f32, write_f32};
use sortlast_types::{
    Background, CompositorConfig, ElementType, PixelFormat, PixelLayout, MAX_BYTES_PER_PIXEL,
};

use crate::error::{CompositeError, Result};
use lut::{blend_direct, BlendLut};
use runs::Runs;

/// Pixels per rayon task in a parallel dense merge.
const PARALLEL_CHUNK_PIXELS: usize = 4096;

// ── Modes ─────────────────────────────────────────────────────────────────────

/// The per-pixel operation, independent of how payloads travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MergeOp {
    Alpha,
    Depth,
}

impl MergeOp {
    /// Pixels that are the identity of this operation, left out of ROI
    /// payloads.
    pub fn background(self) -> Background {
        match self {
            Self::Alpha => Background::Transparent,
            Self::Depth => Background::FarPlane,
        }
    }
}

/// Merge semantics requested by the caller. Discriminants are the wire ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum MergeMode {
    Alpha           = 0,
    Depth           = 1,
    /// Alpha, exchanging only pixels inside each sender's region of interest.
    AlphaRoi        = 2,
    DepthRoi        = 3,
    /// Alpha, exchanging run-length encoded spans.
    AlphaCompressed = 4,
    DepthCompressed = 5,
}

impl MergeMode {
    pub const ALL: [MergeMode; 6] = [
        Self::Alpha,
        Self::Depth,
        Self::AlphaRoi,
        Self::DepthRoi,
        Self::AlphaCompressed,
        Self::DepthCompressed,
    ];

    pub fn from_id(id: i32) -> Option<Self> {
        usize::try_from(id).ok().and_then(|i| Self::ALL.get(i).copied())
    }

    pub const fn id(self) -> i32 {
        self as i32
    }

    pub const fn op(self) -> MergeOp {
        match self {
            Self::Alpha | Self::AlphaRoi | Self::AlphaCompressed => MergeOp::Alpha,
            Self::Depth | Self::DepthRoi | Self::DepthCompressed => MergeOp::Depth,
        }
    }

    pub const fn is_roi(self) -> bool {
        matches!(self, Self::AlphaRoi | Self::DepthRoi)
    }

    pub const fn is_compressed(self) -> bool {
        matches!(self, Self::AlphaCompressed | Self::DepthCompressed)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Alpha           => "ALPHA",
            Self::Depth           => "DEPTH",
            Self::AlphaRoi        => "ALPHA_ROI",
            Self::DepthRoi        => "DEPTH_ROI",
            Self::AlphaCompressed => "ALPHA_COMPRESS",
            Self::DepthCompressed => "DEPTH_COMPRESS",
        }
    }
}

impl fmt::Display for MergeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<i32> for MergeMode {
    type Error = CompositeError;

    fn try_from(id: i32) -> Result<Self> {
        Self::from_id(id)
            .ok_or_else(|| CompositeError::Configuration(format!("unknown merge mode {id}")))
    }
}

/// Which operand the locally held pixels are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// Farther from the viewer (lower ranks).
    First,
    /// Nearer to the viewer.
    Second,
}

// ── Kernel ────────────────────────────────────────────────────────────────────

/// A merge operation bound to one pixel layout.
#[derive(Debug, Clone, Copy)]
pub struct MergeKernel {
    layout: PixelLayout,
    op: MergeOp,
    lut: Option<&'static BlendLut>,
    parallel_threshold: usize,
}

impl MergeKernel {
    pub fn new(format: PixelFormat, op: MergeOp, config: &CompositorConfig) -> Self {
        Self {
            layout: format.layout(),
            op,
            lut: config.use_blend_lut.then(BlendLut::shared),
            parallel_threshold: config.parallel_merge_pixels,
        }
    }

    pub fn layout(&self) -> PixelLayout {
        self.layout
    }

    pub fn op(&self) -> MergeOp {
        self.op
    }

    /// Merge one `incoming` record into `local` in place.
    pub fn merge_pixel(&self, local: &mut [u8], incoming: &[u8], local_operand: Operand) {
        let bpp = self.layout.bytes_per_pixel;
        let mut held = [0u8; MAX_BYTES_PER_PIXEL];
        held[..bpp].copy_from_slice(local);
        let held = &held[..bpp];
        match local_operand {
            Operand::First => self.combine(held, incoming, local),
            Operand::Second => self.combine(incoming, held, local),
        }
    }

    /// Merge equal-length dense spans. Large spans are split across rayon.
    pub fn merge(&self, local: &mut [u8], incoming: &[u8], local_operand: Operand) -> Result<()> {
        let bpp = self.layout.bytes_per_pixel;
        if local.len() != incoming.len() || local.len() % bpp != 0 {
            return Err(CompositeError::ProtocolMismatch(format!(
                "dense merge of {} bytes into {} bytes",
                incoming.len(),
                local.len()
            )));
        }

        if local.len() / bpp >= self.parallel_threshold.max(1) {
            let chunk = PARALLEL_CHUNK_PIXELS * bpp;
            local
                .par_chunks_mut(chunk)
                .zip(incoming.par_chunks(chunk))
                .for_each(|(l, r)| self.merge_serial(l, r, local_operand));
        } else {
            self.merge_serial(local, incoming, local_operand);
        }
        Ok(())
    }

    /// Merge packed pixels into the given raster segments of `local`.
    ///
    /// `local` holds the span starting at pixel `span_start`; segments are
    /// absolute pixel ranges inside it, consumed from `packed` in order.
    pub fn merge_segments(
        &self,
        local: &mut [u8],
        span_start: usize,
        segments: impl IntoIterator<Item = Range<usize>>,
        packed: &[u8],
        local_operand: Operand,
    ) -> Result<()> {
        let bpp = self.layout.bytes_per_pixel;
        let mut cursor = 0;
        for seg in segments {
            let bytes = seg.len() * bpp;
            let src = packed.get(cursor..cursor + bytes).ok_or_else(|| {
                CompositeError::ProtocolMismatch("ROI payload shorter than its rectangle".into())
            })?;
            let dst = match seg.start.checked_sub(span_start) {
                Some(offset) => local.get_mut(offset * bpp..offset * bpp + bytes),
                None => None,
            };
            let dst = dst.ok_or_else(|| {
                CompositeError::ProtocolMismatch(format!(
                    "ROI segment {seg:?} outside span starting at {span_start}"
                ))
            })?;
            self.merge_serial(dst, src, local_operand);
            cursor += bytes;
        }
        if cursor != packed.len() {
            return Err(CompositeError::ProtocolMismatch(format!(
                "ROI payload has {} bytes beyond its rectangle",
                packed.len() - cursor
            )));
        }
        Ok(())
    }

    /// Merge a run-length payload covering exactly `local`.
    pub fn merge_runs(&self, local: &mut [u8], runs: &[u8], local_operand: Operand) -> Result<()> {
        let bpp = self.layout.bytes_per_pixel;
        let mut pos = 0;
        for run in Runs::new(runs, bpp) {
            let (count, pixel) = run?;
            let dst = local
                .get_mut(pos * bpp..(pos + count) * bpp)
                .ok_or_else(|| {
                    CompositeError::ProtocolMismatch("run-length payload overruns its span".into())
                })?;
            for px in dst.chunks_exact_mut(bpp) {
                self.merge_pixel(px, pixel, local_operand);
            }
            pos += count;
        }
        if pos * bpp != local.len() {
            return Err(CompositeError::ProtocolMismatch(format!(
                "run-length payload covers {pos} of {} pixels",
                local.len() / bpp
            )));
        }
        Ok(())
    }

    fn merge_serial(&self, local: &mut [u8], incoming: &[u8], local_operand: Operand) {
        let bpp = self.layout.bytes_per_pixel;
        for (l, r) in local.chunks_exact_mut(bpp).zip(incoming.chunks_exact(bpp)) {
            self.merge_pixel(l, r, local_operand);
        }
    }

    // ── Per-pixel math ───────────────────────────────────────────────────

    fn combine(&self, back: &[u8], front: &[u8], out: &mut [u8]) {
        match self.op {
            MergeOp::Depth => {
                let winner = match (self.layout.depth(back), self.layout.depth(front)) {
                    (Some(zb), Some(zf)) if zf < zb => front,
                    _ => back,
                };
                out.copy_from_slice(winner);
            }
            MergeOp::Alpha => self.over(back, front, out),
        }
    }

    fn over(&self, back: &[u8], front: &[u8], out: &mut [u8]) {
        let l = self.layout;
        if l.is_transparent(front) {
            out.copy_from_slice(back);
            return;
        }
        if l.is_transparent(back) {
            out.copy_from_slice(front);
            return;
        }

        match (l.color, l.alpha) {
            (ElementType::U8, ElementType::U8) => {
                let a = front[l.alpha_offset];
                for i in 0..PixelLayout::COLOR_CHANNELS {
                    out[i] = self.blend_u8(front[i], back[i], a);
                }
                out[l.alpha_offset] = self.blend_u8(a, back[l.alpha_offset], a);
            }
            (ElementType::F32, _) => {
                let a = read_f32(front, l.alpha_offset);
                let keep = 1.0 - a;
                for i in 0..PixelLayout::COLOR_CHANNELS {
                    let off = l.color_offset(i);
                    let c = read_f32(front, off) + read_f32(back, off) * keep;
                    write_f32(out, off, c.clamp(0.0, 1.0));
                }
                let alpha = a + read_f32(back, l.alpha_offset) * keep;
                write_f32(out, l.alpha_offset, alpha.clamp(0.0, 1.0));
            }
            (ElementType::U8, ElementType::F32) => {
                let a = read_f32(front, l.alpha_offset);
                let keep = 1.0 - a;
                for i in 0..PixelLayout::COLOR_CHANNELS {
                    let c = front[i] as f32 + back[i] as f32 * keep;
                    out[i] = c.clamp(0.0, 255.0) as u8;
                }
                let alpha = a + read_f32(back, l.alpha_offset) * keep;
                write_f32(out, l.alpha_offset, alpha.clamp(0.0, 1.0));
                if let Some(pad) = l.pad_offset {
                    out[pad] = front[pad];
                }
            }
        }

        if let Some(z) = l.depth_offset {
            write_f32(out, z, read_f32(back, z).min(read_f32(front, z)));
        }
    }

    #[inline]
    fn blend_u8(&self, front: u8, back: u8, front_alpha: u8) -> u8 {
        match self.lut {
            Some(lut) => lut.blend(front, back, front_alpha),
            None => blend_direct(front, back, front_alpha),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
