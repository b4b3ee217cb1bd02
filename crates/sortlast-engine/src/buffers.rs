//! Per-format scratch slots.
//!
//! A slot holds everything a composition of one pixel format needs between
//! `init` and `destroy`: the geometry it was sized for, the decomposition and
//! gather plans, and the working buffer for the padded regular region.

use tracing::{debug, warn};

use sortlast_types::{ImageError, PixelFormat};

use crate::error::{CompositeError, Result};
use crate::gather::GatherPlan;
use crate::planner::DecompositionPlan;

/// Allocate `len` zeroed bytes, reporting failure instead of aborting.
pub fn try_alloc_zeroed(len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|e| CompositeError::AllocationFailure(format!("{len} bytes: {e}")))?;
    buf.resize(len, 0);
    Ok(buf)
}

// ── ScratchSlot ───────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct ScratchSlot {
    rank: usize,
    process_count: usize,
    width: u32,
    height: u32,
    format: PixelFormat,
    plan: DecompositionPlan,
    gather: GatherPlan,
    work: Vec<u8>,
}

impl ScratchSlot {
    fn new(
        rank: usize,
        process_count: usize,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<Self> {
        let pixels = width as usize * height as usize;
        if pixels == 0 {
            return Err(ImageError::Empty { width, height }.into());
        }
        let plan = DecompositionPlan::new(process_count)?;
        if rank >= process_count {
            return Err(CompositeError::Configuration(format!(
                "rank {rank} out of range for {process_count} processes"
            )));
        }

        let gather = GatherPlan::new(pixels, process_count, plan.group_count());
        let len = gather
            .padded_pixels()
            .checked_mul(format.bytes_per_pixel())
            .ok_or_else(|| {
                CompositeError::AllocationFailure(format!("{width}x{height} {format} overflows"))
            })?;
        let work = try_alloc_zeroed(len)?;

        Ok(Self {
            rank,
            process_count,
            width,
            height,
            format,
            plan,
            gather,
            work,
        })
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn process_count(&self) -> usize {
        self.process_count
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn gather_plan(&self) -> &GatherPlan {
        &self.gather
    }

    /// True if the slot was sized for exactly this job and geometry.
    pub fn matches(&self, rank: usize, process_count: usize, width: u32, height: u32) -> bool {
        self.rank == rank
            && self.process_count == process_count
            && self.width == width
            && self.height == height
    }

    /// Plans and working buffer, borrowed together.
    pub(crate) fn parts_mut(&mut self) -> (&DecompositionPlan, &GatherPlan, &mut [u8]) {
        (&self.plan, &self.gather, self.work.as_mut_slice())
    }
}

// ── BufferManager ─────────────────────────────────────────────────────────────

/// One optional [`ScratchSlot`] per pixel format.
#[derive(Debug, Default)]
pub struct BufferManager {
    slots: [Option<ScratchSlot>; 8],
}

impl BufferManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the slot for `format`, replacing any previous one.
    pub fn init(
        &mut self,
        rank: usize,
        process_count: usize,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<&mut ScratchSlot> {
        let slot = ScratchSlot::new(rank, process_count, width, height, format)?;
        let entry = &mut self.slots[format.index()];
        if entry.is_some() {
            warn!(%format, "replacing compositing slot that was never destroyed");
        }
        debug!(%format, width, height, process_count, "compositing slot initialized");
        Ok(entry.insert(slot))
    }

    /// Release the slot for `format`.
    pub fn destroy(&mut self, format: PixelFormat) -> Result<()> {
        match self.slots[format.index()].take() {
            Some(_) => {
                debug!(%format, "compositing slot destroyed");
                Ok(())
            }
            None => Err(CompositeError::NotInitialized(format)),
        }
    }

    pub fn is_initialized(&self, format: PixelFormat) -> bool {
        self.slots[format.index()].is_some()
    }

    pub fn slot(&self, format: PixelFormat) -> Result<&ScratchSlot> {
        self.slots[format.index()]
            .as_ref()
            .ok_or(CompositeError::NotInitialized(format))
    }

    pub fn slot_mut(&mut self, format: PixelFormat) -> Result<&mut ScratchSlot> {
        self.slots[format.index()]
            .as_mut()
            .ok_or(CompositeError::NotInitialized(format))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
