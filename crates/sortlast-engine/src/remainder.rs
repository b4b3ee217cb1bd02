//! Leftover pixels when the resolution is not a multiple of the process count.
//!
//! The last `pixels mod N` raster positions sit outside the halving rounds.
//! Remainder pixel `j` is owned by world rank `j`: every rank sends it its
//! value of that pixel, the owner merges all N values in rank order, and at
//! the end the owner hands the result to the root.

use futures::future::{try_join, try_join_all};
use tracing::debug;

use sortlast_net::{encode_fragment, Communicator};
use sortlast_types::PixelFormat;

use crate::error::{CompositeError, Result};
use crate::exchange::{dense_message, open_dense, REMAINDER_TAG};
use crate::merge::{MergeKernel, Operand};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemainderPlan {
    regular: usize,
    count: usize,
}

impl RemainderPlan {
    pub fn new(pixels: usize, process_count: usize) -> Self {
        let count = pixels % process_count.max(1);
        Self {
            regular: pixels - count,
            count,
        }
    }

    /// Pixels handled by reduction and binary swap.
    pub fn regular_pixels(&self) -> usize {
        self.regular
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn total_pixels(&self) -> usize {
        self.regular + self.count
    }

    /// Raster index of remainder pixel `j`.
    pub fn pixel_index(&self, j: usize) -> usize {
        self.regular + j
    }

    /// The remainder pixel owned by world rank `rank`, if any.
    pub fn owned_pixel(&self, rank: usize) -> Option<usize> {
        (rank < self.count).then(|| self.pixel_index(rank))
    }
}

/// Route every remainder pixel to its owner and merge it there.
///
/// Returns the owner's merged pixel record, `None` on ranks that own nothing.
pub async fn exchange_remainder<C: Communicator>(
    world: &C,
    plan: &RemainderPlan,
    kernel: &MergeKernel,
    format: PixelFormat,
    image: &[u8],
    max_message_bytes: usize,
) -> Result<Option<Vec<u8>>> {
    let rank = world.rank();
    let layout = format.layout();
    let pixel = move |index: usize| &image[layout.byte_range(index, 1)];

    let mut outgoing = Vec::with_capacity(plan.count());
    for j in (0..plan.count()).filter(|&j| j != rank) {
        let index = plan.pixel_index(j);
        let msg = dense_message(REMAINDER_TAG, format, index..index + 1, pixel(index).to_vec());
        outgoing.push((j, encode_fragment(&msg)?));
    }

    let sends = async {
        try_join_all(
            outgoing
                .into_iter()
                .map(|(owner, bytes)| world.send(owner, REMAINDER_TAG, bytes)),
        )
        .await
        .map_err(CompositeError::from)
    };

    let merge = async {
        let Some(index) = plan.owned_pixel(rank) else {
            return Ok(None);
        };
        let mut merged: Option<Vec<u8>> = None;
        for source in 0..world.size() {
            let value = if source == rank {
                pixel(index).to_vec()
            } else {
                let bytes = world.recv(source, REMAINDER_TAG).await?;
                open_dense(&bytes, max_message_bytes, REMAINDER_TAG, format, index..index + 1)?
            };
            match merged.as_mut() {
                Some(acc) => kernel.merge_pixel(acc, &value, Operand::First),
                None => merged = Some(value),
            }
        }
        debug!(rank, pixel = index, "remainder pixel merged");
        Ok::<_, CompositeError>(merged)
    };

    let (_, merged) = try_join(sends, merge).await?;
    Ok(merged)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
