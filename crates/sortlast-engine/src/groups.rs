//! Communicators derived from a [`DecompositionPlan`].
//!
//! Every process computes the same orderings from the plan and builds them
//! with [`Communicator::create_ordered`]. Only members take part in each
//! construction:
//!
//! - intra-group: the members of one group, in rank order (groups of 2+ only)
//! - swap: the representatives, in group order, so logical rank = group id
//! - gather: the swap communicator permuted so position `p` is logical rank
//!   `bitrev(p)`

use tracing::debug;

use sortlast_net::Communicator;

use crate::error::{CompositeError, Result};
use crate::gather::bitrev_table;
use crate::planner::{DecompositionPlan, GroupSpec};

pub fn intra_group_ordering(group: &GroupSpec) -> Vec<usize> {
    group.ranks().collect()
}

pub fn representative_ordering(plan: &DecompositionPlan) -> Vec<usize> {
    plan.groups().iter().map(GroupSpec::representative).collect()
}

/// Ordering of the swap communicator used by the gather.
pub fn bitrev_ordering(group_count: usize) -> Vec<usize> {
    bitrev_table(group_count.max(1).trailing_zeros())
}

pub struct ProcessGroups<C> {
    intra: Option<C>,
    swap: Option<C>,
    gather: Option<C>,
}

impl<C: Communicator> ProcessGroups<C> {
    /// Build every communicator the calling process belongs to.
    pub async fn build(world: &C, plan: &DecompositionPlan) -> Result<Self> {
        let rank = world.rank();
        let role = plan.role(rank).ok_or_else(|| {
            CompositeError::Configuration(format!(
                "rank {rank} outside a plan for {} processes",
                plan.process_count()
            ))
        })?;
        let group = &plan.groups()[role.group];

        let intra = if group.size > 1 {
            Some(world.create_ordered(&intra_group_ordering(group)).await?)
        } else {
            None
        };

        let (swap, gather) = if role.is_representative() {
            let swap = world.create_ordered(&representative_ordering(plan)).await?;
            let gather = swap
                .create_ordered(&bitrev_ordering(plan.group_count()))
                .await?;
            (Some(swap), Some(gather))
        } else {
            (None, None)
        };

        debug!(
            rank,
            group = role.group,
            position = role.index,
            group_size = role.group_size,
            representative = role.is_representative(),
            "process groups built"
        );

        Ok(Self {
            intra,
            swap,
            gather,
        })
    }

    /// Group members in rank order; `None` for singleton groups.
    pub fn intra(&self) -> Option<&C> {
        self.intra.as_ref()
    }

    /// Representatives in group order; `None` on non-representatives.
    pub fn swap(&self) -> Option<&C> {
        self.swap.as_ref()
    }

    /// Bit-reversed representatives; `None` on non-representatives.
    pub fn gather(&self) -> Option<&C> {
        self.gather.as_ref()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
