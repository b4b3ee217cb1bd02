//! 2-3-4 decomposition of an arbitrary process count.
//!
//! Algorithm:
//! 1. M = largest power of two ≤ N.
//! 2. N == M: every process is its own group (plain binary swap).
//! 3. Otherwise the job is split into M/2 groups of contiguous ranks. Each
//!    group starts with 2 members and the surplus `N − M` is spread one by
//!    one over the lowest groups, so sizes are 2, 3 or 4 and differ by at
//!    most one.
//! 4. The lowest rank of each group is its representative. Representatives
//!    take part in binary swap; the group id is their logical rank there.
//!
//! Every process derives the same plan from N alone.

use std::ops::Range;

use crate::error::{CompositeError, Result};

/// Largest power of two ≤ `n`. Returns 0 for 0.
pub const fn nearest_pow2(n: usize) -> usize {
    if n == 0 {
        0
    } else {
        1 << (usize::BITS - 1 - n.leading_zeros())
    }
}

pub const fn is_pow2(n: usize) -> bool {
    n.is_power_of_two()
}

// ── Groups ────────────────────────────────────────────────────────────────────

/// A contiguous run of world ranks reduced into one representative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupSpec {
    pub id: usize,
    pub first_rank: usize,
    pub size: usize,
}

impl GroupSpec {
    pub fn ranks(&self) -> Range<usize> {
        self.first_rank..self.first_rank + self.size
    }

    pub fn representative(&self) -> usize {
        self.first_rank
    }
}

/// Where one process sits in the decomposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupRole {
    /// Group id, which is also the logical rank in binary swap.
    pub group: usize,
    /// Position inside the group; 0 is the representative.
    pub index: usize,
    pub group_size: usize,
}

impl GroupRole {
    pub fn is_representative(&self) -> bool {
        self.index == 0
    }
}

// ── DecompositionPlan ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecompositionPlan {
    process_count: usize,
    pow2: usize,
    groups: Vec<GroupSpec>,
}

impl DecompositionPlan {
    pub fn new(process_count: usize) -> Result<Self> {
        if process_count < 1 {
            return Err(CompositeError::Configuration(
                "process count must be at least 1".into(),
            ));
        }

        let pow2 = nearest_pow2(process_count);
        let groups = if process_count == pow2 {
            (0..process_count)
                .map(|id| GroupSpec {
                    id,
                    first_rank: id,
                    size: 1,
                })
                .collect()
        } else {
            let count = pow2 / 2;
            let surplus = process_count - pow2;
            let mut first_rank = 0;
            (0..count)
                .map(|id| {
                    let size = 2 + surplus / count + usize::from(id < surplus % count);
                    let group = GroupSpec {
                        id,
                        first_rank,
                        size,
                    };
                    first_rank += size;
                    group
                })
                .collect()
        };

        Ok(Self {
            process_count,
            pow2,
            groups,
        })
    }

    pub fn process_count(&self) -> usize {
        self.process_count
    }

    /// Largest power of two ≤ the process count.
    pub fn nearest_pow2(&self) -> usize {
        self.pow2
    }

    /// True when no intra-group reduction is needed.
    pub fn is_pure_binary_swap(&self) -> bool {
        self.process_count == self.pow2
    }

    /// Number of representatives. Always a power of two.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Number of binary-swap rounds.
    pub fn swap_rounds(&self) -> u32 {
        self.group_count().trailing_zeros()
    }

    pub fn groups(&self) -> &[GroupSpec] {
        &self.groups
    }

    /// Group containing world rank `rank`.
    pub fn group_of(&self, rank: usize) -> Option<&GroupSpec> {
        let i = self
            .groups
            .partition_point(|g| g.first_rank + g.size <= rank);
        self.groups.get(i).filter(|g| g.ranks().contains(&rank))
    }

    pub fn role(&self, rank: usize) -> Option<GroupRole> {
        self.group_of(rank).map(|g| GroupRole {
            group: g.id,
            index: rank - g.first_rank,
            group_size: g.size,
        })
    }

    pub fn is_representative(&self, rank: usize) -> bool {
        self.role(rank).is_some_and(|r| r.is_representative())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
