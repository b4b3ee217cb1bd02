//! `sortlast-engine` — parallel sort-last image compositing.
//!
//! Each of `N` processes renders a full-size partial image. The engine
//! merges them in rank order (rank 0 farthest) and leaves the final image on
//! rank 0. Any `N` works: when `N` is not a power of two, the processes are
//! first folded into a power-of-two number of groups of 2, 3 or 4, whose
//! representatives then run binary swap.
//!
//! # Architecture
//!
//! ```text
//!  ranks   0  1  2 │ 3  4       remainder pixels routed to their owner
//!          └──┴──┘ │ └──┘
//!  reduce     0    │  3        binomial tree inside each group
//!             │◀───┼─▶│
//!  swap      [0,R/2)  [R/2,R)  binary swap among representatives
//!             └────┬───┘
//!  gather       rank 0         bit-reversed order lands in raster order
//! ```
//!
//! Transport is abstracted by [`sortlast_net::Communicator`]; the in-process
//! [`sortlast_net::LocalWorld`] drives the tests.

pub mod buffers;
pub mod compositor;
pub mod error;
pub mod exchange;
pub mod gather;
pub mod groups;
pub mod merge;
pub mod planner;
pub mod remainder;

#[cfg(test)]
mod test_support;

// ── Public re-exports ────────────────────────────────────────────────────────

pub use buffers::{BufferManager, ScratchSlot};
pub use compositor::{CompositeStatus, Compositor};
pub use error::{CompositeError, Result};
pub use exchange::{binary_swap_schedule, reduction_schedule, ExchangeRound, ReductionStep};
pub use gather::{bitrev, GatherPlan, ROOT_RANK};
pub use groups::ProcessGroups;
pub use merge::{MergeKernel, MergeMode, MergeOp, Operand};
pub use planner::{DecompositionPlan, GroupRole, GroupSpec};
pub use remainder::RemainderPlan;
