//! `sortlast-net` — the message-passing substrate consumed by the compositing
//! engine.
//!
//! The engine depends on exactly the primitives in [`Communicator`]:
//! tagged point-to-point send/receive, construction of a sub-communicator
//! from an explicit rank ordering, a fixed-size gather, and job abort.
//!
//! [`LocalWorld`] implements the trait for SPMD runs inside one process
//! (one future per rank). Bindings to a cluster transport implement the same
//! trait outside this crate.

pub mod codec;
pub mod error;
pub mod local;

// ── Public re-exports ─────────────────────────────────────────────────────────

pub use codec::{decode_fragment, encode_fragment, FragmentMessage, PayloadEncoding};
pub use error::{NetError, Result};
pub use local::{LocalComm, LocalWorld};

use async_trait::async_trait;

/// Message tag. Messages match on (communicator, source, tag) and are
/// non-overtaking within that key.
pub type Tag = u32;

/// Tag reserved for [`Communicator::gather`].
pub const GATHER_TAG: Tag = u32::MAX;

// ── Communicator ──────────────────────────────────────────────────────────────

/// An ordered set of cooperating processes.
///
/// Ranks are positions in the ordering, `0..size()`. Every method except
/// `rank`, `size` and `abort` may suspend until the peer side arrives.
#[async_trait]
pub trait Communicator: Send + Sync + Sized {
    /// Rank of the calling process in this communicator.
    fn rank(&self) -> usize;

    /// Number of processes in this communicator.
    fn size(&self) -> usize;

    /// Send `data` to `dest`. May complete before the receiver posts its receive.
    async fn send(&self, dest: usize, tag: Tag, data: Vec<u8>) -> Result<()>;

    /// Receive the next message from `source` with `tag`.
    async fn recv(&self, source: usize, tag: Tag) -> Result<Vec<u8>>;

    /// Build a communicator over `ordering`, a list of ranks of `self`.
    ///
    /// Position `i` of `ordering` becomes rank `i` of the result. Every member
    /// of `ordering` must call this with the identical list; non-members must
    /// not call it. The caller must be a member.
    async fn create_ordered(&self, ordering: &[usize]) -> Result<Self>;

    /// Fixed-size gather: every rank contributes `data` of the same length;
    /// `root` receives the contributions concatenated in rank order.
    /// Returns `None` on non-root ranks.
    async fn gather(&self, root: usize, data: Vec<u8>) -> Result<Option<Vec<u8>>>;

    /// Tear down the whole job. Peers suspended in any operation observe
    /// [`NetError::Aborted`]. A cluster binding may terminate the process here.
    fn abort(&self, reason: &str);
}
