/// Crate-local error type for substrate operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetError {
    #[error("job aborted: {0}")]
    Aborted(String),

    #[error("rank {rank} out of range for communicator of size {size}")]
    InvalidRank { rank: usize, size: usize },

    #[error("invalid rank ordering: {0}")]
    InvalidOrdering(String),

    #[error("gather contribution from rank {rank} is {actual} bytes, expected {expected}")]
    GatherSizeMismatch {
        rank: usize,
        expected: usize,
        actual: usize,
    },

    #[error("message too large: {actual} bytes (max {max})")]
    MessageTooLarge { actual: usize, max: usize },

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, NetError>;
