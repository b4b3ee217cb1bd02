use sortlast_net::NetError;
use sortlast_types::{ImageError, PixelFormat, UnknownPixelFormat};

#[derive(Debug, thiserror::Error)]
pub enum CompositeError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("no {0} compositing slot initialized")]
    NotInitialized(PixelFormat),

    #[error("allocation failure: {0}")]
    AllocationFailure(String),

    #[error("protocol mismatch: {0}")]
    ProtocolMismatch(String),

    #[error("collective failure: {0}")]
    CollectiveFailure(NetError),
}

impl CompositeError {
    /// Fatal errors happen mid-protocol and tear down the whole job.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::AllocationFailure(_) | Self::ProtocolMismatch(_) | Self::CollectiveFailure(_)
        )
    }

    /// Integer status for drivers that report numeric codes. Success is 0.
    pub fn status_code(&self) -> i32 {
        match self {
            Self::Configuration(_)     => 1,
            Self::NotInitialized(_)    => 2,
            Self::AllocationFailure(_) => 3,
            Self::ProtocolMismatch(_)  => 4,
            Self::CollectiveFailure(_) => 5,
        }
    }
}

impl From<NetError> for CompositeError {
    fn from(err: NetError) -> Self {
        match err {
            // Malformed or mis-sized payloads are a disagreement between peers,
            // not a substrate failure.
            NetError::GatherSizeMismatch { .. }
            | NetError::MessageTooLarge { .. }
            | NetError::Serialization(_) => Self::ProtocolMismatch(err.to_string()),
            other => Self::CollectiveFailure(other),
        }
    }
}

impl From<UnknownPixelFormat> for CompositeError {
    fn from(err: UnknownPixelFormat) -> Self {
        Self::Configuration(err.to_string())
    }
}

impl From<ImageError> for CompositeError {
    fn from(err: ImageError) -> Self {
        Self::Configuration(err.to_string())
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, CompositeError>;
