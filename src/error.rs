//! Crate-wide error kinds.

use thiserror::Error;

/// The result type used throughout the transport, channel, and client driver.
pub type Result<T> = std::result::Result<T, LimeError>;

/// An error raised by the LIME transport, channel, or client session driver.
///
/// Each variant corresponds to one of the error kinds named in the protocol
/// design: *invalid-argument*, *invalid-state*, *buffer-overflow*,
/// *serialization*, *io*, and *timeout*.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LimeError {
    /// A required parameter was null/missing, a URI used the wrong scheme, or
    /// a node string was malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is not legal in the channel's or transport's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// An inbound envelope exceeded the configured buffer capacity.
    #[error("buffer overflow: envelope exceeds capacity of {capacity} bytes")]
    BufferOverflow {
        /// The configured buffer capacity, in bytes.
        capacity: usize,
    },

    /// JSON could not be produced or parsed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The underlying socket read or write failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A bounded wait in the client session driver expired.
    #[error("timeout waiting for {0}")]
    Timeout(String),
}

impl LimeError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        LimeError::InvalidArgument(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        LimeError::InvalidState(message.into())
    }
}
