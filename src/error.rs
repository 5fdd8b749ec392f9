//! Error types for bridged streams.

use thiserror::Error;

/// Failure channel of a bridged pull stream.
///
/// Retry exhaustion is deliberately not a variant of its own: once the retry
/// budget is spent, the original upstream error is re-surfaced unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError<E> {
    /// An error surfaced unchanged from the bridged push source.
    #[error("upstream error: {0}")]
    UpstreamError(E),
    /// The bridge buffer was full when another value arrived.
    ///
    /// Only raised under [`BufferPolicy::FailOnOverflow`](crate::config::BufferPolicy).
    #[error("bridge buffer overflowed")]
    BufferOverflow,
}

impl<E> BridgeError<E> {
    /// The wrapped upstream error, if this is one.
    pub fn into_upstream(self) -> Option<E> {
        match self {
            BridgeError::UpstreamError(error) => Some(error),
            BridgeError::BufferOverflow => None,
        }
    }
}
