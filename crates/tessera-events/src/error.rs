//! Channel error types.

use thiserror::Error;

/// Errors surfaced by [`Channel::emit_async`](crate::Channel::emit_async).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
    /// An async subscriber rejected the emission.
    #[error("subscriber for '{event}' failed: {message}")]
    SubscriberFailed {
        /// Event that was being emitted.
        event: String,
        /// Failure reported by the subscriber.
        message: String,
    },
}

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;
