//! Sink-specific error types.

use thiserror::Error;

/// Errors that can occur in the plugin output layer.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Writing to the output stream failed.
    #[error("output error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to send command to writer actor.
    #[error("failed to send command to writer actor")]
    ChannelSend,

    /// Internal error (e.g., thread join failure).
    #[error("internal error: {0}")]
    Internal(String),
}
