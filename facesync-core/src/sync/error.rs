//! Sync error types.

use thiserror::Error;

/// Errors handing a message to the transport.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChannelError {
    /// The transport is not connected or has shut down.
    #[error("Channel unavailable: {0}")]
    Unavailable(String),

    /// The message could not be encoded for the wire.
    #[error("Failed to encode sync message: {0}")]
    Encode(String),
}
