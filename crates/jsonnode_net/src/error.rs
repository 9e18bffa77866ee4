//! Network error types.

use std::net::SocketAddr;
use std::time::Duration;

/// Errors raised while reading or writing a single frame.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The underlying stream failed for a reason other than a clean close.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The payload bytes are not valid JSON text.
    #[error("Malformed JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    /// The length prefix announces more bytes than this node accepts.
    #[error("Frame of {len} bytes exceeds limit of {max} bytes")]
    FrameTooLarge { len: usize, max: usize },
}

/// A failed delivery attempt. Retried by the send worker, never surfaced to
/// the caller of `send`.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("Connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Connect to {addr} timed out after {timeout:?}")]
    Timeout { addr: String, timeout: Duration },

    #[error("Write to {addr} failed: {source}")]
    Write {
        addr: String,
        #[source]
        source: CodecError,
    },
}

/// Errors that can occur in the jsonnode_net crate.
///
/// Only construction-time failures reach the caller. Everything that
/// happens inside the accept and send workers is logged and contained.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// The listening socket could not be bound.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization / deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration could not be loaded or saved.
    #[error("Config error: {0}")]
    Config(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
