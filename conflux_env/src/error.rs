//! Error types for the transport abstraction.

use thiserror::Error;

/// Errors surfaced by reply sockets.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The underlying socket failed; the session treats this as fatal.
    #[error("transport error: {0}")]
    Socket(String),

    /// The peer went away and no further messages can arrive.
    #[error("transport closed")]
    Closed,
}

impl TransportError {
    /// Creates a socket error.
    pub fn socket(msg: impl Into<String>) -> Self {
        Self::Socket(msg.into())
    }
}
