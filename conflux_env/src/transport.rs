//! Reply-socket abstraction for hub endpoints.

use crate::error::TransportError;

/// One end of a strictly alternating request/reply conversation.
///
/// # Implementations
///
/// - **Production**: a ZeroMQ REP socket with a receive timeout
/// - **Tests**: a channel-backed in-memory pair
///
/// # Receive semantics
///
/// `recv` waits at most one timeout slice and returns `Ok(None)` when no
/// message arrived, so callers can observe the shutdown token between
/// slices instead of blocking forever. `Err(TransportError::Closed)` means
/// the peer is gone for good.
pub trait ReplySocket {
    /// Receives the next message, or `None` after an idle timeout slice.
    fn recv(&mut self) -> Result<Option<Vec<u8>>, TransportError>;

    /// Sends one reply message.
    fn send(&mut self, payload: &[u8]) -> Result<(), TransportError>;

    /// The endpoint this socket is bound to.
    fn endpoint(&self) -> &str;

    /// Releases the endpoint. Further calls fail.
    fn unbind(&mut self) -> Result<(), TransportError>;
}
