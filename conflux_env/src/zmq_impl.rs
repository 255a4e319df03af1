//! Production reply sockets backed by ZeroMQ.

use crate::error::TransportError;
use crate::transport::ReplySocket;

/// How long a receive blocks before yielding control back to the caller.
const RECV_TIMEOUT_MS: i32 = 100;

/// A ZeroMQ context plus the endpoints it hands out.
///
/// The hub runs two of these: one owned by the rendezvous acceptor, one
/// shared by every session socket.
pub struct ZmqHost {
    context: zmq::Context,
}

impl ZmqHost {
    pub fn new() -> ZmqHost {
        ZmqHost { context: zmq::Context::new() }
    }

    /// Binds a REP socket to an endpoint.
    pub fn reply_socket(&self, endpoint: &str) -> Result<ZmqReplySocket, TransportError> {
        let socket = self
            .context
            .socket(zmq::REP)
            .map_err(|e| TransportError::socket(e.to_string()))?;
        socket
            .set_rcvtimeo(RECV_TIMEOUT_MS)
            .map_err(|e| TransportError::socket(e.to_string()))?;
        socket
            .bind(endpoint)
            .map_err(|e| TransportError::socket(e.to_string()))?;
        Ok(ZmqReplySocket { socket, endpoint: endpoint.to_string() })
    }
}

impl Default for ZmqHost {
    fn default() -> Self {
        ZmqHost::new()
    }
}

/// A bound REP socket speaking the strict request/reply alternation.
pub struct ZmqReplySocket {
    socket: zmq::Socket,
    endpoint: String,
}

impl ReplySocket for ZmqReplySocket {
    fn recv(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        match self.socket.recv_bytes(0) {
            Ok(payload) => Ok(Some(payload)),
            Err(zmq::Error::EAGAIN) => Ok(None), // idle timeout slice
            Err(e) => Err(TransportError::socket(e.to_string())),
        }
    }

    fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        self.socket
            .send(payload, 0)
            .map_err(|e| TransportError::socket(e.to_string()))
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn unbind(&mut self) -> Result<(), TransportError> {
        self.socket
            .unbind(&self.endpoint)
            .map_err(|e| TransportError::socket(e.to_string()))
    }
}
