//! Channel-backed socket pairs for tests.

use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use crate::error::TransportError;
use crate::transport::ReplySocket;

const RECV_TIMEOUT: Duration = Duration::from_millis(10);

/// One end of an in-memory request/reply link.
///
/// Dropping either end closes the link: the survivor's next receive reports
/// `TransportError::Closed`, which mirrors a peer disconnect in production.
pub struct MemorySocket {
    endpoint: String,
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
}

/// Creates a connected pair of in-memory sockets.
pub fn memory_pair(endpoint: &str) -> (MemorySocket, MemorySocket) {
    let (server_tx, client_rx) = channel();
    let (client_tx, server_rx) = channel();
    let server = MemorySocket { endpoint: endpoint.to_string(), tx: server_tx, rx: server_rx };
    let client = MemorySocket { endpoint: endpoint.to_string(), tx: client_tx, rx: client_rx };
    (server, client)
}

impl ReplySocket for MemorySocket {
    fn recv(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        match self.rx.recv_timeout(RECV_TIMEOUT) {
            Ok(payload) => Ok(Some(payload)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Closed),
        }
    }

    fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        self.tx.send(payload.to_vec()).map_err(|_| TransportError::Closed)
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn unbind(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

impl MemorySocket {
    /// Receives with a longer patience window, for test clients that wait on
    /// a server thread to finish a bind.
    pub fn recv_blocking(&mut self, patience: Duration) -> Result<Vec<u8>, TransportError> {
        match self.rx.recv_timeout(patience) {
            Ok(payload) => Ok(payload),
            Err(RecvTimeoutError::Timeout) => Err(TransportError::socket("receive timed out")),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_round_trip() {
        let (mut server, mut client) = memory_pair("mem://test");
        client.send(b"hello").unwrap();
        assert_eq!(server.recv().unwrap(), Some(b"hello".to_vec()));

        server.send(b"world").unwrap();
        assert_eq!(client.recv().unwrap(), Some(b"world".to_vec()));
    }

    #[test]
    fn test_idle_receive_yields_none() {
        let (mut server, _client) = memory_pair("mem://test");
        assert!(server.recv().unwrap().is_none());
    }

    #[test]
    fn test_dropped_peer_closes_link() {
        let (mut server, client) = memory_pair("mem://test");
        drop(client);
        assert!(matches!(server.recv(), Err(TransportError::Closed)));
    }
}
