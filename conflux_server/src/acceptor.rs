//! Rendezvous acceptor.
//!
//! New clients send the session endpoint they want to speak on; the
//! acceptor binds a REP socket there, spawns a session thread for it, and
//! echoes the endpoint back as confirmation. Re-sending a known endpoint
//! just repeats the echo.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{info, warn};

use conflux_core::hub::Hub;
use conflux_env::{ReplySocket, TransportError, ZmqHost};

use crate::session::Session;

pub struct Acceptor {
    hub: Arc<Hub>,
    /// Context for the rendezvous endpoint.
    rendezvous: ZmqHost,
    /// Context shared by every session socket.
    sessions: ZmqHost,
}

impl Acceptor {
    pub fn new(hub: Arc<Hub>) -> Acceptor {
        Acceptor { hub, rendezvous: ZmqHost::new(), sessions: ZmqHost::new() }
    }

    /// Serves the rendezvous endpoint until shutdown, then joins every
    /// session thread.
    pub fn run(&self, endpoint: &str) -> Result<(), TransportError> {
        let mut socket = self.rendezvous.reply_socket(endpoint)?;
        info!("[{}] rendezvous endpoint ready, waiting for clients", endpoint);

        let mut workers: BTreeMap<String, JoinHandle<()>> = BTreeMap::new();
        while !self.hub.shutdown.is_triggered() {
            let payload = match socket.recv() {
                Ok(Some(payload)) => payload,
                Ok(None) => continue,
                Err(e) => {
                    info!("[{}] {}, rendezvous endpoint prepares to close", endpoint, e);
                    self.hub.shutdown.trigger();
                    break;
                }
            };
            let session_endpoint = String::from_utf8_lossy(&payload).to_string();

            if !workers.contains_key(&session_endpoint) {
                match self.spawn_session(&session_endpoint) {
                    Ok(handle) => {
                        workers.insert(session_endpoint.clone(), handle);
                    }
                    Err(e) => {
                        warn!("[{}] could not open session endpoint: {}", session_endpoint, e)
                    }
                }
            }

            if let Err(e) = socket.send(session_endpoint.as_bytes()) {
                info!("[{}] {}, rendezvous endpoint prepares to close", endpoint, e);
                self.hub.shutdown.trigger();
                break;
            }
        }

        for (session_endpoint, handle) in workers {
            if handle.join().is_err() {
                warn!("[{}] session thread panicked", session_endpoint);
            }
        }
        Ok(())
    }

    fn spawn_session(&self, endpoint: &str) -> Result<JoinHandle<()>, TransportError> {
        let socket = self.sessions.reply_socket(endpoint)?;
        let hub = Arc::clone(&self.hub);
        Ok(thread::spawn(move || Session::new(socket, hub).run()))
    }
}
