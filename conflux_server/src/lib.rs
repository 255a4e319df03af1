//! Conflux Server - Multi-Client Coordination Layer
//!
//! Session drivers and the rendezvous acceptor for the Conflux hub. Each
//! client gets a dedicated reply socket and thread; the shared world state
//! lives in [`conflux_core`] behind one global mutex.

pub mod acceptor;
pub mod session;

pub use acceptor::Acceptor;
pub use session::{Session, SessionError};
