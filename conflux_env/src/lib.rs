//! Conflux Environment Abstraction Layer
//!
//! Reply-socket transport for the hub, split so the session driver only
//! depends on the semantic guarantees of request/reply messaging:
//!
//! - [`ReplySocket`]: strict-alternation endpoint with sliced receives
//! - [`ZmqHost`] / [`ZmqReplySocket`]: production ZeroMQ implementation
//! - [`memory_pair`]: channel-backed pair for driving sessions in tests

mod error;
mod memory;
mod transport;
mod zmq_impl;

pub use error::TransportError;
pub use memory::{memory_pair, MemorySocket};
pub use transport::ReplySocket;
pub use zmq_impl::{ZmqHost, ZmqReplySocket};
