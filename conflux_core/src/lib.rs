//! Conflux Core - World State and Conversion Layer
//!
//! The I/O-free half of the Conflux hub: the closed attribute table, unit
//! and handedness conversion, the arena-backed world registry with effort
//! aggregation, the typed meta-data documents with sentinel expansion, and
//! the cross-simulation renegotiation mailbox. Sessions in the server crate
//! drive all of this under one global mutex; nothing here touches a socket.

pub mod attribute;
pub mod convert;
pub mod error;
pub mod hub;
pub mod mailbox;
pub mod meta;
pub mod registry;
pub mod shutdown;

// Re-export key types for convenience
pub use attribute::{Attribute, ALL_ATTRIBUTES};
pub use convert::{unit_scale, ConversionTable, Handedness, UnitSystem};
pub use error::CoreError;
pub use hub::Hub;
pub use mailbox::{Mailbox, MergeState, PendingMetaData};
pub use meta::{parse_attribute_map, RequestMetaData, ResponseMetaData};
pub use registry::{AttributeEntry, EntryId, ProducerBinding, Registry};
pub use shutdown::ShutdownToken;
