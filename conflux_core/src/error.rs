//! Error types for the Conflux state layer.

use thiserror::Error;

/// Errors raised while validating meta-data against the hub state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A unit or handedness token the conversion tables don't know.
    #[error("unknown unit token: {0}")]
    UnknownUnit(String),

    /// An attribute name outside the closed attribute set.
    #[error("unknown attribute: {0}")]
    UnknownAttribute(String),

    /// A first request without a simulation name.
    #[error("request meta data from socket {0} doesn't have a name")]
    MissingSimulationName(String),
}
