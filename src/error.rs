//! Engine-level error types.
//!
//! Per spec, only a handful of conditions are fatal `Result` errors:
//! invalid configuration, capacity exhaustion, and calling `consume` after
//! `terminate`. Everything else recoverable (transport send failures,
//! malformed receives, expired/duplicate data) is counted in
//! [`crate::metrics`] and logged, not propagated as an `Err`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("feature map is at capacity ({capacity} slots)")]
    CapacityExhausted { capacity: usize },

    #[error("engine has been terminated")]
    Terminated,

    #[error("query already finalized")]
    AlreadyFinalized,

    #[error("i/o error: {0}")]
    Io(String),
}
