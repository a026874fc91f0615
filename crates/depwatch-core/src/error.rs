//! Error types for construction-time validation and scheduler usage.
//!
//! Probe failures are not here: they are values of
//! [`CheckError`](crate::checker::CheckError) and never escape a check loop.

use thiserror::Error;

/// Invalid configuration or descriptor, raised before anything runs.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: String,
        min: String,
        max: String,
    },

    #[error("timeout {timeout} must be less than interval {interval}")]
    TimeoutNotBelowInterval { timeout: String, interval: String },

    #[error("invalid name {0:?}: must match [a-z][a-z0-9-]* and be 1-63 characters")]
    InvalidName(String),

    #[error("invalid label name {0:?}")]
    InvalidLabel(String),

    #[error("reserved label name {0:?}")]
    ReservedLabel(String),

    #[error("invalid port {0:?}: must be an integer in 1-65535")]
    InvalidPort(String),

    #[error("missing host")]
    MissingHost,

    #[error("missing critical flag for dependency {0:?}")]
    MissingCritical(String),

    #[error("dependency {0:?} has no endpoints")]
    NoEndpoints(String),

    #[error("dependency {name:?} lists endpoint {host}:{port} more than once")]
    DuplicateEndpoint {
        name: String,
        host: String,
        port: String,
    },

    #[error("unknown dependency type {0:?}")]
    UnknownType(String),

    #[error("invalid duration {0:?}")]
    InvalidDuration(String),

    #[error("invalid health path {0:?}: must be an absolute path")]
    InvalidPath(String),

    #[error("invalid header {0:?}")]
    InvalidHeader(String),

    #[error("conflicting auth options: {0}")]
    ConflictingAuth(String),
}

/// Misuse of the scheduler lifecycle or its mutation API.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler already started")]
    AlreadyStarted,

    #[error("scheduler already stopped")]
    AlreadyStopped,

    #[error("scheduler not started")]
    NotStarted,

    #[error("scheduler stopped")]
    Stopped,

    #[error("endpoint not found: {0}")]
    EndpointNotFound(String),

    #[error("endpoint already registered: {0}")]
    DuplicateEndpoint(String),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
