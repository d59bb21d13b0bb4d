//! Error types for the TopoLVM e2e harness
//!
//! Every failure a scenario step can produce falls into one of two classes:
//! convergence-pending errors, which the eventual engine is allowed to retry,
//! and fatal errors, which abort the scenario immediately with whatever
//! diagnostic output was captured.

use std::time::Duration;
use thiserror::Error;

/// Unified error type for the harness
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // External Command Errors
    // =========================================================================
    #[error("Command `{command}` failed ({status}): stdout={stdout}, stderr={stderr}")]
    Command {
        command: String,
        status: String,
        stdout: String,
        stderr: String,
    },

    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // =========================================================================
    // Decode Errors
    // =========================================================================
    #[error("Failed to decode {kind}: {source}; payload={payload}")]
    Decode {
        kind: String,
        payload: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unexpected output from {what}: {output:?}")]
    UnexpectedOutput { what: String, output: String },

    #[error("Manifest render error: {0}")]
    Manifest(#[from] serde_yaml::Error),

    // =========================================================================
    // Capacity / Oracle Errors
    // =========================================================================
    #[error("Capacity is not annotated on node {node}: missing {key}")]
    MissingCapacity { node: String, key: String },

    #[error("Invalid capacity annotation on node {node}: {value:?}")]
    InvalidCapacity { node: String, value: String },

    #[error("Capacity parse error: {0}")]
    CapacityParse(String),

    #[error("Expectation violated: {0}")]
    Assertion(String),

    // =========================================================================
    // Convergence Errors
    // =========================================================================
    #[error("Not yet converged: {0}")]
    NotConverged(String),

    #[error("Timed out after {elapsed:?} ({attempts} attempts) waiting for {what}: {last}")]
    Timeout {
        what: String,
        elapsed: Duration,
        attempts: u32,
        last: Box<Error>,
    },

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// How a failure should be treated by whoever observes it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Observed state has not caught up yet; poll again
    Pending,
    /// Abort the scenario now
    Fatal,
}

impl Error {
    /// Classify this error
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::NotConverged(_) => ErrorClass::Pending,

            // Query failures that are not "object absent" mean the control
            // plane itself is unhealthy; probes inside a consumer convert
            // their own failures into NotConverged.
            Error::Command { .. }
            | Error::UnexpectedOutput { .. }
            | Error::Internal(_)
            | Error::Configuration(_)
            | Error::Spawn { .. }
            | Error::Decode { .. }
            | Error::Manifest(_)
            | Error::MissingCapacity { .. }
            | Error::InvalidCapacity { .. }
            | Error::CapacityParse(_)
            | Error::Assertion(_)
            | Error::Timeout { .. }
            | Error::JsonParse(_)
            | Error::Io(_) => ErrorClass::Fatal,
        }
    }

    /// Check if the eventual engine may retry after this error
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Pending
    }

    /// Shorthand for a not-yet-converged observation
    pub fn pending(msg: impl Into<String>) -> Self {
        Error::NotConverged(msg.into())
    }

    /// Shorthand for an oracle violation
    pub fn assertion(msg: impl Into<String>) -> Self {
        Error::Assertion(msg.into())
    }
}

/// Result type alias for the harness
pub type Result<T> = std::result::Result<T, Error>;
