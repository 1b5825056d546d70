//! Errors surfaced by `ResilientConnection`.

use super::classify::ErrorClass;
use crate::interfaces::{BackendIdentity, DriverError};

/// Result type for connection operations.
pub type Result<T> = std::result::Result<T, ConnectionError>;

/// A statement (or reconnect) that could not be completed.
///
/// Every variant carries the diagnostic label of the caller that issued the
/// statement and the number of attempts made, so operators can tell which
/// migration step stalled.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("[{label}] {operation} failed after {attempts} attempt(s) ({class}): {source}")]
    Failed {
        label: String,
        operation: &'static str,
        attempts: u32,
        class: ErrorClass,
        #[source]
        source: DriverError,
    },

    #[error(
        "[{label}] reconnected to backend {actual} but the session was pinned to {expected} (after {attempts} attempt(s))"
    )]
    HostMismatch {
        label: String,
        expected: BackendIdentity,
        actual: BackendIdentity,
        attempts: u32,
    },

    #[error("[{label}] could not open session: {source}")]
    Connect {
        label: String,
        #[source]
        source: DriverError,
    },
}

impl ConnectionError {
    /// Diagnostic label of the caller.
    pub fn label(&self) -> &str {
        match self {
            ConnectionError::Failed { label, .. }
            | ConnectionError::HostMismatch { label, .. }
            | ConnectionError::Connect { label, .. } => label,
        }
    }

    /// Total attempts made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            ConnectionError::Failed { attempts, .. }
            | ConnectionError::HostMismatch { attempts, .. } => *attempts,
            ConnectionError::Connect { .. } => 1,
        }
    }

    /// The underlying driver error, when there is one.
    pub fn driver_error(&self) -> Option<&DriverError> {
        match self {
            ConnectionError::Failed { source, .. } | ConnectionError::Connect { source, .. } => {
                Some(source)
            }
            ConnectionError::HostMismatch { .. } => None,
        }
    }
}
