//! Decides what a failed statement means for the retry loop.
//!
//! The classifier is total: every `DriverError` maps to exactly one
//! `ErrorClass`, and anything not explicitly listed is `Fatal`.

use serde::Deserialize;

use crate::interfaces::{DriverError, DriverErrorKind};

/// MySQL error numbers for lock contention that clears on its own.
pub const DEFAULT_TRANSIENT_CODES: &[u16] = &[
    1205, // ER_LOCK_WAIT_TIMEOUT
    1213, // ER_LOCK_DEADLOCK
    1317, // ER_QUERY_INTERRUPTED
];

/// Error numbers meaning the session is unusable and must be replaced.
pub const DEFAULT_RECONNECT_CODES: &[u16] = &[
    1040, // ER_CON_COUNT_ERROR
    1053, // ER_SERVER_SHUTDOWN
    1290, // ER_OPTION_PREVENTS_STATEMENT (--read-only after failover)
    1836, // ER_READ_ONLY_MODE
    1927, // ER_CONNECTION_KILLED
    2002, // CR_CONNECTION_ERROR
    2003, // CR_CONN_HOST_ERROR
    2006, // CR_SERVER_GONE_ERROR
    2013, // CR_SERVER_LOST
    2055, // CR_SERVER_LOST_EXTENDED
    9001, // ProxySQL: max connect timeout reached
    9006, // ProxySQL: no backend available
];

const DEFAULT_TRANSIENT_MESSAGES: &[&str] = &[
    "lock wait timeout exceeded",
    "deadlock found when trying to get lock",
    "timeout waiting for a response from the last query",
];

const DEFAULT_RECONNECT_MESSAGES: &[&str] = &[
    "lost connection to mysql server",
    "mysql server has gone away",
    "max connect timeout reached",
    "connection is locked to hostgroup",
    "running with the --read-only option",
];

/// Outcome of classifying a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retry on the same session.
    Transient,
    /// Retry after replacing the session.
    Disconnected,
    /// Surface immediately.
    Fatal,
}

impl ErrorClass {
    pub fn is_retryable(self) -> bool {
        !matches!(self, ErrorClass::Fatal)
    }

    pub fn requires_reconnect(self) -> bool {
        matches!(self, ErrorClass::Disconnected)
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorClass::Transient => write!(f, "transient"),
            ErrorClass::Disconnected => write!(f, "disconnected"),
            ErrorClass::Fatal => write!(f, "fatal"),
        }
    }
}

/// Which driver errors are worth retrying.
///
/// Codes are matched first; message fragments (case-insensitive) cover proxies
/// that rewrite or drop the error number.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub transient_codes: Vec<u16>,
    pub reconnect_codes: Vec<u16>,
    pub transient_messages: Vec<String>,
    pub reconnect_messages: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            transient_codes: DEFAULT_TRANSIENT_CODES.to_vec(),
            reconnect_codes: DEFAULT_RECONNECT_CODES.to_vec(),
            transient_messages: DEFAULT_TRANSIENT_MESSAGES
                .iter()
                .map(|m| m.to_string())
                .collect(),
            reconnect_messages: DEFAULT_RECONNECT_MESSAGES
                .iter()
                .map(|m| m.to_string())
                .collect(),
        }
    }
}

/// Pure classification of driver errors.
#[derive(Debug, Clone, Default)]
pub struct ErrorClassifier {
    config: ClassifierConfig,
}

impl ErrorClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        let config = ClassifierConfig {
            transient_messages: lowercase(config.transient_messages),
            reconnect_messages: lowercase(config.reconnect_messages),
            ..config
        };
        Self { config }
    }

    pub fn classify(&self, error: &DriverError) -> ErrorClass {
        match error.kind {
            DriverErrorKind::ConnectionLost => ErrorClass::Disconnected,
            DriverErrorKind::Other => ErrorClass::Fatal,
            DriverErrorKind::Database => self.classify_database(error),
        }
    }

    fn classify_database(&self, error: &DriverError) -> ErrorClass {
        if let Some(code) = error.code {
            if self.config.reconnect_codes.contains(&code) {
                return ErrorClass::Disconnected;
            }
            if self.config.transient_codes.contains(&code) {
                return ErrorClass::Transient;
            }
        }

        let message = error.message.to_lowercase();
        if contains_any(&message, &self.config.reconnect_messages) {
            ErrorClass::Disconnected
        } else if contains_any(&message, &self.config.transient_messages) {
            ErrorClass::Transient
        } else {
            ErrorClass::Fatal
        }
    }
}

fn lowercase(messages: Vec<String>) -> Vec<String> {
    messages.into_iter().map(|m| m.to_lowercase()).collect()
}

fn contains_any(message: &str, fragments: &[String]) -> bool {
    fragments
        .iter()
        .any(|fragment| !fragment.is_empty() && message.contains(fragment.as_str()))
}
