//! Database session interface.

use std::fmt;

use async_trait::async_trait;

/// Result type for session primitives.
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Broad category of a driver failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// The server (or a proxy in front of it) rejected the statement.
    Database,
    /// The transport failed: reset, closed, timed out, or protocol desync.
    ConnectionLost,
    /// Anything else the driver can raise (decode errors, bad configuration).
    Other,
}

/// Typed failure raised by a session primitive.
///
/// `code` is the MySQL error number when the server supplied one; proxies
/// sometimes only supply a message, which is why the message is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverError {
    pub kind: DriverErrorKind,
    pub code: Option<u16>,
    pub sql_state: Option<String>,
    pub message: String,
}

impl DriverError {
    /// A server-side error with a MySQL error number.
    pub fn database(code: u16, message: impl Into<String>) -> Self {
        Self {
            kind: DriverErrorKind::Database,
            code: Some(code),
            sql_state: None,
            message: message.into(),
        }
    }

    /// A transport-level failure.
    pub fn connection_lost(message: impl Into<String>) -> Self {
        Self {
            kind: DriverErrorKind::ConnectionLost,
            code: None,
            sql_state: None,
            message: message.into(),
        }
    }

    /// Any other driver failure.
    pub fn other(message: impl Into<String>) -> Self {
        Self {
            kind: DriverErrorKind::Other,
            code: None,
            sql_state: None,
            message: message.into(),
        }
    }

    pub fn with_sql_state(mut self, sql_state: impl Into<String>) -> Self {
        self.sql_state = Some(sql_state.into());
        self
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, &self.sql_state) {
            (Some(code), Some(state)) => write!(f, "({code}/{state}) {}", self.message),
            (Some(code), None) => write!(f, "({code}) {}", self.message),
            _ => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for DriverError {}

/// Identifies the physical backend a session is bound to.
///
/// Behind a routing proxy two sessions opened with the same DSN may land on
/// different servers; comparing identities is how a reconnect detects that.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BackendIdentity(String);

impl BackendIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BackendIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A result row rendered as text, in column order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    columns: Vec<(String, Option<String>)>,
}

impl Row {
    pub fn new(columns: Vec<(String, Option<String>)>) -> Self {
        Self { columns }
    }

    /// Value of the named column; `None` when the column is absent or NULL.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .and_then(|(_, value)| value.as_deref())
    }

    /// Value of the first column.
    pub fn first(&self) -> Option<&str> {
        self.columns.first().and_then(|(_, value)| value.as_deref())
    }

    pub fn columns(&self) -> &[(String, Option<String>)] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// One live database session.
///
/// The five statement primitives mirror what the migration steps need;
/// `query` is the generic pass-through for anything else.
///
/// Implementations:
/// - `MySqlSession`: a single sqlx MySQL connection
/// - `MockSession`: in-memory schema for tests
#[async_trait]
pub trait Session: Send {
    /// Run a statement, discarding any result.
    async fn execute(&mut self, sql: &str) -> DriverResult<()>;

    /// Run a data-modifying statement and return the affected row count.
    async fn update(&mut self, sql: &str) -> DriverResult<u64>;

    /// First row of the result, if any.
    async fn select_one(&mut self, sql: &str) -> DriverResult<Option<Row>>;

    /// First column of the first row, if any.
    async fn select_value(&mut self, sql: &str) -> DriverResult<Option<String>>;

    /// First column of every row. NULLs are skipped.
    async fn select_values(&mut self, sql: &str) -> DriverResult<Vec<String>>;

    /// Every row of the result.
    async fn query(&mut self, sql: &str) -> DriverResult<Vec<Row>>;

    /// Identity of the backend this session is bound to.
    async fn backend_identity(&mut self) -> DriverResult<BackendIdentity>;
}

/// Opens fresh sessions.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Open a new session.
    ///
    /// When `pin` is given the factory should do what it can to land on that
    /// backend. It is not required to guarantee it; callers verify the
    /// identity of the returned session.
    async fn connect(&self, pin: Option<&BackendIdentity>) -> DriverResult<Box<dyn Session>>;
}
