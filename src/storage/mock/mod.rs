//! Mock session backend for testing.
//!
//! `MockDatabase` holds an in-memory schema (table and trigger names) and a
//! log of every statement received. Faults can be queued to make the next
//! matching statement, or the next connect, fail with a chosen driver error.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::interfaces::{
    BackendIdentity, DriverError, DriverResult, Row, Session, SessionFactory,
};

/// Backend identity handed out when no identities are queued.
pub const DEFAULT_BACKEND: &str = "mock-backend-1";

/// A queued statement failure.
struct Fault {
    /// Upper-cased fragment the statement must contain; `None` matches anything.
    pattern: Option<String>,
    error: DriverError,
    remaining: u32,
}

#[derive(Default)]
struct MockState {
    tables: Vec<String>,
    triggers: Vec<String>,
    statements: Vec<String>,
    faults: Vec<Fault>,
    connect_faults: VecDeque<DriverError>,
    backends: VecDeque<String>,
    pins: Vec<Option<BackendIdentity>>,
    stubs: Vec<(String, Vec<Row>)>,
    affected_rows: u64,
    connects: u32,
}

/// Shared in-memory database. Cloning shares state.
#[derive(Clone, Default)]
pub struct MockDatabase {
    state: Arc<Mutex<MockState>>,
}

impl MockDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory opening sessions against this database.
    pub fn connector(&self) -> MockConnector {
        MockConnector { db: self.clone() }
    }

    pub async fn add_table(&self, name: &str) {
        self.state.lock().await.tables.push(name.to_string());
    }

    pub async fn add_trigger(&self, name: &str) {
        self.state.lock().await.triggers.push(name.to_string());
    }

    pub async fn tables(&self) -> Vec<String> {
        self.state.lock().await.tables.clone()
    }

    pub async fn triggers(&self) -> Vec<String> {
        self.state.lock().await.triggers.clone()
    }

    /// Every statement received, as sent (including proxy tags).
    pub async fn statements(&self) -> Vec<String> {
        self.state.lock().await.statements.clone()
    }

    /// Statements that mutate the schema.
    pub async fn mutations(&self) -> Vec<String> {
        self.state
            .lock()
            .await
            .statements
            .iter()
            .filter(|sql| {
                let upper = strip_comments(sql).to_ascii_uppercase();
                !(upper.starts_with("SHOW") || upper.starts_with("SELECT"))
            })
            .cloned()
            .collect()
    }

    pub async fn clear_statements(&self) {
        self.state.lock().await.statements.clear();
    }

    /// Fail the next statement, whatever it is.
    pub async fn fail_next(&self, error: DriverError) {
        self.state.lock().await.faults.push(Fault {
            pattern: None,
            error,
            remaining: 1,
        });
    }

    /// Fail the next `times` statements containing `pattern` (case-insensitive).
    pub async fn fail_on(&self, pattern: &str, error: DriverError, times: u32) {
        self.state.lock().await.faults.push(Fault {
            pattern: Some(pattern.to_ascii_uppercase()),
            error,
            remaining: times,
        });
    }

    /// Fail the next connect attempt.
    pub async fn fail_connect(&self, error: DriverError) {
        self.state.lock().await.connect_faults.push_back(error);
    }

    /// Identities handed out to successive connects, before falling back to
    /// [`DEFAULT_BACKEND`].
    pub async fn queue_backends(&self, backends: &[&str]) {
        let mut state = self.state.lock().await;
        state
            .backends
            .extend(backends.iter().map(|b| b.to_string()));
    }

    /// Rows returned for statements containing `pattern`.
    pub async fn stub(&self, pattern: &str, rows: Vec<Row>) {
        self.state
            .lock()
            .await
            .stubs
            .push((pattern.to_ascii_uppercase(), rows));
    }

    pub async fn set_affected_rows(&self, affected: u64) {
        self.state.lock().await.affected_rows = affected;
    }

    /// Number of connect attempts, failed ones included.
    pub async fn connect_count(&self) -> u32 {
        self.state.lock().await.connects
    }

    /// The pin passed to each connect attempt, in order.
    pub async fn pins(&self) -> Vec<Option<BackendIdentity>> {
        self.state.lock().await.pins.clone()
    }

    async fn dispatch(&self, sql: &str) -> DriverResult<(Vec<Row>, u64)> {
        let mut state = self.state.lock().await;
        state.statements.push(sql.to_string());

        let statement = strip_comments(sql);
        let upper = statement.to_ascii_uppercase();

        if let Some(error) = state.take_fault(&upper) {
            return Err(error);
        }

        if let Some((_, rows)) = state.stubs.iter().find(|(p, _)| upper.contains(p.as_str())) {
            return Ok((rows.clone(), 0));
        }

        if upper == "SHOW TABLES" {
            let rows = single_column("Tables_in_mock", &state.tables);
            return Ok((rows, 0));
        }

        if upper == "SHOW TRIGGERS" {
            let rows = single_column("Trigger", &state.triggers);
            return Ok((rows, 0));
        }

        if let Some(rest) = upper.strip_prefix("DROP TRIGGER ") {
            let (if_exists, name) = drop_target(&statement, rest)?;
            return drop_object(&mut state.triggers, &name, if_exists, 1360, "Trigger does not exist")
                .map(|_| (Vec::new(), 0));
        }

        if let Some(rest) = upper.strip_prefix("DROP TABLE ") {
            let (if_exists, name) = drop_target(&statement, rest)?;
            return drop_object(&mut state.tables, &name, if_exists, 1051, "Unknown table")
                .map(|_| (Vec::new(), 0));
        }

        Ok((Vec::new(), state.affected_rows))
    }
}

impl MockState {
    fn take_fault(&mut self, upper: &str) -> Option<DriverError> {
        let index = self.faults.iter().position(|fault| match &fault.pattern {
            Some(pattern) => upper.contains(pattern.as_str()),
            None => true,
        })?;

        let fault = &mut self.faults[index];
        let error = fault.error.clone();
        fault.remaining = fault.remaining.saturating_sub(1);
        if fault.remaining == 0 {
            self.faults.remove(index);
        }
        Some(error)
    }
}

fn single_column(column: &str, values: &[String]) -> Vec<Row> {
    values
        .iter()
        .map(|value| Row::new(vec![(column.to_string(), Some(value.clone()))]))
        .collect()
}

/// Parse `[IF EXISTS] <ident>` out of a DROP statement.
///
/// `rest` is the upper-cased remainder; the identifier is taken from the
/// original statement so its case survives.
fn drop_target(statement: &str, rest: &str) -> DriverResult<(bool, String)> {
    let if_exists = rest.starts_with("IF EXISTS ");
    let ident_len = if if_exists {
        rest.len() - "IF EXISTS ".len()
    } else {
        rest.len()
    };
    let ident = statement[statement.len() - ident_len..].trim();

    let name = match ident.strip_prefix('`').and_then(|s| s.strip_suffix('`')) {
        Some(quoted) => quoted.replace("``", "`"),
        None => ident.to_string(),
    };

    if name.is_empty() {
        return Err(DriverError::database(1064, "You have an error in your SQL syntax"));
    }
    Ok((if_exists, name))
}

fn drop_object(
    objects: &mut Vec<String>,
    name: &str,
    if_exists: bool,
    code: u16,
    message: &str,
) -> DriverResult<()> {
    match objects.iter().position(|o| o == name) {
        Some(index) => {
            objects.remove(index);
            Ok(())
        }
        None if if_exists => Ok(()),
        None => Err(DriverError::database(code, format!("{message}: {name}"))),
    }
}

/// Remove `/* ... */` comments and surrounding whitespace.
fn strip_comments(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut rest = sql;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find("*/") {
            Some(end) => rest = &rest[start + 2 + end + 2..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out.trim().trim_end_matches(';').trim().to_string()
}

/// One session against a `MockDatabase`.
pub struct MockSession {
    db: MockDatabase,
    backend: BackendIdentity,
}

#[async_trait]
impl Session for MockSession {
    async fn execute(&mut self, sql: &str) -> DriverResult<()> {
        self.db.dispatch(sql).await.map(|_| ())
    }

    async fn update(&mut self, sql: &str) -> DriverResult<u64> {
        self.db.dispatch(sql).await.map(|(_, affected)| affected)
    }

    async fn select_one(&mut self, sql: &str) -> DriverResult<Option<Row>> {
        let (rows, _) = self.db.dispatch(sql).await?;
        Ok(rows.into_iter().next())
    }

    async fn select_value(&mut self, sql: &str) -> DriverResult<Option<String>> {
        let (rows, _) = self.db.dispatch(sql).await?;
        Ok(rows.first().and_then(|row| row.first()).map(str::to_string))
    }

    async fn select_values(&mut self, sql: &str) -> DriverResult<Vec<String>> {
        let (rows, _) = self.db.dispatch(sql).await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.first().map(str::to_string))
            .collect())
    }

    async fn query(&mut self, sql: &str) -> DriverResult<Vec<Row>> {
        self.db.dispatch(sql).await.map(|(rows, _)| rows)
    }

    async fn backend_identity(&mut self) -> DriverResult<BackendIdentity> {
        Ok(self.backend.clone())
    }
}

/// Opens `MockSession`s.
#[derive(Clone)]
pub struct MockConnector {
    db: MockDatabase,
}

#[async_trait]
impl SessionFactory for MockConnector {
    async fn connect(&self, pin: Option<&BackendIdentity>) -> DriverResult<Box<dyn Session>> {
        let mut state = self.db.state.lock().await;
        state.connects += 1;
        state.pins.push(pin.cloned());

        if let Some(error) = state.connect_faults.pop_front() {
            return Err(error);
        }

        let backend = state
            .backends
            .pop_front()
            .unwrap_or_else(|| DEFAULT_BACKEND.to_string());

        Ok(Box::new(MockSession {
            db: self.db.clone(),
            backend: BackendIdentity::new(backend),
        }))
    }
}
