//! MySQL sessions over sqlx.
//!
//! Every statement goes through `sqlx::raw_sql`, the text protocol. Trigger
//! DDL and several administrative statements cannot be prepared, and text
//! results render uniformly as strings.

use async_trait::async_trait;
use sqlx::mysql::{MySqlDatabaseError, MySqlRow};
use sqlx::{Column, Connection, Executor, MySqlConnection, Row as _};
use tracing::{debug, warn};

use crate::config::DatabaseConfig;
use crate::interfaces::{
    BackendIdentity, DriverError, DriverErrorKind, DriverResult, Row, Session, SessionFactory,
};

/// Query identifying the server behind the session, even through a proxy.
const IDENTITY_SQL: &str = "SELECT @@global.hostname, @@global.server_id";

impl From<sqlx::Error> for DriverError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) => {
                let sql_state = db.code().map(|code| code.into_owned());
                let code = db
                    .try_downcast_ref::<MySqlDatabaseError>()
                    .map(MySqlDatabaseError::number);
                DriverError {
                    kind: DriverErrorKind::Database,
                    code,
                    sql_state,
                    message: db.message().to_string(),
                }
            }
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => DriverError::connection_lost(err.to_string()),
            _ => DriverError::other(err.to_string()),
        }
    }
}

/// One MySQL connection.
pub struct MySqlSession {
    conn: MySqlConnection,
}

impl MySqlSession {
    pub async fn connect(url: &str) -> DriverResult<Self> {
        let conn = MySqlConnection::connect(url).await?;
        Ok(Self { conn })
    }

    pub async fn close(self) {
        if let Err(e) = self.conn.close().await {
            debug!(error = %e, "Error closing session");
        }
    }

    async fn fetch(&mut self, sql: &str) -> DriverResult<Vec<Row>> {
        let rows = (&mut self.conn).fetch_all(sqlx::raw_sql(sql)).await?;
        Ok(rows.iter().map(render_row).collect())
    }
}

#[async_trait]
impl Session for MySqlSession {
    async fn execute(&mut self, sql: &str) -> DriverResult<()> {
        (&mut self.conn).execute(sqlx::raw_sql(sql)).await?;
        Ok(())
    }

    async fn update(&mut self, sql: &str) -> DriverResult<u64> {
        let result = (&mut self.conn).execute(sqlx::raw_sql(sql)).await?;
        Ok(result.rows_affected())
    }

    async fn select_one(&mut self, sql: &str) -> DriverResult<Option<Row>> {
        Ok(self.fetch(sql).await?.into_iter().next())
    }

    async fn select_value(&mut self, sql: &str) -> DriverResult<Option<String>> {
        let rows = self.fetch(sql).await?;
        Ok(rows.first().and_then(Row::first).map(str::to_string))
    }

    async fn select_values(&mut self, sql: &str) -> DriverResult<Vec<String>> {
        let rows = self.fetch(sql).await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.first().map(str::to_string))
            .collect())
    }

    async fn query(&mut self, sql: &str) -> DriverResult<Vec<Row>> {
        self.fetch(sql).await
    }

    async fn backend_identity(&mut self) -> DriverResult<BackendIdentity> {
        let row = self
            .fetch(IDENTITY_SQL)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DriverError::other("backend identity query returned no rows"))?;

        let columns = row.columns();
        let hostname = columns.first().and_then(|(_, v)| v.as_deref()).unwrap_or("");
        let server_id = columns.get(1).and_then(|(_, v)| v.as_deref()).unwrap_or("");
        Ok(BackendIdentity::new(format!("{hostname}:{server_id}")))
    }
}

fn render_row(row: &MySqlRow) -> Row {
    let columns = row
        .columns()
        .iter()
        .map(|column| {
            let index = column.ordinal();
            (column.name().to_string(), render_value(row, index))
        })
        .collect();
    Row::new(columns)
}

/// Text protocol values arrive in their textual form.
fn render_value(row: &MySqlRow, index: usize) -> Option<String> {
    match row.try_get_unchecked::<Option<String>, _>(index) {
        Ok(value) => value,
        Err(_) => row
            .try_get_unchecked::<Option<Vec<u8>>, _>(index)
            .ok()
            .flatten()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()),
    }
}

/// Opens `MySqlSession`s from a URL.
///
/// Through a routing proxy a fresh connection may land on any backend. When
/// a pin is requested the connector re-dials a bounded number of times until
/// the identity matches, then returns the last session either way.
#[derive(Debug, Clone)]
pub struct MySqlConnector {
    url: String,
    pinned_connect_attempts: u32,
}

impl MySqlConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            pinned_connect_attempts: crate::config::DEFAULT_PINNED_CONNECT_ATTEMPTS,
        }
    }

    pub fn from_config(config: &DatabaseConfig) -> Self {
        Self::new(config.url.clone()).with_pinned_connect_attempts(config.pinned_connect_attempts)
    }

    pub fn with_pinned_connect_attempts(mut self, attempts: u32) -> Self {
        self.pinned_connect_attempts = attempts;
        self
    }
}

#[async_trait]
impl SessionFactory for MySqlConnector {
    async fn connect(&self, pin: Option<&BackendIdentity>) -> DriverResult<Box<dyn Session>> {
        let mut session = MySqlSession::connect(&self.url).await?;
        let Some(pin) = pin else {
            return Ok(Box::new(session));
        };

        for attempt in 1..self.pinned_connect_attempts.max(1) {
            let identity = session.backend_identity().await?;
            if &identity == pin {
                return Ok(Box::new(session));
            }
            debug!(attempt, %identity, %pin, "Session landed on another backend, re-dialing");
            session.close().await;
            session = MySqlSession::connect(&self.url).await?;
        }

        warn!(%pin, "Could not confirm pinned backend");
        Ok(Box::new(session))
    }
}
