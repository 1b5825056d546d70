//! Resilient statement execution.
//!
//! `ResilientConnection` owns one live session and is the only path through
//! which migration steps and cleanup talk to the database. Every statement is
//! tagged for the routing proxy; statements issued with
//! [`ExecOptions::retrying`] run inside a bounded retry loop that reconnects
//! when the session is severed, keeping the same backend when host affinity
//! is required.

pub mod classify;
mod error;
mod primitive;

use std::sync::Arc;

use backon::BackoffBuilder;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

pub use classify::{ClassifierConfig, ErrorClass, ErrorClassifier};
pub use error::{ConnectionError, Result};

use self::primitive::{
    Execute, Primitive, Query, SelectOne, SelectValue, SelectValues, Update,
};
use crate::config::Config;
use crate::interfaces::{BackendIdentity, DriverError, Row, Session, SessionFactory};
use crate::proxy::{ProxySqlTagger, StatementTagger};
use crate::utils::retry::RetryConfig;

/// Label used when neither the call nor the connection supplies one.
pub const DEFAULT_LABEL: &str = "Connection";

/// Connection-level behavior that can change between statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConnectionOptions {
    /// A reconnect must land on the backend the previous session was bound to.
    ///
    /// Triggers and session state installed through one proxied backend are
    /// not guaranteed to be visible on another.
    pub reconnect_with_consistent_host: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            reconnect_with_consistent_host: true,
        }
    }
}

/// Per-call execution controls.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Run inside the retry loop.
    pub retry: bool,
    /// Replaces the connection's retry config for this call only.
    pub policy: Option<RetryConfig>,
    /// Name of the component issuing the statement.
    pub label: Option<String>,
}

impl ExecOptions {
    /// Single attempt, no retry.
    pub fn once() -> Self {
        Self::default()
    }

    /// Retry with the connection's policy.
    pub fn retrying() -> Self {
        Self {
            retry: true,
            ..Self::default()
        }
    }

    pub fn with_policy(mut self, policy: RetryConfig) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn labelled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// The live session and the backend it is bound to.
///
/// Replaced wholesale on reconnect.
struct ConnectionState {
    session: Box<dyn Session>,
    backend: BackendIdentity,
}

impl ConnectionState {
    async fn open(
        factory: &dyn SessionFactory,
        pin: Option<&BackendIdentity>,
    ) -> std::result::Result<Self, DriverError> {
        let mut session = factory.connect(pin).await?;
        let backend = session.backend_identity().await?;
        Ok(Self { session, backend })
    }
}

/// Bookkeeping for one retrying invocation.
struct RetryContext {
    operation: &'static str,
    label: String,
    attempts: u32,
}

enum ReconnectError {
    Driver(DriverError),
    HostMismatch {
        expected: BackendIdentity,
        actual: BackendIdentity,
    },
}

/// A database session that retries transient failures.
pub struct ResilientConnection {
    state: ConnectionState,
    factory: Arc<dyn SessionFactory>,
    tagger: Arc<dyn StatementTagger>,
    classifier: ErrorClassifier,
    retry: RetryConfig,
    options: ConnectionOptions,
    default_label: String,
}

impl ResilientConnection {
    /// Open the first session through `factory` using default settings.
    pub async fn connect(factory: Arc<dyn SessionFactory>) -> Result<Self> {
        let state = ConnectionState::open(factory.as_ref(), None)
            .await
            .map_err(|source| ConnectionError::Connect {
                label: DEFAULT_LABEL.to_string(),
                source,
            })?;

        info!(backend = %state.backend, "Session opened");

        Ok(Self {
            state,
            factory,
            tagger: Arc::new(ProxySqlTagger::default()),
            classifier: ErrorClassifier::default(),
            retry: RetryConfig::default(),
            options: ConnectionOptions::default(),
            default_label: DEFAULT_LABEL.to_string(),
        })
    }

    pub fn with_tagger(mut self, tagger: Arc<dyn StatementTagger>) -> Self {
        self.tagger = tagger;
        self
    }

    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_options(mut self, options: ConnectionOptions) -> Self {
        self.options = options;
        self
    }

    /// Apply retry, classifier, proxy and affinity settings from `config`.
    pub fn with_config(self, config: &Config) -> Self {
        self.with_retry(config.retry.clone())
            .with_classifier(ErrorClassifier::new(config.classifier.clone()))
            .with_tagger(Arc::new(ProxySqlTagger::from_config(&config.proxy)))
            .with_options(config.database.connection_options())
    }

    /// Label used for statements issued without one.
    pub fn with_default_label(mut self, label: impl Into<String>) -> Self {
        self.default_label = label.into();
        self
    }

    /// Takes effect at the next retry-triggered reconnect.
    pub fn set_options(&mut self, options: ConnectionOptions) {
        self.options = options;
    }

    pub fn options(&self) -> ConnectionOptions {
        self.options
    }

    /// Backend the current session is bound to.
    pub fn backend(&self) -> &BackendIdentity {
        &self.state.backend
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    pub async fn execute(&mut self, sql: &str, opts: ExecOptions) -> Result<()> {
        self.run(Execute, sql, opts).await
    }

    /// Returns the number of affected rows.
    pub async fn update(&mut self, sql: &str, opts: ExecOptions) -> Result<u64> {
        self.run(Update, sql, opts).await
    }

    pub async fn select_one(&mut self, sql: &str, opts: ExecOptions) -> Result<Option<Row>> {
        self.run(SelectOne, sql, opts).await
    }

    pub async fn select_value(&mut self, sql: &str, opts: ExecOptions) -> Result<Option<String>> {
        self.run(SelectValue, sql, opts).await
    }

    pub async fn select_values(&mut self, sql: &str, opts: ExecOptions) -> Result<Vec<String>> {
        self.run(SelectValues, sql, opts).await
    }

    /// Forward a statement to the session unmodified: no tag, no retry.
    pub async fn raw(&mut self, sql: &str) -> Result<Vec<Row>> {
        Query
            .call(self.state.session.as_mut(), sql)
            .await
            .map_err(|source| ConnectionError::Failed {
                label: self.default_label.clone(),
                operation: Query::NAME,
                attempts: 1,
                class: self.classifier.classify(&source),
                source,
            })
    }

    async fn run<P: Primitive>(&mut self, primitive: P, sql: &str, opts: ExecOptions) -> Result<P::Output> {
        let tagged = self.tagger.tag(sql);
        let label = opts
            .label
            .unwrap_or_else(|| self.default_label.clone());

        debug!(%label, operation = P::NAME, retry = opts.retry, "Executing statement");

        if !opts.retry {
            return primitive
                .call(self.state.session.as_mut(), &tagged)
                .await
                .map_err(|source| ConnectionError::Failed {
                    label,
                    operation: P::NAME,
                    attempts: 1,
                    class: self.classifier.classify(&source),
                    source,
                });
        }

        let policy = opts.policy.unwrap_or_else(|| self.retry.clone());
        let mut delays = policy.backoff().build();
        let mut ctx = RetryContext {
            operation: P::NAME,
            label,
            attempts: 0,
        };
        let mut needs_reconnect = false;

        loop {
            ctx.attempts += 1;

            let result = if needs_reconnect {
                match self.reconnect(&ctx).await {
                    Ok(()) => {
                        needs_reconnect = false;
                        primitive.call(self.state.session.as_mut(), &tagged).await
                    }
                    Err(ReconnectError::HostMismatch { expected, actual }) => {
                        error!(
                            label = %ctx.label,
                            operation = ctx.operation,
                            %expected,
                            %actual,
                            "Reconnect landed on a different backend"
                        );
                        return Err(ConnectionError::HostMismatch {
                            label: ctx.label,
                            expected,
                            actual,
                            attempts: ctx.attempts,
                        });
                    }
                    Err(ReconnectError::Driver(source)) => Err(source),
                }
            } else {
                primitive.call(self.state.session.as_mut(), &tagged).await
            };

            let source = match result {
                Ok(output) => {
                    if ctx.attempts > 1 {
                        info!(
                            label = %ctx.label,
                            operation = ctx.operation,
                            attempts = ctx.attempts,
                            "Statement succeeded after retry"
                        );
                    }
                    return Ok(output);
                }
                Err(source) => source,
            };

            let class = self.classifier.classify(&source);
            if !class.is_retryable() {
                error!(
                    label = %ctx.label,
                    operation = ctx.operation,
                    attempts = ctx.attempts,
                    error = %source,
                    "Statement failed (not retryable)"
                );
                return Err(ctx.fail(class, source));
            }

            match delays.next() {
                Some(delay) => {
                    warn!(
                        label = %ctx.label,
                        operation = ctx.operation,
                        attempt = ctx.attempts,
                        %class,
                        ?delay,
                        error = %source,
                        "Statement failed, retrying"
                    );
                    if class.requires_reconnect() {
                        needs_reconnect = true;
                    }
                    tokio::time::sleep(delay).await;
                }
                None => {
                    error!(
                        label = %ctx.label,
                        operation = ctx.operation,
                        attempts = ctx.attempts,
                        error = %source,
                        "Statement failed (retries exhausted)"
                    );
                    return Err(ctx.fail(class, source));
                }
            }
        }
    }

    /// Replace the session, pinned to the current backend when affinity is required.
    async fn reconnect(&mut self, ctx: &RetryContext) -> std::result::Result<(), ReconnectError> {
        let pin = self
            .options
            .reconnect_with_consistent_host
            .then(|| self.state.backend.clone());

        info!(
            label = %ctx.label,
            operation = ctx.operation,
            consistent_host = pin.is_some(),
            "Reconnecting"
        );

        let state = ConnectionState::open(self.factory.as_ref(), pin.as_ref())
            .await
            .map_err(ReconnectError::Driver)?;

        if let Some(expected) = pin {
            if state.backend != expected {
                return Err(ReconnectError::HostMismatch {
                    expected,
                    actual: state.backend,
                });
            }
        }

        info!(label = %ctx.label, backend = %state.backend, "Reconnected");
        self.state = state;
        Ok(())
    }
}

impl RetryContext {
    fn fail(self, class: ErrorClass, source: DriverError) -> ConnectionError {
        ConnectionError::Failed {
            label: self.label,
            operation: self.operation,
            attempts: self.attempts,
            class,
            source,
        }
    }
}

#[cfg(test)]
mod tests;
