//! Bootstrap utilities for lhm binaries.

use std::sync::Arc;

use backon::BackoffBuilder;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LOG_ENV_VAR;
use crate::connection::{ConnectionError, ErrorClass, ErrorClassifier, ResilientConnection};
use crate::interfaces::SessionFactory;
use crate::utils::retry::RetryConfig;

/// Initialize tracing with LHM_LOG environment variable.
///
/// Defaults to "info" level if LHM_LOG is not set.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Config path from `--config <path>` / `--config=<path>`.
///
/// `args` excludes the program name. `LHM_CONFIG` is read by `Config::load`.
pub fn parse_config_path<I>(args: I) -> Option<String>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next();
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(path.to_string());
        }
    }
    None
}

/// Open a `ResilientConnection`, retrying the initial connect with `retry`.
///
/// Errors `classifier` deems fatal are returned at once. Otherwise returns the
/// last error once the policy is exhausted.
pub async fn connect_with_retry(
    factory: Arc<dyn SessionFactory>,
    retry: &RetryConfig,
    classifier: &ErrorClassifier,
) -> Result<ResilientConnection, ConnectionError> {
    let mut delays = retry.backoff().build();
    let mut attempt = 0;

    loop {
        attempt += 1;
        match ResilientConnection::connect(factory.clone()).await {
            Ok(conn) => {
                tracing::info!(backend = %conn.backend(), "Connected");
                return Ok(conn);
            }
            Err(e) => {
                let class = connect_class(classifier, &e);
                match delays.next() {
                    Some(delay) if class.is_retryable() => {
                        warn!(attempt, error = %e, ?delay, "Failed to connect, retrying");
                        tokio::time::sleep(delay).await;
                    }
                    _ => {
                        tracing::error!(attempts = attempt, %class, error = %e, "Failed to connect");
                        return Err(e);
                    }
                }
            }
        }
    }
}

fn connect_class(classifier: &ErrorClassifier, error: &ConnectionError) -> ErrorClass {
    error
        .driver_error()
        .map_or(ErrorClass::Fatal, |source| classifier.classify(source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CONFIG_ENV_VAR;
    use crate::interfaces::DriverError;
    use crate::storage::mock::MockDatabase;
    use serial_test::serial;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    #[serial]
    fn test_parse_config_path() {
        std::env::remove_var(CONFIG_ENV_VAR);
        assert_eq!(
            parse_config_path(args(&["--config", "/etc/lhm.yaml"])),
            Some("/etc/lhm.yaml".to_string())
        );
        assert_eq!(
            parse_config_path(args(&["-v", "--config=lhm.yaml"])),
            Some("lhm.yaml".to_string())
        );
        assert_eq!(parse_config_path(args(&[])), None);

        // The env var is a separate config source, not a path fallback.
        std::env::set_var(CONFIG_ENV_VAR, "/from/env.yaml");
        let path = parse_config_path(args(&[]));
        std::env::remove_var(CONFIG_ENV_VAR);
        assert_eq!(path, None);
    }

    #[tokio::test]
    async fn test_connect_with_retry() {
        let db = MockDatabase::new();
        db.fail_connect(DriverError::connection_lost("refused")).await;
        db.fail_connect(DriverError::connection_lost("refused")).await;

        let conn = connect_with_retry(
            Arc::new(db.connector()),
            &RetryConfig::immediate(3),
            &ErrorClassifier::default(),
        )
        .await;
        assert!(conn.is_ok());
        assert_eq!(db.connect_count().await, 3);
    }

    #[tokio::test]
    async fn test_connect_with_retry_gives_up() {
        let db = MockDatabase::new();
        for _ in 0..3 {
            db.fail_connect(DriverError::connection_lost("refused")).await;
        }

        let result = connect_with_retry(
            Arc::new(db.connector()),
            &RetryConfig::immediate(2),
            &ErrorClassifier::default(),
        )
        .await;
        assert!(matches!(result, Err(ConnectionError::Connect { .. })));
        assert_eq!(db.connect_count().await, 2);
    }

    #[tokio::test]
    async fn test_connect_with_retry_stops_on_fatal_error() {
        let db = MockDatabase::new();
        db.fail_connect(DriverError::database(1045, "Access denied for user 'lhm'"))
            .await;
        db.fail_connect(DriverError::connection_lost("refused")).await;

        let result = connect_with_retry(
            Arc::new(db.connector()),
            &RetryConfig::immediate(5),
            &ErrorClassifier::default(),
        )
        .await;
        assert!(matches!(result, Err(ConnectionError::Connect { .. })));
        assert_eq!(db.connect_count().await, 1);
    }
}
