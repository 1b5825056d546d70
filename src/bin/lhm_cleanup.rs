//! lhm-cleanup: Migration artifact cleanup
//!
//! Finds archive tables, provisional tables and change-capture triggers left
//! by interrupted migrations and reports or drops them.
//!
//! ## Configuration
//! - `--config <path>` or LHM_CONFIG: YAML config file (optional)
//! - LHM__DATABASE__URL: MySQL URL
//! - LHM__CLEANUP__DESTRUCTIVE: drop instead of report (default: false)
//! - LHM__CLEANUP__TABLE / LHM__CLEANUP__UNTIL / LHM__CLEANUP__OLDER_THAN_SECS: scope
//! - LHM__CLEANUP__CURRENT_RUN: unwind the current run of the configured table
//! - LHM_LOG: tracing filter (default: info)
//!
//! Exits 0 when the pass succeeded, 1 otherwise.

use std::process::ExitCode;
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};

use lhm::cleanup::Cleanup;
use lhm::config::Config;
use lhm::connection::ErrorClassifier;
use lhm::interfaces::TracingReporter;
use lhm::storage::MySqlConnector;
use lhm::utils::bootstrap::{connect_with_retry, init_tracing, parse_config_path};

const LABEL: &str = "lhm-cleanup";

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!(error = %e, "lhm-cleanup failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<bool, Box<dyn std::error::Error>> {
    let config_path = parse_config_path(std::env::args().skip(1));
    let config = Config::load(config_path.as_deref())?;

    let factory = Arc::new(MySqlConnector::from_config(&config.database));
    let classifier = ErrorClassifier::new(config.classifier.clone());
    let mut conn = connect_with_retry(factory, &config.retry, &classifier)
        .await?
        .with_config(&config)
        .with_default_label(LABEL);

    let destructive = config.cleanup.destructive;
    let mut cleanup = Cleanup::new(&mut conn, Arc::new(TracingReporter));

    let report = if config.cleanup.current_run {
        let table = config
            .cleanup
            .table
            .as_deref()
            .ok_or("cleanup.current_run requires cleanup.table")?;
        cleanup.run_current_run(destructive, table).await?
    } else {
        let filter = config.cleanup.filter(Utc::now())?;
        cleanup.run(destructive, filter).await?
    };

    info!(destructive, success = report.success(), "lhm-cleanup finished");
    Ok(report.success())
}
