//! Reconciliation of artifacts left behind by interrupted migrations.
//!
//! A cleanup pass always starts from a fresh [`CleanupScanner`] scan, keeps
//! the artifacts that match the pass's scope, and then either reports what it
//! would drop or drops it. Triggers are dropped before tables. A failed drop
//! stops the pass; the report lists what was dropped and what remains.

mod report;
pub mod scanner;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_query::{Alias, MysqlQueryBuilder, Table};
use tracing::{error, info, warn};

pub use report::{CleanupMode, CleanupReport, DropFailure};
pub use scanner::{ArtifactScan, CleanupScanner, ScanItem, UnrecognizedObject};

use crate::connection::{ExecOptions, ResilientConnection, Result};
use crate::interfaces::Reporter;
use crate::naming::{self, ArtifactKind, ArtifactRecord, ObjectKind};
use crate::utils::retry::RetryConfig;

/// Diagnostic label for drop statements.
pub const CLEANUP_LABEL: &str = "Cleanup";

/// Scope of a history sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupFilter {
    /// Only artifacts owned by this table.
    pub table: Option<String>,
    /// Only artifacts whose embedded timestamp is strictly older.
    /// Artifacts without a timestamp are always eligible.
    pub until: Option<DateTime<Utc>>,
}

impl CleanupFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn matches(&self, record: &ArtifactRecord) -> bool {
        let table_matches = self.table.as_deref().map_or(true, |t| record.owned_by(t));
        let old_enough = match (self.until, record.timestamp) {
            (Some(until), Some(timestamp)) => timestamp < until,
            _ => true,
        };
        table_matches && old_enough
    }

    /// Unrecognized objects are reported when they may belong to the scope.
    fn mentions(&self, name: &str) -> bool {
        self.table
            .as_deref()
            .map_or(true, |t| naming::may_belong_to(name, t))
    }
}

/// Artifacts selected for dropping, in scan order.
#[derive(Debug, Default)]
struct Plan {
    tables: Vec<String>,
    triggers: Vec<String>,
    unrecognized: Vec<String>,
}

impl Plan {
    fn from_scan(
        scan: ArtifactScan,
        select: impl Fn(&ArtifactRecord) -> bool,
        mentions: impl Fn(&str) -> bool,
    ) -> Self {
        let mut plan = Plan::default();
        for item in scan {
            match item {
                ScanItem::Artifact(record) if select(&record) => match record.kind.object() {
                    ObjectKind::Table => plan.tables.push(record.name),
                    ObjectKind::Trigger => plan.triggers.push(record.name),
                },
                ScanItem::Artifact(_) => {}
                ScanItem::Unrecognized(object) => {
                    if mentions(&object.name) {
                        warn!(name = %object.name, object = %object.object, "Skipping unrecognized artifact");
                        plan.unrecognized.push(object.name);
                    }
                }
            }
        }
        plan
    }
}

/// Runs cleanup passes over one connection.
pub struct Cleanup<'a> {
    conn: &'a mut ResilientConnection,
    reporter: Arc<dyn Reporter>,
    scanner: CleanupScanner,
    policy: Option<RetryConfig>,
}

impl<'a> Cleanup<'a> {
    pub fn new(conn: &'a mut ResilientConnection, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            conn,
            reporter,
            scanner: CleanupScanner::new(),
            policy: None,
        }
    }

    /// Retry policy for scan and drop statements, instead of the connection's.
    pub fn with_retry(mut self, policy: RetryConfig) -> Self {
        self.scanner = self.scanner.with_retry(policy.clone());
        self.policy = Some(policy);
        self
    }

    /// Sweep artifacts matching `filter`.
    ///
    /// Fails only if the scan fails, before anything is dropped.
    pub async fn run(&mut self, destructive: bool, filter: CleanupFilter) -> Result<CleanupReport> {
        info!(
            destructive,
            table = ?filter.table,
            until = ?filter.until,
            "Starting cleanup"
        );

        let scan = self.scanner.scan(self.conn).await?;
        let plan = Plan::from_scan(scan, |r| filter.matches(r), |n| filter.mentions(n));

        let report = self.finish(destructive, plan, false).await;
        Ok(report)
    }

    /// Unwind a single migration of `table`: its provisional table and its
    /// triggers. Archive tables are left alone.
    pub async fn run_current_run(&mut self, destructive: bool, table: &str) -> Result<CleanupReport> {
        info!(destructive, table, "Starting current-run cleanup");

        let scan = self.scanner.scan(self.conn).await?;
        let plan = Plan::from_scan(
            scan,
            |r| r.owned_by(table) && r.kind != ArtifactKind::Archive,
            |n| naming::may_belong_to(n, table),
        );

        let report = self.finish(destructive, plan, true).await;
        Ok(report)
    }

    async fn finish(&mut self, destructive: bool, plan: Plan, list_ddl: bool) -> CleanupReport {
        let report = if destructive {
            self.drop_all(plan).await
        } else {
            let mut report = CleanupReport::new(CleanupMode::DryRun, plan.tables, plan.triggers);
            report.unrecognized = plan.unrecognized;
            if list_ddl {
                report.ddl = report
                    .triggers
                    .iter()
                    .map(|name| drop_trigger_sql(name))
                    .chain(report.tables.iter().map(|name| drop_table_sql(name)))
                    .collect();
            }
            report
        };

        for line in report.lines() {
            self.reporter.report(&line);
        }
        report
    }

    async fn drop_all(&mut self, plan: Plan) -> CleanupReport {
        let mut report = CleanupReport::new(CleanupMode::Destructive, plan.tables, plan.triggers);
        report.unrecognized = plan.unrecognized;

        let steps: Vec<(ObjectKind, String)> = report
            .triggers
            .iter()
            .map(|name| (ObjectKind::Trigger, name.clone()))
            .chain(report.tables.iter().map(|name| (ObjectKind::Table, name.clone())))
            .collect();

        for (index, (object, name)) in steps.iter().enumerate() {
            let sql = match object {
                ObjectKind::Trigger => drop_trigger_sql(name),
                ObjectKind::Table => drop_table_sql(name),
            };

            let opts = self.options();
            match self.conn.execute(&sql, opts).await {
                Ok(()) => {
                    info!(%name, %object, "Dropped artifact");
                    match object {
                        ObjectKind::Trigger => report.dropped_triggers.push(name.clone()),
                        ObjectKind::Table => report.dropped_tables.push(name.clone()),
                    }
                }
                Err(e) => {
                    error!(%name, %object, error = %e, "Failed to drop artifact");
                    report.failure = Some(DropFailure {
                        name: name.clone(),
                        error: e.to_string(),
                    });
                    report.remaining = steps[index..].iter().map(|(_, n)| n.clone()).collect();
                    break;
                }
            }
        }

        report
    }

    fn options(&self) -> ExecOptions {
        let opts = ExecOptions::retrying().labelled(CLEANUP_LABEL);
        match &self.policy {
            Some(policy) => opts.with_policy(policy.clone()),
            None => opts,
        }
    }
}

/// `DROP TRIGGER IF EXISTS` for `name`.
pub fn drop_trigger_sql(name: &str) -> String {
    format!("DROP TRIGGER IF EXISTS {}", quote_identifier(name))
}

/// `DROP TABLE IF EXISTS` for `name`.
pub fn drop_table_sql(name: &str) -> String {
    Table::drop()
        .table(Alias::new(name))
        .if_exists()
        .to_string(MysqlQueryBuilder)
}

fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}
