//! Schema scan for migration artifacts.

use std::vec;

use tracing::debug;

use crate::connection::{ExecOptions, ResilientConnection, Result};
use crate::naming::{self, ArtifactRecord, ObjectKind};
use crate::utils::retry::RetryConfig;

/// Diagnostic label for scan statements.
pub const SCANNER_LABEL: &str = "CleanupScanner";

/// A schema object carrying an artifact prefix that cannot be safely
/// attributed to a migration.
///
/// Either the name does not parse, parses as the wrong object kind, or does
/// not re-encode to itself (for example a name truncated at the identifier
/// limit). Such objects are reported and never dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnrecognizedObject {
    pub object: ObjectKind,
    pub name: String,
}

/// One result of a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanItem {
    Artifact(ArtifactRecord),
    Unrecognized(UnrecognizedObject),
}

/// Lazy, single-pass sequence over the objects listed by one scan.
///
/// Names are parsed as the iterator advances. Objects without an artifact
/// prefix are skipped.
pub struct ArtifactScan {
    objects: vec::IntoIter<(ObjectKind, String)>,
}

impl ArtifactScan {
    fn new(tables: Vec<String>, triggers: Vec<String>) -> Self {
        let objects: Vec<_> = tables
            .into_iter()
            .map(|name| (ObjectKind::Table, name))
            .chain(triggers.into_iter().map(|name| (ObjectKind::Trigger, name)))
            .collect();
        Self {
            objects: objects.into_iter(),
        }
    }
}

impl Iterator for ArtifactScan {
    type Item = ScanItem;

    fn next(&mut self) -> Option<ScanItem> {
        for (object, name) in self.objects.by_ref() {
            if !naming::has_artifact_prefix(&name) {
                continue;
            }
            return Some(recognize(object, name));
        }
        None
    }
}

fn recognize(object: ObjectKind, name: String) -> ScanItem {
    match naming::parse(&name) {
        Some(record) if record.kind.object() == object && record.round_trips() => {
            ScanItem::Artifact(record)
        }
        _ => ScanItem::Unrecognized(UnrecognizedObject { object, name }),
    }
}

/// Lists tables and triggers in the current schema and recognizes artifacts.
#[derive(Debug, Clone, Default)]
pub struct CleanupScanner {
    policy: Option<RetryConfig>,
}

impl CleanupScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retry policy for the listing statements, instead of the connection's.
    pub fn with_retry(mut self, policy: RetryConfig) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Read the schema now. Every call issues fresh listing statements.
    pub async fn scan(&self, conn: &mut ResilientConnection) -> Result<ArtifactScan> {
        let tables = conn.select_values("SHOW TABLES", self.options()).await?;
        let triggers = conn.select_values("SHOW TRIGGERS", self.options()).await?;

        debug!(
            tables = tables.len(),
            triggers = triggers.len(),
            "Schema scanned"
        );

        Ok(ArtifactScan::new(tables, triggers))
    }

    fn options(&self) -> ExecOptions {
        let opts = ExecOptions::retrying().labelled(SCANNER_LABEL);
        match &self.policy {
            Some(policy) => opts.with_policy(policy.clone()),
            None => opts,
        }
    }
}
