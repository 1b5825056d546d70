//! Human-readable outcome of a cleanup pass.

/// A drop that failed and stopped the pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropFailure {
    pub name: String,
    pub error: String,
}

/// Whether a pass was a dry run or a destructive sweep, and over what scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupMode {
    DryRun,
    Destructive,
}

/// Result of one cleanup pass.
///
/// Table and trigger lists keep scan order. `tables` and `triggers` hold the
/// planned drops; `dropped_*` only what was actually dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub mode: CleanupMode,
    pub tables: Vec<String>,
    pub triggers: Vec<String>,
    pub dropped_tables: Vec<String>,
    pub dropped_triggers: Vec<String>,
    /// Planned drops that were not carried out after a failure.
    pub remaining: Vec<String>,
    pub failure: Option<DropFailure>,
    pub unrecognized: Vec<String>,
    /// DDL listed in a current-run dry run.
    pub ddl: Vec<String>,
}

impl CleanupReport {
    pub(crate) fn new(mode: CleanupMode, tables: Vec<String>, triggers: Vec<String>) -> Self {
        Self {
            mode,
            tables,
            triggers,
            dropped_tables: Vec::new(),
            dropped_triggers: Vec::new(),
            remaining: Vec::new(),
            failure: None,
            unrecognized: Vec::new(),
            ddl: Vec::new(),
        }
    }

    /// False only when a destructive pass failed to drop a planned artifact.
    pub fn success(&self) -> bool {
        self.failure.is_none()
    }

    /// True when nothing matched.
    pub fn is_clean(&self) -> bool {
        self.tables.is_empty() && self.triggers.is_empty()
    }

    /// The report as printable lines.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::new();

        if self.is_clean() {
            lines.push("Everything is clean. Nothing to do.".to_string());
        } else {
            match self.mode {
                CleanupMode::DryRun => self.dry_run_lines(&mut lines),
                CleanupMode::Destructive => self.destructive_lines(&mut lines),
            }
        }

        if !self.unrecognized.is_empty() {
            lines.push(format!(
                "Skipped unrecognized objects: {}",
                self.unrecognized.join(", ")
            ));
        }
        lines
    }

    fn dry_run_lines(&self, lines: &mut Vec<String>) {
        if !self.ddl.is_empty() {
            lines.push("The following DDLs would be executed:".to_string());
            lines.extend(self.ddl.iter().cloned());
            return;
        }

        if !self.tables.is_empty() {
            lines.push(format!(
                "Would drop LHM backup tables: {}.",
                self.tables.join(", ")
            ));
        }
        if !self.triggers.is_empty() {
            lines.push(format!(
                "Would drop LHM triggers: {}.",
                self.triggers.join(", ")
            ));
        }
        lines.push("Run cleanup in destructive mode to drop them.".to_string());
    }

    fn destructive_lines(&self, lines: &mut Vec<String>) {
        if !self.dropped_triggers.is_empty() {
            lines.push(format!(
                "Dropped triggers {}",
                self.dropped_triggers.join(", ")
            ));
        }
        if !self.dropped_tables.is_empty() {
            lines.push(format!("Dropped tables {}", self.dropped_tables.join(", ")));
        }
        if let Some(failure) = &self.failure {
            lines.push(format!("Failed to drop {}: {}", failure.name, failure.error));
            lines.push(format!("Not dropped: {}", self.remaining.join(", ")));
        }
    }
}
