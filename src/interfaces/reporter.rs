//! Output sink for human-readable reports.

use std::sync::{Mutex, PoisonError};

use tracing::info;

/// Receives report lines.
///
/// Owned by whoever orchestrates the run; the core never writes to a global
/// logger for user-facing output.
pub trait Reporter: Send + Sync {
    fn report(&self, line: &str);
}

/// Forwards every line to `tracing` at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, line: &str) {
        info!(target: "lhm::report", "{}", line);
    }
}

/// Collects lines in memory.
#[derive(Debug, Default)]
pub struct BufferReporter {
    lines: Mutex<Vec<String>>,
}

impl BufferReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// All lines joined with newlines.
    pub fn output(&self) -> String {
        self.lines().join("\n")
    }
}

impl Reporter for BufferReporter {
    fn report(&self, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_reporter_keeps_order() {
        let reporter = BufferReporter::new();
        reporter.report("first");
        reporter.report("second");

        assert_eq!(reporter.lines(), vec!["first", "second"]);
        assert_eq!(reporter.output(), "first\nsecond");
    }

    #[test]
    fn test_buffer_reporter_survives_poisoning() {
        let reporter = std::sync::Arc::new(BufferReporter::new());
        reporter.report("before");

        let poisoner = reporter.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lines.lock();
            panic!("poison the lock");
        })
        .join();
        assert!(reporter.lines.is_poisoned());

        reporter.report("after");
        assert_eq!(reporter.lines(), vec!["before", "after"]);
    }
}
