// Diagnostics sink for the project store
// Every non-fatal problem (bad row, failed write, rejected mutation) lands here and
// is mirrored to `tracing` so the binary's subscriber can persist it.

use chrono::{DateTime, Local};
use serde::Serialize;

/// How serious a recorded problem is, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational, e.g. nothing to finish
    Low,
    /// Cosmetic data problem, e.g. duplicate setting key
    Warning,
    /// Recoverable problem that loses a small piece of state
    Moderate,
    /// Structural problem: a record or a write was dropped
    High,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "LOW"),
            Severity::Warning => write!(f, "WARNING"),
            Severity::Moderate => write!(f, "MODERATE"),
            Severity::High => write!(f, "HIGH"),
        }
    }
}

/// A single recorded problem
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub recorded_at: DateTime<Local>,
}

/// Append-only log of problems seen by the store
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message and emit it as a tracing event
    pub fn log(&mut self, severity: Severity, message: impl Into<String>) {
        let message = message.into();
        match severity {
            Severity::Low => tracing::debug!(%severity, "{}", message),
            Severity::Warning | Severity::Moderate => tracing::warn!(%severity, "{}", message),
            Severity::High => tracing::error!(%severity, "{}", message),
        }
        self.entries.push(Diagnostic {
            severity,
            message,
            recorded_at: Local::now(),
        });
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    /// True once anything at MODERATE or above has been recorded
    pub fn errors_occurred(&self) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.severity >= Severity::Moderate)
    }

    /// Number of entries at exactly the given severity
    pub fn count(&self, severity: Severity) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.severity == severity)
            .count()
    }

    /// True if any entry message contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.entries.iter().any(|entry| entry.message.contains(needle))
    }

    /// Drain all entries, leaving the log empty
    pub fn take(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.entries)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
