//! Diagnostic message sink
//!
//! Ports report protocol anomalies (out-of-order phase calls, kind changes,
//! missing outputs) as plain text messages through a [`DiagnosticSink`].
//! The sink is owned by the [`ProcessContext`](crate::context::ProcessContext)
//! and handed to every port; there is no process-wide instance.
//!
//! - [`TracingSink`] - default, forwards into `tracing`
//! - [`MemorySink`] - keeps messages in memory for inspection

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Severity of a diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => f.write_str("info"),
            Severity::Warning => f.write_str("warning"),
            Severity::Error => f.write_str("error"),
        }
    }
}

/// Destination for diagnostic text.
pub trait DiagnosticSink: Send + Sync {
    fn display_text(&self, severity: Severity, text: &str);
}

/// Sink that forwards every message to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn display_text(&self, severity: Severity, text: &str) {
        match severity {
            Severity::Info => tracing::info!(target: "pipeport::diagnostics", "{}", text),
            Severity::Warning => tracing::warn!(target: "pipeport::diagnostics", "{}", text),
            Severity::Error => tracing::error!(target: "pipeport::diagnostics", "{}", text),
        }
    }
}

/// A recorded diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub text: String,
}

/// Sink that stores messages. Clones share the same buffer.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    messages: Arc<Mutex<Vec<Diagnostic>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn messages(&self) -> Vec<Diagnostic> {
        match self.messages.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Number of recorded messages at `severity`.
    pub fn count(&self, severity: Severity) -> usize {
        self.messages()
            .iter()
            .filter(|m| m.severity == severity)
            .count()
    }

    pub fn clear(&self) {
        match self.messages.lock() {
            Ok(mut guard) => guard.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

impl DiagnosticSink for MemorySink {
    fn display_text(&self, severity: Severity, text: &str) {
        let entry = Diagnostic {
            severity,
            text: text.to_string(),
        };
        match self.messages.lock() {
            Ok(mut guard) => guard.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }
}

/// Handle used by the ports to report diagnostics.
///
/// Warnings can be switched off globally for the process; errors are always
/// delivered.
#[derive(Clone)]
pub struct Diagnostics {
    sink: Arc<dyn DiagnosticSink>,
    warnings_enabled: Arc<AtomicBool>,
}

impl Diagnostics {
    pub fn new(sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            sink,
            warnings_enabled: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn set_warnings_enabled(&self, enabled: bool) {
        self.warnings_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn warnings_enabled(&self) -> bool {
        self.warnings_enabled.load(Ordering::Relaxed)
    }

    pub fn info(&self, text: impl AsRef<str>) {
        if self.warnings_enabled() {
            self.sink.display_text(Severity::Info, text.as_ref());
        }
    }

    pub fn warning(&self, text: impl AsRef<str>) {
        if self.warnings_enabled() {
            self.sink.display_text(Severity::Warning, text.as_ref());
        }
    }

    pub fn error(&self, text: impl AsRef<str>) {
        self.sink.display_text(Severity::Error, text.as_ref());
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(Arc::new(TracingSink))
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("warnings_enabled", &self.warnings_enabled())
            .finish_non_exhaustive()
    }
}
