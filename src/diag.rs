//! Structured diagnostics.
//!
//! Verification failures and driver warnings are reported as [`Diagnostic`]
//! records through an injected [`DiagnosticSink`]; the core never formats
//! user-facing text beyond the structured message and notes.

use crate::ir::OpId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Remark,
}

/// A diagnostic attached to the offending operation.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub op: OpId,
    pub severity: Severity,
    pub message: String,
    pub notes: Vec<String>,
}

impl Diagnostic {
    pub fn error(op: OpId, message: impl Into<String>) -> Self {
        Diagnostic { op, severity: Severity::Error, message: message.into(), notes: Vec::new() }
    }

    pub fn warning(op: OpId, message: impl Into<String>) -> Self {
        Diagnostic { op, severity: Severity::Warning, message: message.into(), notes: Vec::new() }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

/// Reporting interface injected by the host driver.
pub trait DiagnosticSink {
    fn report(&mut self, diagnostic: Diagnostic);
}

/// A sink that just collects diagnostics, used by the verification pass and
/// throughout the tests.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub diagnostics: Vec<Diagnostic>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.severity == Severity::Error).count()
    }
}

impl DiagnosticSink for CollectingSink {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }
}
