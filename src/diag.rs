//! Diagnostics for merge and rewrite operations.
//!
//! Defines [`DiagnosticsSink`], the explicit accumulator threaded through
//! every merge/rewrite call chain. Passes and the merge engine report
//! per-element errors and warnings here and keep going, so one run surfaces
//! every problem; the caller inspects the counts afterwards to decide
//! whether the output tree is usable ("poisoned" results are never written).
//!
//! A sink is owned by exactly one merge invocation. Callers running merges
//! in parallel allocate one sink per merge; the sink itself is plain data
//! and never synchronizes.

use std::fmt;

use serde::Serialize;

use crate::model::keys::ElementKey;

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// Diagnostic severity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Developer-level detail.
    Debug,
    /// Notable but expected events (e.g. a format-version change).
    Info,
    /// Likely-unintended but not incorrect states; never block completion.
    Warning,
    /// A localized problem; the operation continues but its result is
    /// poisoned and must not be persisted.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

// ---------------------------------------------------------------------------
// Diagnostic
// ---------------------------------------------------------------------------

/// One reported diagnostic, attributed to an element when one is known.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    /// Severity of the condition.
    pub severity: Severity,
    /// The element the condition was detected on, if attributable.
    pub key: Option<ElementKey>,
    /// Human-readable description.
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "{}: {}: {}", self.severity, key, self.message),
            None => write!(f, "{}: {}", self.severity, self.message),
        }
    }
}

// ---------------------------------------------------------------------------
// DiagnosticsSink
// ---------------------------------------------------------------------------

/// Accumulates diagnostics for one merge or rewrite invocation.
#[derive(Debug, Default)]
pub struct DiagnosticsSink {
    entries: Vec<Diagnostic>,
    errors: usize,
    warnings: usize,
}

impl DiagnosticsSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a diagnostic.
    pub fn report(&mut self, severity: Severity, key: Option<ElementKey>, message: String) {
        match severity {
            Severity::Error => self.errors += 1,
            Severity::Warning => self.warnings += 1,
            Severity::Debug | Severity::Info => {}
        }
        self.entries.push(Diagnostic {
            severity,
            key,
            message,
        });
    }

    /// Report an error attributed to an element.
    pub fn error(&mut self, key: ElementKey, message: String) {
        self.report(Severity::Error, Some(key), message);
    }

    /// Report a warning attributed to an element.
    pub fn warn(&mut self, key: ElementKey, message: String) {
        self.report(Severity::Warning, Some(key), message);
    }

    /// Report an informational diagnostic.
    pub fn info(&mut self, key: Option<ElementKey>, message: String) {
        self.report(Severity::Info, key, message);
    }

    /// Returns `true` if any error has been reported.
    #[must_use]
    pub const fn has_errors(&self) -> bool {
        self.errors > 0
    }

    /// Number of errors reported so far.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors
    }

    /// Number of warnings reported so far.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings
    }

    /// All entries in report order.
    #[must_use]
    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    /// Snapshot of the current counts, for attributing later deltas.
    #[must_use]
    pub const fn summary(&self) -> DiagnosticsSummary {
        DiagnosticsSummary {
            errors: self.errors,
            warnings: self.warnings,
        }
    }

    /// The counts accumulated since an earlier [`summary`](Self::summary)
    /// snapshot.
    #[must_use]
    pub const fn since(&self, snapshot: DiagnosticsSummary) -> DiagnosticsSummary {
        DiagnosticsSummary {
            errors: self.errors - snapshot.errors,
            warnings: self.warnings - snapshot.warnings,
        }
    }
}

// ---------------------------------------------------------------------------
// DiagnosticsSummary
// ---------------------------------------------------------------------------

/// Error/warning counts for one operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DiagnosticsSummary {
    /// Errors reported.
    pub errors: usize,
    /// Warnings reported.
    pub warnings: usize,
}

impl DiagnosticsSummary {
    /// Returns `true` if no errors were reported.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.errors == 0
    }
}

impl fmt::Display for DiagnosticsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error(s), {} warning(s)", self.errors, self.warnings)
    }
}

// ---------------------------------------------------------------------------
// FatalError
// ---------------------------------------------------------------------------

/// A structurally fatal condition: the operation aborts immediately with no
/// partial result (malformed tree, unloadable lookup table).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FatalError {
    /// The element the condition was detected on, if attributable.
    pub key: Option<ElementKey>,
    /// What went wrong.
    pub message: String,
}

impl FatalError {
    /// Create a fatal error without element attribution.
    #[must_use]
    pub fn new(message: String) -> Self {
        Self { key: None, message }
    }

    /// Create a fatal error attributed to an element.
    #[must_use]
    pub fn for_element(key: ElementKey, message: String) -> Self {
        Self {
            key: Some(key),
            message,
        }
    }
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "fatal: {key}: {}", self.message),
            None => write!(f, "fatal: {}", self.message),
        }
    }
}

impl std::error::Error for FatalError {}

impl From<crate::model::tree::DuplicateElement> for FatalError {
    fn from(err: crate::model::tree::DuplicateElement) -> Self {
        Self::for_element(err.key, "duplicate key in tree".to_owned())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
