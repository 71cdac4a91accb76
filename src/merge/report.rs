//! Patch report artifacts.
//!
//! A machine-parseable JSON summary of one patching run: what was merged,
//! under which format version, with which action counts and diagnostics.
//! Reports are disposable and regenerable — running the same inputs again
//! produces the same `report_id`.
//!
//! # Report ID
//!
//! `report_id` is `sha256(source || patches || version)` over the input
//! descriptors, so identical runs are recognizable across machines without
//! comparing whole files.
//!
//! Artifacts are written atomically (write-to-temp + persist) so a crashed
//! run never leaves a truncated report behind.

use std::io::Write as _;
use std::path::Path;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::diag::{DiagnosticsSink, Severity};
use crate::merge::engine::MergeStats;

// ---------------------------------------------------------------------------
// ReportDiagnostic
// ---------------------------------------------------------------------------

/// One diagnostic entry in serialized form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReportDiagnostic {
    /// Severity level.
    pub severity: Severity,
    /// Element key the diagnostic was attributed to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<String>,
    /// Message text.
    pub message: String,
}

// ---------------------------------------------------------------------------
// PatchReport
// ---------------------------------------------------------------------------

/// A deterministic, machine-parseable summary of one patching run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PatchReport {
    /// Stable identifier: `sha256(source || patches || version)`.
    pub report_id: String,

    /// Source container descriptor.
    pub source: String,

    /// Patch container descriptors, in application order.
    pub patches: Vec<String>,

    /// Output format version (e.g. `"035"`).
    pub format_version: String,

    /// Classes in the output tree.
    pub class_count: usize,

    /// Directive actions applied across all patches.
    pub stats: MergeStats,

    /// Total errors reported.
    pub errors: usize,

    /// Total warnings reported.
    pub warnings: usize,

    /// Every diagnostic, in report order.
    pub diagnostics: Vec<ReportDiagnostic>,
}

impl PatchReport {
    /// Assemble a report from a finished run.
    #[must_use]
    pub fn build(
        source: &str,
        patches: &[String],
        format_version: &str,
        class_count: usize,
        stats: MergeStats,
        sink: &DiagnosticsSink,
    ) -> Self {
        let diagnostics = sink
            .entries()
            .iter()
            .map(|d| ReportDiagnostic {
                severity: d.severity,
                element: d.key.as_ref().map(ToString::to_string),
                message: d.message.clone(),
            })
            .collect();
        Self {
            report_id: compute_report_id(source, patches, format_version),
            source: source.to_owned(),
            patches: patches.to_vec(),
            format_version: format_version.to_owned(),
            class_count,
            stats,
            errors: sink.error_count(),
            warnings: sink.warning_count(),
            diagnostics,
        }
    }
}

/// Compute the stable report ID for a set of inputs.
///
/// Algorithm: SHA-256 of `source || '\n' || patch || '\n' ... || version`.
#[must_use]
pub fn compute_report_id(source: &str, patches: &[String], format_version: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(b"\n");
    for patch in patches {
        hasher.update(patch.as_bytes());
        hasher.update(b"\n");
    }
    hasher.update(format_version.as_bytes());
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(64);
    for byte in digest {
        use std::fmt::Write as _;
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

/// Write a report as pretty-printed JSON via atomic rename.
///
/// # Errors
/// Returns an I/O error on serialization or filesystem failure.
pub fn write_report(report: &PatchReport, path: &Path) -> std::io::Result<()> {
    let json = serde_json::to_vec_pretty(report).map_err(std::io::Error::other)?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(&json)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|err| err.error)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
