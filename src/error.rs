//! Unified error type for bytepatch operations.
//!
//! Defines [`PatchError`], the error surfaced at the pipeline and CLI
//! boundary. Error messages are designed to be actionable: each variant
//! includes what went wrong and guidance on how to fix it.
//!
//! Per-element merge problems are not errors in this sense — they flow
//! through the [`DiagnosticsSink`](crate::diag::DiagnosticsSink) and
//! poison the result instead of aborting the run.

use std::fmt;
use std::path::PathBuf;

use crate::diag::FatalError;

// ---------------------------------------------------------------------------
// PatchError
// ---------------------------------------------------------------------------

/// Unified error type for pipeline operations.
#[derive(Debug)]
pub enum PatchError {
    /// A configuration file could not be loaded or parsed.
    Config {
        /// Path to the configuration file, if known.
        path: Option<PathBuf>,
        /// Human-readable description of the problem.
        detail: String,
    },

    /// A container could not be read, parsed or written.
    Container {
        /// Path to the container file.
        path: PathBuf,
        /// Human-readable description of the problem.
        detail: String,
    },

    /// A rename map or encode table failed to load.
    MapFile {
        /// Path to the map file, if it came from disk.
        path: Option<PathBuf>,
        /// Human-readable description of the problem.
        detail: String,
    },

    /// An invalid option value (API level, version number).
    InvalidOption {
        /// The option name.
        option: String,
        /// Why the value is invalid.
        reason: String,
    },

    /// A structurally fatal condition aborted a merge or rewrite.
    Fatal(FatalError),

    /// An I/O error outside any of the cases above.
    Io(std::io::Error),
}

// ---------------------------------------------------------------------------
// Display — actionable error messages
// ---------------------------------------------------------------------------

impl fmt::Display for PatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { path, detail } => {
                match path {
                    Some(path) => write!(f, "configuration error in '{}': {detail}", path.display())?,
                    None => write!(f, "configuration error: {detail}")?,
                }
                write!(f, "\n  To fix: edit the config file and correct the issue.")
            }
            Self::Container { path, detail } => {
                write!(
                    f,
                    "container '{}': {detail}\n  To fix: check that the file exists and is a valid bytecode container.",
                    path.display()
                )
            }
            Self::MapFile { path, detail } => {
                match path {
                    Some(path) => write!(f, "map file '{}': {detail}", path.display())?,
                    None => write!(f, "map file: {detail}")?,
                }
                write!(
                    f,
                    "\n  To fix: correct the map file; each line is '<old> <new>', '#' starts a comment."
                )
            }
            Self::InvalidOption { option, reason } => {
                write!(
                    f,
                    "invalid value for '{option}': {reason}\n  To fix: see 'bytepatch apply --help' for accepted values."
                )
            }
            Self::Fatal(err) => {
                write!(
                    f,
                    "{err}\n  To fix: the input is too broken to patch; repair the container and retry."
                )
            }
            Self::Io(err) => {
                write!(
                    f,
                    "I/O error: {err}\n  To fix: check file permissions and disk space."
                )
            }
        }
    }
}

// ---------------------------------------------------------------------------
// std::error::Error
// ---------------------------------------------------------------------------

impl std::error::Error for PatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Fatal(err) => Some(err),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// From impls
// ---------------------------------------------------------------------------

impl From<std::io::Error> for PatchError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<FatalError> for PatchError {
    fn from(err: FatalError) -> Self {
        Self::Fatal(err)
    }
}

impl From<crate::config::ConfigError> for PatchError {
    fn from(err: crate::config::ConfigError) -> Self {
        Self::Config {
            path: err.path,
            detail: err.message,
        }
    }
}

impl From<crate::container::ContainerError> for PatchError {
    fn from(err: crate::container::ContainerError) -> Self {
        Self::Container {
            path: err.path,
            detail: err.detail,
        }
    }
}

impl From<crate::transform::mapper::MapError> for PatchError {
    fn from(err: crate::transform::mapper::MapError) -> Self {
        Self::MapFile {
            path: err.path,
            detail: err.message,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_config_error() {
        let err = PatchError::Config {
            path: Some(PathBuf::from("bytepatch.toml")),
            detail: "unknown field 'foo'".to_owned(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("bytepatch.toml"));
        assert!(msg.contains("unknown field 'foo'"));
        assert!(msg.contains("To fix:"));
    }

    #[test]
    fn display_container_error() {
        let err = PatchError::Container {
            path: PathBuf::from("app.json"),
            detail: "duplicate element 'com.A'".to_owned(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("app.json"));
        assert!(msg.contains("duplicate element"));
        assert!(msg.contains("valid bytecode container"));
    }

    #[test]
    fn display_map_file_error() {
        let err = PatchError::MapFile {
            path: Some(PathBuf::from("renames.map")),
            detail: "line 3: expected 'old new'".to_owned(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("renames.map"));
        assert!(msg.contains("line 3"));
        assert!(msg.contains("'#' starts a comment"));
    }

    #[test]
    fn display_invalid_option() {
        let err = PatchError::InvalidOption {
            option: "--api-level".to_owned(),
            reason: "API levels above 24 are not supported".to_owned(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("--api-level"));
        assert!(msg.contains("--help"));
    }

    #[test]
    fn display_fatal() {
        let err = PatchError::Fatal(FatalError::new("duplicate key in tree".to_owned()));
        let msg = format!("{err}");
        assert!(msg.contains("fatal:"));
        assert!(msg.contains("repair the container"));
    }

    #[test]
    fn error_source_chain() {
        let io = PatchError::Io(std::io::Error::other("disk full"));
        assert!(std::error::Error::source(&io).is_some());

        let config = PatchError::Config {
            path: None,
            detail: "bad".to_owned(),
        };
        assert!(std::error::Error::source(&config).is_none());
    }

    #[test]
    fn from_config_error() {
        let err: PatchError = crate::config::ConfigError {
            path: Some(PathBuf::from("bytepatch.toml")),
            message: "bad syntax".to_owned(),
        }
        .into();
        assert!(matches!(err, PatchError::Config { .. }));
    }

    #[test]
    fn from_map_error() {
        let err: PatchError = crate::transform::mapper::MapError {
            path: None,
            message: "bad line".to_owned(),
        }
        .into();
        assert!(matches!(err, PatchError::MapFile { .. }));
    }
}
