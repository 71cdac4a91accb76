//! bytepatch configuration (`bytepatch.toml`).
//!
//! Defines the typed configuration for directive tag vocabulary, default
//! directive policy, splice contract, and peer-transform markers. The whole
//! table is an explicit immutable value passed into the merge engine and
//! directive resolver — never ambient global state.
//!
//! Missing fields use defaults. Missing file → all defaults (no error).

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level bytepatch configuration.
///
/// Parsed from `bytepatch.toml`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct PatchConfig {
    /// Directive tag vocabulary settings.
    #[serde(default)]
    pub tags: TagConfig,

    /// Default directive policy for unmarked patch elements.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Merge behaviour settings.
    #[serde(default)]
    pub merge: MergeConfig,

    /// Splice contract for append/prepend/wrap.
    #[serde(default)]
    pub splice: SpliceConfig,

    /// Peer-transform settings (codec markers, anonymization plan).
    #[serde(default)]
    pub transform: TransformConfig,
}

impl PatchConfig {
    /// Load configuration from a file.
    ///
    /// A missing file yields all defaults; a present but malformed file is
    /// an error.
    ///
    /// # Errors
    /// Returns [`ConfigError`] on unreadable or invalid TOML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(ConfigError {
                    path: Some(path.to_owned()),
                    message: err.to_string(),
                });
            }
        };
        toml::from_str(&text).map_err(|err| ConfigError {
            path: Some(path.to_owned()),
            message: err.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// TagConfig
// ---------------------------------------------------------------------------

/// Directive tag vocabulary settings.
///
/// Directive tags are annotations whose type name lives directly under
/// `annotation_package`, with the fixed simple names `Add`, `Replace`,
/// `Edit`, `Append`, `Prepend`, `Wrap`, `Remove` and `Ignore`. The simple
/// names and their parameters are a stable external contract; only the
/// package is configurable.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TagConfig {
    /// Dotted package holding the directive tag annotations
    /// (default: `"bytepatch.tag"`).
    #[serde(default = "default_annotation_package")]
    pub annotation_package: String,
}

impl Default for TagConfig {
    fn default() -> Self {
        Self {
            annotation_package: default_annotation_package(),
        }
    }
}

fn default_annotation_package() -> String {
    "bytepatch.tag".to_owned()
}

// ---------------------------------------------------------------------------
// DefaultsConfig
// ---------------------------------------------------------------------------

/// Default directive policy for patch elements carrying no explicit tag.
///
/// An unmarked element defaults to `Add` when no source counterpart exists
/// and to [`implicit_action`](Self::implicit_action) when one does, unless
/// an auto-ignore rule matches.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DefaultsConfig {
    /// Action taken for an unmarked element with a source counterpart.
    #[serde(default)]
    pub implicit_action: ImplicitAction,

    /// Auto-ignore unmarked constructors that have a source counterpart.
    #[serde(default = "default_true")]
    pub auto_ignore_constructors: bool,

    /// Auto-ignore unmarked static initializers that have a source
    /// counterpart.
    #[serde(default)]
    pub auto_ignore_static_init: bool,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            implicit_action: ImplicitAction::default(),
            auto_ignore_constructors: true,
            auto_ignore_static_init: false,
        }
    }
}

const fn default_true() -> bool {
    true
}

/// What an unmarked patch element with a source counterpart does.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImplicitAction {
    /// Edit the counterpart in place.
    #[default]
    Edit,
    /// Replace the counterpart outright.
    Replace,
}

impl fmt::Display for ImplicitAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Edit => write!(f, "edit"),
            Self::Replace => write!(f, "replace"),
        }
    }
}

// ---------------------------------------------------------------------------
// MergeConfig
// ---------------------------------------------------------------------------

/// Merge behaviour settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct MergeConfig {
    /// Treat removal of an absent element as an error instead of a warning.
    #[serde(default)]
    pub strict: bool,

    /// Pin the output format version to the source tree's version instead
    /// of reconciling to the newer of source and patch.
    #[serde(default)]
    pub pin_source_version: bool,
}

// ---------------------------------------------------------------------------
// SpliceConfig
// ---------------------------------------------------------------------------

/// The configuration-visible splice contract for append/prepend/wrap.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpliceConfig {
    /// Strip the trailing `return` of the patch body when prepending or
    /// wrapping, so control falls through into the spliced code.
    #[serde(default = "default_true")]
    pub strip_patch_return: bool,

    /// Mnemonic of the marker instruction that names the splice point in a
    /// wrap body (exactly one occurrence required).
    #[serde(default = "default_invoke_original_marker")]
    pub invoke_original_marker: String,
}

impl Default for SpliceConfig {
    fn default() -> Self {
        Self {
            strip_patch_return: true,
            invoke_original_marker: default_invoke_original_marker(),
        }
    }
}

fn default_invoke_original_marker() -> String {
    "invoke-original".to_owned()
}

// ---------------------------------------------------------------------------
// TransformConfig
// ---------------------------------------------------------------------------

/// Peer-transform settings (string codec, type anonymizer).
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransformConfig {
    /// Marker delimiting encoded string literals (default `"$$"`).
    #[serde(default = "default_code_marker")]
    pub code_marker: String,

    /// Package segment inserted/removed by the type anonymizer
    /// (default `"anon"`).
    #[serde(default = "default_anonymize_marker")]
    pub anonymize_marker: String,

    /// Downgrade string-decode errors to warnings.
    #[serde(default)]
    pub treat_decode_errors_as_warnings: bool,

    /// Downgrade reanonymization errors to warnings.
    #[serde(default)]
    pub treat_reanonymize_errors_as_warnings: bool,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            code_marker: default_code_marker(),
            anonymize_marker: default_anonymize_marker(),
            treat_decode_errors_as_warnings: false,
            treat_reanonymize_errors_as_warnings: false,
        }
    }
}

fn default_code_marker() -> String {
    "$$".to_owned()
}

fn default_anonymize_marker() -> String {
    "anon".to_owned()
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// A configuration file could not be loaded or parsed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigError {
    /// Path to the configuration file, if known.
    pub path: Option<PathBuf>,
    /// Human-readable description of the problem.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(
                f,
                "configuration error in '{}': {}",
                path.display(),
                self.message
            ),
            None => write!(f, "configuration error: {}", self.message),
        }
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
