//! Binary-format version descriptors.
//!
//! An [`OpcodeSet`] records which instruction-set revision a tree was
//! authored against. Two trees being merged may disagree; the merge engine
//! reconciles to the newer of the two unless a pin is configured.
//!
//! The version ↔ platform API level mapping follows the container format:
//! API levels up to 23 produce format version 035, API level 24 produces 037.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::keys::{ErrorKind, ValidationError};

/// Highest platform API level with a known format version.
pub const MAX_API_LEVEL: u32 = 24;

/// A binary-format version / instruction-set descriptor.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "u16", into = "u16")]
pub struct OpcodeSet {
    version: u16,
}

impl OpcodeSet {
    /// Format version 035 (API levels ≤ 23).
    pub const V035: Self = Self { version: 35 };
    /// Format version 037 (API level 24).
    pub const V037: Self = Self { version: 37 };

    /// Create from a raw format version number.
    ///
    /// # Errors
    /// Returns an error for unsupported version numbers.
    pub fn from_version(version: u16) -> Result<Self, ValidationError> {
        if version == 35 || version == 37 {
            Ok(Self { version })
        } else {
            Err(ValidationError {
                kind: ErrorKind::Version,
                value: version.to_string(),
                reason: "supported format versions are 035 and 037".to_owned(),
            })
        }
    }

    /// The format version for a platform API level.
    ///
    /// # Errors
    /// Returns an error for API levels above [`MAX_API_LEVEL`].
    pub fn for_api(api_level: u32) -> Result<Self, ValidationError> {
        if api_level > MAX_API_LEVEL {
            return Err(ValidationError {
                kind: ErrorKind::Version,
                value: api_level.to_string(),
                reason: format!("API levels above {MAX_API_LEVEL} are not supported"),
            });
        }
        Ok(if api_level <= 23 { Self::V035 } else { Self::V037 })
    }

    /// The raw format version number.
    #[must_use]
    pub const fn version(self) -> u16 {
        self.version
    }

    /// The highest platform API level this format version targets.
    #[must_use]
    pub const fn api_level(self) -> u32 {
        if self.version <= 35 { 23 } else { 24 }
    }

    /// Reconcile two descriptors to the newer one.
    #[must_use]
    pub fn newest(a: Self, b: Self) -> Self {
        if b.version > a.version { b } else { a }
    }
}

impl fmt::Display for OpcodeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}", self.version)
    }
}

impl TryFrom<u16> for OpcodeSet {
    type Error = ValidationError;
    fn try_from(version: u16) -> Result<Self, Self::Error> {
        Self::from_version(version)
    }
}

impl From<OpcodeSet> for u16 {
    fn from(set: OpcodeSet) -> Self {
        set.version
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
