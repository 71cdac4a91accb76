//! Structural keys for bytecode tree elements.
//!
//! Foundation types used throughout bytepatch: validated class names, member
//! keys (name + descriptor), and the [`ElementKey`] used to attribute
//! diagnostics to a specific element of a tree.
//!
//! Keys are value objects. Identity of an element is its key, never its
//! position in a tree — back-references are always computed lookups by key.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ClassKey
// ---------------------------------------------------------------------------

/// A validated fully-qualified class name in dotted form
/// (e.g. `com.example.Widget`).
///
/// Segments are separated by `.`; each segment must start with a letter,
/// `_` or `$` and continue with letters, digits, `_` or `$`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClassKey(String);

impl ClassKey {
    /// Create a new `ClassKey` from a string, validating format.
    ///
    /// # Errors
    /// Returns an error if the string is not a dotted identifier path.
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        Self::validate(s)?;
        Ok(Self(s.to_owned()))
    }

    /// Return the dotted name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The simple (unqualified) class name — everything after the last dot.
    #[must_use]
    pub fn simple_name(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or(&self.0)
    }

    /// The package portion — everything before the last dot, or `""` for
    /// classes in the default package.
    #[must_use]
    pub fn package(&self) -> &str {
        match self.0.rfind('.') {
            Some(i) => &self.0[..i],
            None => "",
        }
    }

    /// Returns `true` if this class lives under the given dotted package.
    #[must_use]
    pub fn in_package(&self, package: &str) -> bool {
        self.package() == package
    }

    fn validate(s: &str) -> Result<(), ValidationError> {
        if s.is_empty() {
            return Err(ValidationError {
                kind: ErrorKind::ClassKey,
                value: s.to_owned(),
                reason: "class name must not be empty".to_owned(),
            });
        }
        for segment in s.split('.') {
            if !is_identifier(segment) {
                return Err(ValidationError {
                    kind: ErrorKind::ClassKey,
                    value: s.to_owned(),
                    reason: format!("invalid name segment '{segment}'"),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for ClassKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ClassKey {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ClassKey {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::validate(&s)?;
        Ok(Self(s))
    }
}

impl From<ClassKey> for String {
    fn from(key: ClassKey) -> Self {
        key.0
    }
}

/// Returns `true` if `s` is a single valid name segment.
fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

// ---------------------------------------------------------------------------
// MemberKey
// ---------------------------------------------------------------------------

/// Reserved name for instance constructors.
pub const CONSTRUCTOR_NAME: &str = "<init>";

/// Reserved name for static initializers.
pub const STATIC_INIT_NAME: &str = "<clinit>";

/// A field or method key: member name plus descriptor.
///
/// A field descriptor is a single type name (`int`, `com.example.Foo`,
/// `byte[]`). A method descriptor is `(t1,t2,...)ret`. Members with the
/// same name but different descriptors are distinct elements.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MemberKey {
    name: String,
    descriptor: String,
}

impl MemberKey {
    /// Create a new `MemberKey`, validating the name.
    ///
    /// # Errors
    /// Returns an error if the name is neither an identifier nor one of the
    /// reserved names `<init>` / `<clinit>`, or if the descriptor is empty.
    pub fn new(name: &str, descriptor: &str) -> Result<Self, ValidationError> {
        if !is_identifier(name) && name != CONSTRUCTOR_NAME && name != STATIC_INIT_NAME {
            return Err(ValidationError {
                kind: ErrorKind::MemberKey,
                value: name.to_owned(),
                reason: "member name must be an identifier, '<init>' or '<clinit>'".to_owned(),
            });
        }
        if descriptor.is_empty() {
            return Err(ValidationError {
                kind: ErrorKind::MemberKey,
                value: name.to_owned(),
                reason: "member descriptor must not be empty".to_owned(),
            });
        }
        Ok(Self {
            name: name.to_owned(),
            descriptor: descriptor.to_owned(),
        })
    }

    /// The member name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The descriptor string.
    #[must_use]
    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    /// Returns a copy of this key under a different name, keeping the
    /// descriptor. Used to locate a renamed counterpart (`target` qualifier).
    ///
    /// # Errors
    /// Returns an error if the new name fails validation.
    pub fn renamed(&self, name: &str) -> Result<Self, ValidationError> {
        Self::new(name, &self.descriptor)
    }

    /// Returns `true` if this key names an instance constructor.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR_NAME
    }

    /// Returns `true` if this key names a static initializer.
    #[must_use]
    pub fn is_static_init(&self) -> bool {
        self.name == STATIC_INIT_NAME
    }
}

impl fmt::Display for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.descriptor)
    }
}

impl TryFrom<String> for MemberKey {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        let Some((name, descriptor)) = s.split_once(':') else {
            return Err(ValidationError {
                kind: ErrorKind::MemberKey,
                value: s,
                reason: "expected 'name:descriptor'".to_owned(),
            });
        };
        Self::new(name, descriptor)
    }
}

impl From<MemberKey> for String {
    fn from(key: MemberKey) -> Self {
        format!("{}:{}", key.name, key.descriptor)
    }
}

// ---------------------------------------------------------------------------
// Descriptor helpers
// ---------------------------------------------------------------------------

const PRIMITIVES: &[&str] = &[
    "void", "boolean", "byte", "short", "char", "int", "long", "float", "double",
];

/// Returns `true` if `ty` (array suffixes stripped) is a primitive type name.
#[must_use]
pub fn is_primitive(ty: &str) -> bool {
    PRIMITIVES.contains(&base_type(ty))
}

/// Strip array suffixes from a type name: `int[][]` → `int`.
#[must_use]
pub fn base_type(ty: &str) -> &str {
    ty.trim_end_matches("[]")
}

/// Rewrite every class name appearing in a type name via `f`.
///
/// Primitives and unmapped names pass through unchanged; array suffixes are
/// preserved.
pub fn map_type(ty: &str, f: &dyn Fn(&str) -> Option<String>) -> String {
    let base = base_type(ty);
    let suffix = &ty[base.len()..];
    if is_primitive(base) {
        return ty.to_owned();
    }
    match f(base) {
        Some(mapped) => format!("{mapped}{suffix}"),
        None => ty.to_owned(),
    }
}

/// Rewrite every class name appearing in a field or method descriptor.
///
/// Field descriptors are single type names. Method descriptors have the form
/// `(t1,t2,...)ret`; parameters and return type are rewritten independently.
pub fn map_descriptor(descriptor: &str, f: &dyn Fn(&str) -> Option<String>) -> String {
    let Some(rest) = descriptor.strip_prefix('(') else {
        return map_type(descriptor, f);
    };
    let Some((params, ret)) = rest.split_once(')') else {
        return descriptor.to_owned();
    };
    let mapped_params = if params.is_empty() {
        String::new()
    } else {
        params
            .split(',')
            .map(|p| map_type(p, f))
            .collect::<Vec<_>>()
            .join(",")
    };
    format!("({mapped_params}){}", map_type(ret, f))
}

// ---------------------------------------------------------------------------
// ElementKey
// ---------------------------------------------------------------------------

/// Identifies one element of a bytecode tree for diagnostics attribution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ElementKey {
    /// A class, by fully-qualified name.
    Class(ClassKey),
    /// A field of a class.
    Field {
        /// Owning class.
        class: ClassKey,
        /// Field name + type descriptor.
        member: MemberKey,
    },
    /// A method of a class.
    Method {
        /// Owning class.
        class: ClassKey,
        /// Method name + descriptor.
        member: MemberKey,
    },
    /// An annotation attached to another element.
    Annotation {
        /// The annotated element.
        owner: Box<ElementKey>,
        /// The annotation's type name.
        name: ClassKey,
    },
}

impl ElementKey {
    /// The class this element belongs to (itself, for classes).
    #[must_use]
    pub fn class(&self) -> &ClassKey {
        match self {
            Self::Class(key) => key,
            Self::Field { class, .. } | Self::Method { class, .. } => class,
            Self::Annotation { owner, .. } => owner.class(),
        }
    }
}

impl fmt::Display for ElementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Class(key) => write!(f, "{key}"),
            Self::Field { class, member } | Self::Method { class, member } => {
                write!(f, "{class}.{member}")
            }
            Self::Annotation { owner, name } => write!(f, "@{name} on {owner}"),
        }
    }
}

// ---------------------------------------------------------------------------
// ValidationError
// ---------------------------------------------------------------------------

/// Which kind of key failed validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A fully-qualified class name.
    ClassKey,
    /// A member name or descriptor.
    MemberKey,
    /// A binary-format version or API level.
    Version,
}

/// A key failed validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    /// What kind of value was being validated.
    pub kind: ErrorKind,
    /// The offending input.
    pub value: String,
    /// Why it is invalid.
    pub reason: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.kind {
            ErrorKind::ClassKey => "class name",
            ErrorKind::MemberKey => "member key",
            ErrorKind::Version => "format version",
        };
        write!(f, "invalid {what} '{}': {}", self.value, self.reason)
    }
}

impl std::error::Error for ValidationError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
