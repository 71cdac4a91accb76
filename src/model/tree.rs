//! The in-memory bytecode tree.
//!
//! A [`BytecodeTree`] is an immutable value: classes own fields, methods and
//! annotations, and every "modification" produces a new tree that shares
//! unmodified subtrees with the original via [`Arc`]. No element holds a
//! back-reference to its owning tree.
//!
//! Classes and members are keyed maps ([`BTreeMap`]), so iteration order is
//! lexicographic and deterministic regardless of insertion order. Duplicate
//! keys are rejected at construction.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::keys::{ClassKey, ElementKey, MemberKey};
use super::version::OpcodeSet;

// ---------------------------------------------------------------------------
// AccessFlags
// ---------------------------------------------------------------------------

/// Access and property flags for classes, fields and methods.
///
/// A thin bit-set over the container's flag encoding. Only the named flags
/// below are interpreted by bytepatch; unknown bits are carried through
/// untouched.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct AccessFlags(u32);

impl AccessFlags {
    pub const PUBLIC: Self = Self(0x0001);
    pub const PRIVATE: Self = Self(0x0002);
    pub const PROTECTED: Self = Self(0x0004);
    pub const STATIC: Self = Self(0x0008);
    pub const FINAL: Self = Self(0x0010);
    pub const NATIVE: Self = Self(0x0100);
    pub const INTERFACE: Self = Self(0x0200);
    pub const ABSTRACT: Self = Self(0x0400);
    pub const SYNTHETIC: Self = Self(0x1000);
    pub const ENUM: Self = Self(0x4000);

    const NAMED: &'static [(Self, &'static str)] = &[
        (Self::PUBLIC, "public"),
        (Self::PRIVATE, "private"),
        (Self::PROTECTED, "protected"),
        (Self::STATIC, "static"),
        (Self::FINAL, "final"),
        (Self::NATIVE, "native"),
        (Self::INTERFACE, "interface"),
        (Self::ABSTRACT, "abstract"),
        (Self::SYNTHETIC, "synthetic"),
        (Self::ENUM, "enum"),
    ];

    const VISIBILITY_MASK: u32 = 0x0007;

    /// An empty flag set.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Construct from raw bits.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// The raw bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns `true` if every flag in `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Union of two flag sets.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// This set with every flag in `other` cleared.
    #[must_use]
    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// The visibility bits only (public/private/protected).
    #[must_use]
    pub const fn visibility(self) -> Self {
        Self(self.0 & Self::VISIBILITY_MASK)
    }

    /// Returns `true` if the `static` flag is set.
    #[must_use]
    pub const fn is_static(self) -> bool {
        self.contains(Self::STATIC)
    }

    /// Look up a single flag by its lowercase name.
    #[must_use]
    pub fn by_name(name: &str) -> Option<Self> {
        Self::NAMED
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(flag, _)| *flag)
    }
}

impl fmt::Display for AccessFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut rest = self.0;
        let mut first = true;
        for (flag, name) in Self::NAMED {
            if self.contains(*flag) {
                if !first {
                    f.write_str(" ")?;
                }
                f.write_str(name)?;
                first = false;
                rest &= !flag.0;
            }
        }
        if rest != 0 {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "0x{rest:x}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Annotations
// ---------------------------------------------------------------------------

/// A single named value inside an annotation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AnnotationValue {
    /// A boolean value.
    Bool(bool),
    /// An integer value.
    Int(i64),
    /// A string value.
    Str(String),
    /// A class name value.
    Type(ClassKey),
    /// An ordered list of values.
    List(Vec<AnnotationValue>),
}

impl AnnotationValue {
    /// The string payload, if this is a `Str` value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// An annotation: a type name plus named values, attached to a class, field
/// or method.
///
/// Values are stored in a [`BTreeMap`] so their order is deterministic.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    /// The annotation's type name.
    pub name: ClassKey,
    /// Named values, keyed by parameter name.
    #[serde(default)]
    pub values: BTreeMap<String, AnnotationValue>,
}

impl Annotation {
    /// Create an annotation with no values.
    #[must_use]
    pub fn new(name: ClassKey) -> Self {
        Self {
            name,
            values: BTreeMap::new(),
        }
    }

    /// Add or replace a named value.
    #[must_use]
    pub fn with_value(mut self, key: &str, value: AnnotationValue) -> Self {
        self.values.insert(key.to_owned(), value);
        self
    }

    /// Look up a named value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&AnnotationValue> {
        self.values.get(key)
    }
}

/// Sort an annotation list by name for deterministic iteration.
fn sort_annotations(mut annotations: Vec<Annotation>) -> Vec<Annotation> {
    annotations.sort_by(|a, b| a.name.cmp(&b.name));
    annotations
}

// ---------------------------------------------------------------------------
// Instructions
// ---------------------------------------------------------------------------

/// One instruction: an opcode mnemonic plus operand strings.
///
/// The core treats instructions as opaque except where a splice contract or
/// a peer pass inspects them (return detection, wrap markers, string and
/// type operands).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    /// Opcode mnemonic, e.g. `const-string` or `return`.
    pub op: String,
    /// Operand strings.
    #[serde(default)]
    pub operands: Vec<String>,
}

impl Instruction {
    /// Create an instruction with no operands.
    #[must_use]
    pub fn of(op: &str) -> Self {
        Self {
            op: op.to_owned(),
            operands: Vec::new(),
        }
    }

    /// Create an instruction with operands.
    #[must_use]
    pub fn with_operands(op: &str, operands: &[&str]) -> Self {
        Self {
            op: op.to_owned(),
            operands: operands.iter().map(|&s| s.to_owned()).collect(),
        }
    }

    /// Returns `true` for any `return*` mnemonic.
    #[must_use]
    pub fn is_return(&self) -> bool {
        self.op == "return" || self.op.starts_with("return-")
    }
}

/// A method body: register count plus instruction sequence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodBody {
    /// Number of registers the body uses.
    pub registers: u16,
    /// The instruction sequence.
    pub instructions: Vec<Instruction>,
}

impl MethodBody {
    /// Create a body.
    #[must_use]
    pub const fn new(registers: u16, instructions: Vec<Instruction>) -> Self {
        Self {
            registers,
            instructions,
        }
    }
}

// ---------------------------------------------------------------------------
// FieldDef
// ---------------------------------------------------------------------------

/// An immutable field definition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDef {
    /// Field name + type descriptor.
    pub key: MemberKey,
    /// Access flags.
    pub access: AccessFlags,
    /// Static initial value, if any.
    pub initial: Option<AnnotationValue>,
    /// Annotations, sorted by name.
    pub annotations: Vec<Annotation>,
}

impl FieldDef {
    /// Create a field with no initial value or annotations.
    #[must_use]
    pub const fn new(key: MemberKey, access: AccessFlags) -> Self {
        Self {
            key,
            access,
            initial: None,
            annotations: Vec::new(),
        }
    }

    /// Set the static initial value.
    #[must_use]
    pub fn with_initial(mut self, value: AnnotationValue) -> Self {
        self.initial = Some(value);
        self
    }

    /// Set annotations (sorted by name on the way in).
    #[must_use]
    pub fn with_annotations(mut self, annotations: Vec<Annotation>) -> Self {
        self.annotations = sort_annotations(annotations);
        self
    }
}

// ---------------------------------------------------------------------------
// MethodDef
// ---------------------------------------------------------------------------

/// An immutable method definition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodDef {
    /// Method name + descriptor.
    pub key: MemberKey,
    /// Access flags.
    pub access: AccessFlags,
    /// Annotations, sorted by name.
    pub annotations: Vec<Annotation>,
    /// The body; `None` for abstract and native methods.
    pub body: Option<MethodBody>,
}

impl MethodDef {
    /// Create a bodyless method.
    #[must_use]
    pub const fn new(key: MemberKey, access: AccessFlags) -> Self {
        Self {
            key,
            access,
            annotations: Vec::new(),
            body: None,
        }
    }

    /// Set the body.
    #[must_use]
    pub fn with_body(mut self, body: MethodBody) -> Self {
        self.body = Some(body);
        self
    }

    /// Set annotations (sorted by name on the way in).
    #[must_use]
    pub fn with_annotations(mut self, annotations: Vec<Annotation>) -> Self {
        self.annotations = sort_annotations(annotations);
        self
    }
}

// ---------------------------------------------------------------------------
// ClassDef
// ---------------------------------------------------------------------------

/// An immutable class definition owning its fields, methods and annotations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassDef {
    /// Fully-qualified class name.
    pub key: ClassKey,
    /// Access flags.
    pub access: AccessFlags,
    /// Superclass name, if any.
    pub superclass: Option<ClassKey>,
    /// Implemented interfaces, sorted and deduplicated.
    pub interfaces: Vec<ClassKey>,
    /// Annotations, sorted by name.
    pub annotations: Vec<Annotation>,
    /// Fields, keyed by name + type descriptor.
    pub fields: BTreeMap<MemberKey, Arc<FieldDef>>,
    /// Methods, keyed by name + descriptor.
    pub methods: BTreeMap<MemberKey, Arc<MethodDef>>,
}

impl ClassDef {
    /// Create an empty class.
    #[must_use]
    pub const fn new(key: ClassKey, access: AccessFlags) -> Self {
        Self {
            key,
            access,
            superclass: None,
            interfaces: Vec::new(),
            annotations: Vec::new(),
            fields: BTreeMap::new(),
            methods: BTreeMap::new(),
        }
    }

    /// Set the superclass.
    #[must_use]
    pub fn with_superclass(mut self, superclass: ClassKey) -> Self {
        self.superclass = Some(superclass);
        self
    }

    /// Set interfaces (sorted and deduplicated on the way in).
    #[must_use]
    pub fn with_interfaces(mut self, mut interfaces: Vec<ClassKey>) -> Self {
        interfaces.sort();
        interfaces.dedup();
        self.interfaces = interfaces;
        self
    }

    /// Set annotations (sorted by name on the way in).
    #[must_use]
    pub fn with_annotations(mut self, annotations: Vec<Annotation>) -> Self {
        self.annotations = sort_annotations(annotations);
        self
    }

    /// Add a field, replacing any existing field with the same key.
    #[must_use]
    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.insert(field.key.clone(), Arc::new(field));
        self
    }

    /// Add a method, replacing any existing method with the same key.
    #[must_use]
    pub fn with_method(mut self, method: MethodDef) -> Self {
        self.methods.insert(method.key.clone(), Arc::new(method));
        self
    }

    /// Total member count (fields + methods).
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.fields.len() + self.methods.len()
    }
}

// ---------------------------------------------------------------------------
// BytecodeTree
// ---------------------------------------------------------------------------

/// An immutable bytecode tree: classes keyed by name, plus the opcode set
/// the tree was authored against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BytecodeTree {
    /// The binary-format version descriptor.
    pub opcodes: OpcodeSet,
    classes: BTreeMap<ClassKey, Arc<ClassDef>>,
}

impl BytecodeTree {
    /// Create an empty tree.
    #[must_use]
    pub const fn new(opcodes: OpcodeSet) -> Self {
        Self {
            opcodes,
            classes: BTreeMap::new(),
        }
    }

    /// Build a tree from classes, rejecting duplicate class keys.
    ///
    /// # Errors
    /// Returns [`DuplicateElement`] naming the first duplicated class.
    pub fn from_classes<I>(opcodes: OpcodeSet, classes: I) -> Result<Self, DuplicateElement>
    where
        I: IntoIterator<Item = ClassDef>,
    {
        let mut map = BTreeMap::new();
        for class in classes {
            let key = class.key.clone();
            if map.insert(key.clone(), Arc::new(class)).is_some() {
                return Err(DuplicateElement {
                    key: ElementKey::Class(key),
                });
            }
        }
        Ok(Self {
            opcodes,
            classes: map,
        })
    }

    /// Build a tree from an already-keyed class map.
    #[must_use]
    pub const fn from_class_map(
        opcodes: OpcodeSet,
        classes: BTreeMap<ClassKey, Arc<ClassDef>>,
    ) -> Self {
        Self { opcodes, classes }
    }

    /// Look up a class by key.
    #[must_use]
    pub fn get(&self, key: &ClassKey) -> Option<&Arc<ClassDef>> {
        self.classes.get(key)
    }

    /// Iterate classes in key order.
    pub fn classes(&self) -> impl Iterator<Item = &Arc<ClassDef>> {
        self.classes.values()
    }

    /// The class map, keyed by name.
    #[must_use]
    pub const fn class_map(&self) -> &BTreeMap<ClassKey, Arc<ClassDef>> {
        &self.classes
    }

    /// Number of classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Returns `true` if the tree has no classes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

// ---------------------------------------------------------------------------
// DuplicateElement
// ---------------------------------------------------------------------------

/// Two elements with the same key at the same tree level — a structural
/// error that makes the tree unusable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DuplicateElement {
    /// The duplicated key.
    pub key: ElementKey,
}

impl fmt::Display for DuplicateElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "duplicate element '{}'", self.key)
    }
}

impl std::error::Error for DuplicateElement {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
