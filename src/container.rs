//! Container I/O.
//!
//! The on-disk archive format of real bytecode containers is an external
//! collaborator; the core only needs the [`ContainerIo`] interface. This
//! module ships one implementation, [`JsonContainer`], a JSON rendering of
//! the tree used by the CLI and the test suite.
//!
//! Reading validates structural well-formedness (key uniqueness at every
//! level, known format version); a malformed container is an error before
//! any merge begins, never a poisoned result.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::model::keys::{ClassKey, ElementKey, MemberKey};
use crate::model::tree::{
    AccessFlags, Annotation, AnnotationValue, BytecodeTree, ClassDef, FieldDef, MethodBody,
    MethodDef,
};
use crate::model::version::OpcodeSet;

// ---------------------------------------------------------------------------
// ContainerError
// ---------------------------------------------------------------------------

/// A container could not be read, parsed or written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerError {
    /// The container path.
    pub path: PathBuf,
    /// What went wrong.
    pub detail: String,
}

impl ContainerError {
    fn new(path: &Path, detail: String) -> Self {
        Self {
            path: path.to_owned(),
            detail,
        }
    }
}

impl fmt::Display for ContainerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "container '{}': {}", self.path.display(), self.detail)
    }
}

impl std::error::Error for ContainerError {}

// ---------------------------------------------------------------------------
// ContainerIo
// ---------------------------------------------------------------------------

/// Reads and writes bytecode trees from container files.
pub trait ContainerIo {
    /// Read a tree, validating structural well-formedness.
    ///
    /// `hint` forces the instruction-set descriptor (e.g. from an API-level
    /// option) instead of the container's own.
    ///
    /// # Errors
    /// Returns [`ContainerError`] on I/O, parse or validation failure.
    fn read_tree(
        &self,
        path: &Path,
        hint: Option<OpcodeSet>,
    ) -> Result<BytecodeTree, ContainerError>;

    /// Write a tree.
    ///
    /// # Errors
    /// Returns [`ContainerError`] on I/O failure.
    fn write_tree(&self, tree: &BytecodeTree, path: &Path) -> Result<(), ContainerError>;
}

// ---------------------------------------------------------------------------
// JSON rendering
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
struct TreeDto {
    version: u16,
    classes: Vec<ClassDto>,
}

#[derive(Serialize, Deserialize)]
struct ClassDto {
    name: ClassKey,
    access: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    superclass: Option<ClassKey>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    interfaces: Vec<ClassKey>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    annotations: Vec<Annotation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    fields: Vec<FieldDto>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    methods: Vec<MethodDto>,
}

#[derive(Serialize, Deserialize)]
struct FieldDto {
    name: String,
    descriptor: String,
    access: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    initial: Option<AnnotationValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    annotations: Vec<Annotation>,
}

#[derive(Serialize, Deserialize)]
struct MethodDto {
    name: String,
    descriptor: String,
    access: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    annotations: Vec<Annotation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    body: Option<MethodBody>,
}

// ---------------------------------------------------------------------------
// JsonContainer
// ---------------------------------------------------------------------------

/// JSON-file container format.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonContainer;

impl ContainerIo for JsonContainer {
    fn read_tree(
        &self,
        path: &Path,
        hint: Option<OpcodeSet>,
    ) -> Result<BytecodeTree, ContainerError> {
        let text = std::fs::read_to_string(path)
            .map_err(|err| ContainerError::new(path, err.to_string()))?;
        let dto: TreeDto = serde_json::from_str(&text)
            .map_err(|err| ContainerError::new(path, err.to_string()))?;

        let opcodes = match hint {
            Some(opcodes) => opcodes,
            None => OpcodeSet::from_version(dto.version)
                .map_err(|err| ContainerError::new(path, err.to_string()))?,
        };

        let mut classes = Vec::with_capacity(dto.classes.len());
        for class in dto.classes {
            classes.push(class_from_dto(class, path)?);
        }
        BytecodeTree::from_classes(opcodes, classes)
            .map_err(|err| ContainerError::new(path, err.to_string()))
    }

    fn write_tree(&self, tree: &BytecodeTree, path: &Path) -> Result<(), ContainerError> {
        let dto = TreeDto {
            version: tree.opcodes.version(),
            classes: tree.classes().map(|class| class_to_dto(class)).collect(),
        };
        let json = serde_json::to_vec_pretty(&dto)
            .map_err(|err| ContainerError::new(path, err.to_string()))?;

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let write = || -> std::io::Result<()> {
            std::fs::create_dir_all(dir)?;
            let mut temp = tempfile::NamedTempFile::new_in(dir)?;
            temp.write_all(&json)?;
            temp.as_file().sync_all()?;
            temp.persist(path).map_err(|err| err.error)?;
            Ok(())
        };
        write().map_err(|err| ContainerError::new(path, err.to_string()))
    }
}

fn class_from_dto(dto: ClassDto, path: &Path) -> Result<ClassDef, ContainerError> {
    let class_key = dto.name.clone();

    let mut fields: BTreeMap<MemberKey, Arc<FieldDef>> = BTreeMap::new();
    for field in dto.fields {
        let key = MemberKey::new(&field.name, &field.descriptor)
            .map_err(|err| ContainerError::new(path, err.to_string()))?;
        let def = FieldDef {
            key: key.clone(),
            access: AccessFlags::from_bits(field.access),
            initial: field.initial,
            annotations: field.annotations,
        };
        if fields.insert(key.clone(), Arc::new(def)).is_some() {
            let elem = ElementKey::Field {
                class: class_key.clone(),
                member: key,
            };
            return Err(ContainerError::new(path, format!("duplicate element '{elem}'")));
        }
    }

    let mut methods: BTreeMap<MemberKey, Arc<MethodDef>> = BTreeMap::new();
    for method in dto.methods {
        let key = MemberKey::new(&method.name, &method.descriptor)
            .map_err(|err| ContainerError::new(path, err.to_string()))?;
        let def = MethodDef {
            key: key.clone(),
            access: AccessFlags::from_bits(method.access),
            annotations: method.annotations,
            body: method.body,
        };
        if methods.insert(key.clone(), Arc::new(def)).is_some() {
            let elem = ElementKey::Method {
                class: class_key.clone(),
                member: key,
            };
            return Err(ContainerError::new(path, format!("duplicate element '{elem}'")));
        }
    }

    Ok(ClassDef {
        key: dto.name,
        access: AccessFlags::from_bits(dto.access),
        superclass: dto.superclass,
        interfaces: dto.interfaces,
        annotations: dto.annotations,
        fields,
        methods,
    })
}

fn class_to_dto(class: &ClassDef) -> ClassDto {
    ClassDto {
        name: class.key.clone(),
        access: class.access.bits(),
        superclass: class.superclass.clone(),
        interfaces: class.interfaces.clone(),
        annotations: class.annotations.clone(),
        fields: class
            .fields
            .values()
            .map(|field| FieldDto {
                name: field.key.name().to_owned(),
                descriptor: field.key.descriptor().to_owned(),
                access: field.access.bits(),
                initial: field.initial.clone(),
                annotations: field.annotations.clone(),
            })
            .collect(),
        methods: class
            .methods
            .values()
            .map(|method| MethodDto {
                name: method.key.name().to_owned(),
                descriptor: method.key.descriptor().to_owned(),
                access: method.access.bits(),
                annotations: method.annotations.clone(),
                body: method.body.clone(),
            })
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tree::Instruction;

    fn sample_tree() -> BytecodeTree {
        let field = FieldDef::new(
            MemberKey::new("x", "int").unwrap(),
            AccessFlags::PRIVATE.union(AccessFlags::STATIC),
        )
        .with_initial(AnnotationValue::Int(42));
        let method = MethodDef::new(
            MemberKey::new("f", "(int)int").unwrap(),
            AccessFlags::PUBLIC,
        )
        .with_body(MethodBody::new(
            2,
            vec![
                Instruction::with_operands("const", &["v0", "1"]),
                Instruction::with_operands("return", &["v0"]),
            ],
        ))
        .with_annotations(vec![
            Annotation::new(ClassKey::new("com.Marker").unwrap())
                .with_value("v", AnnotationValue::Str("m".to_owned())),
        ]);
        BytecodeTree::from_classes(
            OpcodeSet::V037,
            vec![
                ClassDef::new(ClassKey::new("com.A").unwrap(), AccessFlags::PUBLIC)
                    .with_superclass(ClassKey::new("com.Base").unwrap())
                    .with_interfaces(vec![ClassKey::new("com.I").unwrap()])
                    .with_field(field)
                    .with_method(method),
                ClassDef::new(ClassKey::new("com.B").unwrap(), AccessFlags::FINAL),
            ],
        )
        .unwrap()
    }

    #[test]
    fn json_round_trip_preserves_tree() {
        let tree = sample_tree();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("container.json");

        JsonContainer.write_tree(&tree, &path).unwrap();
        let back = JsonContainer.read_tree(&path, None).unwrap();
        assert_eq!(back, tree);
    }

    #[test]
    fn hint_overrides_container_version() {
        let tree = sample_tree();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("container.json");
        JsonContainer.write_tree(&tree, &path).unwrap();

        let back = JsonContainer
            .read_tree(&path, Some(OpcodeSet::V035))
            .unwrap();
        assert_eq!(back.opcodes, OpcodeSet::V035);
    }

    #[test]
    fn unknown_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("container.json");
        std::fs::write(&path, r#"{"version": 99, "classes": []}"#).unwrap();
        let err = JsonContainer.read_tree(&path, None).unwrap_err();
        assert!(err.detail.contains("format version"));
    }

    #[test]
    fn duplicate_class_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("container.json");
        std::fs::write(
            &path,
            r#"{"version": 35, "classes": [
                {"name": "com.A", "access": 1},
                {"name": "com.A", "access": 1}
            ]}"#,
        )
        .unwrap();
        let err = JsonContainer.read_tree(&path, None).unwrap_err();
        assert!(err.detail.contains("duplicate"));
        assert!(err.detail.contains("com.A"));
    }

    #[test]
    fn duplicate_member_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("container.json");
        std::fs::write(
            &path,
            r#"{"version": 35, "classes": [
                {"name": "com.A", "access": 1, "methods": [
                    {"name": "f", "descriptor": "()void", "access": 1},
                    {"name": "f", "descriptor": "()void", "access": 1}
                ]}
            ]}"#,
        )
        .unwrap();
        let err = JsonContainer.read_tree(&path, None).unwrap_err();
        assert!(err.detail.contains("duplicate"));
        assert!(err.detail.contains("f:()void"));
    }

    #[test]
    fn missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = JsonContainer
            .read_tree(&dir.path().join("absent.json"), None)
            .unwrap_err();
        assert!(!err.detail.is_empty());
    }

    #[test]
    fn invalid_member_name_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("container.json");
        std::fs::write(
            &path,
            r#"{"version": 35, "classes": [
                {"name": "com.A", "access": 1, "fields": [
                    {"name": "bad name", "descriptor": "int", "access": 1}
                ]}
            ]}"#,
        )
        .unwrap();
        assert!(JsonContainer.read_tree(&path, None).is_err());
    }
}
