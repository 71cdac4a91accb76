//! Identifier renaming against a loaded rename map.
//!
//! A rename map is a text file of `old new` pairs (dotted class names, one
//! pair per line, `#` comments). [`RenamePass`] applies the map to every
//! class-name reference; [`RenameMap::inverted`] produces the inverse map
//! for the unmap stages, rejecting ambiguous (duplicate-target) maps.
//!
//! A map file that fails to load is a fatal condition — the pipeline aborts
//! before reading any tree.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use crate::diag::{DiagnosticsSink, FatalError, Severity};
use crate::model::keys::ClassKey;
use crate::model::tree::BytecodeTree;
use crate::rewrite::{Action, Element, ElementRef, RewritePass};

use super::rewrite_class_types;

// ---------------------------------------------------------------------------
// MapError
// ---------------------------------------------------------------------------

/// A rename map could not be loaded or is inconsistent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MapError {
    /// Path of the map file, if it came from disk.
    pub path: Option<PathBuf>,
    /// What went wrong.
    pub message: String,
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "rename map '{}': {}", path.display(), self.message),
            None => write!(f, "rename map: {}", self.message),
        }
    }
}

impl std::error::Error for MapError {}

impl From<MapError> for FatalError {
    fn from(err: MapError) -> Self {
        Self::new(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// RenameMap
// ---------------------------------------------------------------------------

/// An immutable class-rename table.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenameMap {
    classes: BTreeMap<String, String>,
}

impl RenameMap {
    /// Build a map from `(old, new)` pairs, rejecting duplicate sources.
    ///
    /// # Errors
    /// Returns [`MapError`] when a source name is mapped twice or a name
    /// fails validation.
    pub fn from_pairs<I>(pairs: I) -> Result<Self, MapError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut classes = BTreeMap::new();
        for (old, new) in pairs {
            for name in [&old, &new] {
                ClassKey::new(name).map_err(|err| MapError {
                    path: None,
                    message: err.to_string(),
                })?;
            }
            if classes.insert(old.clone(), new).is_some() {
                return Err(MapError {
                    path: None,
                    message: format!("'{old}' is mapped more than once"),
                });
            }
        }
        Ok(Self { classes })
    }

    /// Load a map file: one `old new` pair per line, `#` starts a comment,
    /// blank lines ignored.
    ///
    /// # Errors
    /// Returns [`MapError`] on I/O failure or malformed content.
    pub fn load(path: &Path) -> Result<Self, MapError> {
        let text = std::fs::read_to_string(path).map_err(|err| MapError {
            path: Some(path.to_owned()),
            message: err.to_string(),
        })?;
        let mut pairs = Vec::new();
        for (number, line) in text.lines().enumerate() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.split_whitespace();
            match (parts.next(), parts.next(), parts.next()) {
                (Some(old), Some(new), None) => pairs.push((old.to_owned(), new.to_owned())),
                _ => {
                    return Err(MapError {
                        path: Some(path.to_owned()),
                        message: format!("line {}: expected 'old new'", number + 1),
                    });
                }
            }
        }
        Self::from_pairs(pairs).map_err(|mut err| {
            err.path = Some(path.to_owned());
            err
        })
    }

    /// The inverse map (for unmap stages).
    ///
    /// # Errors
    /// Returns [`MapError`] when two sources map to the same target — the
    /// inverse would be ambiguous.
    pub fn inverted(&self) -> Result<Self, MapError> {
        let mut classes = BTreeMap::new();
        for (old, new) in &self.classes {
            if classes.insert(new.clone(), old.clone()).is_some() {
                return Err(MapError {
                    path: None,
                    message: format!("map is not invertible: two names map to '{new}'"),
                });
            }
        }
        Ok(Self { classes })
    }

    /// Look up a class name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.classes.get(name).map(String::as_str)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Returns `true` if the map has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

// ---------------------------------------------------------------------------
// RenamePass
// ---------------------------------------------------------------------------

/// Applies a [`RenameMap`] to every class-name reference in the tree.
pub struct RenamePass<'a> {
    map: &'a RenameMap,
    exclude_package: &'a str,
}

impl<'a> RenamePass<'a> {
    /// Create a pass over a map. Names under `exclude_package` (the
    /// directive tag package) are never renamed.
    #[must_use]
    pub const fn new(map: &'a RenameMap, exclude_package: &'a str) -> Self {
        Self {
            map,
            exclude_package,
        }
    }
}

impl RewritePass for RenamePass<'_> {
    fn name(&self) -> &'static str {
        "rename"
    }

    fn rewrite(
        &self,
        element: ElementRef<'_>,
        sink: &mut DiagnosticsSink,
    ) -> Result<Action, FatalError> {
        let ElementRef::Class(class) = element else {
            return Ok(Action::Keep);
        };
        let mapping =
            |name: &str| -> Result<Option<String>, String> { Ok(self.map.get(name).map(ToOwned::to_owned)) };
        match rewrite_class_types(class, &mapping, self.exclude_package, Severity::Error, sink) {
            Some(rewritten) => Ok(Action::Replace(Element::Class(std::sync::Arc::new(
                rewritten,
            )))),
            None => Ok(Action::Keep),
        }
    }
}

// ---------------------------------------------------------------------------
// Map templates
// ---------------------------------------------------------------------------

/// Write a map-template file listing every class of a tree as a
/// commented-out identity pair, ready for hand editing.
///
/// # Errors
/// Returns an I/O error on write failure.
pub fn write_template(tree: &BytecodeTree, path: &Path) -> std::io::Result<()> {
    let mut out = Vec::new();
    writeln!(out, "# bytepatch rename map template")?;
    writeln!(out, "# uncomment and edit: <old-name> <new-name>")?;
    for class in tree.classes() {
        writeln!(out, "# {key} {key}", key = class.key)?;
    }
    std::fs::write(path, out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tree::{AccessFlags, ClassDef};
    use crate::model::version::OpcodeSet;
    use std::sync::Arc;

    fn map_of(pairs: &[(&str, &str)]) -> RenameMap {
        RenameMap::from_pairs(
            pairs
                .iter()
                .map(|(a, b)| ((*a).to_owned(), (*b).to_owned())),
        )
        .unwrap()
    }

    #[test]
    fn from_pairs_rejects_duplicates_and_bad_names() {
        let dup = RenameMap::from_pairs(vec![
            ("a.B".to_owned(), "x.Y".to_owned()),
            ("a.B".to_owned(), "x.Z".to_owned()),
        ]);
        assert!(dup.unwrap_err().message.contains("more than once"));

        let bad = RenameMap::from_pairs(vec![("not a name".to_owned(), "x.Y".to_owned())]);
        assert!(bad.is_err());
    }

    #[test]
    fn load_parses_comments_and_blanks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.txt");
        std::fs::write(
            &path,
            "# a comment\n\na.B x.Y   # trailing comment\na.C x.Z\n",
        )
        .unwrap();
        let map = RenameMap::load(&path).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("a.B"), Some("x.Y"));
        assert_eq!(map.get("a.C"), Some("x.Z"));
        assert_eq!(map.get("a.D"), None);
    }

    #[test]
    fn load_rejects_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.txt");
        std::fs::write(&path, "a.B\n").unwrap();
        let err = RenameMap::load(&path).unwrap_err();
        assert!(err.message.contains("line 1"));
    }

    #[test]
    fn load_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(RenameMap::load(&dir.path().join("absent.txt")).is_err());
    }

    #[test]
    fn inverted_swaps_and_detects_ambiguity() {
        let map = map_of(&[("a.B", "x.Y"), ("a.C", "x.Z")]);
        let inverse = map.inverted().unwrap();
        assert_eq!(inverse.get("x.Y"), Some("a.B"));
        assert_eq!(inverse.get("x.Z"), Some("a.C"));

        let ambiguous = map_of(&[("a.B", "x.Y"), ("a.C", "x.Y")]);
        assert!(
            ambiguous
                .inverted()
                .unwrap_err()
                .message
                .contains("not invertible")
        );
    }

    #[test]
    fn rename_pass_round_trip() {
        let tree = BytecodeTree::from_classes(
            OpcodeSet::V035,
            vec![
                ClassDef::new(ClassKey::new("a.B").unwrap(), AccessFlags::PUBLIC),
                ClassDef::new(ClassKey::new("a.Other").unwrap(), AccessFlags::PUBLIC),
            ],
        )
        .unwrap();
        let map = map_of(&[("a.B", "x.Y")]);
        let mut sink = DiagnosticsSink::new();

        let pass = RenamePass::new(&map, "bytepatch.tag");
        let mapped = crate::rewrite::apply(&tree, &[&pass], &mut sink).unwrap();
        assert!(mapped.get(&ClassKey::new("x.Y").unwrap()).is_some());
        // Unmapped class shared by identity.
        assert!(Arc::ptr_eq(
            tree.get(&ClassKey::new("a.Other").unwrap()).unwrap(),
            mapped.get(&ClassKey::new("a.Other").unwrap()).unwrap()
        ));

        let inverse = map.inverted().unwrap();
        let unmap = RenamePass::new(&inverse, "bytepatch.tag");
        let back = crate::rewrite::apply(&mapped, &[&unmap], &mut sink).unwrap();
        assert_eq!(back, tree);
        assert!(!sink.has_errors());
    }

    #[test]
    fn template_lists_every_class() {
        let tree = BytecodeTree::from_classes(
            OpcodeSet::V035,
            vec![
                ClassDef::new(ClassKey::new("a.B").unwrap(), AccessFlags::PUBLIC),
                ClassDef::new(ClassKey::new("a.C").unwrap(), AccessFlags::PUBLIC),
            ],
        )
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("template.txt");
        write_template(&tree, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("# a.B a.B"));
        assert!(text.contains("# a.C a.C"));
    }
}
