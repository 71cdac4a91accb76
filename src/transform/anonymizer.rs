//! Deterministic type anonymization.
//!
//! The plan is a single marker package segment (config
//! `transform.anonymize_marker`). Reanonymization inserts the marker as the
//! last package segment of every class name (`a.b.C` → `a.b.anon.C`);
//! deanonymization removes it. The two are exact inverses:
//! `deanonymize(reanonymize(t)) == t`.
//!
//! Malformed names are reported per class and left untouched: a name that
//! already carries the marker cannot be reanonymized again, and a name
//! carrying it more than once is ambiguous to deanonymize. Severity is
//! error, or warning when `treat_reanonymize_errors_as_warnings` is set.

use crate::diag::{DiagnosticsSink, FatalError, Severity};
use crate::rewrite::{Action, Element, ElementRef, RewritePass};

use super::rewrite_class_types;

// ---------------------------------------------------------------------------
// TypeAnonymizer
// ---------------------------------------------------------------------------

/// The name-level anonymization scheme.
#[derive(Clone, Debug)]
pub struct TypeAnonymizer {
    marker: String,
    reanonymize: bool,
}

impl TypeAnonymizer {
    /// Create an anonymizer. `reanonymize` selects the insert direction;
    /// otherwise the marker is removed (deanonymize).
    #[must_use]
    pub fn new(marker: &str, reanonymize: bool) -> Self {
        Self {
            marker: marker.to_owned(),
            reanonymize,
        }
    }

    /// Rewrite one class name, or `Ok(None)` to leave it untouched.
    ///
    /// # Errors
    /// Returns a message for names the scheme cannot handle.
    pub fn map_name(&self, name: &str) -> Result<Option<String>, String> {
        let segments: Vec<&str> = name.split('.').collect();
        let marker_count = segments
            .iter()
            .filter(|segment| **segment == self.marker)
            .count();

        if self.reanonymize {
            if marker_count > 0 {
                return Err(format!(
                    "cannot reanonymize '{name}': already contains marker segment '{}'",
                    self.marker
                ));
            }
            let (package, simple) = match segments.split_last() {
                Some((simple, package)) if !package.is_empty() => {
                    (format!("{}.", package.join(".")), *simple)
                }
                _ => (String::new(), name),
            };
            Ok(Some(format!("{package}{}.{simple}", self.marker)))
        } else {
            match marker_count {
                0 => Ok(None),
                1 => Ok(Some(
                    segments
                        .iter()
                        .filter(|segment| **segment != self.marker)
                        .copied()
                        .collect::<Vec<_>>()
                        .join("."),
                )),
                more => Err(format!(
                    "cannot deanonymize '{name}': marker segment '{}' appears {more} times",
                    self.marker
                )),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// AnonymizerPass
// ---------------------------------------------------------------------------

/// Applies a [`TypeAnonymizer`] to every class-name reference in the tree.
pub struct AnonymizerPass<'a> {
    anonymizer: TypeAnonymizer,
    exclude_package: &'a str,
    severity: Severity,
}

impl<'a> AnonymizerPass<'a> {
    /// Create a pass. `errors_as_warnings` downgrades per-name failures.
    #[must_use]
    pub fn new(
        anonymizer: TypeAnonymizer,
        exclude_package: &'a str,
        errors_as_warnings: bool,
    ) -> Self {
        Self {
            anonymizer,
            exclude_package,
            severity: if errors_as_warnings {
                Severity::Warning
            } else {
                Severity::Error
            },
        }
    }
}

impl RewritePass for AnonymizerPass<'_> {
    fn name(&self) -> &'static str {
        "anonymize"
    }

    fn rewrite(
        &self,
        element: ElementRef<'_>,
        sink: &mut DiagnosticsSink,
    ) -> Result<Action, FatalError> {
        let ElementRef::Class(class) = element else {
            return Ok(Action::Keep);
        };
        let mapping = |name: &str| self.anonymizer.map_name(name);
        match rewrite_class_types(class, &mapping, self.exclude_package, self.severity, sink) {
            Some(rewritten) => Ok(Action::Replace(Element::Class(std::sync::Arc::new(
                rewritten,
            )))),
            None => Ok(Action::Keep),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::keys::ClassKey;
    use crate::model::tree::{AccessFlags, BytecodeTree, ClassDef};
    use crate::model::version::OpcodeSet;

    #[test]
    fn reanonymize_inserts_marker_segment() {
        let anon = TypeAnonymizer::new("anon", true);
        assert_eq!(
            anon.map_name("a.b.C").unwrap(),
            Some("a.b.anon.C".to_owned())
        );
        assert_eq!(anon.map_name("C").unwrap(), Some("anon.C".to_owned()));
    }

    #[test]
    fn reanonymize_rejects_already_marked() {
        let anon = TypeAnonymizer::new("anon", true);
        let err = anon.map_name("a.anon.C").unwrap_err();
        assert!(err.contains("already contains"));
    }

    #[test]
    fn deanonymize_removes_marker_segment() {
        let dean = TypeAnonymizer::new("anon", false);
        assert_eq!(dean.map_name("a.b.anon.C").unwrap(), Some("a.b.C".to_owned()));
        assert_eq!(dean.map_name("anon.C").unwrap(), Some("C".to_owned()));
        // Unmarked names pass through silently.
        assert_eq!(dean.map_name("a.b.C").unwrap(), None);
    }

    #[test]
    fn deanonymize_rejects_double_markers() {
        let dean = TypeAnonymizer::new("anon", false);
        let err = dean.map_name("anon.a.anon.C").unwrap_err();
        assert!(err.contains("2 times"));
    }

    #[test]
    fn round_trip_is_identity() {
        let rean = TypeAnonymizer::new("anon", true);
        let dean = TypeAnonymizer::new("anon", false);
        for name in ["a.b.C", "C", "x.Y$Inner"] {
            let marked = rean.map_name(name).unwrap().unwrap();
            assert_eq!(dean.map_name(&marked).unwrap(), Some(name.to_owned()));
        }
    }

    #[test]
    fn pass_reports_at_configured_severity() {
        let tree = BytecodeTree::from_classes(
            OpcodeSet::V035,
            vec![ClassDef::new(
                ClassKey::new("a.anon.C").unwrap(),
                AccessFlags::PUBLIC,
            )],
        )
        .unwrap();

        let strict = AnonymizerPass::new(TypeAnonymizer::new("anon", true), "bytepatch.tag", false);
        let mut sink = DiagnosticsSink::new();
        let out = crate::rewrite::apply(&tree, &[&strict], &mut sink).unwrap();
        assert!(sink.has_errors());
        assert_eq!(out, tree);

        let lenient = AnonymizerPass::new(TypeAnonymizer::new("anon", true), "bytepatch.tag", true);
        let mut sink = DiagnosticsSink::new();
        crate::rewrite::apply(&tree, &[&lenient], &mut sink).unwrap();
        assert!(!sink.has_errors());
        assert_eq!(sink.warning_count(), 1);
    }

    #[test]
    fn pass_anonymizes_tree_classes() {
        let tree = BytecodeTree::from_classes(
            OpcodeSet::V035,
            vec![ClassDef::new(
                ClassKey::new("a.C").unwrap(),
                AccessFlags::PUBLIC,
            )],
        )
        .unwrap();
        let pass = AnonymizerPass::new(TypeAnonymizer::new("anon", true), "bytepatch.tag", false);
        let mut sink = DiagnosticsSink::new();
        let out = crate::rewrite::apply(&tree, &[&pass], &mut sink).unwrap();
        assert!(out.get(&ClassKey::new("a.anon.C").unwrap()).is_some());
    }
}
