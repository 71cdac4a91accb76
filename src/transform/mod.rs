//! Peer transform passes over the rewrite framework.
//!
//! These passes run before and after the merge, each an independent
//! [`RewritePass`](crate::rewrite::RewritePass):
//!
//! - [`mapper`] — identifier renaming against a loaded rename map (direct
//!   or inverse), plus map-template emission.
//! - [`anonymizer`] — deterministic type anonymization against a marker
//!   plan (deanonymize ∘ reanonymize = identity).
//! - [`codec`] — string-literal encoding/decoding against a code marker.
//!
//! All three are table lookup/substitution over class-name references; the
//! shared walk lives in [`rewrite_class_types`]. Names under the directive
//! annotation package are never rewritten, so patch directives survive
//! every transform stage.

pub mod anonymizer;
pub mod codec;
pub mod mapper;

use std::cell::{Cell, RefCell};

use crate::diag::{DiagnosticsSink, Severity};
use crate::model::keys::{self, ClassKey, ElementKey, MemberKey};
use crate::model::tree::{Annotation, AnnotationValue, ClassDef, FieldDef, Instruction, MethodDef};

/// How one class name should be rewritten.
///
/// `Ok(None)` leaves the name untouched; `Err` reports against the owning
/// class (at the pass's configured severity) and leaves the name untouched.
pub type NameMapping<'m> = dyn Fn(&str) -> Result<Option<String>, String> + 'm;

/// Rewrite every class-name reference in a class: its key, superclass,
/// interfaces, member descriptors, annotation types and type-valued
/// operands.
///
/// Returns `None` when nothing changed, so callers can return
/// [`Action::Keep`](crate::rewrite::Action) and preserve structural
/// sharing. Names under `exclude_package` are never rewritten.
pub(crate) fn rewrite_class_types(
    class: &ClassDef,
    map: &NameMapping<'_>,
    exclude_package: &str,
    severity: Severity,
    sink: &mut DiagnosticsSink,
) -> Option<ClassDef> {
    let changed = Cell::new(false);
    let errors: RefCell<Vec<String>> = RefCell::new(Vec::new());

    let lookup = |name: &str| -> Option<String> {
        if ClassKey::new(name).is_ok_and(|key| key.in_package(exclude_package)) {
            return None;
        }
        match map(name) {
            Ok(Some(new)) => {
                changed.set(true);
                Some(new)
            }
            Ok(None) => None,
            Err(message) => {
                errors.borrow_mut().push(message);
                None
            }
        }
    };

    let map_key = |key: &ClassKey| -> ClassKey {
        match lookup(key.as_str()).map(|new| ClassKey::new(&new)) {
            Some(Ok(new)) => new,
            Some(Err(err)) => {
                errors.borrow_mut().push(err.to_string());
                key.clone()
            }
            None => key.clone(),
        }
    };

    let map_member_key = |member: &MemberKey| -> MemberKey {
        let descriptor = keys::map_descriptor(member.descriptor(), &lookup);
        MemberKey::new(member.name(), &descriptor).unwrap_or_else(|_| member.clone())
    };

    let map_value = |value: &AnnotationValue| -> AnnotationValue { map_annotation_value(value, &map_key) };

    let map_annotation = |annotation: &Annotation| -> Annotation {
        Annotation {
            name: map_key(&annotation.name),
            values: annotation
                .values
                .iter()
                .map(|(k, v)| (k.clone(), map_value(v)))
                .collect(),
        }
    };

    // Type-valued operands are method descriptors or dotted class names.
    // Bare identifiers (registers, labels) are never mapped.
    let map_operand = |operand: &str| -> String {
        if operand.starts_with('(') {
            keys::map_descriptor(operand, &lookup)
        } else if operand.contains('.') && ClassKey::new(keys::base_type(operand)).is_ok() {
            keys::map_type(operand, &lookup)
        } else {
            operand.to_owned()
        }
    };

    let map_instruction = |instruction: &Instruction| -> Instruction {
        Instruction {
            op: instruction.op.clone(),
            operands: instruction
                .operands
                .iter()
                .map(|operand| map_operand(operand))
                .collect(),
        }
    };

    let rebuilt = ClassDef {
        key: map_key(&class.key),
        access: class.access,
        superclass: class.superclass.as_ref().map(&map_key),
        interfaces: {
            let mut interfaces: Vec<ClassKey> = class.interfaces.iter().map(&map_key).collect();
            interfaces.sort();
            interfaces.dedup();
            interfaces
        },
        annotations: class.annotations.iter().map(&map_annotation).collect(),
        fields: class
            .fields
            .values()
            .map(|field| {
                let mapped = FieldDef {
                    key: map_member_key(&field.key),
                    access: field.access,
                    initial: field.initial.as_ref().map(&map_value),
                    annotations: field.annotations.iter().map(&map_annotation).collect(),
                };
                (mapped.key.clone(), std::sync::Arc::new(mapped))
            })
            .collect(),
        methods: class
            .methods
            .values()
            .map(|method| {
                let mapped = MethodDef {
                    key: map_member_key(&method.key),
                    access: method.access,
                    annotations: method.annotations.iter().map(&map_annotation).collect(),
                    body: method.body.as_ref().map(|body| {
                        crate::model::tree::MethodBody::new(
                            body.registers,
                            body.instructions.iter().map(&map_instruction).collect(),
                        )
                    }),
                };
                (mapped.key.clone(), std::sync::Arc::new(mapped))
            })
            .collect(),
    };

    let reported = errors.into_inner();
    for message in &reported {
        sink.report(
            severity,
            Some(ElementKey::Class(class.key.clone())),
            message.clone(),
        );
    }

    if changed.get() {
        Some(rebuilt)
    } else {
        None
    }
}

fn map_annotation_value(
    value: &AnnotationValue,
    map_key: &dyn Fn(&ClassKey) -> ClassKey,
) -> AnnotationValue {
    match value {
        AnnotationValue::Type(key) => AnnotationValue::Type(map_key(key)),
        AnnotationValue::List(items) => AnnotationValue::List(
            items
                .iter()
                .map(|item| map_annotation_value(item, map_key))
                .collect(),
        ),
        other => other.clone(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tree::{AccessFlags, MethodBody};

    fn class_key(name: &str) -> ClassKey {
        ClassKey::new(name).unwrap()
    }

    fn simple_mapping(from: &'static str, to: &'static str) -> impl Fn(&str) -> Result<Option<String>, String> {
        move |name: &str| Ok((name == from).then(|| to.to_owned()))
    }

    fn sample_class() -> ClassDef {
        let field = FieldDef::new(
            MemberKey::new("x", "a.B").unwrap(),
            AccessFlags::PRIVATE,
        );
        let method = MethodDef::new(
            MemberKey::new("f", "(a.B,int)a.B[]").unwrap(),
            AccessFlags::PUBLIC,
        )
        .with_body(MethodBody::new(
            1,
            vec![Instruction::with_operands("invoke", &["a.B", "v0"])],
        ));
        ClassDef::new(class_key("a.B"), AccessFlags::PUBLIC)
            .with_superclass(class_key("a.Base"))
            .with_interfaces(vec![class_key("a.B")])
            .with_annotations(vec![
                Annotation::new(class_key("a.Tag"))
                    .with_value("t", AnnotationValue::Type(class_key("a.B"))),
            ])
            .with_field(field)
            .with_method(method)
    }

    #[test]
    fn rewrites_every_reference_site() {
        let class = sample_class();
        let mut sink = DiagnosticsSink::new();
        let mapping = simple_mapping("a.B", "x.Y");
        let rewritten =
            rewrite_class_types(&class, &mapping, "bytepatch.tag", Severity::Error, &mut sink)
                .unwrap();

        assert_eq!(rewritten.key, class_key("x.Y"));
        assert_eq!(rewritten.superclass, Some(class_key("a.Base")));
        assert_eq!(rewritten.interfaces, vec![class_key("x.Y")]);
        assert_eq!(
            rewritten.annotations[0].get("t"),
            Some(&AnnotationValue::Type(class_key("x.Y")))
        );
        assert!(
            rewritten
                .fields
                .contains_key(&MemberKey::new("x", "x.Y").unwrap())
        );
        let method_key = MemberKey::new("f", "(x.Y,int)x.Y[]").unwrap();
        let method = rewritten.methods.get(&method_key).unwrap();
        assert_eq!(method.body.as_ref().unwrap().instructions[0].operands[0], "x.Y");
        assert!(!sink.has_errors());
    }

    #[test]
    fn unmapped_class_returns_none() {
        let class = sample_class();
        let mut sink = DiagnosticsSink::new();
        let mapping = simple_mapping("other.Z", "x.Y");
        assert!(
            rewrite_class_types(&class, &mapping, "bytepatch.tag", Severity::Error, &mut sink)
                .is_none()
        );
    }

    #[test]
    fn excluded_package_is_never_rewritten() {
        let class = ClassDef::new(class_key("com.A"), AccessFlags::PUBLIC).with_annotations(vec![
            Annotation::new(class_key("bytepatch.tag.Edit")),
        ]);
        let mut sink = DiagnosticsSink::new();
        let mapping = simple_mapping("bytepatch.tag.Edit", "x.Hijacked");
        assert!(
            rewrite_class_types(&class, &mapping, "bytepatch.tag", Severity::Error, &mut sink)
                .is_none()
        );
    }

    #[test]
    fn bare_identifier_operands_are_never_mapped() {
        // A mapping that would rewrite anything it is asked about must not
        // see register operands.
        let class = sample_class();
        let mut sink = DiagnosticsSink::new();
        let greedy = |name: &str| -> Result<Option<String>, String> {
            Ok(Some(format!("x.{}", name.rsplit('.').next().unwrap_or(name))))
        };
        let rewritten =
            rewrite_class_types(&class, &greedy, "bytepatch.tag", Severity::Error, &mut sink)
                .unwrap();
        let method = rewritten
            .methods
            .get(&MemberKey::new("f", "(x.B,int)x.B[]").unwrap())
            .unwrap();
        let operands = &method.body.as_ref().unwrap().instructions[0].operands;
        assert_eq!(operands[0], "x.B");
        assert_eq!(operands[1], "v0");
    }

    #[test]
    fn mapping_error_is_reported_and_name_kept() {
        let class = ClassDef::new(class_key("com.A"), AccessFlags::PUBLIC);
        let mut sink = DiagnosticsSink::new();
        let mapping =
            |_: &str| -> Result<Option<String>, String> { Err("boom".to_owned()) };
        let result =
            rewrite_class_types(&class, &mapping, "bytepatch.tag", Severity::Warning, &mut sink);
        assert!(result.is_none());
        assert_eq!(sink.warning_count(), 1);
        assert!(!sink.has_errors());
    }
}
