//! Merge engine scenario tests.
//!
//! Exercises the documented directive semantics end to end through the
//! library API: default actions, collisions, splices, qualifier
//! validation, and the left-fold composition over successive patches.

mod common;

use std::sync::Arc;

use common::{class, class_key, merge, method_key, method_returning, returned_value, tag, tree};

use bytepatch::model::keys::MemberKey;
use bytepatch::model::tree::{
    AccessFlags, Annotation, AnnotationValue, BytecodeTree, FieldDef, Instruction, MethodBody,
    MethodDef,
};
use bytepatch::model::version::OpcodeSet;

#[test]
fn empty_patch_is_identity() {
    let source = tree(vec![
        class("com.A").with_method(method_returning("f", "()int", "1")),
    ]);
    let patch = tree(vec![]);
    let (result, sink) = merge(&source, &patch);

    assert!(!result.is_poisoned());
    assert_eq!(result.tree, source);
    assert_eq!(result.tree.opcodes, source.opcodes);
    assert_eq!(sink.entries().len(), 0);
}

#[test]
fn replace_directive_swaps_method_body() {
    // Source: class A with f() returning 1, no directives.
    // Patch: class A with f() marked Replace returning 2.
    let source = tree(vec![
        class("com.A").with_method(method_returning("f", "()int", "1")),
    ]);
    let patch = tree(vec![class("com.A").with_method(
        method_returning("f", "()int", "2").with_annotations(vec![tag("Replace")]),
    )]);

    let (result, sink) = merge(&source, &patch);
    assert_eq!(sink.error_count(), 0);
    assert_eq!(returned_value(&result.tree, "com.A", "f", "()int"), "2");
}

#[test]
fn add_collision_reports_exactly_one_error_and_keeps_source() {
    let source = tree(vec![
        class("com.A").with_method(method_returning("f", "()int", "1")),
    ]);
    let patch = tree(vec![class("com.A").with_annotations(vec![tag("Add")])]);

    let (result, sink) = merge(&source, &patch);
    assert_eq!(sink.error_count(), 1);
    assert!(result.is_poisoned());
    // The retained side is deterministically the source version, shared.
    assert!(Arc::ptr_eq(
        source.get(&class_key("com.A")).unwrap(),
        result.tree.get(&class_key("com.A")).unwrap()
    ));
    assert_eq!(returned_value(&result.tree, "com.A", "f", "()int"), "1");
}

#[test]
fn append_without_counterpart_poisons_and_omits_method() {
    // Source: class B with no method g. Patch: B.g marked Append.
    let source = tree(vec![class("com.B")]);
    let patch = tree(vec![class("com.B").with_method(
        method_returning("g", "()void", "0").with_annotations(vec![tag("Append")]),
    )]);

    let (result, sink) = merge(&source, &patch);
    assert_eq!(sink.error_count(), 1);
    assert!(result.is_poisoned());
    let b = result.tree.get(&class_key("com.B")).unwrap();
    assert!(b.methods.get(&method_key("g", "()void")).is_none());
}

#[test]
fn class_qualifier_on_field_directive_is_resolution_error() {
    let source = tree(vec![
        class("com.A").with_field(FieldDef::new(
            MemberKey::new("x", "int").unwrap(),
            AccessFlags::PRIVATE,
        )),
    ]);
    let bad_edit = tag("Edit").with_value(
        "superclass",
        AnnotationValue::Type(class_key("com.Base")),
    );
    let patch = tree(vec![class("com.A").with_field(
        FieldDef::new(MemberKey::new("x", "int").unwrap(), AccessFlags::PRIVATE)
            .with_annotations(vec![bad_edit]),
    )]);

    let (result, sink) = merge(&source, &patch);
    assert_eq!(sink.error_count(), 1);
    assert!(sink.entries()[0].message.contains("not valid on a field"));
    assert!(result.is_poisoned());
}

#[test]
fn wrap_directive_surrounds_source_body() {
    let source = tree(vec![class("com.A").with_method(
        MethodDef::new(method_key("f", "()void"), AccessFlags::PUBLIC).with_body(MethodBody::new(
            1,
            vec![Instruction::of("work"), Instruction::of("return")],
        )),
    )]);
    let wrap_body = MethodBody::new(
        2,
        vec![
            Instruction::of("enter"),
            Instruction::of("invoke-original"),
            Instruction::of("exit"),
            Instruction::of("return"),
        ],
    );
    let patch = tree(vec![class("com.A").with_method(
        MethodDef::new(method_key("f", "()void"), AccessFlags::PUBLIC)
            .with_body(wrap_body)
            .with_annotations(vec![tag("Wrap")]),
    )]);

    let (result, sink) = merge(&source, &patch);
    assert_eq!(sink.error_count(), 0);
    let class = result.tree.get(&class_key("com.A")).unwrap();
    let body = class
        .methods
        .get(&method_key("f", "()void"))
        .unwrap()
        .body
        .as_ref()
        .unwrap();
    let ops: Vec<_> = body.instructions.iter().map(|i| i.op.as_str()).collect();
    assert_eq!(ops, vec!["enter", "work", "exit", "return"]);
    assert_eq!(result.stats.spliced, 1);
}

#[test]
fn remove_and_ignore_semantics() {
    let source = tree(vec![
        class("com.A")
            .with_method(method_returning("gone", "()int", "1"))
            .with_method(method_returning("kept", "()int", "2")),
    ]);
    let patch = tree(vec![
        class("com.A")
            .with_method(
                MethodDef::new(method_key("gone", "()int"), AccessFlags::PUBLIC)
                    .with_annotations(vec![tag("Remove")]),
            )
            .with_method(
                method_returning("kept", "()int", "99").with_annotations(vec![tag("Ignore")]),
            ),
    ]);

    let (result, sink) = merge(&source, &patch);
    assert_eq!(sink.error_count(), 0);
    assert_eq!(sink.warning_count(), 0);
    let class = result.tree.get(&class_key("com.A")).unwrap();
    assert!(class.methods.get(&method_key("gone", "()int")).is_none());
    // Ignore passes the source method through unmodified.
    assert_eq!(returned_value(&result.tree, "com.A", "kept", "()int"), "2");
}

#[test]
fn untouched_source_classes_pass_through_shared() {
    let source = tree(vec![
        class("com.Touched").with_method(method_returning("f", "()int", "1")),
        class("com.Untouched"),
    ]);
    let patch = tree(vec![class("com.Touched").with_method(
        method_returning("f", "()int", "2").with_annotations(vec![tag("Replace")]),
    )]);

    let (result, _) = merge(&source, &patch);
    assert!(Arc::ptr_eq(
        source.get(&class_key("com.Untouched")).unwrap(),
        result.tree.get(&class_key("com.Untouched")).unwrap()
    ));
    assert!(!Arc::ptr_eq(
        source.get(&class_key("com.Touched")).unwrap(),
        result.tree.get(&class_key("com.Touched")).unwrap()
    ));
}

#[test]
fn left_fold_matches_merge_against_intermediate() {
    // patch1 adds class C; patch2 edits C. Folding patch1 then patch2 over S
    // must equal a single merge of patch2 against merge(S, patch1)'s output.
    let source = tree(vec![class("com.S")]);
    let patch1 = tree(vec![
        class("com.C").with_method(method_returning("f", "()int", "1")),
    ]);
    let patch2 = tree(vec![class("com.C").with_method(
        method_returning("f", "()int", "2").with_annotations(vec![tag("Replace")]),
    )]);

    let (after_first, sink1) = merge(&source, &patch1);
    assert!(!after_first.is_poisoned());
    assert_eq!(sink1.warning_count(), 0);

    // Hand-constructed intermediate equal to merge(S, patch1)'s output.
    let intermediate = tree(vec![
        class("com.S"),
        class("com.C").with_method(method_returning("f", "()int", "1")),
    ]);
    assert_eq!(after_first.tree, intermediate);

    let (folded, _) = merge(&after_first.tree, &patch2);
    let (direct, _) = merge(&intermediate, &patch2);
    assert_eq!(folded.tree, direct.tree);
    assert_eq!(returned_value(&folded.tree, "com.C", "f", "()int"), "2");
}

#[test]
fn version_reconciliation_is_a_no_op_for_matching_sets() {
    let source = tree(vec![class("com.A")]);
    let patch = tree(vec![]);
    let (result, sink) = merge(&source, &patch);
    assert_eq!(result.tree.opcodes, OpcodeSet::V035);
    assert!(sink.entries().is_empty());
}

#[test]
fn version_reconciliation_adopts_newer_patch_version() {
    let source = tree(vec![class("com.A")]);
    let patch = BytecodeTree::from_classes(OpcodeSet::V037, vec![]).unwrap();
    let (result, sink) = merge(&source, &patch);
    assert_eq!(result.tree.opcodes, OpcodeSet::V037);
    assert!(!result.is_poisoned());
    assert_eq!(sink.entries().len(), 1);
    assert!(sink.entries()[0].message.contains("format version"));
}

#[test]
fn output_keys_are_unique_and_ordered() {
    let source = tree(vec![class("z.Z"), class("a.A")]);
    let patch = tree(vec![class("m.M")]);
    let (result, _) = merge(&source, &patch);

    let keys: Vec<String> = result
        .tree
        .classes()
        .map(|c| c.key.as_str().to_owned())
        .collect();
    assert_eq!(keys, vec!["a.A", "m.M", "z.Z"]);
}

#[test]
fn directive_tags_never_survive_into_output() {
    let patch = tree(vec![
        class("com.New")
            .with_annotations(vec![
                tag("Add"),
                Annotation::new(class_key("java.lang.Deprecated")),
            ])
            .with_field(
                FieldDef::new(MemberKey::new("x", "int").unwrap(), AccessFlags::PRIVATE)
                    .with_annotations(vec![Annotation::new(class_key("com.Keep"))]),
            ),
    ]);
    let (result, sink) = merge(&tree(vec![]), &patch);
    assert_eq!(sink.error_count(), 0);

    let class = result.tree.get(&class_key("com.New")).unwrap();
    assert_eq!(class.annotations.len(), 1);
    assert_eq!(class.annotations[0].name, class_key("java.lang.Deprecated"));
    let field = class
        .fields
        .get(&MemberKey::new("x", "int").unwrap())
        .unwrap();
    assert_eq!(field.annotations.len(), 1);
}
