//! Shared helpers for integration tests.
//!
//! Small builders for trees, classes and directive tags so scenario tests
//! read close to their prose descriptions.

// Each integration test binary uses its own subset of these helpers.
#![allow(dead_code)]

use bytepatch::config::PatchConfig;
use bytepatch::diag::DiagnosticsSink;
use bytepatch::merge::engine::{MergeEngine, MergeResult};
use bytepatch::model::keys::{ClassKey, MemberKey};
use bytepatch::model::tree::{
    AccessFlags, Annotation, BytecodeTree, ClassDef, Instruction, MethodBody, MethodDef,
};
use bytepatch::model::version::OpcodeSet;

pub fn class_key(name: &str) -> ClassKey {
    ClassKey::new(name).expect("valid class key")
}

pub fn method_key(name: &str, descriptor: &str) -> MemberKey {
    MemberKey::new(name, descriptor).expect("valid member key")
}

/// A directive tag annotation under the default vocabulary package.
pub fn tag(name: &str) -> Annotation {
    Annotation::new(class_key(&format!("bytepatch.tag.{name}")))
}

pub fn class(name: &str) -> ClassDef {
    ClassDef::new(class_key(name), AccessFlags::PUBLIC)
}

/// A public method whose body loads a constant and returns it.
pub fn method_returning(name: &str, descriptor: &str, value: &str) -> MethodDef {
    MethodDef::new(method_key(name, descriptor), AccessFlags::PUBLIC).with_body(MethodBody::new(
        1,
        vec![
            Instruction::with_operands("const", &["v0", value]),
            Instruction::with_operands("return", &["v0"]),
        ],
    ))
}

/// The constant returned by a method built with [`method_returning`].
pub fn returned_value(tree: &BytecodeTree, class: &str, name: &str, descriptor: &str) -> String {
    let class = tree.get(&class_key(class)).expect("class present");
    let method = class
        .methods
        .get(&method_key(name, descriptor))
        .expect("method present");
    method.body.as_ref().expect("body present").instructions[0].operands[1].clone()
}

pub fn tree(classes: Vec<ClassDef>) -> BytecodeTree {
    BytecodeTree::from_classes(OpcodeSet::V035, classes).expect("unique class keys")
}

/// Merge with the default configuration, returning the result and the sink.
pub fn merge(source: &BytecodeTree, patch: &BytecodeTree) -> (MergeResult, DiagnosticsSink) {
    let config = PatchConfig::default();
    let engine = MergeEngine::new(&config);
    let mut sink = DiagnosticsSink::new();
    let result = engine.merge(source, patch, None, &mut sink);
    (result, sink)
}
