//! Generic copy-on-write tree rewriting.
//!
//! [`apply`] walks a [`BytecodeTree`] with an ordered list of
//! [`RewritePass`]es and produces a new tree that shares every unmodified
//! subtree with the input. Sharing is by [`Arc`] identity: a class whose
//! passes all return [`Action::Keep`] is reused, not copied, which is what
//! makes running several passes over multi-megabyte trees affordable.
//!
//! # Walk order
//!
//! Classes in key order; per class: annotations, then fields, then methods
//! (key order); per field: annotations; per method: annotations, then
//! instructions. Passes run in list order at each node. A `Replace` swaps
//! the current node and later passes in the same visit see the replacement.
//! Children are visited only when some pass returned [`Action::Descend`]
//! for the parent; on leaf nodes `Descend` is equivalent to `Keep`.
//!
//! # Failure semantics
//!
//! Passes report per-element errors and warnings through the injected
//! [`DiagnosticsSink`] without halting the walk (the result is poisoned but
//! every problem is surfaced in one run). Returning [`FatalError`] aborts
//! the entire walk immediately — reserved for trees too broken to continue
//! or a pass whose backing table failed to load.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::diag::{DiagnosticsSink, FatalError};
use crate::model::keys::{ClassKey, ElementKey, MemberKey};
use crate::model::tree::{Annotation, BytecodeTree, ClassDef, FieldDef, Instruction, MethodDef};

// ---------------------------------------------------------------------------
// Element / Action
// ---------------------------------------------------------------------------

/// An owned replacement node produced by a pass.
#[derive(Clone, Debug)]
pub enum Element {
    /// A whole class.
    Class(Arc<ClassDef>),
    /// A field.
    Field(Arc<FieldDef>),
    /// A method.
    Method(Arc<MethodDef>),
    /// An annotation.
    Annotation(Annotation),
    /// An instruction.
    Instruction(Instruction),
}

impl Element {
    /// The element kind, for diagnostics.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Class(_) => "class",
            Self::Field(_) => "field",
            Self::Method(_) => "method",
            Self::Annotation(_) => "annotation",
            Self::Instruction(_) => "instruction",
        }
    }
}

/// A borrowed view of the node a pass is visiting.
#[derive(Clone, Copy, Debug)]
pub enum ElementRef<'a> {
    /// A class node.
    Class(&'a ClassDef),
    /// A field node.
    Field(&'a FieldDef),
    /// A method node.
    Method(&'a MethodDef),
    /// An annotation node (leaf).
    Annotation(&'a Annotation),
    /// An instruction node (leaf).
    Instruction(&'a Instruction),
}

/// What a pass wants done with the visited node.
#[derive(Clone, Debug)]
pub enum Action {
    /// Share the node as-is; children are not visited on this node's
    /// account.
    Keep,
    /// Substitute a new node. The replacement must be the same element kind
    /// as the visited node; a mismatch is reported as an error and ignored.
    Replace(Element),
    /// Recurse into the node's children, then reassemble (only if a child
    /// actually changed).
    Descend,
}

// ---------------------------------------------------------------------------
// RewritePass
// ---------------------------------------------------------------------------

/// One independent rewriting pass.
///
/// Implementations must be side-effect-observable only through the injected
/// sink, never through shared mutable state, so that a dry run (discarding
/// the output) and a real run produce identical diagnostics.
pub trait RewritePass {
    /// Name used in diagnostics and stage logs.
    fn name(&self) -> &'static str;

    /// Visit one node.
    ///
    /// # Errors
    /// A [`FatalError`] aborts the entire walk with no partial result.
    fn rewrite(
        &self,
        element: ElementRef<'_>,
        sink: &mut DiagnosticsSink,
    ) -> Result<Action, FatalError>;
}

// ---------------------------------------------------------------------------
// apply
// ---------------------------------------------------------------------------

/// Apply an ordered list of passes to a tree.
///
/// Returns a new tree sharing every unmodified subtree with `tree`. With an
/// empty pass list the result shares every class.
///
/// # Errors
/// Propagates the first [`FatalError`] raised by a pass.
pub fn apply(
    tree: &BytecodeTree,
    passes: &[&dyn RewritePass],
    sink: &mut DiagnosticsSink,
) -> Result<BytecodeTree, FatalError> {
    let mut classes: BTreeMap<ClassKey, Arc<ClassDef>> = BTreeMap::new();
    for class in tree.classes() {
        let (class, _) = visit_class(class, passes, sink)?;
        let key = class.key.clone();
        if classes.insert(key.clone(), class).is_some() {
            sink.error(
                ElementKey::Class(key),
                "rewrite produced a class key that already exists in the tree".to_owned(),
            );
        }
    }
    Ok(BytecodeTree::from_class_map(tree.opcodes, classes))
}

/// Outcome of running the pass list on one node: the (possibly replaced)
/// node and whether any pass asked to descend.
struct NodeOutcome<T> {
    node: T,
    replaced: bool,
    descend: bool,
}

fn run_passes<T: Clone>(
    node: &T,
    passes: &[&dyn RewritePass],
    sink: &mut DiagnosticsSink,
    as_ref: impl Fn(&T) -> ElementRef<'_>,
    from_element: impl Fn(Element) -> Result<T, Element>,
    key: impl Fn(&T) -> ElementKey,
) -> Result<NodeOutcome<T>, FatalError> {
    let mut current = node.clone();
    let mut replaced = false;
    let mut descend = false;
    for pass in passes {
        match pass.rewrite(as_ref(&current), sink)? {
            Action::Keep => {}
            Action::Descend => descend = true,
            Action::Replace(element) => match from_element(element) {
                Ok(node) => {
                    current = node;
                    replaced = true;
                }
                Err(other) => sink.error(
                    key(&current),
                    format!(
                        "pass '{}' replaced a {} with a {} element",
                        pass.name(),
                        as_ref(&current).kind_name(),
                        other.kind_name()
                    ),
                ),
            },
        }
    }
    Ok(NodeOutcome {
        node: current,
        replaced,
        descend,
    })
}

impl ElementRef<'_> {
    const fn kind_name(self) -> &'static str {
        match self {
            Self::Class(_) => "class",
            Self::Field(_) => "field",
            Self::Method(_) => "method",
            Self::Annotation(_) => "annotation",
            Self::Instruction(_) => "instruction",
        }
    }
}

fn visit_class(
    class: &Arc<ClassDef>,
    passes: &[&dyn RewritePass],
    sink: &mut DiagnosticsSink,
) -> Result<(Arc<ClassDef>, bool), FatalError> {
    let outcome = run_passes(
        class,
        passes,
        sink,
        |c: &Arc<ClassDef>| ElementRef::Class(c),
        |element| match element {
            Element::Class(c) => Ok(c),
            other => Err(other),
        },
        |c| ElementKey::Class(c.key.clone()),
    )?;
    let current = outcome.node;
    if !outcome.descend {
        return Ok((current, outcome.replaced));
    }

    let owner = ElementKey::Class(current.key.clone());
    let (annotations, annotations_changed) =
        visit_annotations(&current.annotations, &owner, passes, sink)?;

    let mut fields: BTreeMap<MemberKey, Arc<FieldDef>> = BTreeMap::new();
    let mut fields_changed = false;
    for field in current.fields.values() {
        let (field, changed) = visit_field(field, &current.key, passes, sink)?;
        fields_changed |= changed;
        fields.insert(field.key.clone(), field);
    }

    let mut methods: BTreeMap<MemberKey, Arc<MethodDef>> = BTreeMap::new();
    let mut methods_changed = false;
    for method in current.methods.values() {
        let (method, changed) = visit_method(method, &current.key, passes, sink)?;
        methods_changed |= changed;
        methods.insert(method.key.clone(), method);
    }

    if !(annotations_changed || fields_changed || methods_changed) {
        return Ok((current, outcome.replaced));
    }
    let rebuilt = ClassDef {
        key: current.key.clone(),
        access: current.access,
        superclass: current.superclass.clone(),
        interfaces: current.interfaces.clone(),
        annotations,
        fields,
        methods,
    };
    Ok((Arc::new(rebuilt), true))
}

fn visit_field(
    field: &Arc<FieldDef>,
    class: &ClassKey,
    passes: &[&dyn RewritePass],
    sink: &mut DiagnosticsSink,
) -> Result<(Arc<FieldDef>, bool), FatalError> {
    let outcome = run_passes(
        field,
        passes,
        sink,
        |f: &Arc<FieldDef>| ElementRef::Field(f),
        |element| match element {
            Element::Field(f) => Ok(f),
            other => Err(other),
        },
        |f| ElementKey::Field {
            class: class.clone(),
            member: f.key.clone(),
        },
    )?;
    let current = outcome.node;
    if !outcome.descend {
        return Ok((current, outcome.replaced));
    }

    let owner = ElementKey::Field {
        class: class.clone(),
        member: current.key.clone(),
    };
    let (annotations, changed) = visit_annotations(&current.annotations, &owner, passes, sink)?;
    if !changed {
        return Ok((current, outcome.replaced));
    }
    let rebuilt = FieldDef {
        key: current.key.clone(),
        access: current.access,
        initial: current.initial.clone(),
        annotations,
    };
    Ok((Arc::new(rebuilt), true))
}

fn visit_method(
    method: &Arc<MethodDef>,
    class: &ClassKey,
    passes: &[&dyn RewritePass],
    sink: &mut DiagnosticsSink,
) -> Result<(Arc<MethodDef>, bool), FatalError> {
    let outcome = run_passes(
        method,
        passes,
        sink,
        |m: &Arc<MethodDef>| ElementRef::Method(m),
        |element| match element {
            Element::Method(m) => Ok(m),
            other => Err(other),
        },
        |m| ElementKey::Method {
            class: class.clone(),
            member: m.key.clone(),
        },
    )?;
    let current = outcome.node;
    if !outcome.descend {
        return Ok((current, outcome.replaced));
    }

    let owner = ElementKey::Method {
        class: class.clone(),
        member: current.key.clone(),
    };
    let (annotations, annotations_changed) =
        visit_annotations(&current.annotations, &owner, passes, sink)?;

    let mut body = current.body.clone();
    let mut body_changed = false;
    if let Some(existing) = &current.body {
        let mut instructions = Vec::with_capacity(existing.instructions.len());
        for instruction in &existing.instructions {
            let (instruction, changed) =
                visit_instruction(instruction, &owner, passes, sink)?;
            body_changed |= changed;
            instructions.push(instruction);
        }
        if body_changed {
            body = Some(crate::model::tree::MethodBody::new(
                existing.registers,
                instructions,
            ));
        }
    }

    if !(annotations_changed || body_changed) {
        return Ok((current, outcome.replaced));
    }
    let rebuilt = MethodDef {
        key: current.key.clone(),
        access: current.access,
        annotations,
        body,
    };
    Ok((Arc::new(rebuilt), true))
}

fn visit_annotations(
    annotations: &[Annotation],
    owner: &ElementKey,
    passes: &[&dyn RewritePass],
    sink: &mut DiagnosticsSink,
) -> Result<(Vec<Annotation>, bool), FatalError> {
    let mut out = Vec::with_capacity(annotations.len());
    let mut changed = false;
    for annotation in annotations {
        let outcome = run_passes(
            annotation,
            passes,
            sink,
            |a: &Annotation| ElementRef::Annotation(a),
            |element| match element {
                Element::Annotation(a) => Ok(a),
                other => Err(other),
            },
            |a| ElementKey::Annotation {
                owner: Box::new(owner.clone()),
                name: a.name.clone(),
            },
        )?;
        changed |= outcome.replaced;
        out.push(outcome.node);
    }
    Ok((out, changed))
}

fn visit_instruction(
    instruction: &Instruction,
    owner: &ElementKey,
    passes: &[&dyn RewritePass],
    sink: &mut DiagnosticsSink,
) -> Result<(Instruction, bool), FatalError> {
    let outcome = run_passes(
        instruction,
        passes,
        sink,
        |i: &Instruction| ElementRef::Instruction(i),
        |element| match element {
            Element::Instruction(i) => Ok(i),
            other => Err(other),
        },
        |_| owner.clone(),
    )?;
    Ok((outcome.node, outcome.replaced))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
