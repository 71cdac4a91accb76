//! The directive-driven merge engine.
//!
//! [`MergeEngine::merge`] combines a source tree and a patch tree into one
//! output tree. Patch classes are processed in key order; for each, the
//! resolved directive decides whether it adds, replaces, edits, removes or
//! ignores its source counterpart, and the same resolution recurses over
//! fields, methods and annotations. Source classes without a patch
//! counterpart pass through shared, never copied.
//!
//! # Determinism
//!
//! The same (source, patch, config) inputs always produce the same output:
//! classes and members live in key-ordered maps, annotation merges are
//! keyed by name, and no step consults timestamps or iteration-order state.
//!
//! # Failure semantics
//!
//! Every non-fatal problem (name collision, missing counterpart, signature
//! mismatch, invalid directive) is reported through the sink against the
//! originating element and the merge continues, so one run surfaces every
//! error. On error the source side is retained unmodified. A result with
//! errors is poisoned: complete, inspectable, but not to be persisted.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::config::PatchConfig;
use crate::diag::{DiagnosticsSink, DiagnosticsSummary};
use crate::merge::directive::{
    DirectiveKind, DirectiveResolver, ElementKind, Qualifiers, StaticInitAction,
};
use crate::merge::splice::splice;
use crate::model::keys::{ClassKey, ElementKey, MemberKey};
use crate::model::tree::{
    Annotation, BytecodeTree, ClassDef, FieldDef, MethodDef,
};
use crate::model::version::OpcodeSet;

// ---------------------------------------------------------------------------
// MergeStats
// ---------------------------------------------------------------------------

/// Counts of directive actions applied during one merge, across classes and
/// members.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    /// Elements added.
    pub added: usize,
    /// Elements replaced.
    pub replaced: usize,
    /// Elements edited in place.
    pub edited: usize,
    /// Elements removed.
    pub removed: usize,
    /// Patch elements dropped by Ignore.
    pub ignored: usize,
    /// Method bodies spliced (append/prepend/wrap).
    pub spliced: usize,
}

impl MergeStats {
    /// Accumulate another stats record into this one.
    pub fn absorb(&mut self, other: Self) {
        self.added += other.added;
        self.replaced += other.replaced;
        self.edited += other.edited;
        self.removed += other.removed;
        self.ignored += other.ignored;
        self.spliced += other.spliced;
    }
}

// ---------------------------------------------------------------------------
// MergeResult
// ---------------------------------------------------------------------------

/// The output of one merge: the combined tree plus the diagnostics counts
/// attributable to it.
#[derive(Debug)]
pub struct MergeResult {
    /// The merged tree.
    pub tree: BytecodeTree,
    /// Errors and warnings reported during this merge.
    pub summary: DiagnosticsSummary,
    /// Directive actions applied.
    pub stats: MergeStats,
}

impl MergeResult {
    /// Returns `true` if this result contains errors and must not be
    /// persisted.
    #[must_use]
    pub const fn is_poisoned(&self) -> bool {
        !self.summary.is_clean()
    }
}

// ---------------------------------------------------------------------------
// MergeEngine
// ---------------------------------------------------------------------------

/// Merges a patch tree into a source tree under one configuration.
pub struct MergeEngine<'a> {
    config: &'a PatchConfig,
}

impl<'a> MergeEngine<'a> {
    /// Create an engine over the given configuration.
    #[must_use]
    pub const fn new(config: &'a PatchConfig) -> Self {
        Self { config }
    }

    /// Merge `patch` into `source`.
    ///
    /// The output format version is `pin` when given, otherwise the newer
    /// of the two inputs (or the source's, when `pin_source_version` is
    /// configured). A version change relative to the source is logged at
    /// info level.
    pub fn merge(
        &self,
        source: &BytecodeTree,
        patch: &BytecodeTree,
        pin: Option<OpcodeSet>,
        sink: &mut DiagnosticsSink,
    ) -> MergeResult {
        let snapshot = sink.summary();
        let mut stats = MergeStats::default();

        let opcodes = pin.unwrap_or_else(|| {
            if self.config.merge.pin_source_version {
                source.opcodes
            } else {
                OpcodeSet::newest(source.opcodes, patch.opcodes)
            }
        });
        if opcodes != source.opcodes {
            sink.info(
                None,
                format!(
                    "patch changes format version from '{}' to '{}'",
                    source.opcodes, opcodes
                ),
            );
        }

        let resolver = DirectiveResolver::new(&self.config.tags, &self.config.defaults);
        let mut out: BTreeMap<ClassKey, Arc<ClassDef>> = source.class_map().clone();

        for patch_class in patch.classes() {
            self.merge_one_class(&mut out, patch_class, &resolver, sink, &mut stats);
        }

        MergeResult {
            tree: BytecodeTree::from_class_map(opcodes, out),
            summary: sink.since(snapshot),
            stats,
        }
    }

    fn merge_one_class(
        &self,
        out: &mut BTreeMap<ClassKey, Arc<ClassDef>>,
        patch_class: &Arc<ClassDef>,
        resolver: &DirectiveResolver<'_>,
        sink: &mut DiagnosticsSink,
        stats: &mut MergeStats,
    ) {
        let elem = ElementKey::Class(patch_class.key.clone());

        let extracted = match resolver.extract(&patch_class.annotations) {
            Ok(extracted) => extracted,
            Err(err) => {
                sink.error(elem, err.to_string());
                return;
            }
        };

        // The counterpart may live under a different name (`target`).
        let counterpart_key = match extracted
            .as_ref()
            .and_then(|(_, quals)| quals.target.as_deref())
        {
            Some(target) => match ClassKey::new(target) {
                Ok(key) => key,
                Err(err) => {
                    sink.error(elem, format!("invalid target: {err}"));
                    return;
                }
            },
            None => patch_class.key.clone(),
        };

        let has_counterpart = out.contains_key(&counterpart_key);
        let resolved =
            match resolver.resolve(ElementKind::Class, extracted, has_counterpart, None, None) {
                Ok(resolved) => resolved,
                Err(err) => {
                    sink.error(elem, err.to_string());
                    return;
                }
            };

        match resolved.kind {
            DirectiveKind::Add => {
                if has_counterpart {
                    sink.error(
                        elem,
                        "added class already exists in source (name collision)".to_owned(),
                    );
                    return;
                }
                let added = self.build_class(None, patch_class, &resolved.quals, resolver, sink, stats);
                out.insert(added.key.clone(), added);
                stats.added += 1;
            }
            DirectiveKind::Replace => {
                if class_rename_collides(out, &counterpart_key, &patch_class.key, &elem, sink) {
                    return;
                }
                out.remove(&counterpart_key);
                out.insert(patch_class.key.clone(), strip_class(patch_class, resolver));
                stats.replaced += 1;
            }
            DirectiveKind::Edit => {
                let Some(source_class) = out.get(&counterpart_key).cloned() else {
                    sink.error(
                        elem,
                        format!("no source class '{counterpart_key}' to edit"),
                    );
                    return;
                };
                if class_rename_collides(out, &counterpart_key, &patch_class.key, &elem, sink) {
                    return;
                }
                let merged = self.build_class(
                    Some(&source_class),
                    patch_class,
                    &resolved.quals,
                    resolver,
                    sink,
                    stats,
                );
                out.remove(&counterpart_key);
                out.insert(merged.key.clone(), merged);
                stats.edited += 1;
            }
            DirectiveKind::Remove => {
                if out.remove(&counterpart_key).is_some() {
                    stats.removed += 1;
                } else {
                    self.missing_removal(elem, &counterpart_key.to_string(), sink);
                }
            }
            DirectiveKind::Ignore => {
                if !has_counterpart {
                    sink.warn(
                        elem,
                        "ignored class has no source counterpart (patch drift?)".to_owned(),
                    );
                }
                stats.ignored += 1;
            }
            DirectiveKind::Append | DirectiveKind::Prepend | DirectiveKind::Wrap => {
                sink.error(elem, format!("{} is only valid on methods", resolved.kind));
            }
        }
    }

    fn missing_removal(&self, elem: ElementKey, name: &str, sink: &mut DiagnosticsSink) {
        let message = format!("cannot remove '{name}': no source counterpart");
        if self.config.merge.strict {
            sink.error(elem, message);
        } else {
            sink.warn(elem, message);
        }
    }

    /// Build the output class for an Add (no source) or Edit (source
    /// present), recursing into members with the same directive resolution.
    fn build_class(
        &self,
        source: Option<&Arc<ClassDef>>,
        patch: &Arc<ClassDef>,
        quals: &Qualifiers,
        resolver: &DirectiveResolver<'_>,
        sink: &mut DiagnosticsSink,
        stats: &mut MergeStats,
    ) -> Arc<ClassDef> {
        let key = patch.key.clone();

        // Header: from source when editing, from patch when adding;
        // structural qualifiers override.
        let (access, superclass, mut interfaces) = match source {
            Some(src) => (
                quals.apply_access(src.access),
                quals.superclass.clone().or_else(|| src.superclass.clone()),
                src.interfaces.clone(),
            ),
            None => (
                patch.access,
                patch.superclass.clone(),
                patch.interfaces.clone(),
            ),
        };
        interfaces.extend(quals.add_interfaces.iter().cloned());
        interfaces.retain(|i| !quals.remove_interfaces.contains(i));
        interfaces.sort();
        interfaces.dedup();

        let empty_annotations: &[Annotation] = &[];
        let annotations = merge_annotations(
            &ElementKey::Class(key.clone()),
            source.map_or(empty_annotations, |src| &src.annotations),
            &patch.annotations,
            resolver,
            sink,
        );

        let empty_fields = BTreeMap::new();
        let fields = self.merge_fields(
            source.map_or(&empty_fields, |src| &src.fields),
            &patch.fields,
            &key,
            resolver,
            sink,
            stats,
        );

        let empty_methods = BTreeMap::new();
        let methods = self.merge_methods(
            source.map_or(&empty_methods, |src| &src.methods),
            &patch.methods,
            &key,
            quals.static_init,
            resolver,
            sink,
            stats,
        );

        Arc::new(ClassDef {
            key,
            access,
            superclass,
            interfaces,
            annotations,
            fields,
            methods,
        })
    }

    #[allow(clippy::too_many_lines)]
    fn merge_fields(
        &self,
        source: &BTreeMap<MemberKey, Arc<FieldDef>>,
        patch: &BTreeMap<MemberKey, Arc<FieldDef>>,
        class: &ClassKey,
        resolver: &DirectiveResolver<'_>,
        sink: &mut DiagnosticsSink,
        stats: &mut MergeStats,
    ) -> BTreeMap<MemberKey, Arc<FieldDef>> {
        let mut out = source.clone();
        for field in patch.values() {
            let elem = ElementKey::Field {
                class: class.clone(),
                member: field.key.clone(),
            };

            let extracted = match resolver.extract(&field.annotations) {
                Ok(extracted) => extracted,
                Err(err) => {
                    sink.error(elem, err.to_string());
                    continue;
                }
            };
            let counterpart_key = match member_counterpart_key(&field.key, extracted.as_ref()) {
                Ok(key) => key,
                Err(message) => {
                    sink.error(elem, message);
                    continue;
                }
            };
            let has_counterpart = out.contains_key(&counterpart_key);
            let resolved = match resolver.resolve(
                ElementKind::Field,
                extracted,
                has_counterpart,
                Some(&field.key),
                None,
            ) {
                Ok(resolved) => resolved,
                Err(err) => {
                    sink.error(elem, err.to_string());
                    continue;
                }
            };

            match resolved.kind {
                DirectiveKind::Add => {
                    if has_counterpart {
                        sink.error(
                            elem,
                            "added field already exists in source (name collision)".to_owned(),
                        );
                        continue;
                    }
                    out.insert(field.key.clone(), strip_field(field, resolver));
                    stats.added += 1;
                }
                DirectiveKind::Replace => {
                    if member_rename_collides(&out, &counterpart_key, &field.key, &elem, sink) {
                        continue;
                    }
                    out.remove(&counterpart_key);
                    out.insert(field.key.clone(), strip_field(field, resolver));
                    stats.replaced += 1;
                }
                DirectiveKind::Edit => {
                    let Some(src_field) = out.get(&counterpart_key).cloned() else {
                        sink.error(
                            elem,
                            format!("no source field '{counterpart_key}' to edit"),
                        );
                        continue;
                    };
                    if member_rename_collides(&out, &counterpart_key, &field.key, &elem, sink) {
                        continue;
                    }
                    let annotations = merge_annotations(
                        &elem,
                        &src_field.annotations,
                        &field.annotations,
                        resolver,
                        sink,
                    );
                    let merged = FieldDef {
                        key: field.key.clone(),
                        access: resolved.quals.apply_access(src_field.access),
                        initial: field.initial.clone().or_else(|| src_field.initial.clone()),
                        annotations,
                    };
                    out.remove(&counterpart_key);
                    out.insert(field.key.clone(), Arc::new(merged));
                    stats.edited += 1;
                }
                DirectiveKind::Remove => {
                    if out.remove(&counterpart_key).is_some() {
                        stats.removed += 1;
                    } else {
                        self.missing_removal(elem, &counterpart_key.to_string(), sink);
                    }
                }
                DirectiveKind::Ignore => {
                    if !has_counterpart {
                        sink.warn(
                            elem,
                            "ignored field has no source counterpart (patch drift?)".to_owned(),
                        );
                    }
                    stats.ignored += 1;
                }
                DirectiveKind::Append | DirectiveKind::Prepend | DirectiveKind::Wrap => {
                    sink.error(elem, format!("{} is only valid on methods", resolved.kind));
                }
            }
        }
        out
    }

    #[allow(clippy::too_many_lines, clippy::too_many_arguments)]
    fn merge_methods(
        &self,
        source: &BTreeMap<MemberKey, Arc<MethodDef>>,
        patch: &BTreeMap<MemberKey, Arc<MethodDef>>,
        class: &ClassKey,
        static_init_default: Option<StaticInitAction>,
        resolver: &DirectiveResolver<'_>,
        sink: &mut DiagnosticsSink,
        stats: &mut MergeStats,
    ) -> BTreeMap<MemberKey, Arc<MethodDef>> {
        let mut out = source.clone();
        for method in patch.values() {
            let elem = ElementKey::Method {
                class: class.clone(),
                member: method.key.clone(),
            };

            let extracted = match resolver.extract(&method.annotations) {
                Ok(extracted) => extracted,
                Err(err) => {
                    sink.error(elem, err.to_string());
                    continue;
                }
            };
            let counterpart_key = match member_counterpart_key(&method.key, extracted.as_ref()) {
                Ok(key) => key,
                Err(message) => {
                    sink.error(elem, message);
                    continue;
                }
            };
            let has_counterpart = out.contains_key(&counterpart_key);
            let resolved = match resolver.resolve(
                ElementKind::Method,
                extracted,
                has_counterpart,
                Some(&method.key),
                static_init_default,
            ) {
                Ok(resolved) => resolved,
                Err(err) => {
                    sink.error(elem, err.to_string());
                    continue;
                }
            };

            match resolved.kind {
                DirectiveKind::Add => {
                    if has_counterpart {
                        sink.error(
                            elem,
                            "added method already exists in source (name collision)".to_owned(),
                        );
                        continue;
                    }
                    out.insert(method.key.clone(), strip_method(method, resolver));
                    stats.added += 1;
                }
                DirectiveKind::Replace => {
                    if member_rename_collides(&out, &counterpart_key, &method.key, &elem, sink) {
                        continue;
                    }
                    out.remove(&counterpart_key);
                    out.insert(method.key.clone(), strip_method(method, resolver));
                    stats.replaced += 1;
                }
                DirectiveKind::Edit => {
                    let Some(src_method) = out.get(&counterpart_key).cloned() else {
                        sink.error(
                            elem,
                            format!("no source method '{counterpart_key}' to edit"),
                        );
                        continue;
                    };
                    if member_rename_collides(&out, &counterpart_key, &method.key, &elem, sink) {
                        continue;
                    }
                    let annotations = merge_annotations(
                        &elem,
                        &src_method.annotations,
                        &method.annotations,
                        resolver,
                        sink,
                    );
                    let merged = MethodDef {
                        key: method.key.clone(),
                        access: resolved.quals.apply_access(src_method.access),
                        annotations,
                        body: method.body.clone().or_else(|| src_method.body.clone()),
                    };
                    out.remove(&counterpart_key);
                    out.insert(method.key.clone(), Arc::new(merged));
                    stats.edited += 1;
                }
                DirectiveKind::Append | DirectiveKind::Prepend | DirectiveKind::Wrap => {
                    let Some(src_method) = out.get(&counterpart_key).cloned() else {
                        sink.error(
                            elem,
                            format!(
                                "cannot {} '{counterpart_key}': no source counterpart",
                                resolved.kind
                            ),
                        );
                        continue;
                    };
                    if src_method.access.visibility() != method.access.visibility()
                        || src_method.access.is_static() != method.access.is_static()
                    {
                        sink.error(
                            elem,
                            format!(
                                "signature mismatch on {}: source is '{}', patch is '{}'",
                                resolved.kind, src_method.access, method.access
                            ),
                        );
                        continue;
                    }
                    let (Some(src_body), Some(patch_body)) = (&src_method.body, &method.body)
                    else {
                        sink.error(
                            elem,
                            format!("cannot {} a method without a body", resolved.kind),
                        );
                        continue;
                    };
                    let body = match splice(resolved.kind, src_body, patch_body, &self.config.splice)
                    {
                        Ok(body) => body,
                        Err(err) => {
                            sink.error(elem, err.to_string());
                            continue;
                        }
                    };
                    let annotations = merge_annotations(
                        &elem,
                        &src_method.annotations,
                        &method.annotations,
                        resolver,
                        sink,
                    );
                    let merged = MethodDef {
                        key: method.key.clone(),
                        access: src_method.access,
                        annotations,
                        body: Some(body),
                    };
                    out.remove(&counterpart_key);
                    out.insert(method.key.clone(), Arc::new(merged));
                    stats.spliced += 1;
                }
                DirectiveKind::Remove => {
                    if out.remove(&counterpart_key).is_some() {
                        stats.removed += 1;
                    } else {
                        self.missing_removal(elem, &counterpart_key.to_string(), sink);
                    }
                }
                DirectiveKind::Ignore => {
                    if !has_counterpart {
                        sink.warn(
                            elem,
                            "ignored method has no source counterpart (patch drift?)".to_owned(),
                        );
                    }
                    stats.ignored += 1;
                }
            }
        }
        out
    }

}

// ---------------------------------------------------------------------------
// Member helpers
// ---------------------------------------------------------------------------

/// Returns `true` (and reports) when renaming `from` to `to` would
/// overwrite an unrelated class.
fn class_rename_collides(
    out: &BTreeMap<ClassKey, Arc<ClassDef>>,
    from: &ClassKey,
    to: &ClassKey,
    elem: &ElementKey,
    sink: &mut DiagnosticsSink,
) -> bool {
    if from != to && out.contains_key(to) {
        sink.error(
            elem.clone(),
            format!("renaming '{from}' collides with existing class '{to}'"),
        );
        return true;
    }
    false
}

/// A patch class taken verbatim: directive tags stripped, everything else
/// shared.
fn strip_class(patch: &Arc<ClassDef>, resolver: &DirectiveResolver<'_>) -> Arc<ClassDef> {
    let annotations = strip_annotation_list(&patch.annotations, resolver);
    let fields: BTreeMap<_, _> = patch
        .fields
        .iter()
        .map(|(k, f)| (k.clone(), strip_field(f, resolver)))
        .collect();
    let methods: BTreeMap<_, _> = patch
        .methods
        .iter()
        .map(|(k, m)| (k.clone(), strip_method(m, resolver)))
        .collect();
    Arc::new(ClassDef {
        key: patch.key.clone(),
        access: patch.access,
        superclass: patch.superclass.clone(),
        interfaces: patch.interfaces.clone(),
        annotations,
        fields,
        methods,
    })
}

/// The key the source counterpart lives under: the patch member's own key,
/// or the `target` name with the patch descriptor.
fn member_counterpart_key(
    key: &MemberKey,
    extracted: Option<&(DirectiveKind, Qualifiers)>,
) -> Result<MemberKey, String> {
    match extracted.and_then(|(_, quals)| quals.target.as_deref()) {
        Some(target) => key
            .renamed(target)
            .map_err(|err| format!("invalid target: {err}")),
        None => Ok(key.clone()),
    }
}

fn member_rename_collides<T>(
    out: &BTreeMap<MemberKey, T>,
    from: &MemberKey,
    to: &MemberKey,
    elem: &ElementKey,
    sink: &mut DiagnosticsSink,
) -> bool {
    if from != to && out.contains_key(to) {
        sink.error(
            elem.clone(),
            format!("renaming '{from}' collides with existing member '{to}'"),
        );
        return true;
    }
    false
}

/// Drop directive tags (and annotation action parameters) from an
/// annotation list. Unchanged lists are returned as cheap clones.
fn strip_annotation_list(
    annotations: &[Annotation],
    resolver: &DirectiveResolver<'_>,
) -> Vec<Annotation> {
    annotations
        .iter()
        .filter(|a| !resolver.is_tag(a))
        .map(|a| DirectiveResolver::strip_annotation_action(a))
        .collect()
}

fn strip_field(field: &Arc<FieldDef>, resolver: &DirectiveResolver<'_>) -> Arc<FieldDef> {
    let stripped = strip_annotation_list(&field.annotations, resolver);
    if stripped == field.annotations {
        return field.clone();
    }
    Arc::new(FieldDef {
        key: field.key.clone(),
        access: field.access,
        initial: field.initial.clone(),
        annotations: stripped,
    })
}

fn strip_method(method: &Arc<MethodDef>, resolver: &DirectiveResolver<'_>) -> Arc<MethodDef> {
    let stripped = strip_annotation_list(&method.annotations, resolver);
    if stripped == method.annotations {
        return method.clone();
    }
    Arc::new(MethodDef {
        key: method.key.clone(),
        access: method.access,
        annotations: stripped,
        body: method.body.clone(),
    })
}

/// Merge annotation lists by name. Untagged patch annotations win over
/// same-named source annotations; the reserved `action` parameter selects
/// Add/Replace/Remove/Ignore explicitly.
fn merge_annotations(
    owner: &ElementKey,
    source: &[Annotation],
    patch: &[Annotation],
    resolver: &DirectiveResolver<'_>,
    sink: &mut DiagnosticsSink,
) -> Vec<Annotation> {
    let mut out: BTreeMap<ClassKey, Annotation> = source
        .iter()
        .map(|a| (a.name.clone(), a.clone()))
        .collect();

    for annotation in patch {
        if resolver.is_tag(annotation) {
            continue;
        }
        let elem = ElementKey::Annotation {
            owner: Box::new(owner.clone()),
            name: annotation.name.clone(),
        };
        let action = match resolver.annotation_action(annotation) {
            Ok(action) => action,
            Err(err) => {
                sink.error(elem, err.to_string());
                continue;
            }
        };
        let stripped = DirectiveResolver::strip_annotation_action(annotation);
        let exists = out.contains_key(&annotation.name);
        match action {
            Some(DirectiveKind::Add) => {
                if exists {
                    sink.error(
                        elem,
                        "added annotation already exists on source element".to_owned(),
                    );
                } else {
                    out.insert(stripped.name.clone(), stripped);
                }
            }
            Some(DirectiveKind::Remove) => {
                if out.remove(&annotation.name).is_none() {
                    sink.warn(
                        elem,
                        "cannot remove annotation: no source counterpart".to_owned(),
                    );
                }
            }
            Some(DirectiveKind::Ignore) => {
                if !exists {
                    sink.warn(
                        elem,
                        "ignored annotation has no source counterpart (patch drift?)".to_owned(),
                    );
                }
            }
            // Explicit Replace and the untagged default: patch wins.
            Some(_) | None => {
                out.insert(stripped.name.clone(), stripped);
            }
        }
    }
    out.into_values().collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
