//! Directive extraction and resolution.
//!
//! Patch elements carry directives as annotation tags: annotations whose
//! type name lives directly under the configured annotation package, with
//! the simple names `Add`, `Replace`, `Edit`, `Append`, `Prepend`, `Wrap`,
//! `Remove` and `Ignore`. Tag parameters qualify the directive (`target`,
//! `superclass`, `addInterfaces`, `removeInterfaces`, `setAccess`,
//! `clearAccess`, `staticInit`). The vocabulary is a stable external
//! contract; only the package is configurable.
//!
//! Resolution is total: every patch element receives exactly one resolved
//! action, either from an explicit tag or from the configured default
//! policy (Add without a counterpart, the implicit action with one, unless
//! an auto-ignore rule matches). Contradictory or mis-qualified directives
//! are resolution errors, never silent no-ops.

use std::fmt;

use crate::config::{DefaultsConfig, ImplicitAction, TagConfig};
use crate::model::keys::{ClassKey, MemberKey};
use crate::model::tree::{AccessFlags, Annotation, AnnotationValue};

// ---------------------------------------------------------------------------
// DirectiveKind
// ---------------------------------------------------------------------------

/// The action a directive requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DirectiveKind {
    /// Add a new element; a name collision with the source is an error.
    Add,
    /// Discard the source counterpart (if present) and use the patch
    /// element verbatim.
    Replace,
    /// Merge the patch element into its source counterpart in place.
    Edit,
    /// Splice the patch method body after the source body.
    Append,
    /// Splice the patch method body before the source body.
    Prepend,
    /// Splice the source body into the patch body at the marker point.
    Wrap,
    /// Omit the source counterpart from the output.
    Remove,
    /// Drop the patch element; the source counterpart passes through.
    Ignore,
}

impl DirectiveKind {
    const ALL: &'static [Self] = &[
        Self::Add,
        Self::Replace,
        Self::Edit,
        Self::Append,
        Self::Prepend,
        Self::Wrap,
        Self::Remove,
        Self::Ignore,
    ];

    /// The tag simple name for this directive.
    #[must_use]
    pub const fn tag_name(self) -> &'static str {
        match self {
            Self::Add => "Add",
            Self::Replace => "Replace",
            Self::Edit => "Edit",
            Self::Append => "Append",
            Self::Prepend => "Prepend",
            Self::Wrap => "Wrap",
            Self::Remove => "Remove",
            Self::Ignore => "Ignore",
        }
    }

    /// Look up a directive by tag simple name (case-sensitive).
    #[must_use]
    pub fn from_tag_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|d| d.tag_name() == name)
    }

    /// Returns `true` for the body-splicing directives.
    #[must_use]
    pub const fn is_splice(self) -> bool {
        matches!(self, Self::Append | Self::Prepend | Self::Wrap)
    }
}

impl fmt::Display for DirectiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag_name())
    }
}

// ---------------------------------------------------------------------------
// StaticInitAction
// ---------------------------------------------------------------------------

/// How an untagged `<clinit>` in the patch combines with the source's, as
/// requested by a class-level `staticInit` qualifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StaticInitAction {
    /// Append the patch initializer after the source's.
    Append,
    /// Prepend the patch initializer before the source's.
    Prepend,
    /// Replace the source initializer.
    Replace,
    /// Keep the source initializer, dropping the patch's.
    Ignore,
}

impl StaticInitAction {
    /// Parse from the `staticInit` parameter value.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "append" => Some(Self::Append),
            "prepend" => Some(Self::Prepend),
            "replace" => Some(Self::Replace),
            "ignore" => Some(Self::Ignore),
            _ => None,
        }
    }

    /// The directive this action maps to for the `<clinit>` member.
    #[must_use]
    pub const fn directive(self) -> DirectiveKind {
        match self {
            Self::Append => DirectiveKind::Append,
            Self::Prepend => DirectiveKind::Prepend,
            Self::Replace => DirectiveKind::Replace,
            Self::Ignore => DirectiveKind::Ignore,
        }
    }
}

// ---------------------------------------------------------------------------
// Qualifiers
// ---------------------------------------------------------------------------

/// Optional qualifiers attached to a directive tag.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Qualifiers {
    /// Name of the source counterpart when it differs from the patch
    /// element's own name (class simple target for members, dotted name for
    /// classes).
    pub target: Option<String>,
    /// New superclass (class-level Edit only).
    pub superclass: Option<ClassKey>,
    /// Interfaces to add (class-level Edit only).
    pub add_interfaces: Vec<ClassKey>,
    /// Interfaces to remove (class-level Edit only).
    pub remove_interfaces: Vec<ClassKey>,
    /// Access flags to set (Edit only).
    pub set_access: AccessFlags,
    /// Access flags to clear (Edit only).
    pub clear_access: AccessFlags,
    /// Default action for an untagged `<clinit>` (class-level Edit only).
    pub static_init: Option<StaticInitAction>,
}

impl Qualifiers {
    /// Returns `true` if any class-structure qualifier is present.
    #[must_use]
    pub fn has_class_structure(&self) -> bool {
        self.superclass.is_some()
            || !self.add_interfaces.is_empty()
            || !self.remove_interfaces.is_empty()
            || self.static_init.is_some()
    }

    /// Returns `true` if any access-flag qualifier is present.
    #[must_use]
    pub fn has_access(&self) -> bool {
        self.set_access != AccessFlags::empty() || self.clear_access != AccessFlags::empty()
    }

    /// Apply the access-flag qualifiers to a flag set.
    #[must_use]
    pub fn apply_access(&self, access: AccessFlags) -> AccessFlags {
        access.without(self.clear_access).union(self.set_access)
    }
}

// ---------------------------------------------------------------------------
// ResolvedDirective
// ---------------------------------------------------------------------------

/// The total outcome of directive resolution for one patch element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedDirective {
    /// The action to take.
    pub kind: DirectiveKind,
    /// Validated qualifiers (empty for implicit directives).
    pub quals: Qualifiers,
    /// Whether an explicit tag was present.
    pub explicit: bool,
}

// ---------------------------------------------------------------------------
// ElementKind
// ---------------------------------------------------------------------------

/// What kind of element a directive is attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElementKind {
    /// A class.
    Class,
    /// A field.
    Field,
    /// A method.
    Method,
    /// An annotation.
    Annotation,
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Class => write!(f, "class"),
            Self::Field => write!(f, "field"),
            Self::Method => write!(f, "method"),
            Self::Annotation => write!(f, "annotation"),
        }
    }
}

// ---------------------------------------------------------------------------
// DirectiveError
// ---------------------------------------------------------------------------

/// An invalid or contradictory directive on a single element.
///
/// Localized: the engine reports it against the element key and continues.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectiveError {
    /// Why resolution failed.
    pub reason: String,
}

impl DirectiveError {
    fn new(reason: String) -> Self {
        Self { reason }
    }
}

impl fmt::Display for DirectiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid directive: {}", self.reason)
    }
}

impl std::error::Error for DirectiveError {}

// ---------------------------------------------------------------------------
// DirectiveResolver
// ---------------------------------------------------------------------------

/// Reserved parameter carrying a directive on an annotation element (an
/// annotation cannot itself be annotated).
pub const ANNOTATION_ACTION_PARAM: &str = "action";

/// Extracts and validates directives from patch elements.
pub struct DirectiveResolver<'a> {
    tags: &'a TagConfig,
    defaults: &'a DefaultsConfig,
}

impl<'a> DirectiveResolver<'a> {
    /// Create a resolver over the given configuration.
    #[must_use]
    pub const fn new(tags: &'a TagConfig, defaults: &'a DefaultsConfig) -> Self {
        Self { tags, defaults }
    }

    /// Returns the directive a tag annotation names, or `None` for ordinary
    /// annotations.
    #[must_use]
    pub fn tag_kind(&self, annotation: &Annotation) -> Option<DirectiveKind> {
        self.key_tag_kind(&annotation.name)
    }

    fn key_tag_kind(&self, name: &ClassKey) -> Option<DirectiveKind> {
        if !name.in_package(&self.tags.annotation_package) {
            return None;
        }
        DirectiveKind::from_tag_name(name.simple_name())
    }

    /// Returns `true` if the annotation is a directive tag.
    #[must_use]
    pub fn is_tag(&self, annotation: &Annotation) -> bool {
        self.tag_kind(annotation).is_some()
    }

    /// Remove directive tags from an annotation list (output elements never
    /// carry the vocabulary).
    #[must_use]
    pub fn strip_tags(&self, annotations: &[Annotation]) -> Vec<Annotation> {
        annotations
            .iter()
            .filter(|a| !self.is_tag(a))
            .cloned()
            .collect()
    }

    /// Extract at most one directive tag (with parsed qualifiers) from an
    /// element's annotations.
    ///
    /// # Errors
    /// Duplicate tags and malformed parameters are resolution errors.
    pub fn extract(
        &self,
        annotations: &[Annotation],
    ) -> Result<Option<(DirectiveKind, Qualifiers)>, DirectiveError> {
        let mut found: Option<(DirectiveKind, Qualifiers)> = None;
        for annotation in annotations {
            let Some(kind) = self.tag_kind(annotation) else {
                continue;
            };
            if let Some((existing, _)) = &found {
                return Err(DirectiveError::new(format!(
                    "duplicate directive: both {existing} and {kind} are present"
                )));
            }
            let quals = parse_qualifiers(annotation)?;
            found = Some((kind, quals));
        }
        Ok(found)
    }

    /// Read the reserved `action` parameter of an annotation element.
    ///
    /// # Errors
    /// A non-tag value or a directive outside Add/Replace/Remove/Ignore is
    /// a resolution error.
    pub fn annotation_action(
        &self,
        annotation: &Annotation,
    ) -> Result<Option<DirectiveKind>, DirectiveError> {
        let Some(value) = annotation.get(ANNOTATION_ACTION_PARAM) else {
            return Ok(None);
        };
        let AnnotationValue::Type(name) = value else {
            return Err(DirectiveError::new(
                "annotation 'action' parameter must be a directive tag type".to_owned(),
            ));
        };
        let Some(kind) = self.key_tag_kind(name) else {
            return Err(DirectiveError::new(format!(
                "annotation 'action' parameter '{name}' is not a directive tag"
            )));
        };
        match kind {
            DirectiveKind::Add | DirectiveKind::Replace | DirectiveKind::Remove
            | DirectiveKind::Ignore => Ok(Some(kind)),
            other => Err(DirectiveError::new(format!(
                "{other} is not valid on an annotation"
            ))),
        }
    }

    /// Remove the reserved `action` parameter from an annotation.
    #[must_use]
    pub fn strip_annotation_action(annotation: &Annotation) -> Annotation {
        let mut stripped = annotation.clone();
        stripped.values.remove(ANNOTATION_ACTION_PARAM);
        stripped
    }

    /// Resolve the directive for one patch element.
    ///
    /// `member` is the element's member key for fields and methods (drives
    /// constructor/static-initializer auto-ignore); `static_init_default` is
    /// the owning class directive's `staticInit` qualifier, if any.
    ///
    /// # Errors
    /// Qualifier/action mismatches and kind/action mismatches are resolution
    /// errors.
    pub fn resolve(
        &self,
        kind: ElementKind,
        extracted: Option<(DirectiveKind, Qualifiers)>,
        has_counterpart: bool,
        member: Option<&MemberKey>,
        static_init_default: Option<StaticInitAction>,
    ) -> Result<ResolvedDirective, DirectiveError> {
        if let Some((directive, quals)) = extracted {
            validate(kind, directive, &quals)?;
            return Ok(ResolvedDirective {
                kind: directive,
                quals,
                explicit: true,
            });
        }

        let implicit = |kind: DirectiveKind| ResolvedDirective {
            kind,
            quals: Qualifiers::default(),
            explicit: false,
        };

        if let Some(member) = member
            && has_counterpart
        {
            if member.is_constructor() && self.defaults.auto_ignore_constructors {
                return Ok(implicit(DirectiveKind::Ignore));
            }
            if member.is_static_init() {
                if let Some(action) = static_init_default {
                    return Ok(implicit(action.directive()));
                }
                if self.defaults.auto_ignore_static_init {
                    return Ok(implicit(DirectiveKind::Ignore));
                }
            }
        }

        if has_counterpart {
            let action = match self.defaults.implicit_action {
                ImplicitAction::Edit => DirectiveKind::Edit,
                ImplicitAction::Replace => DirectiveKind::Replace,
            };
            Ok(implicit(action))
        } else {
            Ok(implicit(DirectiveKind::Add))
        }
    }
}

// ---------------------------------------------------------------------------
// Qualifier parsing
// ---------------------------------------------------------------------------

fn parse_qualifiers(annotation: &Annotation) -> Result<Qualifiers, DirectiveError> {
    let mut quals = Qualifiers::default();
    for (name, value) in &annotation.values {
        match name.as_str() {
            "target" => {
                quals.target = Some(expect_str(name, value)?.to_owned());
            }
            "superclass" => {
                quals.superclass = Some(expect_type(name, value)?);
            }
            "addInterfaces" => {
                quals.add_interfaces = expect_type_list(name, value)?;
            }
            "removeInterfaces" => {
                quals.remove_interfaces = expect_type_list(name, value)?;
            }
            "setAccess" => {
                quals.set_access = expect_flags(name, value)?;
            }
            "clearAccess" => {
                quals.clear_access = expect_flags(name, value)?;
            }
            "staticInit" => {
                let raw = expect_str(name, value)?;
                quals.static_init = Some(StaticInitAction::parse(raw).ok_or_else(|| {
                    DirectiveError::new(format!("unknown staticInit action '{raw}'"))
                })?);
            }
            other => {
                return Err(DirectiveError::new(format!(
                    "unknown directive parameter '{other}'"
                )));
            }
        }
    }
    Ok(quals)
}

fn expect_str<'v>(name: &str, value: &'v AnnotationValue) -> Result<&'v str, DirectiveError> {
    value
        .as_str()
        .ok_or_else(|| DirectiveError::new(format!("parameter '{name}' must be a string")))
}

fn expect_type(name: &str, value: &AnnotationValue) -> Result<ClassKey, DirectiveError> {
    match value {
        AnnotationValue::Type(key) => Ok(key.clone()),
        AnnotationValue::Str(s) => ClassKey::new(s)
            .map_err(|e| DirectiveError::new(format!("parameter '{name}': {e}"))),
        _ => Err(DirectiveError::new(format!(
            "parameter '{name}' must be a class name"
        ))),
    }
}

fn expect_type_list(name: &str, value: &AnnotationValue) -> Result<Vec<ClassKey>, DirectiveError> {
    let AnnotationValue::List(items) = value else {
        return Err(DirectiveError::new(format!(
            "parameter '{name}' must be a list of class names"
        )));
    };
    items.iter().map(|item| expect_type(name, item)).collect()
}

fn expect_flags(name: &str, value: &AnnotationValue) -> Result<AccessFlags, DirectiveError> {
    let AnnotationValue::List(items) = value else {
        return Err(DirectiveError::new(format!(
            "parameter '{name}' must be a list of flag names"
        )));
    };
    let mut flags = AccessFlags::empty();
    for item in items {
        let raw = expect_str(name, item)?;
        let flag = AccessFlags::by_name(raw).ok_or_else(|| {
            DirectiveError::new(format!("parameter '{name}': unknown access flag '{raw}'"))
        })?;
        flags = flags.union(flag);
    }
    Ok(flags)
}

// ---------------------------------------------------------------------------
// Qualifier/action validation
// ---------------------------------------------------------------------------

fn validate(
    kind: ElementKind,
    directive: DirectiveKind,
    quals: &Qualifiers,
) -> Result<(), DirectiveError> {
    if kind == ElementKind::Annotation {
        return Err(DirectiveError::new(
            "annotation directives are carried by the 'action' parameter, not tags".to_owned(),
        ));
    }

    if directive.is_splice() && kind != ElementKind::Method {
        return Err(DirectiveError::new(format!(
            "{directive} is only valid on methods, not on a {kind}"
        )));
    }

    let bare_only = |what: &str| -> Result<(), DirectiveError> {
        if quals.target.is_some() || quals.has_class_structure() || quals.has_access() {
            return Err(DirectiveError::new(format!(
                "{directive} takes {what}"
            )));
        }
        Ok(())
    };

    match directive {
        DirectiveKind::Add | DirectiveKind::Ignore => bare_only("no parameters")?,
        DirectiveKind::Replace | DirectiveKind::Remove => {
            if quals.has_class_structure() || quals.has_access() {
                return Err(DirectiveError::new(format!(
                    "{directive} takes no structural qualifiers"
                )));
            }
        }
        DirectiveKind::Append | DirectiveKind::Prepend | DirectiveKind::Wrap => {
            if quals.has_class_structure() || quals.has_access() {
                return Err(DirectiveError::new(format!(
                    "{directive} takes no structural qualifiers"
                )));
            }
        }
        DirectiveKind::Edit => {
            if quals.has_class_structure() && kind != ElementKind::Class {
                return Err(DirectiveError::new(format!(
                    "class-structure qualifiers are not valid on a {kind} Edit"
                )));
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn configs() -> (TagConfig, DefaultsConfig) {
        (TagConfig::default(), DefaultsConfig::default())
    }

    fn tag(name: &str) -> Annotation {
        Annotation::new(ClassKey::new(&format!("bytepatch.tag.{name}")).unwrap())
    }

    fn plain(name: &str) -> Annotation {
        Annotation::new(ClassKey::new(name).unwrap())
    }

    #[test]
    fn tag_recognition_respects_package() {
        let (tags, defaults) = configs();
        let resolver = DirectiveResolver::new(&tags, &defaults);

        assert_eq!(resolver.tag_kind(&tag("Edit")), Some(DirectiveKind::Edit));
        assert_eq!(resolver.tag_kind(&plain("other.pkg.Edit")), None);
        assert_eq!(resolver.tag_kind(&tag("NotADirective")), None);
        assert!(resolver.is_tag(&tag("Remove")));
        assert!(!resolver.is_tag(&plain("java.lang.Deprecated")));
    }

    #[test]
    fn strip_tags_keeps_ordinary_annotations() {
        let (tags, defaults) = configs();
        let resolver = DirectiveResolver::new(&tags, &defaults);
        let annotations = vec![tag("Edit"), plain("java.lang.Deprecated")];
        let stripped = resolver.strip_tags(&annotations);
        assert_eq!(stripped.len(), 1);
        assert_eq!(stripped[0].name.as_str(), "java.lang.Deprecated");
    }

    #[test]
    fn extract_single_tag_with_qualifiers() {
        let (tags, defaults) = configs();
        let resolver = DirectiveResolver::new(&tags, &defaults);
        let annotation = tag("Edit")
            .with_value("target", AnnotationValue::Str("old".to_owned()))
            .with_value(
                "superclass",
                AnnotationValue::Type(ClassKey::new("com.Base").unwrap()),
            )
            .with_value(
                "setAccess",
                AnnotationValue::List(vec![AnnotationValue::Str("final".to_owned())]),
            );
        let (kind, quals) = resolver.extract(&[annotation]).unwrap().unwrap();
        assert_eq!(kind, DirectiveKind::Edit);
        assert_eq!(quals.target.as_deref(), Some("old"));
        assert_eq!(quals.superclass, Some(ClassKey::new("com.Base").unwrap()));
        assert_eq!(quals.set_access, AccessFlags::FINAL);
    }

    #[test]
    fn extract_rejects_duplicate_tags() {
        let (tags, defaults) = configs();
        let resolver = DirectiveResolver::new(&tags, &defaults);
        let err = resolver.extract(&[tag("Edit"), tag("Remove")]).unwrap_err();
        assert!(err.reason.contains("duplicate directive"));
    }

    #[test]
    fn extract_rejects_unknown_parameter() {
        let (tags, defaults) = configs();
        let resolver = DirectiveResolver::new(&tags, &defaults);
        let annotation = tag("Edit").with_value("frobnicate", AnnotationValue::Bool(true));
        let err = resolver.extract(&[annotation]).unwrap_err();
        assert!(err.reason.contains("frobnicate"));
    }

    #[test]
    fn extract_rejects_bad_static_init_action() {
        let (tags, defaults) = configs();
        let resolver = DirectiveResolver::new(&tags, &defaults);
        let annotation =
            tag("Edit").with_value("staticInit", AnnotationValue::Str("merge".to_owned()));
        let err = resolver.extract(&[annotation]).unwrap_err();
        assert!(err.reason.contains("staticInit"));
    }

    #[test]
    fn extract_rejects_unknown_access_flag() {
        let (tags, defaults) = configs();
        let resolver = DirectiveResolver::new(&tags, &defaults);
        let annotation = tag("Edit").with_value(
            "clearAccess",
            AnnotationValue::List(vec![AnnotationValue::Str("sideways".to_owned())]),
        );
        let err = resolver.extract(&[annotation]).unwrap_err();
        assert!(err.reason.contains("sideways"));
    }

    #[test]
    fn implicit_add_without_counterpart() {
        let (tags, defaults) = configs();
        let resolver = DirectiveResolver::new(&tags, &defaults);
        let resolved = resolver
            .resolve(ElementKind::Class, None, false, None, None)
            .unwrap();
        assert_eq!(resolved.kind, DirectiveKind::Add);
        assert!(!resolved.explicit);
    }

    #[test]
    fn implicit_edit_with_counterpart() {
        let (tags, defaults) = configs();
        let resolver = DirectiveResolver::new(&tags, &defaults);
        let resolved = resolver
            .resolve(ElementKind::Class, None, true, None, None)
            .unwrap();
        assert_eq!(resolved.kind, DirectiveKind::Edit);
    }

    #[test]
    fn implicit_action_config_replace() {
        let tags = TagConfig::default();
        let defaults = DefaultsConfig {
            implicit_action: ImplicitAction::Replace,
            ..DefaultsConfig::default()
        };
        let resolver = DirectiveResolver::new(&tags, &defaults);
        let resolved = resolver
            .resolve(ElementKind::Method, None, true, None, None)
            .unwrap();
        assert_eq!(resolved.kind, DirectiveKind::Replace);
    }

    #[test]
    fn constructor_auto_ignore() {
        let (tags, defaults) = configs();
        let resolver = DirectiveResolver::new(&tags, &defaults);
        let ctor = MemberKey::new("<init>", "()void").unwrap();

        let with_counterpart = resolver
            .resolve(ElementKind::Method, None, true, Some(&ctor), None)
            .unwrap();
        assert_eq!(with_counterpart.kind, DirectiveKind::Ignore);

        // Without a counterpart the constructor is added normally.
        let without = resolver
            .resolve(ElementKind::Method, None, false, Some(&ctor), None)
            .unwrap();
        assert_eq!(without.kind, DirectiveKind::Add);
    }

    #[test]
    fn constructor_auto_ignore_disabled() {
        let tags = TagConfig::default();
        let defaults = DefaultsConfig {
            auto_ignore_constructors: false,
            ..DefaultsConfig::default()
        };
        let resolver = DirectiveResolver::new(&tags, &defaults);
        let ctor = MemberKey::new("<init>", "()void").unwrap();
        let resolved = resolver
            .resolve(ElementKind::Method, None, true, Some(&ctor), None)
            .unwrap();
        assert_eq!(resolved.kind, DirectiveKind::Edit);
    }

    #[test]
    fn static_init_follows_class_qualifier() {
        let (tags, defaults) = configs();
        let resolver = DirectiveResolver::new(&tags, &defaults);
        let clinit = MemberKey::new("<clinit>", "()void").unwrap();
        let resolved = resolver
            .resolve(
                ElementKind::Method,
                None,
                true,
                Some(&clinit),
                Some(StaticInitAction::Append),
            )
            .unwrap();
        assert_eq!(resolved.kind, DirectiveKind::Append);
    }

    #[test]
    fn static_init_auto_ignore_when_configured() {
        let tags = TagConfig::default();
        let defaults = DefaultsConfig {
            auto_ignore_static_init: true,
            ..DefaultsConfig::default()
        };
        let resolver = DirectiveResolver::new(&tags, &defaults);
        let clinit = MemberKey::new("<clinit>", "()void").unwrap();
        let resolved = resolver
            .resolve(ElementKind::Method, None, true, Some(&clinit), None)
            .unwrap();
        assert_eq!(resolved.kind, DirectiveKind::Ignore);
    }

    #[test]
    fn splice_on_non_method_is_rejected() {
        let (tags, defaults) = configs();
        let resolver = DirectiveResolver::new(&tags, &defaults);
        let extracted = resolver.extract(&[tag("Append")]).unwrap();
        let err = resolver
            .resolve(ElementKind::Field, extracted, true, None, None)
            .unwrap_err();
        assert!(err.reason.contains("only valid on methods"));
    }

    #[test]
    fn class_structure_qualifier_on_field_edit_is_rejected() {
        let (tags, defaults) = configs();
        let resolver = DirectiveResolver::new(&tags, &defaults);
        let annotation = tag("Edit").with_value(
            "superclass",
            AnnotationValue::Type(ClassKey::new("com.Base").unwrap()),
        );
        let extracted = resolver.extract(&[annotation]).unwrap();
        let err = resolver
            .resolve(ElementKind::Field, extracted, true, None, None)
            .unwrap_err();
        assert!(err.reason.contains("not valid on a field"));
    }

    #[test]
    fn remove_and_ignore_must_be_bare_of_structure() {
        let (tags, defaults) = configs();
        let resolver = DirectiveResolver::new(&tags, &defaults);

        let remove = tag("Remove").with_value(
            "setAccess",
            AnnotationValue::List(vec![AnnotationValue::Str("final".to_owned())]),
        );
        let extracted = resolver.extract(&[remove]).unwrap();
        assert!(
            resolver
                .resolve(ElementKind::Method, extracted, true, None, None)
                .is_err()
        );

        let ignore = tag("Ignore").with_value("target", AnnotationValue::Str("x".to_owned()));
        let extracted = resolver.extract(&[ignore]).unwrap();
        assert!(
            resolver
                .resolve(ElementKind::Field, extracted, true, None, None)
                .is_err()
        );
    }

    #[test]
    fn remove_with_target_is_allowed() {
        let (tags, defaults) = configs();
        let resolver = DirectiveResolver::new(&tags, &defaults);
        let remove = tag("Remove").with_value("target", AnnotationValue::Str("old".to_owned()));
        let extracted = resolver.extract(&[remove]).unwrap();
        let resolved = resolver
            .resolve(ElementKind::Method, extracted, true, None, None)
            .unwrap();
        assert_eq!(resolved.kind, DirectiveKind::Remove);
        assert_eq!(resolved.quals.target.as_deref(), Some("old"));
    }

    #[test]
    fn add_must_be_bare() {
        let (tags, defaults) = configs();
        let resolver = DirectiveResolver::new(&tags, &defaults);
        let add = tag("Add").with_value("target", AnnotationValue::Str("x".to_owned()));
        let extracted = resolver.extract(&[add]).unwrap();
        assert!(
            resolver
                .resolve(ElementKind::Class, extracted, false, None, None)
                .is_err()
        );
    }

    #[test]
    fn annotation_action_parameter() {
        let (tags, defaults) = configs();
        let resolver = DirectiveResolver::new(&tags, &defaults);

        let remove = plain("com.Marker").with_value(
            ANNOTATION_ACTION_PARAM,
            AnnotationValue::Type(ClassKey::new("bytepatch.tag.Remove").unwrap()),
        );
        assert_eq!(
            resolver.annotation_action(&remove).unwrap(),
            Some(DirectiveKind::Remove)
        );

        let stripped = DirectiveResolver::strip_annotation_action(&remove);
        assert!(stripped.get(ANNOTATION_ACTION_PARAM).is_none());

        let edit = plain("com.Marker").with_value(
            ANNOTATION_ACTION_PARAM,
            AnnotationValue::Type(ClassKey::new("bytepatch.tag.Edit").unwrap()),
        );
        assert!(resolver.annotation_action(&edit).is_err());

        let none = plain("com.Marker");
        assert_eq!(resolver.annotation_action(&none).unwrap(), None);
    }

    #[test]
    fn qualifiers_apply_access() {
        let quals = Qualifiers {
            set_access: AccessFlags::FINAL,
            clear_access: AccessFlags::PUBLIC,
            ..Qualifiers::default()
        };
        let access = AccessFlags::PUBLIC.union(AccessFlags::STATIC);
        let applied = quals.apply_access(access);
        assert!(applied.contains(AccessFlags::FINAL));
        assert!(applied.contains(AccessFlags::STATIC));
        assert!(!applied.contains(AccessFlags::PUBLIC));
    }
}
