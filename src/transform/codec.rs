//! String-literal encoding and decoding.
//!
//! Encoded literals are wrapped in the configured code marker:
//! `{marker}{payload}{marker}` (default marker `"$$"`). [`EncodePass`]
//! wraps literals found in an encode table (const-string operands,
//! annotation string values, field initial values); [`DecodePass`] strips
//! marked literals back to their payload, reporting malformed occurrences
//! (a marker present but not forming a well-formed wrapping) at error
//! severity, or warning when `treat_decode_errors_as_warnings` is set.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::diag::{DiagnosticsSink, FatalError, Severity};
use crate::model::tree::{Annotation, AnnotationValue, FieldDef, Instruction};
use crate::rewrite::{Action, Element, ElementRef, RewritePass};

use super::mapper::MapError;

// ---------------------------------------------------------------------------
// StringCodec
// ---------------------------------------------------------------------------

/// The marker-wrapping scheme for encoded string literals.
#[derive(Clone, Debug)]
pub struct StringCodec {
    marker: String,
}

impl StringCodec {
    /// Create a codec over a marker.
    #[must_use]
    pub fn new(marker: &str) -> Self {
        Self {
            marker: marker.to_owned(),
        }
    }

    /// Wrap a payload.
    #[must_use]
    pub fn encode(&self, payload: &str) -> String {
        format!("{m}{payload}{m}", m = self.marker)
    }

    /// Unwrap an encoded literal.
    ///
    /// `Ok(None)` means the string carries no marker and is not encoded.
    ///
    /// # Errors
    /// Returns a message for strings that contain the marker but are not a
    /// single well-formed wrapping.
    pub fn decode(&self, s: &str) -> Result<Option<String>, String> {
        if !s.contains(&self.marker) {
            return Ok(None);
        }
        let well_formed = s.len() >= 2 * self.marker.len()
            && s.starts_with(&self.marker)
            && s.ends_with(&self.marker);
        if well_formed {
            let payload = &s[self.marker.len()..s.len() - self.marker.len()];
            if !payload.contains(&self.marker) {
                return Ok(Some(payload.to_owned()));
            }
        }
        Err(format!("malformed encoded string literal '{s}'"))
    }
}

/// Load an encode table: one `literal payload` pair per line, `#` comments.
///
/// # Errors
/// Returns [`MapError`] on I/O failure, malformed lines or duplicate
/// literals.
pub fn load_encode_map(path: &Path) -> Result<BTreeMap<String, String>, MapError> {
    let text = std::fs::read_to_string(path).map_err(|err| MapError {
        path: Some(path.to_owned()),
        message: err.to_string(),
    })?;
    let mut table = BTreeMap::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next(), parts.next()) {
            (Some(literal), Some(payload), None) => {
                if table.insert(literal.to_owned(), payload.to_owned()).is_some() {
                    return Err(MapError {
                        path: Some(path.to_owned()),
                        message: format!("'{literal}' is mapped more than once"),
                    });
                }
            }
            _ => {
                return Err(MapError {
                    path: Some(path.to_owned()),
                    message: format!("line {}: expected 'literal payload'", number + 1),
                });
            }
        }
    }
    Ok(table)
}

// ---------------------------------------------------------------------------
// EncodePass
// ---------------------------------------------------------------------------

/// Wraps table-listed string literals in the code marker.
pub struct EncodePass<'a> {
    codec: StringCodec,
    table: &'a BTreeMap<String, String>,
}

impl<'a> EncodePass<'a> {
    /// Create a pass over an encode table.
    #[must_use]
    pub const fn new(codec: StringCodec, table: &'a BTreeMap<String, String>) -> Self {
        Self { codec, table }
    }

    fn encode_str(&self, s: &str) -> Option<String> {
        self.table.get(s).map(|payload| self.codec.encode(payload))
    }

    fn encode_value(&self, value: &AnnotationValue) -> Option<AnnotationValue> {
        match value {
            AnnotationValue::Str(s) => self.encode_str(s).map(AnnotationValue::Str),
            AnnotationValue::List(items) => {
                let mut changed = false;
                let encoded: Vec<AnnotationValue> = items
                    .iter()
                    .map(|item| {
                        self.encode_value(item).map_or_else(
                            || item.clone(),
                            |new| {
                                changed = true;
                                new
                            },
                        )
                    })
                    .collect();
                changed.then_some(AnnotationValue::List(encoded))
            }
            _ => None,
        }
    }

    fn encode_annotation(&self, annotation: &Annotation) -> Option<Annotation> {
        let mut changed = false;
        let values = annotation
            .values
            .iter()
            .map(|(key, value)| {
                let value = self.encode_value(value).map_or_else(
                    || value.clone(),
                    |new| {
                        changed = true;
                        new
                    },
                );
                (key.clone(), value)
            })
            .collect();
        changed.then_some(Annotation {
            name: annotation.name.clone(),
            values,
        })
    }
}

impl RewritePass for EncodePass<'_> {
    fn name(&self) -> &'static str {
        "encode"
    }

    fn rewrite(
        &self,
        element: ElementRef<'_>,
        _sink: &mut DiagnosticsSink,
    ) -> Result<Action, FatalError> {
        match element {
            ElementRef::Class(_) | ElementRef::Method(_) => Ok(Action::Descend),
            ElementRef::Field(field) => {
                let initial = field
                    .initial
                    .as_ref()
                    .and_then(|value| self.encode_value(value));
                let mut annotations_changed = false;
                let annotations: Vec<Annotation> = field
                    .annotations
                    .iter()
                    .map(|a| {
                        self.encode_annotation(a).map_or_else(
                            || a.clone(),
                            |new| {
                                annotations_changed = true;
                                new
                            },
                        )
                    })
                    .collect();
                if initial.is_none() && !annotations_changed {
                    return Ok(Action::Keep);
                }
                Ok(Action::Replace(Element::Field(Arc::new(FieldDef {
                    key: field.key.clone(),
                    access: field.access,
                    initial: initial.or_else(|| field.initial.clone()),
                    annotations,
                }))))
            }
            ElementRef::Annotation(annotation) => Ok(self
                .encode_annotation(annotation)
                .map_or(Action::Keep, |new| {
                    Action::Replace(Element::Annotation(new))
                })),
            ElementRef::Instruction(instruction) => {
                if instruction.op != "const-string" {
                    return Ok(Action::Keep);
                }
                let mut changed = false;
                let operands: Vec<String> = instruction
                    .operands
                    .iter()
                    .map(|operand| {
                        self.encode_str(operand).map_or_else(
                            || operand.clone(),
                            |new| {
                                changed = true;
                                new
                            },
                        )
                    })
                    .collect();
                if changed {
                    Ok(Action::Replace(Element::Instruction(Instruction {
                        op: instruction.op.clone(),
                        operands,
                    })))
                } else {
                    Ok(Action::Keep)
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// DecodePass
// ---------------------------------------------------------------------------

/// Strips marker-wrapped string literals back to their payloads.
pub struct DecodePass {
    codec: StringCodec,
    severity: Severity,
}

impl DecodePass {
    /// Create a pass. `errors_as_warnings` downgrades malformed-literal
    /// reports.
    #[must_use]
    pub const fn new(codec: StringCodec, errors_as_warnings: bool) -> Self {
        Self {
            codec,
            severity: if errors_as_warnings {
                Severity::Warning
            } else {
                Severity::Error
            },
        }
    }

    fn decode_str(&self, s: &str, sink: &mut DiagnosticsSink) -> Option<String> {
        match self.codec.decode(s) {
            Ok(decoded) => decoded,
            Err(message) => {
                sink.report(self.severity, None, message);
                None
            }
        }
    }

    fn decode_value(
        &self,
        value: &AnnotationValue,
        sink: &mut DiagnosticsSink,
    ) -> Option<AnnotationValue> {
        match value {
            AnnotationValue::Str(s) => self.decode_str(s, sink).map(AnnotationValue::Str),
            AnnotationValue::List(items) => {
                let mut changed = false;
                let decoded: Vec<AnnotationValue> = items
                    .iter()
                    .map(|item| {
                        self.decode_value(item, sink).map_or_else(
                            || item.clone(),
                            |new| {
                                changed = true;
                                new
                            },
                        )
                    })
                    .collect();
                changed.then_some(AnnotationValue::List(decoded))
            }
            _ => None,
        }
    }

    fn decode_annotation(
        &self,
        annotation: &Annotation,
        sink: &mut DiagnosticsSink,
    ) -> Option<Annotation> {
        let mut changed = false;
        let values = annotation
            .values
            .iter()
            .map(|(key, value)| {
                let value = self.decode_value(value, sink).map_or_else(
                    || value.clone(),
                    |new| {
                        changed = true;
                        new
                    },
                );
                (key.clone(), value)
            })
            .collect();
        changed.then_some(Annotation {
            name: annotation.name.clone(),
            values,
        })
    }
}

impl RewritePass for DecodePass {
    fn name(&self) -> &'static str {
        "decode"
    }

    fn rewrite(
        &self,
        element: ElementRef<'_>,
        sink: &mut DiagnosticsSink,
    ) -> Result<Action, FatalError> {
        match element {
            ElementRef::Class(_) | ElementRef::Method(_) => Ok(Action::Descend),
            ElementRef::Field(field) => {
                let initial = field
                    .initial
                    .as_ref()
                    .and_then(|value| self.decode_value(value, sink));
                let mut annotations_changed = false;
                let annotations: Vec<Annotation> = field
                    .annotations
                    .iter()
                    .map(|a| {
                        self.decode_annotation(a, sink).map_or_else(
                            || a.clone(),
                            |new| {
                                annotations_changed = true;
                                new
                            },
                        )
                    })
                    .collect();
                if initial.is_none() && !annotations_changed {
                    return Ok(Action::Keep);
                }
                Ok(Action::Replace(Element::Field(Arc::new(FieldDef {
                    key: field.key.clone(),
                    access: field.access,
                    initial: initial.or_else(|| field.initial.clone()),
                    annotations,
                }))))
            }
            ElementRef::Annotation(annotation) => Ok(self
                .decode_annotation(annotation, sink)
                .map_or(Action::Keep, |new| {
                    Action::Replace(Element::Annotation(new))
                })),
            ElementRef::Instruction(instruction) => {
                if instruction.op != "const-string" {
                    return Ok(Action::Keep);
                }
                let mut changed = false;
                let operands: Vec<String> = instruction
                    .operands
                    .iter()
                    .map(|operand| {
                        self.decode_str(operand, sink).map_or_else(
                            || operand.clone(),
                            |new| {
                                changed = true;
                                new
                            },
                        )
                    })
                    .collect();
                if changed {
                    Ok(Action::Replace(Element::Instruction(Instruction {
                        op: instruction.op.clone(),
                        operands,
                    })))
                } else {
                    Ok(Action::Keep)
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
