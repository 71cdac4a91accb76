//! Method body splicing for Append, Prepend and Wrap.
//!
//! Combines the source and patch instruction sequences per the
//! configuration-visible contract in [`SpliceConfig`]:
//!
//! - **Prepend**: patch body (trailing `return` stripped when
//!   `strip_patch_return`), then the source body.
//! - **Append**: source body with its trailing `return` stripped, then the
//!   patch body.
//! - **Wrap**: the patch body must contain exactly one marker instruction
//!   (`invoke_original_marker`); the merged body is the patch prefix, the
//!   source body with its trailing `return` stripped, then the patch
//!   suffix. This is how the original body becomes invocable from the
//!   wrapping body — an explicit marker, not an implicit convention.
//!
//! The register count of a spliced body is the maximum of the two inputs.

use std::fmt;

use crate::config::SpliceConfig;
use crate::merge::directive::DirectiveKind;
use crate::model::tree::{Instruction, MethodBody};

// ---------------------------------------------------------------------------
// SpliceError
// ---------------------------------------------------------------------------

/// A splice contract violation on one method.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpliceError {
    /// Wrap body contained zero or more than one marker instruction.
    MarkerCount {
        /// The configured marker mnemonic.
        marker: String,
        /// How many occurrences were found.
        found: usize,
    },
    /// The directive is not a splice directive.
    NotSplice {
        /// The offending directive.
        directive: DirectiveKind,
    },
}

impl fmt::Display for SpliceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MarkerCount { marker, found } => write!(
                f,
                "wrap body must contain exactly one '{marker}' instruction, found {found}"
            ),
            Self::NotSplice { directive } => {
                write!(f, "{directive} is not a splice directive")
            }
        }
    }
}

impl std::error::Error for SpliceError {}

// ---------------------------------------------------------------------------
// splice
// ---------------------------------------------------------------------------

/// Splice a source and patch body per the contract.
///
/// # Errors
/// Returns [`SpliceError`] for marker-count violations or a non-splice
/// directive.
pub fn splice(
    directive: DirectiveKind,
    source: &MethodBody,
    patch: &MethodBody,
    config: &SpliceConfig,
) -> Result<MethodBody, SpliceError> {
    let registers = source.registers.max(patch.registers);
    let instructions = match directive {
        DirectiveKind::Prepend => {
            let mut out = without_trailing_return(&patch.instructions, config);
            out.extend(source.instructions.iter().cloned());
            out
        }
        DirectiveKind::Append => {
            let mut out = strip_return(&source.instructions);
            out.extend(patch.instructions.iter().cloned());
            out
        }
        DirectiveKind::Wrap => {
            let (prefix, suffix) = split_at_marker(&patch.instructions, config)?;
            let mut out = prefix.to_vec();
            out.extend(strip_return(&source.instructions));
            out.extend(suffix.iter().cloned());
            out
        }
        other => return Err(SpliceError::NotSplice { directive: other }),
    };
    Ok(MethodBody::new(registers, instructions))
}

/// Drop a trailing `return*` instruction, if present.
fn strip_return(instructions: &[Instruction]) -> Vec<Instruction> {
    match instructions.split_last() {
        Some((last, rest)) if last.is_return() => rest.to_vec(),
        _ => instructions.to_vec(),
    }
}

fn without_trailing_return(
    instructions: &[Instruction],
    config: &SpliceConfig,
) -> Vec<Instruction> {
    if config.strip_patch_return {
        strip_return(instructions)
    } else {
        instructions.to_vec()
    }
}

/// Split a wrap body around its single marker instruction.
fn split_at_marker<'a>(
    instructions: &'a [Instruction],
    config: &SpliceConfig,
) -> Result<(&'a [Instruction], &'a [Instruction]), SpliceError> {
    let positions: Vec<usize> = instructions
        .iter()
        .enumerate()
        .filter(|(_, i)| i.op == config.invoke_original_marker)
        .map(|(idx, _)| idx)
        .collect();
    match positions.as_slice() {
        [at] => Ok((&instructions[..*at], &instructions[*at + 1..])),
        other => Err(SpliceError::MarkerCount {
            marker: config.invoke_original_marker.clone(),
            found: other.len(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
