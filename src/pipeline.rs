//! The patching pipeline.
//!
//! Sequences the optional peer transforms around the merge engine for one
//! source container and any number of patch containers, folding left to
//! right:
//!
//! ```text
//! read source → map → deanonymize → encode → decode
//!   → for each patch: read → deanonymize → decode → merge
//! → decode → reanonymize → unmap → write (unless poisoned or dry run)
//! ```
//!
//! Setup failures (unloadable maps, bad options) abort before any tree is
//! read. Per-element problems accumulate in the sink; a poisoned result is
//! never written. Stage timings and class counts are logged at debug level.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use crate::config::PatchConfig;
use crate::container::{ContainerIo, JsonContainer};
use crate::diag::{DiagnosticsSink, Severity};
use crate::error::PatchError;
use crate::merge::engine::{MergeEngine, MergeStats};
use crate::merge::report::{self, PatchReport};
use crate::model::tree::BytecodeTree;
use crate::model::version::OpcodeSet;
use crate::rewrite::{self, RewritePass};
use crate::transform::anonymizer::{AnonymizerPass, TypeAnonymizer};
use crate::transform::codec::{self, DecodePass, EncodePass, StringCodec};
use crate::transform::mapper::{RenameMap, RenamePass, write_template};

// ---------------------------------------------------------------------------
// PipelineOptions
// ---------------------------------------------------------------------------

/// Per-invocation options (the CLI surface).
///
/// All transform stages default to off: a run with no flags is a pure
/// merge.
#[derive(Clone, Debug, Default)]
pub struct PipelineOptions {
    /// Source container.
    pub source: PathBuf,
    /// Patch containers, applied in order.
    pub patches: Vec<PathBuf>,
    /// Output container (omitting it makes the run a dry run).
    pub output: Option<PathBuf>,
    /// Pin the instruction set to a platform API level.
    pub api_level: Option<u32>,
    /// Process fully but write nothing.
    pub dry_run: bool,

    /// Rename map file (required by `map_source` / `unmap_output`).
    pub map_file: Option<PathBuf>,
    /// Apply the rename map to the source tree.
    pub map_source: bool,
    /// Apply the inverse rename map to the output tree.
    pub unmap_output: bool,

    /// Deanonymize the source tree.
    pub deanon_source: bool,
    /// Deanonymize each patch tree.
    pub deanon_patches: bool,
    /// Reanonymize the output tree.
    pub reanon_output: bool,

    /// Decode string literals in the source tree.
    pub decode_source: bool,
    /// Decode string literals in each patch tree.
    pub decode_patches: bool,
    /// Decode string literals in the output tree.
    pub decode_output: bool,
    /// Encode string literals in the source tree.
    pub encode_source: bool,
    /// Encode table file (required by `encode_source`).
    pub encode_map: Option<PathBuf>,

    /// Write a rename-map template for the output tree.
    pub template_file: Option<PathBuf>,
    /// Write a JSON patch report.
    pub report_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

/// Run the full pipeline.
///
/// Returns `Ok(true)` when no errors were logged (the output, if any, was
/// written), `Ok(false)` for a poisoned run.
///
/// # Errors
/// Returns [`PatchError`] for setup, container and fatal conditions.
pub fn run(
    options: &PipelineOptions,
    config: &PatchConfig,
    sink: &mut DiagnosticsSink,
) -> Result<bool, PatchError> {
    let started = Instant::now();

    let pin = match options.api_level {
        Some(level) => Some(OpcodeSet::for_api(level).map_err(|err| {
            PatchError::InvalidOption {
                option: "--api-level".to_owned(),
                reason: err.reason,
            }
        })?),
        None => None,
    };

    // Setup phase: lookup tables load before any tree is read, so a broken
    // table aborts early.
    let direct_map = load_rename_map(options, options.map_source)?;
    let inverse_map = match load_rename_map(options, options.unmap_output)? {
        Some(map) => Some(map.inverted().map_err(PatchError::from)?),
        None => None,
    };
    let encode_table = load_encode_table(options)?;

    let io = JsonContainer;
    let tags = config.tags.annotation_package.as_str();
    let codec = StringCodec::new(&config.transform.code_marker);

    let mut tree = read_timed(&io, &options.source, pin)?;

    if let Some(map) = &direct_map {
        let pass = RenamePass::new(map, tags);
        tree = stage(&tree, &pass, "map source", sink)?;
    }
    if options.deanon_source {
        let pass = deanonymizer(config);
        tree = stage(&tree, &pass, "deanonymize source", sink)?;
    }
    if let Some(table) = &encode_table {
        let pass = EncodePass::new(codec.clone(), table);
        tree = stage(&tree, &pass, "encode source", sink)?;
    }
    if options.decode_source {
        let pass = decoder(config);
        tree = stage(&tree, &pass, "decode source", sink)?;
    }

    let engine = MergeEngine::new(config);
    let mut stats = MergeStats::default();
    for patch_path in &options.patches {
        let mut patch = read_timed(&io, patch_path, pin)?;
        if options.deanon_patches {
            let pass = deanonymizer(config);
            patch = stage(&patch, &pass, "deanonymize patch", sink)?;
        }
        if options.decode_patches {
            let pass = decoder(config);
            patch = stage(&patch, &pass, "decode patch", sink)?;
        }

        let merge_started = Instant::now();
        let result = engine.merge(&tree, &patch, pin, sink);
        tracing::debug!(
            patch = %patch_path.display(),
            classes = result.tree.len(),
            elapsed_ms = millis(merge_started),
            "merged patch"
        );
        stats.absorb(result.stats);
        tree = result.tree;
    }

    if options.decode_output {
        let pass = decoder(config);
        tree = stage(&tree, &pass, "decode output", sink)?;
    }
    if options.reanon_output {
        let pass = reanonymizer(config);
        tree = stage(&tree, &pass, "reanonymize output", sink)?;
    }
    if let Some(map) = &inverse_map {
        let pass = RenamePass::new(map, tags);
        tree = stage(&tree, &pass, "unmap output", sink)?;
    }

    let clean = !sink.has_errors();
    if clean {
        if options.dry_run {
            sink.info(None, "dry run due to '--dry-run' option".to_owned());
        } else if options.output.is_none() && options.template_file.is_none() {
            sink.report(
                Severity::Warning,
                None,
                "dry run due to missing '--output' and '--template' options".to_owned(),
            );
        } else {
            if let Some(output) = &options.output {
                let write_started = Instant::now();
                io.write_tree(&tree, output)?;
                tracing::debug!(
                    output = %output.display(),
                    classes = tree.len(),
                    elapsed_ms = millis(write_started),
                    "wrote output"
                );
            }
            if let Some(template) = &options.template_file {
                write_template(&tree, template)?;
            }
        }
    }

    if let Some(report_path) = &options.report_file {
        let patches: Vec<String> = options
            .patches
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        let report = PatchReport::build(
            &options.source.display().to_string(),
            &patches,
            &tree.opcodes.to_string(),
            tree.len(),
            stats,
            sink,
        );
        report::write_report(&report, report_path)?;
    }

    tracing::info!(
        errors = sink.error_count(),
        warnings = sink.warning_count(),
        classes = tree.len(),
        elapsed_ms = millis(started),
        "pipeline finished"
    );
    Ok(!sink.has_errors())
}

// ---------------------------------------------------------------------------
// Stage helpers
// ---------------------------------------------------------------------------

fn load_rename_map(
    options: &PipelineOptions,
    wanted: bool,
) -> Result<Option<RenameMap>, PatchError> {
    if !wanted {
        return Ok(None);
    }
    let Some(path) = &options.map_file else {
        return Err(PatchError::MapFile {
            path: None,
            detail: "'--map-source' and '--unmap-output' require '--map <file>'".to_owned(),
        });
    };
    Ok(Some(RenameMap::load(path)?))
}

fn load_encode_table(
    options: &PipelineOptions,
) -> Result<Option<BTreeMap<String, String>>, PatchError> {
    if !options.encode_source {
        return Ok(None);
    }
    let Some(path) = &options.encode_map else {
        return Err(PatchError::MapFile {
            path: None,
            detail: "'--encode-source' requires '--encode-map <file>'".to_owned(),
        });
    };
    Ok(Some(codec::load_encode_map(path)?))
}

fn deanonymizer(config: &PatchConfig) -> AnonymizerPass<'_> {
    AnonymizerPass::new(
        TypeAnonymizer::new(&config.transform.anonymize_marker, false),
        &config.tags.annotation_package,
        config.transform.treat_reanonymize_errors_as_warnings,
    )
}

fn reanonymizer(config: &PatchConfig) -> AnonymizerPass<'_> {
    AnonymizerPass::new(
        TypeAnonymizer::new(&config.transform.anonymize_marker, true),
        &config.tags.annotation_package,
        config.transform.treat_reanonymize_errors_as_warnings,
    )
}

fn decoder(config: &PatchConfig) -> DecodePass {
    DecodePass::new(
        StringCodec::new(&config.transform.code_marker),
        config.transform.treat_decode_errors_as_warnings,
    )
}

fn millis(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn read_timed(
    io: &JsonContainer,
    path: &std::path::Path,
    pin: Option<OpcodeSet>,
) -> Result<BytecodeTree, PatchError> {
    let started = Instant::now();
    let tree = io.read_tree(path, pin)?;
    tracing::debug!(
        container = %path.display(),
        classes = tree.len(),
        version = %tree.opcodes,
        elapsed_ms = millis(started),
        "read container"
    );
    Ok(tree)
}

fn stage(
    tree: &BytecodeTree,
    pass: &dyn RewritePass,
    label: &'static str,
    sink: &mut DiagnosticsSink,
) -> Result<BytecodeTree, PatchError> {
    let started = Instant::now();
    let out = rewrite::apply(tree, &[pass], sink)?;
    tracing::debug!(
        stage = label,
        classes = out.len(),
        elapsed_ms = millis(started),
        "transform stage"
    );
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
