use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use bytepatch::config::PatchConfig;
use bytepatch::container::{ContainerIo, JsonContainer};
use bytepatch::diag::{DiagnosticsSink, Severity};
use bytepatch::pipeline::{self, PipelineOptions};
use bytepatch::transform::mapper::write_template;

/// Directive-driven bytecode container patcher
///
/// bytepatch merges patch containers into a source container. Patch
/// elements carry directive tags (Add, Replace, Edit, Append, Prepend,
/// Wrap, Remove, Ignore) that decide how each class, field, method and
/// annotation combines with its source counterpart.
///
/// QUICK START:
///
///   bytepatch apply app.json fix.json --output patched.json
///
///   # Several patches fold left to right:
///   bytepatch apply app.json fix1.json fix2.json -o patched.json
///
///   # Inspect what would happen without writing:
///   bytepatch apply app.json fix.json --dry-run -v
///
/// Exit status is nonzero when any error was reported; a run with errors
/// never writes its output.
#[derive(Parser)]
#[command(name = "bytepatch")]
#[command(version, about)]
#[command(propagate_version = true)]
#[command(after_help = "See 'bytepatch <command> --help' for more information on a specific command.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge patch containers into a source container
    Apply(ApplyArgs),

    /// Write a rename-map template listing every class of a container
    Template {
        /// Input container.
        input: PathBuf,
        /// Template file to write.
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(Args)]
struct ApplyArgs {
    /// Source container
    source: PathBuf,

    /// Patch containers, applied in order
    patches: Vec<PathBuf>,

    /// Output container (omit for a dry run)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Configuration file
    #[arg(long, default_value = "bytepatch.toml", env = "BYTEPATCH_CONFIG")]
    config: PathBuf,

    /// Pin the instruction set to a platform API level
    #[arg(long)]
    api_level: Option<u32>,

    /// Process fully but write nothing
    #[arg(long)]
    dry_run: bool,

    /// Rename map file ('old new' per line, '#' comments)
    #[arg(long)]
    map: Option<PathBuf>,

    /// Apply the rename map to the source container
    #[arg(long, requires = "map")]
    map_source: bool,

    /// Apply the inverse rename map to the output container
    #[arg(long, requires = "map")]
    unmap_output: bool,

    /// Deanonymize the source container
    #[arg(long)]
    deanon_source: bool,

    /// Deanonymize each patch container
    #[arg(long)]
    deanon_patches: bool,

    /// Reanonymize the output container
    #[arg(long)]
    reanon_output: bool,

    /// Decode string literals in the source container
    #[arg(long)]
    decode_source: bool,

    /// Decode string literals in each patch container
    #[arg(long)]
    decode_patches: bool,

    /// Decode string literals in the output container
    #[arg(long)]
    decode_output: bool,

    /// Encode string literals in the source container
    #[arg(long, requires = "encode_map")]
    encode_source: bool,

    /// Encode table file ('literal payload' per line)
    #[arg(long)]
    encode_map: Option<PathBuf>,

    /// Write a rename-map template for the output
    #[arg(long)]
    template: Option<PathBuf>,

    /// Write a JSON patch report
    #[arg(long)]
    report: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    bytepatch::telemetry::init(cli.verbose);

    let outcome = match cli.command {
        Commands::Apply(args) => apply(args),
        Commands::Template { input, output } => template(&input, &output),
    };
    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn apply(args: ApplyArgs) -> Result<bool> {
    let config = PatchConfig::load(&args.config)?;
    let options = PipelineOptions {
        source: args.source,
        patches: args.patches,
        output: args.output,
        api_level: args.api_level,
        dry_run: args.dry_run,
        map_file: args.map,
        map_source: args.map_source,
        unmap_output: args.unmap_output,
        deanon_source: args.deanon_source,
        deanon_patches: args.deanon_patches,
        reanon_output: args.reanon_output,
        decode_source: args.decode_source,
        decode_patches: args.decode_patches,
        decode_output: args.decode_output,
        encode_source: args.encode_source,
        encode_map: args.encode_map,
        template_file: args.template,
        report_file: args.report,
    };

    let mut sink = DiagnosticsSink::new();
    let clean = pipeline::run(&options, &config, &mut sink)?;

    for diagnostic in sink.entries() {
        if diagnostic.severity >= Severity::Info {
            eprintln!("{diagnostic}");
        }
    }
    eprintln!("{}", sink.summary());
    Ok(clean)
}

fn template(input: &std::path::Path, output: &std::path::Path) -> Result<bool> {
    let tree = JsonContainer.read_tree(input, None)?;
    write_template(&tree, output)?;
    Ok(true)
}
