//! CLI entry point (§4.L, §6): resolves a reference bundle, loads it,
//! gathers the cluster/manifest resource set, runs the comparison
//! driver, and renders the chosen report format.

mod commands;
mod error;
mod exit_codes;
mod inventory;

use std::path::PathBuf;

use clap::Parser;
use commands::compare::{CompareArgs, OutputFormatArg};
use miette::Result;

/// Compares a live cluster (or a set of manifests) against a templated
/// reference configuration and reports any drift.
#[derive(Parser, Debug)]
#[command(name = "clustercompare")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Reference bundle: a local path, an http(s):// base URL, or
    /// `container://image:tag:/path/to/metadata.yaml`.
    #[arg(short = 'r', long)]
    reference: String,

    /// A manifest file, a directory, or `-` for stdin (repeatable).
    /// When omitted, resources are gathered from a live cluster.
    #[arg(short = 'f', long = "filename")]
    filename: Vec<String>,

    /// Read manifest directories recursively.
    #[arg(short = 'R', long)]
    recursive: bool,

    /// YAML file carrying `correlationSettings.manualCorrelation.correlationPairs`.
    #[arg(short = 'c', long = "diff-config")]
    diff_config: Option<PathBuf>,

    /// Output format. Defaults to a human-readable report.
    #[arg(short = 'o', long)]
    output: Option<OutputFormatArg>,

    /// Worker pool size for the comparison driver.
    #[arg(long, default_value_t = 4)]
    concurrency: usize,

    /// Compare every cluster resource kind discoverable, not just the
    /// kinds the reference's templates mention.
    #[arg(short = 'A', long = "all-resources")]
    all_resources: bool,

    /// Keep `metadata.managedFields` instead of stripping it before diffing.
    #[arg(long)]
    show_managed_fields: bool,

    /// YAML patch-bundle file of overrides to apply before diffing.
    #[arg(long)]
    overrides: Option<PathBuf>,

    /// Emit a skeleton override for this template path instead of
    /// running the comparison.
    #[arg(long)]
    generate_override_for: Option<String>,

    /// Reason recorded on a generated override.
    #[arg(long)]
    override_reason: Option<String>,

    /// Increase log verbosity (repeatable: -v, -vv, -vvv).
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

fn main() -> Result<()> {
    miette::set_panic_hook();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let runtime = tokio::runtime::Runtime::new().map_err(error::CliError::from)?;
    let exit_code = runtime.block_on(run(cli))?;
    std::process::exit(exit_code);
}

fn init_tracing(verbose: u8) {
    use tracing_subscriber::EnvFilter;
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

async fn run(cli: Cli) -> Result<i32, error::CliError> {
    let args = CompareArgs {
        reference: cli.reference,
        filenames: cli.filename,
        recursive: cli.recursive,
        diff_config: cli.diff_config,
        output: cli.output,
        concurrency: cli.concurrency,
        all_resources: cli.all_resources,
        show_managed_fields: cli.show_managed_fields,
        overrides: cli.overrides,
        generate_override_for: cli.generate_override_for,
        override_reason: cli.override_reason,
    };
    commands::compare::run(args).await
}
