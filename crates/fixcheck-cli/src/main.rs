//! fixcheck - verification harness CLI
//!
//! The `fixcheck` command runs a check pipeline against a target source tree
//! and exits 0 only when every check passed.
//!
//! ## Commands
//!
//! - `run` (default): execute the pipeline and print one line per check
//! - `plan`: show what `run` would check without executing anything

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use fixcheck_ci::{
    CheckPipeline, ConsoleReporter, FailurePolicy, HarnessConfig, JsonReporter, LocalExecutor,
    Manifest, DEFAULT_TARGET_DIR, DEFAULT_TIMEOUT_SECS,
};
use fixcheck_core::{init_tracing, StepKind, SuccessPolicy};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn, Level};

#[derive(Parser, Debug)]
#[command(name = "fixcheck")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Verify that a set of fixes is present and the project still builds", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run every check and report a single verdict
    Run(RunArgs),

    /// Print the checks that would run, without executing them
    Plan(SourceArgs),
}

/// Where the checks come from and what they look at.
#[derive(Args, Debug, Clone)]
struct SourceArgs {
    /// Directory the checks run in and resolve file paths against
    #[arg(long, env = "FIXCHECK_TARGET", default_value = DEFAULT_TARGET_DIR)]
    target: PathBuf,

    /// JSON manifest to run instead of the built-in session checks
    #[arg(long, env = "FIXCHECK_MANIFEST")]
    manifest: Option<PathBuf>,

    /// Per-command timeout in seconds (overrides the manifest)
    #[arg(long, env = "FIXCHECK_TIMEOUT_SECS", value_parser = clap::value_parser!(u64).range(1..))]
    timeout_secs: Option<u64>,
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Keep running after a failed check and report every failure
    #[arg(long)]
    keep_going: bool,

    /// Report format written to stdout
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    format: ReportFormat,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum ReportFormat {
    Text,
    Json,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    let result = match cli.command.unwrap_or(Commands::Run(cli.run)) {
        Commands::Run(args) => cmd_run(&args).await,
        Commands::Plan(source) => cmd_plan(&source),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!(error = %format!("{e:#}"), "fixcheck aborted");
            eprintln!("❌ {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Load the manifest named on the command line, or the built-in one.
fn load_manifest(path: Option<&Path>) -> Result<Manifest> {
    match path {
        Some(path) => Manifest::load(path)
            .with_context(|| format!("Failed to load manifest {}", path.display())),
        None => Ok(Manifest::session_fixes()),
    }
}

/// Command-line timeout wins over the manifest, which wins over the default.
fn harness_config(source: &SourceArgs, manifest: &Manifest) -> HarnessConfig {
    let timeout_secs = source
        .timeout_secs
        .or(manifest.timeout_secs)
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    HarnessConfig::new(&source.target).with_timeout_secs(timeout_secs)
}

/// Run the pipeline and map its verdict to the process exit code.
async fn cmd_run(args: &RunArgs) -> Result<ExitCode> {
    let manifest = load_manifest(args.source.manifest.as_deref())?;
    let policy = if args.keep_going {
        FailurePolicy::CollectAll
    } else {
        FailurePolicy::FailFast
    };
    let config = harness_config(&args.source, &manifest).with_failure_policy(policy);

    if !config.target_dir.is_dir() {
        warn!(target = %config.target_dir.display(), "Target directory does not exist");
    }
    info!(
        pipeline = %manifest.name,
        target = %config.target_dir.display(),
        timeout_secs = config.timeout.as_secs(),
        "Running checks"
    );

    let pipeline = CheckPipeline::from_manifest(manifest).with_failure_policy(policy);
    let executor = LocalExecutor::new(config);

    let result = match args.format {
        ReportFormat::Text => {
            pipeline
                .run(&executor, &mut ConsoleReporter::stdout())
                .await
        }
        ReportFormat::Json => pipeline.run(&executor, &mut JsonReporter::stdout()).await,
    }
    .context("Check pipeline aborted")?;

    Ok(ExitCode::from(result.exit_code() as u8))
}

fn cmd_plan(source: &SourceArgs) -> Result<ExitCode> {
    let manifest = load_manifest(source.manifest.as_deref())?;
    let config = harness_config(source, &manifest);
    print!("{}", render_plan(&manifest, &config));
    Ok(ExitCode::SUCCESS)
}

fn render_plan(manifest: &Manifest, config: &HarnessConfig) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Pipeline: {} ({} check(s))",
        manifest.name,
        manifest.steps.len()
    );
    let _ = writeln!(out, "Target:   {}", config.target_dir.display());
    let _ = writeln!(out, "Digest:   {}", manifest.digest());

    for (index, step) in manifest.steps.iter().enumerate() {
        let _ = writeln!(out);
        let _ = writeln!(out, "{}. {} [{}]", index + 1, step.name, step.kind.label());
        match &step.kind {
            StepKind::Command(cmd) => {
                let timeout = cmd
                    .timeout_secs
                    .unwrap_or_else(|| config.timeout.as_secs());
                let dir = cmd
                    .working_dir
                    .as_deref()
                    .map(|d| config.resolve(d))
                    .unwrap_or_else(|| config.target_dir.clone());
                let _ = writeln!(out, "   $ {}", cmd.command);
                let _ = writeln!(out, "   in {} (timeout {timeout}s)", dir.display());
                if let SuccessPolicy::NoErrorMarker { marker } = &cmd.success {
                    let _ = writeln!(
                        out,
                        "   non-zero exit tolerated unless stderr mentions \"{marker}\""
                    );
                }
            }
            StepKind::ContentPattern(p) => {
                let _ = writeln!(out, "   file: {}", config.resolve(&p.path).display());
                for pattern in &p.patterns {
                    match &pattern.guarantee {
                        Some(guarantee) => {
                            let _ = writeln!(out, "   - \"{}\": {guarantee}", pattern.text);
                        }
                        None => {
                            let _ = writeln!(out, "   - \"{}\"", pattern.text);
                        }
                    }
                }
            }
        }
    }

    if !manifest.summary.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Guarantees listed on success:");
        for item in &manifest.summary {
            let _ = writeln!(out, "- {item}");
        }
    }
    out
}
