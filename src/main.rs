//! `cachebench` command line
//!
//! Exit status: 0 when at least one workload succeeded, 1 when none did,
//! 2 for configuration errors found before anything ran.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use cachebench::config::{resolve_runtime, RunConfig, DEFAULT_INVOCATIONS, DEFAULT_REPEATS};
use cachebench::orchestrator::{BatchOrchestrator, BatchReport, EXIT_CONFIG_ERROR};
use cachebench::phase::VariantKind;
use cachebench::process::SystemInvoker;
use cachebench::storage::TableFormat;
use cachebench::workload::{load_workloads, select_workloads};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliVariant {
    Baseline,
    Replay,
}

impl From<CliVariant> for VariantKind {
    fn from(v: CliVariant) -> Self {
        match v {
            CliVariant::Baseline => Self::Baseline,
            CliVariant::Replay => Self::Replay,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliFormat {
    Csv,
    Parquet,
}

impl From<CliFormat> for TableFormat {
    fn from(f: CliFormat) -> Self {
        match f {
            CliFormat::Csv => Self::Csv,
            CliFormat::Parquet => Self::Parquet,
        }
    }
}

/// Benchmark baseline vs AOT-cache replay latency across repeated runs.
#[derive(Debug, Parser)]
#[command(name = "cachebench", version, about)]
struct Cli {
    /// JSON file listing the workloads
    #[arg(long, value_name = "FILE")]
    workloads: PathBuf,

    /// Only run these workloads (default: all, in file order)
    #[arg(long, num_args = 1.., value_name = "NAME")]
    only: Vec<String>,

    /// Invocations per run
    #[arg(long, default_value_t = DEFAULT_INVOCATIONS)]
    invocations: u32,

    /// Invocations for the training run (default: --invocations)
    #[arg(long)]
    train_invocations: Option<u32>,

    /// Repeats per variant
    #[arg(long, default_value_t = DEFAULT_REPEATS)]
    repeats: u32,

    /// Output directory
    #[arg(long, default_value = "out")]
    outdir: PathBuf,

    /// Table format
    #[arg(long, value_enum, default_value_t = CliFormat::Csv)]
    format: CliFormat,

    /// Runtime executable (overrides CACHEBENCH_RUNTIME and the driver script)
    #[arg(long, value_name = "PATH")]
    runtime: Option<PathBuf>,

    /// Shell script whose `JAVA=` line names the runtime
    #[arg(long, value_name = "FILE")]
    driver_script: Option<PathBuf>,

    /// Extra runtime flag for every phase (repeatable)
    #[arg(long = "runtime-flag", value_name = "FLAG", allow_hyphen_values = true)]
    runtime_flags: Vec<String>,

    /// Variants to measure (default: baseline,replay)
    #[arg(long, value_enum, value_delimiter = ',')]
    variants: Vec<CliVariant>,

    /// Re-record training data and re-create caches even if present
    #[arg(long)]
    rebuild: bool,

    /// Disable class data sharing for the baseline
    #[arg(long)]
    strict_cold: bool,

    /// Replay training profiles only, without cached code
    #[arg(long)]
    profiles_only: bool,

    /// Render SVG charts of the averaged tables
    #[arg(long)]
    plot: bool,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .init();
}

fn build_config(cli: &Cli) -> anyhow::Result<RunConfig> {
    let runtime = resolve_runtime(cli.runtime.clone(), cli.driver_script.as_deref())
        .context("resolving runtime executable")?;

    let mut builder = RunConfig::builder(&cli.outdir)
        .runtime(runtime)
        .invocations(cli.invocations)
        .repeats(cli.repeats)
        .rebuild(cli.rebuild)
        .strict_cold(cli.strict_cold)
        .profiles_only(cli.profiles_only)
        .format(cli.format.into());
    for flag in &cli.runtime_flags {
        builder = builder.runtime_flag(flag);
    }
    if let Some(n) = cli.train_invocations {
        builder = builder.train_invocations(n);
    }
    if !cli.variants.is_empty() {
        builder = builder.variants(cli.variants.iter().copied().map(VariantKind::from));
    }
    builder.build().context("invalid run configuration")
}

fn run(cli: &Cli) -> anyhow::Result<BatchReport> {
    let config = build_config(cli)?;
    let workloads = load_workloads(&cli.workloads)
        .and_then(|all| select_workloads(all, &cli.only))
        .context("loading workloads")?;
    std::fs::create_dir_all(config.output_dir())
        .with_context(|| format!("creating {}", config.output_dir().display()))?;

    tracing::info!(
        runtime = %config.runtime().display(),
        workloads = workloads.len(),
        invocations = config.invocations(),
        repeats = config.repeats(),
        "starting batch"
    );
    let report = BatchOrchestrator::new(&config, SystemInvoker::new()).run_configured(&workloads);

    if cli.plot {
        plot(&report, &config);
    }
    Ok(report)
}

#[cfg(feature = "plot")]
fn plot(report: &BatchReport, config: &RunConfig) {
    if report.averaged.is_empty() {
        return;
    }
    if let Err(e) = cachebench::report::render_batch(&report.averaged, config.output_dir()) {
        tracing::warn!(error = %e, "chart rendering failed");
    }
}

#[cfg(not(feature = "plot"))]
fn plot(_report: &BatchReport, _config: &RunConfig) {
    tracing::warn!("built without the `plot` feature; skipping charts");
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(report) => {
            for failure in &report.failed {
                eprintln!("[cachebench] FAILED {}: {}", failure.workload, failure.error);
            }
            ExitCode::from(report.exit_code())
        }
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(EXIT_CONFIG_ERROR)
        }
    }
}
