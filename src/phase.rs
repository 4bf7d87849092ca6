//! Phases and the phase runner
//!
//! A phase is one way of launching a workload. [`PhaseSpec`] enumerates the
//! four kinds, each with its own typed arguments, and
//! [`PhaseSpec::command_args`] is the only place that turns a phase into
//! runtime flags. [`PhaseRunner`] executes a phase and extracts its series.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::RunConfig;
use crate::process::{CommandSpec, ProcessInvoker};
use crate::series::{extract_column, extract_series};
use crate::storage::{remove_best_effort, staging_path};
use crate::workload::{OutputConvention, Workload};
use crate::{Error, Result};

/// Flags that restrict a replay to training profiles only.
///
/// The last three are diagnostic options and need the unlock flag first.
pub const PROFILES_ONLY_FLAGS: [&str; 4] = [
    "-XX:+UnlockDiagnosticVMOptions",
    "-XX:+AOTReplayTraining",
    "-XX:-AOTAdapterCaching",
    "-XX:-AOTStubCaching",
];

/// A measured comparison arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantKind {
    /// Plain run without a cache
    Baseline,
    /// Run replaying the trained cache
    Replay,
}

impl VariantKind {
    /// Label used in tables and logs.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::Replay => "replay",
        }
    }
}

impl fmt::Display for VariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One way of invoking a workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseSpec {
    /// Training run recording an AOT configuration
    Record {
        /// Configuration file to write
        configuration: PathBuf,
        /// Invocations during training
        invocations: u32,
    },
    /// Assembles the cache from a recorded configuration
    Create {
        /// Configuration file to read
        configuration: PathBuf,
        /// Cache file to write
        cache: PathBuf,
    },
    /// Measured run without any cache
    Baseline {
        /// Invocations per run
        invocations: u32,
        /// Disable class data sharing
        strict_cold: bool,
    },
    /// Measured run using the cache
    Replay {
        /// Cache file to read
        cache: PathBuf,
        /// Invocations per run
        invocations: u32,
        /// Use training profiles only, no cached code
        profiles_only: bool,
    },
}

impl PhaseSpec {
    /// Phase name used in logs, errors and output file names.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Record { .. } => "train-record",
            Self::Create { .. } => "train-create",
            Self::Baseline { .. } => "baseline",
            Self::Replay { .. } => "replay",
        }
    }

    /// The comparison arm this phase measures, if any.
    #[must_use]
    pub const fn variant(&self) -> Option<VariantKind> {
        match self {
            Self::Baseline { .. } => Some(VariantKind::Baseline),
            Self::Replay { .. } => Some(VariantKind::Replay),
            Self::Record { .. } | Self::Create { .. } => None,
        }
    }

    /// Whether an empty series from this phase is a failure.
    #[must_use]
    pub const fn requires_output(&self) -> bool {
        self.variant().is_some()
    }

    /// Invocation count, when the phase runs the workload's entry point.
    #[must_use]
    pub const fn invocations(&self) -> Option<u32> {
        match self {
            Self::Record { invocations, .. }
            | Self::Baseline { invocations, .. }
            | Self::Replay { invocations, .. } => Some(*invocations),
            Self::Create { .. } => None,
        }
    }

    /// Build the argument list (everything after the runtime executable).
    ///
    /// `output` is substituted for the `{output}` placeholder.
    #[must_use]
    pub fn command_args(&self, config: &RunConfig, workload: &Workload, output: &Path) -> Vec<String> {
        let mut args: Vec<String> = config.runtime_flags().to_vec();

        match self {
            Self::Record { configuration, .. } => {
                args.push("-XX:AOTMode=record".to_string());
                args.push(format!("-XX:AOTConfiguration={}", configuration.display()));
            }
            Self::Create { configuration, cache } => {
                args.push("-XX:AOTMode=create".to_string());
                args.push(format!("-XX:AOTConfiguration={}", configuration.display()));
                args.push(format!("-XX:AOTCache={}", cache.display()));
            }
            Self::Baseline { strict_cold, .. } => {
                if *strict_cold {
                    args.push("-Xshare:off".to_string());
                }
            }
            Self::Replay { cache, profiles_only, .. } => {
                args.push(format!("-XX:AOTCache={}", cache.display()));
                if *profiles_only {
                    args.extend(PROFILES_ONLY_FLAGS.iter().map(ToString::to_string));
                }
            }
        }

        args.push("-cp".to_string());
        args.push(workload.classpath().to_string());

        // Create only assembles the cache; it never enters the workload
        if let Some(invocations) = self.invocations() {
            args.push(workload.main_class().to_string());
            args.extend(workload.expand_args(invocations, output));
        }
        args
    }
}

impl fmt::Display for PhaseSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A validated, ordered list of phases for one workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhasePlan {
    phases: Vec<PhaseSpec>,
}

/// The record/create pair of a plan.
#[derive(Debug, Clone, Copy)]
pub struct TrainingSteps<'a> {
    /// Record phase
    pub record: &'a PhaseSpec,
    /// Create phase
    pub create: &'a PhaseSpec,
}

impl PhasePlan {
    /// Validate phase ordering.
    ///
    /// Every artifact a phase consumes must be produced by an earlier phase,
    /// at most one record/create pair is allowed, and at least one measured
    /// variant is required, each at most once.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first violation.
    pub fn new(phases: Vec<PhaseSpec>) -> Result<Self> {
        let mut configurations: Vec<&Path> = Vec::new();
        let mut caches: Vec<&Path> = Vec::new();
        let mut variants: Vec<VariantKind> = Vec::new();
        let mut records = 0;
        let mut creates = 0;

        for phase in &phases {
            match phase {
                PhaseSpec::Record { configuration, .. } => {
                    records += 1;
                    configurations.push(configuration.as_path());
                }
                PhaseSpec::Create { configuration, cache } => {
                    creates += 1;
                    if !configurations.contains(&configuration.as_path()) {
                        return Err(Error::Config(format!(
                            "train-create reads {} before any train-record produces it",
                            configuration.display()
                        )));
                    }
                    caches.push(cache.as_path());
                }
                PhaseSpec::Replay { cache, .. } => {
                    if !caches.contains(&cache.as_path()) {
                        return Err(Error::Config(format!(
                            "replay reads {} before any train-create produces it",
                            cache.display()
                        )));
                    }
                }
                PhaseSpec::Baseline { .. } => {}
            }
            if let Some(variant) = phase.variant() {
                if variants.contains(&variant) {
                    return Err(Error::Config(format!("variant `{variant}` listed twice")));
                }
                variants.push(variant);
            }
        }

        if records > 1 || creates > 1 || records != creates {
            return Err(Error::Config(
                "a plan needs exactly one train-record and one train-create, or neither".to_string(),
            ));
        }
        if variants.is_empty() {
            return Err(Error::Config("a plan needs at least one measured variant".to_string()));
        }
        Ok(Self { phases })
    }

    /// The standard plan for a workload under `config`:
    /// record and create (when replay is requested) followed by the variants.
    ///
    /// # Errors
    ///
    /// Propagates [`PhasePlan::new`] validation errors.
    pub fn standard(config: &RunConfig, workload: &Workload) -> Result<Self> {
        let artifact = crate::cache::CacheArtifact::for_workload(workload);
        let mut phases = Vec::new();

        if config.variants().contains(&VariantKind::Replay) {
            phases.push(artifact.record_phase(config.train_invocations()));
            phases.push(artifact.create_phase());
        }
        for variant in config.variants() {
            phases.push(match variant {
                VariantKind::Baseline => PhaseSpec::Baseline {
                    invocations: config.invocations(),
                    strict_cold: config.strict_cold(),
                },
                VariantKind::Replay => PhaseSpec::Replay {
                    cache: artifact.cache().to_path_buf(),
                    invocations: config.invocations(),
                    profiles_only: config.profiles_only(),
                },
            });
        }
        Self::new(phases)
    }

    /// All phases in order.
    #[must_use]
    pub fn phases(&self) -> &[PhaseSpec] {
        &self.phases
    }

    /// The training pair, when the plan trains a cache.
    #[must_use]
    pub fn training(&self) -> Option<TrainingSteps<'_>> {
        let record = self.phases.iter().find(|p| matches!(p, PhaseSpec::Record { .. }))?;
        let create = self.phases.iter().find(|p| matches!(p, PhaseSpec::Create { .. }))?;
        Some(TrainingSteps { record, create })
    }

    /// Measured phases, in order.
    pub fn variants(&self) -> impl Iterator<Item = &PhaseSpec> {
        self.phases.iter().filter(|p| p.variant().is_some())
    }
}

/// Outcome of one phase execution.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationResult {
    /// Exit code of the child
    pub exit_code: i32,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
    /// Extracted measurements, possibly empty
    pub series: Vec<f64>,
}

/// Executes phases for workloads.
#[derive(Debug)]
pub struct PhaseRunner<'a, I: ProcessInvoker> {
    config: &'a RunConfig,
    invoker: I,
}

impl<'a, I: ProcessInvoker> PhaseRunner<'a, I> {
    /// Create a runner.
    pub const fn new(config: &'a RunConfig, invoker: I) -> Self {
        Self { config, invoker }
    }

    /// Run configuration in use.
    #[must_use]
    pub const fn config(&self) -> &'a RunConfig {
        self.config
    }

    /// Final path of the output file for one phase run.
    ///
    /// The workload is handed the staging path (`<this>.tmp`); it is renamed
    /// here once the phase succeeded.
    #[must_use]
    pub fn output_path(&self, workload: &Workload, phase: &PhaseSpec, repeat: usize) -> PathBuf {
        self.config
            .output_dir()
            .join(workload.name())
            .join(format!("{}-{repeat}.csv", phase.name()))
    }

    /// Execute `phase` once for `workload`.
    ///
    /// # Errors
    ///
    /// - [`Error::ProcessStart`] when the runtime cannot be spawned
    /// - [`Error::PhaseExecution`] on a nonzero exit
    /// - [`Error::PhaseOutput`] when a measured phase yields no values
    pub fn run(&self, workload: &Workload, phase: &PhaseSpec, repeat: usize) -> Result<InvocationResult> {
        let final_path = self.output_path(workload, phase, repeat);
        let staged = staging_path(&final_path);
        let uses_file = matches!(workload.output(), OutputConvention::File { .. });
        if uses_file {
            if let Some(parent) = staged.parent() {
                std::fs::create_dir_all(parent)?;
            }
            remove_best_effort(&staged);
        }

        let command = CommandSpec::new(self.config.runtime())
            .args(phase.command_args(self.config, workload, &staged))
            .current_dir(workload.working_dir());

        tracing::info!(workload = workload.name(), phase = phase.name(), repeat, "running phase");
        let output = self.invoker.invoke(&command)?;

        if !output.success() {
            // The staging file, if any, stays behind for inspection
            return Err(Error::PhaseExecution {
                workload: workload.name().to_string(),
                phase: phase.name().to_string(),
                exit_code: output.exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }

        let (series, staged_written) = match workload.output() {
            OutputConvention::Stdout => (extract_series(&output.stdout), false),
            OutputConvention::File { column } => match std::fs::read_to_string(&staged) {
                Ok(text) => (extract_column(&text, column), true),
                Err(e) => {
                    tracing::debug!(path = %staged.display(), error = %e, "no phase output file");
                    (Vec::new(), false)
                }
            },
        };

        if series.is_empty() && phase.requires_output() {
            return Err(Error::PhaseOutput {
                workload: workload.name().to_string(),
                phase: phase.name().to_string(),
            });
        }
        if staged_written {
            std::fs::rename(&staged, &final_path).map_err(|source| Error::Persist {
                staged: staged.clone(),
                source,
            })?;
        }
        tracing::debug!(
            workload = workload.name(),
            phase = phase.name(),
            repeat,
            samples = series.len(),
            "phase complete"
        );

        Ok(InvocationResult {
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
            series,
        })
    }
}
