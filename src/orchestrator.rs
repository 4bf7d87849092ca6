//! Batch orchestration
//!
//! Runs every combination in input order, one child process at a time.
//! A failing combination is logged and recorded, never fatal: the batch always
//! attempts everything it was given.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::aggregate::{AggregatedRecord, Aggregation, AveragedRecord, RepeatAggregator, Variant, VariantSummary};
use crate::cache::CacheLifecycle;
use crate::config::RunConfig;
use crate::phase::{PhasePlan, PhaseRunner};
use crate::process::ProcessInvoker;
use crate::storage::{averaged_table, raw_table, TableWriter};
use crate::workload::{Workload, WorkloadConfig};
use crate::{Error, Result};

/// Exit status when at least one combination succeeded.
pub const EXIT_SUCCESS: u8 = 0;

/// Exit status when no combination succeeded.
pub const EXIT_BATCH_FAILED: u8 = 1;

/// Exit status for pre-flight configuration errors.
pub const EXIT_CONFIG_ERROR: u8 = 2;

/// One independently processed unit: a workload and its phase plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Combination {
    /// Resolved workload
    pub workload: Workload,
    /// Validated phases
    pub plan: PhasePlan,
}

impl Combination {
    /// Pair a workload with a plan.
    #[must_use]
    pub const fn new(workload: Workload, plan: PhasePlan) -> Self {
        Self { workload, plan }
    }
}

/// Files written for a successful combination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CombinationOutput {
    /// Workload name
    pub workload: String,
    /// Long-form table
    pub raw_path: PathBuf,
    /// Wide-form table
    pub averaged_path: PathBuf,
    /// JSON summary
    pub summary_path: PathBuf,
    /// Common series length
    pub common_length: usize,
}

/// A combination that failed, with the reason.
#[derive(Debug)]
pub struct FailedCombination {
    /// Workload name
    pub workload: String,
    /// What went wrong
    pub error: Error,
}

/// Outcome of a whole batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Successful combinations, in input order
    pub succeeded: Vec<CombinationOutput>,
    /// Failed combinations, in input order
    pub failed: Vec<FailedCombination>,
    /// Long-form rows of every successful combination
    pub raw: Vec<AggregatedRecord>,
    /// Wide-form rows of every successful combination
    pub averaged: Vec<AveragedRecord>,
}

impl BatchReport {
    /// Process exit status: success unless nothing succeeded.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        if self.succeeded.is_empty() {
            EXIT_BATCH_FAILED
        } else {
            EXIT_SUCCESS
        }
    }

    fn record_failure(&mut self, workload: &str, error: Error) {
        match &error {
            Error::PhaseExecution { phase, exit_code, stdout, stderr, .. } => tracing::error!(
                workload,
                phase = %phase,
                exit_code,
                stdout = %stdout,
                stderr = %stderr,
                kind = error.kind(),
                "combination failed"
            ),
            _ => tracing::error!(workload, kind = error.kind(), error = %error, "combination failed"),
        }
        self.failed.push(FailedCombination {
            workload: workload.to_string(),
            error,
        });
    }
}

#[derive(Serialize)]
struct CombinationSummary<'a> {
    workload: &'a str,
    finished_at: DateTime<Utc>,
    repeats: u32,
    invocations: u32,
    common_length: usize,
    variants: &'a [VariantSummary],
}

/// Drives a batch of combinations.
#[derive(Debug)]
pub struct BatchOrchestrator<'a, I: ProcessInvoker> {
    config: &'a RunConfig,
    invoker: I,
    writer: TableWriter,
}

impl<'a, I: ProcessInvoker> BatchOrchestrator<'a, I> {
    /// Orchestrator writing in the configured format.
    pub const fn new(config: &'a RunConfig, invoker: I) -> Self {
        Self {
            config,
            invoker,
            writer: TableWriter::new(config.format()),
        }
    }

    /// Resolve workload configs and run them; resolution failures count as
    /// failed combinations.
    pub fn run_configured(&self, workloads: &[WorkloadConfig]) -> BatchReport {
        let mut report = BatchReport::default();
        for config in workloads {
            let prepared = config.resolve(&self.invoker).and_then(|workload| {
                let plan = PhasePlan::standard(self.config, &workload)?;
                Ok(Combination::new(workload, plan))
            });
            match prepared {
                Ok(combination) => self.run_one(&combination, &mut report),
                Err(error) => report.record_failure(&config.name, error),
            }
        }
        self.finish(&mut report);
        report
    }

    /// Run combinations in order, then write the batch-wide tables.
    pub fn run(&self, combinations: &[Combination]) -> BatchReport {
        let mut report = BatchReport::default();
        for combination in combinations {
            self.run_one(combination, &mut report);
        }
        self.finish(&mut report);
        report
    }

    fn run_one(&self, combination: &Combination, report: &mut BatchReport) {
        let name = combination.workload.name();
        let span = tracing::info_span!("combination", workload = name);
        let _guard = span.enter();

        match self.run_combination(combination) {
            Ok((output, aggregation)) => {
                tracing::info!(
                    workload = name,
                    common_length = aggregation.common_length,
                    raw = %output.raw_path.display(),
                    averaged = %output.averaged_path.display(),
                    "combination complete"
                );
                report.raw.extend(aggregation.raw);
                report.averaged.extend(aggregation.averaged);
                report.succeeded.push(output);
            }
            Err(error) => report.record_failure(name, error),
        }
    }

    /// Train, measure, aggregate and persist one combination.
    ///
    /// # Errors
    ///
    /// Any phase, aggregation or storage error of this combination.
    pub fn run_combination(&self, combination: &Combination) -> Result<(CombinationOutput, Aggregation)> {
        let workload = &combination.workload;
        let runner = PhaseRunner::new(self.config, &self.invoker);

        if let Some(steps) = combination.plan.training() {
            CacheLifecycle::new(steps)?.ensure_ready(&runner, workload, self.config.rebuild())?;
        }

        let variants = combination
            .plan
            .variants()
            .map(|phase| {
                let runner = &runner;
                Variant::new(phase.name(), move |repeat| {
                    runner.run(workload, phase, repeat).map(|result| result.series)
                })
            })
            .collect();
        let aggregation = RepeatAggregator::new(self.config.repeats() as usize).run(workload.name(), variants)?;

        for summary in &aggregation.summaries {
            tracing::info!(
                workload = workload.name(),
                variant = %summary.variant,
                count = summary.count,
                first = summary.first,
                mean = summary.mean,
                median = summary.median,
                p95 = summary.p95,
                "variant summary"
            );
        }

        let output = self.persist(workload, &aggregation)?;
        Ok((output, aggregation))
    }

    fn persist(&self, workload: &Workload, aggregation: &Aggregation) -> Result<CombinationOutput> {
        let dir = self.config.output_dir();
        let name = workload.name();
        let raw_path = self.writer.table_path(dir, &format!("{name}_raw"));
        let averaged_path = self.writer.table_path(dir, &format!("{name}_avg"));
        let summary_path = dir.join(format!("{name}_summary.json"));

        self.writer.write_atomic(&raw_table(&aggregation.raw)?, &raw_path)?;
        self.writer.write_atomic(&averaged_table(&aggregation.averaged)?, &averaged_path)?;
        self.writer.write_json_atomic(
            &CombinationSummary {
                workload: name,
                finished_at: Utc::now(),
                repeats: self.config.repeats(),
                invocations: self.config.invocations(),
                common_length: aggregation.common_length,
                variants: &aggregation.summaries,
            },
            &summary_path,
        )?;

        Ok(CombinationOutput {
            workload: name.to_string(),
            raw_path,
            averaged_path,
            summary_path,
            common_length: aggregation.common_length,
        })
    }

    /// Batch-wide concatenations; failures here are logged, not fatal.
    fn finish(&self, report: &mut BatchReport) {
        tracing::info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "batch finished"
        );
        if report.succeeded.is_empty() {
            return;
        }
        let dir = self.config.output_dir();
        let all_raw = self.writer.table_path(dir, "all_raw");
        let all_avg = self.writer.table_path(dir, "all_avg");

        let written = raw_table(&report.raw)
            .and_then(|batch| self.writer.write_atomic(&batch, &all_raw))
            .and_then(|()| averaged_table(&report.averaged))
            .and_then(|batch| self.writer.write_atomic(&batch, &all_avg));
        match written {
            Ok(()) => tracing::info!(raw = %all_raw.display(), averaged = %all_avg.display(), "batch tables written"),
            Err(e) => tracing::error!(error = %e, "failed to write batch tables"),
        }
    }
}
