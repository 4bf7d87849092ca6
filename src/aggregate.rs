//! Repeat aggregation
//!
//! Each variant is run `repeats` times. Repeats rarely print exactly the same
//! number of measurements (a stalled invocation, a truncated log), so every
//! series is cut to the shortest length seen across all repeats of all
//! variants. This keeps invocation `i` aligned everywhere without padding or
//! interpolating anything.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Measurements of one variant, indexed by repeat.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepeatedSeries {
    runs: Vec<Vec<f64>>,
}

impl RepeatedSeries {
    /// Wrap already collected runs; index is the repeat number.
    #[must_use]
    pub const fn new(runs: Vec<Vec<f64>>) -> Self {
        Self { runs }
    }

    /// Add the next repeat.
    pub fn push(&mut self, series: Vec<f64>) {
        self.runs.push(series);
    }

    /// Runs in repeat order.
    #[must_use]
    pub fn runs(&self) -> &[Vec<f64>] {
        &self.runs
    }

    /// Number of repeats collected.
    #[must_use]
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// Whether no repeat was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Shortest run length, `None` without runs.
    #[must_use]
    pub fn min_len(&self) -> Option<usize> {
        self.runs.iter().map(Vec::len).min()
    }
}

/// One row of the long-form table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedRecord {
    /// Workload name
    pub workload: String,
    /// Variant label
    pub variant: String,
    /// Repeat number, from 0
    pub repeat: u32,
    /// Invocation number, from 1
    pub invocation: u32,
    /// Measurement
    pub value: f64,
}

/// One row of the wide-form table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AveragedRecord {
    /// Workload name
    pub workload: String,
    /// Invocation number, from 1
    pub invocation: u32,
    /// Mean across repeats, per variant label, in variant order
    pub means: Vec<(String, f64)>,
}

impl AveragedRecord {
    /// Mean for `variant`, if present.
    #[must_use]
    pub fn mean(&self, variant: &str) -> Option<f64> {
        self.means
            .iter()
            .find(|(label, _)| label == variant)
            .map(|(_, mean)| *mean)
    }
}

/// Summary statistics of a variant's averaged series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantSummary {
    /// Variant label
    pub variant: String,
    /// Number of invocations
    pub count: usize,
    /// First invocation (cold start)
    pub first: f64,
    /// Arithmetic mean
    pub mean: f64,
    /// Median
    pub median: f64,
    /// 95th percentile (nearest rank below)
    pub p95: f64,
}

impl VariantSummary {
    /// Summarize a non-empty series; `None` when empty.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_series(variant: impl Into<String>, series: &[f64]) -> Option<Self> {
        let first = *series.first()?;
        let count = series.len();
        let mean = series.iter().sum::<f64>() / count as f64;

        let mut sorted = series.to_vec();
        sorted.sort_by(f64::total_cmp);
        let median = if count % 2 == 1 {
            sorted[count / 2]
        } else {
            (sorted[count / 2 - 1] + sorted[count / 2]) / 2.0
        };
        let p95 = sorted[(0.95 * (count - 1) as f64) as usize];

        Some(Self {
            variant: variant.into(),
            count,
            first,
            mean,
            median,
            p95,
        })
    }
}

/// Aligned result of one workload's repeats.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    /// Workload name
    pub workload: String,
    /// Variant labels, in run order
    pub variants: Vec<String>,
    /// Length every series was truncated to
    pub common_length: usize,
    /// Long-form rows, ordered by (variant, repeat, invocation)
    pub raw: Vec<AggregatedRecord>,
    /// Wide-form rows, one per invocation
    pub averaged: Vec<AveragedRecord>,
    /// Per-variant statistics over the averaged series
    pub summaries: Vec<VariantSummary>,
}

/// A labeled arm whose repeats are produced by a callable.
pub struct Variant<'a> {
    label: String,
    run: Box<dyn FnMut(usize) -> Result<Vec<f64>> + 'a>,
}

impl<'a> Variant<'a> {
    /// `run` receives the repeat number and returns that repeat's series.
    pub fn new(label: impl Into<String>, run: impl FnMut(usize) -> Result<Vec<f64>> + 'a) -> Self {
        Self {
            label: label.into(),
            run: Box::new(run),
        }
    }

    /// Variant label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl std::fmt::Debug for Variant<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Variant").field("label", &self.label).finish_non_exhaustive()
    }
}

/// Runs repeats and aligns their series.
#[derive(Debug, Clone, Copy)]
pub struct RepeatAggregator {
    repeats: usize,
}

impl RepeatAggregator {
    /// Aggregator running each variant `repeats` times.
    #[must_use]
    pub const fn new(repeats: usize) -> Self {
        Self { repeats }
    }

    /// Run every variant and aggregate.
    ///
    /// All repeats of a variant run before the next variant starts.
    ///
    /// # Errors
    ///
    /// Propagates the first repeat failure, and returns
    /// [`Error::InsufficientData`] when the common length is zero.
    pub fn run(&self, workload: &str, variants: Vec<Variant<'_>>) -> Result<Aggregation> {
        let collected = self.collect(variants)?;
        aggregate(workload, &collected)
    }

    /// Run every variant `repeats` times, without aligning.
    ///
    /// # Errors
    ///
    /// Propagates the first repeat failure.
    pub fn collect(&self, variants: Vec<Variant<'_>>) -> Result<Vec<(String, RepeatedSeries)>> {
        let mut collected = Vec::with_capacity(variants.len());
        for mut variant in variants {
            let mut series = RepeatedSeries::default();
            for repeat in 0..self.repeats {
                series.push((variant.run)(repeat)?);
            }
            collected.push((variant.label, series));
        }
        Ok(collected)
    }
}

/// Align collected series and build both tables.
///
/// # Errors
///
/// Returns [`Error::InsufficientData`] when there is no variant at all, a
/// variant has no repeats, or the shortest series is empty.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn aggregate(workload: &str, collected: &[(String, RepeatedSeries)]) -> Result<Aggregation> {
    // A variant without repeats counts as length 0
    let common_length = collected
        .iter()
        .map(|(_, series)| series.min_len().unwrap_or(0))
        .min()
        .unwrap_or(0);
    if common_length == 0 {
        return Err(Error::InsufficientData {
            workload: workload.to_string(),
        });
    }

    for (label, series) in collected {
        let discarded: usize = series.runs().iter().map(|run| run.len() - common_length).sum();
        if discarded > 0 {
            tracing::debug!(workload, variant = %label, discarded, common_length, "truncated trailing samples");
        }
    }

    let mut raw = Vec::new();
    for (label, series) in collected {
        for (repeat, run) in series.runs().iter().enumerate() {
            for (index, value) in run[..common_length].iter().enumerate() {
                raw.push(AggregatedRecord {
                    workload: workload.to_string(),
                    variant: label.clone(),
                    repeat: repeat as u32,
                    invocation: index as u32 + 1,
                    value: *value,
                });
            }
        }
    }

    let mean_curves: Vec<Vec<f64>> = collected
        .iter()
        .map(|(_, series)| mean_curve(series, common_length))
        .collect();

    let averaged = (0..common_length)
        .map(|index| AveragedRecord {
            workload: workload.to_string(),
            invocation: index as u32 + 1,
            means: collected
                .iter()
                .zip(&mean_curves)
                .map(|((label, _), curve)| (label.clone(), curve[index]))
                .collect(),
        })
        .collect();

    let summaries = collected
        .iter()
        .zip(&mean_curves)
        .filter_map(|((label, _), curve)| VariantSummary::from_series(label.clone(), curve))
        .collect();

    Ok(Aggregation {
        workload: workload.to_string(),
        variants: collected.iter().map(|(label, _)| label.clone()).collect(),
        common_length,
        raw,
        averaged,
        summaries,
    })
}

/// Per-index mean across repeats, over the first `len` samples.
#[allow(clippy::cast_precision_loss)]
fn mean_curve(series: &RepeatedSeries, len: usize) -> Vec<f64> {
    let repeats = series.len() as f64;
    (0..len)
        .map(|index| series.runs().iter().map(|run| run[index]).sum::<f64>() / repeats)
        .collect()
}
