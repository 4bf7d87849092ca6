//! # cachebench: warm-up and AOT cache latency benchmarking
//!
//! Cachebench runs a workload under several launch modes (a plain baseline,
//! and a replay of an ahead-of-time cache trained beforehand), repeats every
//! run, and turns the per-invocation latencies the workload prints into
//! aligned raw and averaged tables.
//!
//! ## Pipeline
//!
//! ```text
//! BatchOrchestrator
//!   ├── CacheLifecycle ── train-record ─> train-create        (once per workload)
//!   └── RepeatAggregator
//!         └── PhaseRunner ── ProcessInvoker ─> SeriesExtractor (per repeat)
//!                                  │
//!                      storage (CSV/Parquet, temp-then-rename)
//! ```
//!
//! Everything is sequential: one child process runs at a time, and a failing
//! workload never stops the rest of the batch.
//!
//! ## Example
//!
//! ```rust,no_run
//! use cachebench::config::RunConfig;
//! use cachebench::orchestrator::{BatchOrchestrator, Combination};
//! use cachebench::phase::PhasePlan;
//! use cachebench::process::SystemInvoker;
//! use cachebench::workload::Workload;
//!
//! let config = RunConfig::builder("out").invocations(100).repeats(3).build()?;
//! let workload = Workload::new("simple-hash", "bench/simple-hash", "build/libs/app.jar", "Runner");
//! let plan = PhasePlan::standard(&config, &workload)?;
//!
//! let report = BatchOrchestrator::new(&config, SystemInvoker::new())
//!     .run(&[Combination::new(workload, plan)]);
//! println!("{} succeeded, {} failed", report.succeeded.len(), report.failed.len());
//! # Ok::<(), cachebench::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod phase;
pub mod process;
#[cfg(feature = "plot")]
pub mod report;
pub mod series;
pub mod storage;
pub mod workload;

pub use error::{Error, Result};
