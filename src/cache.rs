//! AOT cache lifecycle
//!
//! Training is two runs: `train-record` writes a configuration file, then
//! `train-create` turns it into the cache file a replay consumes.
//!
//! ```text
//! Absent ──record──> Recording ──create──> Created ≡ Ready
//!   ^                                                │
//!   └──────────────── rebuild requested ─────────────┘
//! ```
//!
//! An existing cache file is reused without rerunning either step unless a
//! rebuild is requested. A failed step leaves the lifecycle `Absent` and
//! removes whatever either step wrote, so a partial cache is never mistaken
//! for a finished one. Nothing is retried.
//!
//! No locking is done: two batches training the same workload at once will
//! clobber each other's artifacts.

use std::path::{Path, PathBuf};

use crate::phase::{PhaseRunner, PhaseSpec, TrainingSteps};
use crate::process::ProcessInvoker;
use crate::storage::remove_best_effort;
use crate::workload::Workload;
use crate::{Error, Result};

/// Extension of the recorded configuration file.
pub const CONFIGURATION_EXTENSION: &str = "aotconf";

/// Extension of the cache file.
pub const CACHE_EXTENSION: &str = "aot";

/// The two on-disk byproducts of training a workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheArtifact {
    configuration: PathBuf,
    cache: PathBuf,
}

impl CacheArtifact {
    /// Artifacts named after the workload, inside its working directory.
    #[must_use]
    pub fn for_workload(workload: &Workload) -> Self {
        let dir = workload.working_dir();
        Self {
            configuration: dir.join(format!("{}.{CONFIGURATION_EXTENSION}", workload.name())),
            cache: dir.join(format!("{}.{CACHE_EXTENSION}", workload.name())),
        }
    }

    /// Artifacts at explicit paths.
    #[must_use]
    pub fn new(configuration: impl Into<PathBuf>, cache: impl Into<PathBuf>) -> Self {
        Self {
            configuration: configuration.into(),
            cache: cache.into(),
        }
    }

    /// Configuration file (produced by record, consumed by create).
    #[must_use]
    pub fn configuration(&self) -> &Path {
        &self.configuration
    }

    /// Cache file (produced by create, consumed by replay).
    #[must_use]
    pub fn cache(&self) -> &Path {
        &self.cache
    }

    /// Record phase producing this artifact's configuration.
    #[must_use]
    pub fn record_phase(&self, invocations: u32) -> PhaseSpec {
        PhaseSpec::Record {
            configuration: self.configuration.clone(),
            invocations,
        }
    }

    /// Create phase producing this artifact's cache.
    #[must_use]
    pub fn create_phase(&self) -> PhaseSpec {
        PhaseSpec::Create {
            configuration: self.configuration.clone(),
            cache: self.cache.clone(),
        }
    }

    fn clean(&self) {
        remove_best_effort(&self.configuration);
        remove_best_effort(&self.cache);
    }
}

/// Lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// No usable artifact
    Absent,
    /// Record step in progress
    Recording,
    /// Cache assembled
    Created,
    /// Cache usable by replay
    Ready,
}

/// Drives training for one workload.
#[derive(Debug)]
pub struct CacheLifecycle<'a> {
    record: &'a PhaseSpec,
    create: &'a PhaseSpec,
    artifact: CacheArtifact,
    state: CacheState,
}

impl<'a> CacheLifecycle<'a> {
    /// Build a lifecycle from a plan's training steps.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the steps are not a record followed by
    /// a create reading its configuration.
    pub fn new(steps: TrainingSteps<'a>) -> Result<Self> {
        let artifact = match (steps.record, steps.create) {
            (
                PhaseSpec::Record { configuration: recorded, .. },
                PhaseSpec::Create { configuration, cache },
            ) if recorded == configuration => CacheArtifact::new(configuration, cache),
            _ => {
                return Err(Error::Config(
                    "training needs a train-record and a matching train-create".to_string(),
                ));
            }
        };
        Ok(Self {
            record: steps.record,
            create: steps.create,
            artifact,
            state: CacheState::Absent,
        })
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> CacheState {
        self.state
    }

    /// Artifact files managed by this lifecycle.
    #[must_use]
    pub const fn artifact(&self) -> &CacheArtifact {
        &self.artifact
    }

    /// Bring the cache to `Ready`, training only when needed.
    ///
    /// # Errors
    ///
    /// Propagates the failing step's error; the state is `Absent` afterwards.
    /// A create step that exits cleanly without writing the cache file fails
    /// with [`Error::PhaseOutput`].
    pub fn ensure_ready<I: ProcessInvoker>(
        &mut self,
        runner: &PhaseRunner<'_, I>,
        workload: &Workload,
        rebuild: bool,
    ) -> Result<&CacheArtifact> {
        if rebuild {
            self.state = CacheState::Absent;
        } else if self.state == CacheState::Ready || self.artifact.cache.is_file() {
            tracing::info!(
                workload = workload.name(),
                cache = %self.artifact.cache.display(),
                "reusing existing cache"
            );
            self.state = CacheState::Ready;
            return Ok(&self.artifact);
        }

        match self.train(runner, workload) {
            Ok(()) => {
                self.state = CacheState::Ready;
                Ok(&self.artifact)
            }
            Err(e) => {
                // A failed step may still have written files; never reuse them
                self.artifact.clean();
                self.state = CacheState::Absent;
                Err(e)
            }
        }
    }

    fn train<I: ProcessInvoker>(&mut self, runner: &PhaseRunner<'_, I>, workload: &Workload) -> Result<()> {
        self.artifact.clean();

        self.state = CacheState::Recording;
        tracing::info!(workload = workload.name(), "recording training configuration");
        runner.run(workload, self.record, 0)?;

        tracing::info!(workload = workload.name(), "creating cache");
        runner.run(workload, self.create, 0)?;
        if !self.artifact.cache.is_file() {
            return Err(Error::PhaseOutput {
                workload: workload.name().to_string(),
                phase: self.create.name().to_string(),
            });
        }
        self.state = CacheState::Created;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::phase::PhasePlan;
    use crate::process::{CommandSpec, InvocationOutput};
    use std::cell::RefCell;

    /// Writes the artifact of each training step; the step named by
    /// `failing` still writes its file, then exits nonzero.
    struct TrainingInvoker {
        calls: RefCell<Vec<String>>,
        failing: Option<&'static str>,
    }

    impl TrainingInvoker {
        fn new(failing: Option<&'static str>) -> Self {
            Self { calls: RefCell::new(Vec::new()), failing }
        }

        fn exit_for(&self, mode: &str) -> InvocationOutput {
            let failed = self.failing.is_some_and(|f| mode.ends_with(f));
            InvocationOutput { exit_code: if failed { 2 } else { 0 }, ..InvocationOutput::default() }
        }
    }

    impl ProcessInvoker for TrainingInvoker {
        fn invoke(&self, command: &CommandSpec) -> Result<InvocationOutput> {
            let args = command.arguments();
            let mode = args.iter().find(|a| a.starts_with("-XX:AOTMode=")).cloned().unwrap_or_default();
            self.calls.borrow_mut().push(mode.clone());

            if mode == "-XX:AOTMode=record" {
                let conf = args.iter().find_map(|a| a.strip_prefix("-XX:AOTConfiguration=")).unwrap();
                std::fs::write(conf, "conf").unwrap();
            }
            if mode == "-XX:AOTMode=create" {
                let cache = args.iter().find_map(|a| a.strip_prefix("-XX:AOTCache=")).unwrap();
                let contents = if self.failing == Some("create") { "partial" } else { "cache" };
                std::fs::write(cache, contents).unwrap();
            }
            Ok(self.exit_for(&mode))
        }
    }

    fn setup(dir: &Path) -> (RunConfig, Workload, PhasePlan) {
        let config = RunConfig::builder(dir.join("out")).invocations(5).build().unwrap();
        let workload = Workload::new("hash", dir, ".", "Main");
        let plan = PhasePlan::standard(&config, &workload).unwrap();
        (config, workload, plan)
    }

    #[test]
    fn test_artifact_names_from_workload() {
        let workload = Workload::new("simple-hash", "/bench/simple-hash", ".", "Main");
        let artifact = CacheArtifact::for_workload(&workload);
        assert_eq!(artifact.configuration(), Path::new("/bench/simple-hash/simple-hash.aotconf"));
        assert_eq!(artifact.cache(), Path::new("/bench/simple-hash/simple-hash.aot"));
    }

    #[test]
    fn test_trains_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let (config, workload, plan) = setup(dir.path());
        let invoker = TrainingInvoker::new(None);
        let runner = PhaseRunner::new(&config, &invoker);

        let mut lifecycle = CacheLifecycle::new(plan.training().unwrap()).unwrap();
        assert_eq!(lifecycle.state(), CacheState::Absent);
        lifecycle.ensure_ready(&runner, &workload, false).unwrap();

        assert_eq!(lifecycle.state(), CacheState::Ready);
        assert_eq!(
            *invoker.calls.borrow(),
            vec!["-XX:AOTMode=record", "-XX:AOTMode=create"]
        );
    }

    #[test]
    fn test_existing_cache_skips_training() {
        let dir = tempfile::tempdir().unwrap();
        let (config, workload, plan) = setup(dir.path());
        std::fs::write(dir.path().join("hash.aot"), "cache").unwrap();
        let invoker = TrainingInvoker::new(None);
        let runner = PhaseRunner::new(&config, &invoker);

        let mut lifecycle = CacheLifecycle::new(plan.training().unwrap()).unwrap();
        lifecycle.ensure_ready(&runner, &workload, false).unwrap();

        assert_eq!(lifecycle.state(), CacheState::Ready);
        assert!(invoker.calls.borrow().is_empty());
    }

    #[test]
    fn test_rebuild_always_retrains_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let (config, workload, plan) = setup(dir.path());
        std::fs::write(dir.path().join("hash.aot"), "stale").unwrap();
        let invoker = TrainingInvoker::new(None);
        let runner = PhaseRunner::new(&config, &invoker);

        let mut lifecycle = CacheLifecycle::new(plan.training().unwrap()).unwrap();
        lifecycle.ensure_ready(&runner, &workload, true).unwrap();

        assert_eq!(
            *invoker.calls.borrow(),
            vec!["-XX:AOTMode=record", "-XX:AOTMode=create"]
        );
        assert_eq!(std::fs::read_to_string(dir.path().join("hash.aot")).unwrap(), "cache");
    }

    #[test]
    fn test_failed_record_leaves_absent() {
        let dir = tempfile::tempdir().unwrap();
        let (config, workload, plan) = setup(dir.path());
        let invoker = TrainingInvoker::new(Some("record"));
        let runner = PhaseRunner::new(&config, &invoker);

        let mut lifecycle = CacheLifecycle::new(plan.training().unwrap()).unwrap();
        let err = lifecycle.ensure_ready(&runner, &workload, false).unwrap_err();

        assert!(matches!(err, Error::PhaseExecution { ref phase, .. } if phase == "train-record"));
        assert_eq!(lifecycle.state(), CacheState::Absent);
        // Create never ran
        assert_eq!(*invoker.calls.borrow(), vec!["-XX:AOTMode=record"]);
        assert!(!dir.path().join("hash.aot").exists());
    }

    #[test]
    fn test_failed_create_discards_partial_cache() {
        let dir = tempfile::tempdir().unwrap();
        let (config, workload, plan) = setup(dir.path());
        let cache = dir.path().join("hash.aot");

        let failing = TrainingInvoker::new(Some("create"));
        let runner = PhaseRunner::new(&config, &failing);
        let mut lifecycle = CacheLifecycle::new(plan.training().unwrap()).unwrap();
        let err = lifecycle.ensure_ready(&runner, &workload, false).unwrap_err();
        assert!(matches!(err, Error::PhaseExecution { ref phase, .. } if phase == "train-create"));
        assert_eq!(lifecycle.state(), CacheState::Absent);
        assert!(!cache.exists());
        assert!(!dir.path().join("hash.aotconf").exists());

        // The next attempt trains again instead of replaying the partial file
        let healthy = TrainingInvoker::new(None);
        let runner = PhaseRunner::new(&config, &healthy);
        let mut lifecycle = CacheLifecycle::new(plan.training().unwrap()).unwrap();
        lifecycle.ensure_ready(&runner, &workload, false).unwrap();

        assert_eq!(lifecycle.state(), CacheState::Ready);
        assert_eq!(
            *healthy.calls.borrow(),
            vec!["-XX:AOTMode=record", "-XX:AOTMode=create"]
        );
        assert_eq!(std::fs::read_to_string(&cache).unwrap(), "cache");
    }

    #[test]
    fn test_partial_artifacts_cleaned_on_next_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let (config, workload, plan) = setup(dir.path());
        let conf = dir.path().join("hash.aotconf");
        std::fs::write(&conf, "partial").unwrap();

        let invoker = TrainingInvoker::new(None);
        let runner = PhaseRunner::new(&config, &invoker);
        let mut lifecycle = CacheLifecycle::new(plan.training().unwrap()).unwrap();
        lifecycle.ensure_ready(&runner, &workload, false).unwrap();

        assert_eq!(std::fs::read_to_string(conf).unwrap(), "conf");
    }
}
