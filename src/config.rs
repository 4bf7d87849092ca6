//! Run configuration
//!
//! Everything the pipeline needs to know about a batch is resolved once, up
//! front, into a [`RunConfig`] and passed by reference to every component.
//! Nothing is looked up lazily from the environment afterwards.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::phase::VariantKind;
use crate::storage::TableFormat;
use crate::{Error, Result};

/// Environment variable overriding the runtime executable.
pub const RUNTIME_ENV_VAR: &str = "CACHEBENCH_RUNTIME";

/// Runtime used when nothing else is configured (resolved through `PATH`).
pub const DEFAULT_RUNTIME: &str = "java";

/// Default invocations per run.
pub const DEFAULT_INVOCATIONS: u32 = 500;

/// Default repeats per variant.
pub const DEFAULT_REPEATS: u32 = 5;

/// Immutable configuration for one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    runtime: PathBuf,
    runtime_flags: Vec<String>,
    invocations: u32,
    train_invocations: Option<u32>,
    repeats: u32,
    rebuild: bool,
    strict_cold: bool,
    profiles_only: bool,
    variants: Vec<VariantKind>,
    output_dir: PathBuf,
    format: TableFormat,
}

impl RunConfig {
    /// Create a builder writing results under `output_dir`.
    #[must_use]
    pub fn builder(output_dir: impl Into<PathBuf>) -> RunConfigBuilder {
        RunConfigBuilder::new(output_dir)
    }

    /// Runtime executable.
    #[must_use]
    pub fn runtime(&self) -> &Path {
        &self.runtime
    }

    /// Flags prepended to every phase command.
    #[must_use]
    pub fn runtime_flags(&self) -> &[String] {
        &self.runtime_flags
    }

    /// Invocations per measured run.
    #[must_use]
    pub const fn invocations(&self) -> u32 {
        self.invocations
    }

    /// Invocations for the training (record) run.
    #[must_use]
    pub fn train_invocations(&self) -> u32 {
        self.train_invocations.unwrap_or(self.invocations)
    }

    /// Repeats per variant.
    #[must_use]
    pub const fn repeats(&self) -> u32 {
        self.repeats
    }

    /// Whether cache artifacts are rebuilt even when present.
    #[must_use]
    pub const fn rebuild(&self) -> bool {
        self.rebuild
    }

    /// Whether the baseline disables class data sharing.
    #[must_use]
    pub const fn strict_cold(&self) -> bool {
        self.strict_cold
    }

    /// Whether replay only uses training profiles.
    #[must_use]
    pub const fn profiles_only(&self) -> bool {
        self.profiles_only
    }

    /// Variants to measure, in order.
    #[must_use]
    pub fn variants(&self) -> &[VariantKind] {
        &self.variants
    }

    /// Output directory.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Table format for persisted outputs.
    #[must_use]
    pub const fn format(&self) -> TableFormat {
        self.format
    }

    /// Check the configuration before anything is executed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for zero counts, an empty variant set or a
    /// runtime given as a path that does not exist.
    pub fn validate(&self) -> Result<()> {
        if self.invocations == 0 {
            return Err(Error::Config("invocations must be at least 1".to_string()));
        }
        if self.train_invocations == Some(0) {
            return Err(Error::Config(
                "train invocations must be at least 1".to_string(),
            ));
        }
        if self.repeats == 0 {
            return Err(Error::Config("repeats must be at least 1".to_string()));
        }
        if self.variants.is_empty() {
            return Err(Error::Config("at least one variant is required".to_string()));
        }
        // Bare names are looked up through PATH at spawn time
        if self.runtime.components().count() > 1 && !self.runtime.is_file() {
            return Err(Error::Config(format!(
                "runtime executable not found: {}",
                self.runtime.display()
            )));
        }
        Ok(())
    }
}

/// Builder for [`RunConfig`].
#[derive(Debug)]
pub struct RunConfigBuilder {
    config: RunConfig,
}

impl RunConfigBuilder {
    /// Start from defaults.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            config: RunConfig {
                runtime: PathBuf::from(DEFAULT_RUNTIME),
                runtime_flags: Vec::new(),
                invocations: DEFAULT_INVOCATIONS,
                train_invocations: None,
                repeats: DEFAULT_REPEATS,
                rebuild: false,
                strict_cold: false,
                profiles_only: false,
                variants: vec![VariantKind::Baseline, VariantKind::Replay],
                output_dir: output_dir.into(),
                format: TableFormat::Csv,
            },
        }
    }

    /// Set the runtime executable.
    #[must_use]
    pub fn runtime(mut self, runtime: impl Into<PathBuf>) -> Self {
        self.config.runtime = runtime.into();
        self
    }

    /// Add a flag passed to every phase.
    #[must_use]
    pub fn runtime_flag(mut self, flag: impl Into<String>) -> Self {
        self.config.runtime_flags.push(flag.into());
        self
    }

    /// Set invocations per measured run.
    #[must_use]
    pub const fn invocations(mut self, invocations: u32) -> Self {
        self.config.invocations = invocations;
        self
    }

    /// Set invocations for the training run.
    #[must_use]
    pub const fn train_invocations(mut self, invocations: u32) -> Self {
        self.config.train_invocations = Some(invocations);
        self
    }

    /// Set repeats per variant.
    #[must_use]
    pub const fn repeats(mut self, repeats: u32) -> Self {
        self.config.repeats = repeats;
        self
    }

    /// Force cache rebuilds.
    #[must_use]
    pub const fn rebuild(mut self, rebuild: bool) -> Self {
        self.config.rebuild = rebuild;
        self
    }

    /// Disable class data sharing for the baseline.
    #[must_use]
    pub const fn strict_cold(mut self, strict_cold: bool) -> Self {
        self.config.strict_cold = strict_cold;
        self
    }

    /// Restrict replay to training profiles.
    #[must_use]
    pub const fn profiles_only(mut self, profiles_only: bool) -> Self {
        self.config.profiles_only = profiles_only;
        self
    }

    /// Set the variants to measure; duplicates are dropped, order is kept.
    #[must_use]
    pub fn variants(mut self, variants: impl IntoIterator<Item = VariantKind>) -> Self {
        let mut unique = Vec::new();
        for variant in variants {
            if !unique.contains(&variant) {
                unique.push(variant);
            }
        }
        self.config.variants = unique;
        self
    }

    /// Set the persisted table format.
    #[must_use]
    pub const fn format(mut self, format: TableFormat) -> Self {
        self.config.format = format;
        self
    }

    /// Validate and build.
    ///
    /// # Errors
    ///
    /// See [`RunConfig::validate`].
    pub fn build(mut self) -> Result<RunConfig> {
        // Children run in the workload directory, so every path handed to
        // them must be absolute
        self.config.output_dir = absolute(self.config.output_dir);
        if self.config.runtime.components().count() > 1 {
            self.config.runtime = absolute(self.config.runtime);
        }
        self.config.validate()?;
        Ok(self.config)
    }
}

/// `path` joined onto the current directory unless already absolute.
pub(crate) fn absolute(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path,
    }
}

/// Resolve the runtime executable from the CLI flag, the environment and an
/// optional driver script, in that order of precedence.
///
/// # Errors
///
/// Returns [`Error::Config`] when a driver script is given but missing.
pub fn resolve_runtime(explicit: Option<PathBuf>, driver_script: Option<&Path>) -> Result<PathBuf> {
    let env_value = std::env::var(RUNTIME_ENV_VAR).ok();
    resolve_runtime_with(explicit, env_value.as_deref(), driver_script)
}

/// Same as [`resolve_runtime`] with the environment value passed in.
///
/// # Errors
///
/// Returns [`Error::Config`] when a driver script is given but missing.
pub fn resolve_runtime_with(
    explicit: Option<PathBuf>,
    env_value: Option<&str>,
    driver_script: Option<&Path>,
) -> Result<PathBuf> {
    // A named driver script must exist even when it ends up unused
    let from_script = match driver_script {
        Some(script) if !script.is_file() => {
            return Err(Error::Config(format!(
                "driver script not found: {}",
                script.display()
            )));
        }
        Some(script) => runtime_from_driver_script(script),
        None => None,
    };

    if let Some(path) = explicit {
        return Ok(path);
    }
    if let Some(value) = env_value.map(str::trim).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(value));
    }
    Ok(from_script.unwrap_or_else(|| PathBuf::from(DEFAULT_RUNTIME)))
}

/// Read the first `JAVA=` assignment of a shell driver script.
///
/// Exploded JDK builds (`.../build/<conf>/jdk/bin/java`) are swapped for the
/// packaged `images/jdk` when it exists; exploded builds reject AOT caches.
fn runtime_from_driver_script(script: &Path) -> Option<PathBuf> {
    let text = match std::fs::read_to_string(script) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(script = %script.display(), error = %e, "cannot read driver script");
            return None;
        }
    };

    let candidate = text.lines().find_map(|line| {
        line.strip_prefix("JAVA=")
            .map(|value| value.trim().trim_matches('"').trim_matches('\'').to_string())
    })?;
    if candidate.is_empty() {
        return None;
    }

    if candidate.contains("/build/") && candidate.contains("/jdk/bin/java") {
        let images = PathBuf::from(candidate.replace("/jdk/bin/java", "/images/jdk/bin/java"));
        if images.exists() {
            return Some(images);
        }
    }
    Some(PathBuf::from(candidate))
}
