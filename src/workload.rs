//! Workload definitions
//!
//! A workload is loaded from JSON as a [`WorkloadConfig`] and resolved once
//! into an immutable [`Workload`] before the batch starts: its working
//! directory is checked and its classpath is materialized (building the
//! distribution first when needed).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::absolute;
use crate::process::{CommandSpec, ProcessInvoker};
use crate::{Error, Result};

/// Placeholder expanded to the phase's invocation count.
pub const INVOCATIONS_PLACEHOLDER: &str = "{invocations}";

/// Placeholder expanded to the phase's output file path.
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

#[cfg(windows)]
const CLASSPATH_SEPARATOR: &str = ";";
#[cfg(not(windows))]
const CLASSPATH_SEPARATOR: &str = ":";

/// How a workload reports its measurements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputConvention {
    /// One measurement per line on standard output
    #[default]
    Stdout,
    /// CSV table written to the `{output}` path
    File {
        /// Column holding the measurements
        column: String,
    },
}

/// Where the classpath comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClasspathConfig {
    /// Explicit entries, used as-is
    Entries(Vec<String>),
    /// Every file in this directory (relative to the working directory), sorted
    LibDir(PathBuf),
}

/// Serialized form of a workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkloadConfig {
    /// Unique name; also used for artifact and output file names
    pub name: String,
    /// Working directory; defaults to a directory named after the workload
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Classpath source
    pub classpath: ClasspathConfig,
    /// Entry point
    pub main_class: String,
    /// Argument template, may contain `{invocations}` and `{output}`
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    /// Output convention
    #[serde(default)]
    pub output: OutputConvention,
    /// Command producing the library directory when it is missing or empty
    #[serde(default)]
    pub build: Option<Vec<String>>,
}

fn default_args() -> Vec<String> {
    vec![INVOCATIONS_PLACEHOLDER.to_string()]
}

impl WorkloadConfig {
    /// Resolve into an immutable [`Workload`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an invalid name, a missing working
    /// directory or an empty classpath, and propagates failures of the build
    /// command.
    pub fn resolve(&self, invoker: &dyn ProcessInvoker) -> Result<Workload> {
        validate_name(&self.name)?;

        let working_dir = absolute(
            self.working_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(&self.name)),
        );
        if !working_dir.is_dir() {
            return Err(Error::Config(format!(
                "working directory of `{}` not found: {}",
                self.name,
                working_dir.display()
            )));
        }

        let classpath = match &self.classpath {
            ClasspathConfig::Entries(entries) if entries.is_empty() => {
                return Err(Error::Config(format!("empty classpath for `{}`", self.name)));
            }
            ClasspathConfig::Entries(entries) => entries.join(CLASSPATH_SEPARATOR),
            ClasspathConfig::LibDir(lib) => {
                let lib_dir = working_dir.join(lib);
                if list_dir_sorted(&lib_dir).is_empty() {
                    self.run_build(&working_dir, invoker)?;
                }
                let jars = list_dir_sorted(&lib_dir);
                if jars.is_empty() {
                    return Err(Error::Config(format!(
                        "no classpath entries in {}; did the build succeed?",
                        lib_dir.display()
                    )));
                }
                jars.iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(CLASSPATH_SEPARATOR)
            }
        };

        Ok(Workload {
            name: self.name.clone(),
            working_dir,
            classpath,
            main_class: self.main_class.clone(),
            args: self.args.clone(),
            output: self.output.clone(),
        })
    }

    fn run_build(&self, working_dir: &Path, invoker: &dyn ProcessInvoker) -> Result<()> {
        let Some((program, args)) = self.build.as_ref().and_then(|cmd| cmd.split_first()) else {
            return Ok(());
        };
        tracing::info!(workload = %self.name, command = ?self.build, "building workload");
        let command = CommandSpec::new(program).args(args.iter().cloned()).current_dir(working_dir);
        let output = invoker.invoke(&command)?;
        if !output.success() {
            return Err(Error::PhaseExecution {
                workload: self.name.clone(),
                phase: "build".to_string(),
                exit_code: output.exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(Error::Config(format!("invalid workload name `{name}`")));
    }
    Ok(())
}

fn list_dir_sorted(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut paths: Vec<PathBuf> = entries
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .collect();
    paths.sort();
    paths
}

/// Load workload definitions from a JSON array.
///
/// Relative working directories are resolved against the file's directory.
///
/// # Errors
///
/// Returns [`Error::Config`] when the file cannot be read or parsed, or when
/// two workloads share a name.
pub fn load_workloads(path: &Path) -> Result<Vec<WorkloadConfig>> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("cannot read workloads file {}: {e}", path.display()))
    })?;
    let mut workloads: Vec<WorkloadConfig> = serde_json::from_str(&text).map_err(|e| {
        Error::Config(format!("invalid workloads file {}: {e}", path.display()))
    })?;

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    for workload in &mut workloads {
        let dir = workload
            .working_dir
            .take()
            .unwrap_or_else(|| PathBuf::from(&workload.name));
        workload.working_dir = Some(if dir.is_absolute() { dir } else { base.join(dir) });
    }

    for (i, workload) in workloads.iter().enumerate() {
        if workloads[..i].iter().any(|w| w.name == workload.name) {
            return Err(Error::Config(format!("duplicate workload `{}`", workload.name)));
        }
    }
    Ok(workloads)
}

/// Keep only the named workloads, preserving file order.
///
/// # Errors
///
/// Returns [`Error::Config`] for names that are not defined.
pub fn select_workloads(workloads: Vec<WorkloadConfig>, only: &[String]) -> Result<Vec<WorkloadConfig>> {
    if only.is_empty() {
        return Ok(workloads);
    }
    if let Some(unknown) = only.iter().find(|n| !workloads.iter().any(|w| &w.name == *n)) {
        return Err(Error::Config(format!("unknown workload `{unknown}`")));
    }
    Ok(workloads
        .into_iter()
        .filter(|w| only.contains(&w.name))
        .collect())
}

/// A resolved, immutable workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workload {
    name: String,
    working_dir: PathBuf,
    classpath: String,
    main_class: String,
    args: Vec<String>,
    output: OutputConvention,
}

impl Workload {
    /// Create a workload directly, bypassing config resolution.
    ///
    /// Arguments default to `{invocations}` and output to stdout.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        working_dir: impl Into<PathBuf>,
        classpath: impl Into<String>,
        main_class: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            working_dir: absolute(working_dir.into()),
            classpath: classpath.into(),
            main_class: main_class.into(),
            args: default_args(),
            output: OutputConvention::Stdout,
        }
    }

    /// Replace the argument template.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the output convention.
    #[must_use]
    pub fn with_output(mut self, output: OutputConvention) -> Self {
        self.output = output;
        self
    }

    /// Workload name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Working directory.
    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Resolved classpath.
    #[must_use]
    pub fn classpath(&self) -> &str {
        &self.classpath
    }

    /// Entry point.
    #[must_use]
    pub fn main_class(&self) -> &str {
        &self.main_class
    }

    /// Output convention.
    #[must_use]
    pub const fn output(&self) -> &OutputConvention {
        &self.output
    }

    /// Expand the argument template for one run.
    #[must_use]
    pub fn expand_args(&self, invocations: u32, output: &Path) -> Vec<String> {
        let invocations = invocations.to_string();
        let output = output.display().to_string();
        self.args
            .iter()
            .map(|arg| {
                arg.replace(INVOCATIONS_PLACEHOLDER, &invocations)
                    .replace(OUTPUT_PLACEHOLDER, &output)
            })
            .collect()
    }
}
