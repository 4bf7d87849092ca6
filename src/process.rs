//! Child process invocation
//!
//! One call spawns one child, blocks until it exits and returns everything it
//! printed. A nonzero exit is data, not an error: only a failure to spawn is
//! reported as [`Error::ProcessStart`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::{Error, Result};

/// A fully resolved command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: PathBuf,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl CommandSpec {
    /// Create a command for `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments in order.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run the command inside `dir`.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Program path.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments, in order.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Working directory, if any.
    #[must_use]
    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Everything a finished child left behind.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InvocationOutput {
    /// Exit code, `-1` when the child was terminated by a signal
    pub exit_code: i32,
    /// Captured standard output (lossy UTF-8)
    pub stdout: String,
    /// Captured standard error (lossy UTF-8)
    pub stderr: String,
}

impl InvocationOutput {
    /// Whether the child exited with status 0.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs external commands to completion.
///
/// Implementations must be synchronous: `invoke` returns only once the child
/// has exited and its output is fully captured.
pub trait ProcessInvoker {
    /// Execute `command` and capture its exit code and output.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProcessStart`] only when the process cannot be spawned.
    fn invoke(&self, command: &CommandSpec) -> Result<InvocationOutput>;
}

impl<T: ProcessInvoker + ?Sized> ProcessInvoker for &T {
    fn invoke(&self, command: &CommandSpec) -> Result<InvocationOutput> {
        (**self).invoke(command)
    }
}

/// [`ProcessInvoker`] backed by `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemInvoker;

impl SystemInvoker {
    /// Create a new system invoker
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ProcessInvoker for SystemInvoker {
    fn invoke(&self, command: &CommandSpec) -> Result<InvocationOutput> {
        tracing::debug!(command = %command, cwd = ?command.working_dir(), "spawning");

        let mut cmd = Command::new(command.program());
        cmd.args(command.arguments());
        if let Some(dir) = command.working_dir() {
            cmd.current_dir(dir);
        }

        let output = cmd.output().map_err(|source| Error::ProcessStart {
            program: command.program().display().to_string(),
            source,
        })?;

        let result = InvocationOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        tracing::debug!(
            exit_code = result.exit_code,
            stdout_bytes = output.stdout.len(),
            stderr_bytes = output.stderr.len(),
            "process exited"
        );
        Ok(result)
    }
}
