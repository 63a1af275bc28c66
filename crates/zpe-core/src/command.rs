//! External program invocation.
//!
//! Every program this crate runs is described by an [`Invocation`]: a
//! program path plus a discrete argument list. Nothing is ever joined
//! into a string that a shell would re-parse; the [`fmt::Display`] form
//! exists for audit output only.

use std::fmt;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;

use zpe_common::constants::SANITIZED_PATH;
use zpe_common::error::{Result, ZpeError};

/// A program and its arguments, passed to the OS as a list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Absolute path of the program to run.
    pub program: PathBuf,
    /// Arguments, one element per argv entry.
    pub args: Vec<String>,
}

impl Invocation {
    /// Creates an invocation of `program` with `args`.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Returns this invocation wrapped as `sudo -n <program> <args...>`.
    #[must_use]
    pub fn through_sudo(&self, sudo: impl Into<PathBuf>) -> Self {
        let mut args = Vec::with_capacity(self.args.len() + 2);
        args.push("-n".to_owned());
        args.push(self.program.to_string_lossy().into_owned());
        args.extend(self.args.iter().cloned());
        Self {
            program: sudo.into(),
            args,
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured result of a finished program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output from the command.
    pub stdout: String,
    /// Standard error from the command.
    pub stderr: String,
    /// Exit code returned by the command, `-1` if killed by a signal.
    pub exit_code: i32,
}

impl CommandOutput {
    /// Returns whether the program exited with code 0.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs invocations to completion and captures their output.
pub trait CommandRunner: Send + Sync {
    /// Runs `invocation`, blocking until it exits.
    ///
    /// # Errors
    ///
    /// Returns an error only if the program could not be started; a
    /// non-zero exit is reported through [`CommandOutput::exit_code`].
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput>;
}

impl<T: CommandRunner + ?Sized> CommandRunner for Arc<T> {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        (**self).run(invocation)
    }
}

/// Runs invocations as real child processes.
///
/// The child gets an empty environment apart from a fixed `PATH` and
/// `LC_ALL=C`, and `/dev/null` as stdin.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        tracing::debug!(command = %invocation, "spawning");
        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .env_clear()
            .env("PATH", SANITIZED_PATH)
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .output()
            .map_err(|e| ZpeError::Spawn {
                program: invocation.program.clone(),
                source: e,
            })?;

        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        };
        tracing::debug!(
            command = %invocation,
            exit_code = result.exit_code,
            "command finished"
        );
        Ok(result)
    }
}
