//! Unprivileged-side access to the helper binary.
//!
//! A library running as an ordinary user calls [`HelperClient`] instead
//! of the storage tool when it needs one of the mediated actions. The
//! client runs the helper with a discrete argv and turns its exit code
//! back into a typed result.

use std::path::{Path, PathBuf};

use thiserror::Error;
use zpe_common::error::ZpeError;
use zpe_common::types::{ExitStatus, ReasonCode};

use crate::command::{CommandOutput, CommandRunner, Invocation, SystemRunner};
use crate::policy::check_executable;
use crate::request::ActionRequest;

/// Failure reported by, or while invoking, the helper.
#[derive(Debug, Error)]
pub enum HelperError {
    /// The request was refused locally, before the helper was run.
    #[error("request rejected before invoking helper: {0}")]
    Invalid(ReasonCode),

    /// The helper ran and exited with one of its documented failure codes.
    #[error("helper failed with {status}: {}", .stderr.trim())]
    Failed {
        /// Decoded exit status.
        status: ExitStatus,
        /// Captured standard output.
        stdout: String,
        /// Captured standard error.
        stderr: String,
    },

    /// The helper exited with a code outside the documented table.
    #[error("helper exited with unknown code {code}: {}", .stderr.trim())]
    UnknownExit {
        /// Raw exit code, `-1` if killed by a signal.
        code: i32,
        /// Captured standard output.
        stdout: String,
        /// Captured standard error.
        stderr: String,
    },

    /// The helper could not be located or started.
    #[error(transparent)]
    Setup(#[from] ZpeError),
}

impl HelperError {
    /// Exit status of the helper, if it ran and reported one of ours.
    #[must_use]
    pub const fn status(&self) -> Option<ExitStatus> {
        match self {
            Self::Failed { status, .. } => Some(*status),
            Self::Invalid(reason) => Some(reason.exit_status()),
            Self::UnknownExit { .. } | Self::Setup(_) => None,
        }
    }
}

/// Runs the privileged helper on behalf of an unprivileged caller.
pub struct HelperClient {
    executable: PathBuf,
    runner: Box<dyn CommandRunner>,
}

impl std::fmt::Debug for HelperClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HelperClient")
            .field("executable", &self.executable)
            .finish_non_exhaustive()
    }
}

impl HelperClient {
    /// Creates a client for the helper at `executable`.
    ///
    /// # Errors
    ///
    /// Returns an error unless `executable` is an absolute path to a
    /// regular, executable file.
    pub fn new(executable: impl Into<PathBuf>) -> Result<Self, HelperError> {
        Self::with_runner(executable, Box::new(SystemRunner))
    }

    /// Creates a client that runs the helper through `runner`.
    ///
    /// # Errors
    ///
    /// Same as [`HelperClient::new`].
    pub fn with_runner(
        executable: impl Into<PathBuf>,
        runner: Box<dyn CommandRunner>,
    ) -> Result<Self, HelperError> {
        let executable = executable.into();
        check_executable("helper", &executable)?;
        tracing::debug!(executable = %executable.display(), "using privilege escalation helper");
        Ok(Self { executable, runner })
    }

    /// Path of the helper executable.
    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Asks the helper to create `dataset` mounted at `mountpoint`.
    ///
    /// # Errors
    ///
    /// Returns a [`HelperError`] describing the refusal or failure.
    pub fn create_fileset(&self, dataset: &str, mountpoint: &Path) -> Result<CommandOutput, HelperError> {
        self.invoke(&ActionRequest::CreateFileset {
            dataset_path: dataset.to_owned(),
            mountpoint: mountpoint.to_string_lossy().into_owned(),
        })
    }

    /// Asks the helper to destroy `dataset`.
    ///
    /// # Errors
    ///
    /// Returns a [`HelperError`] describing the refusal or failure.
    pub fn destroy_fileset(&self, dataset: &str) -> Result<CommandOutput, HelperError> {
        self.invoke(&ActionRequest::DestroyFileset {
            dataset_path: dataset.to_owned(),
        })
    }

    /// Asks the helper to move `dataset` to `mountpoint`.
    ///
    /// # Errors
    ///
    /// Returns a [`HelperError`] describing the refusal or failure.
    pub fn set_mountpoint(&self, dataset: &str, mountpoint: &Path) -> Result<CommandOutput, HelperError> {
        self.invoke(&ActionRequest::SetMountpoint {
            dataset_path: dataset.to_owned(),
            new_mountpoint: mountpoint.to_string_lossy().into_owned(),
        })
    }

    fn invoke(&self, request: &ActionRequest) -> Result<CommandOutput, HelperError> {
        request.check_syntax().map_err(HelperError::Invalid)?;

        let mut args = vec![
            request.action().to_owned(),
            request.dataset_path().to_owned(),
        ];
        if let Some(mountpoint) = request.requested_mountpoint() {
            args.push(mountpoint.to_owned());
        }
        let invocation = Invocation::new(&self.executable, args);
        tracing::debug!(command = %invocation, "running helper");

        let output = self.runner.run(&invocation)?;
        match ExitStatus::from_code(output.exit_code) {
            Some(ExitStatus::Success) => {
                tracing::info!(%request, "helper successful");
                Ok(output)
            }
            Some(status) => {
                tracing::error!(%request, %status, "helper failed");
                Err(HelperError::Failed {
                    status,
                    stdout: output.stdout,
                    stderr: output.stderr,
                })
            }
            None => {
                tracing::error!(%request, code = output.exit_code, "helper exited with unknown code");
                Err(HelperError::UnknownExit {
                    code: output.exit_code,
                    stdout: output.stdout,
                    stderr: output.stderr,
                })
            }
        }
    }
}
