//! The containment policy.
//!
//! A [`Policy`] is built once from trusted configuration and never
//! mutated. Every component receives it by reference, so all validation
//! steps of a request see the same values.

use std::path::{Path, PathBuf};

use nix::unistd::{AccessFlags, access};
use zpe_common::config::PolicyFile;
use zpe_common::constants::{SANITIZED_PATH, SUDO_PROGRAM};
use zpe_common::error::{Result, ZpeError};
use zpe_common::types::EscalationMode;

use crate::validate::{validate_dataset_name, validate_pool_name};

/// Immutable containment policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    parent_dataset: String,
    parent_directory: PathBuf,
    privileged_binary: PathBuf,
    escalation: EscalationMode,
    sudo_binary: Option<PathBuf>,
}

impl Policy {
    /// Builds a policy, locating `sudo` on [`SANITIZED_PATH`] if the mode
    /// needs it.
    ///
    /// # Errors
    ///
    /// Returns [`ZpeError::Config`] if any value is unusable.
    pub fn new(
        parent_dataset: impl Into<String>,
        parent_directory: impl Into<PathBuf>,
        privileged_binary: impl Into<PathBuf>,
        escalation: EscalationMode,
    ) -> Result<Self> {
        Self::from_file(PolicyFile {
            parent_dataset: parent_dataset.into(),
            parent_directory: parent_directory.into(),
            privileged_binary: privileged_binary.into(),
            escalation,
            sudo_binary: None,
        })
    }

    /// Validates a parsed policy file.
    ///
    /// Existence of the parent directory and parent dataset is *not*
    /// checked here; those are re-checked on every request.
    ///
    /// # Errors
    ///
    /// Returns [`ZpeError::Config`] if any value is unusable.
    pub fn from_file(file: PolicyFile) -> Result<Self> {
        let name_check = validate_dataset_name(&file.parent_dataset)
            .into_result()
            .and_then(|()| validate_pool_name(&file.parent_dataset).into_result());
        if let Err(reason) = name_check {
            return Err(ZpeError::Config {
                message: format!("parent_dataset \"{}\": {reason}", file.parent_dataset),
            });
        }
        if !file.parent_directory.is_absolute() {
            return Err(ZpeError::Config {
                message: format!(
                    "parent_directory must be absolute: {}",
                    file.parent_directory.display()
                ),
            });
        }
        check_executable("privileged_binary", &file.privileged_binary)?;

        let sudo_binary = if file.escalation.needs_escalator() {
            let sudo = match file.sudo_binary {
                Some(path) => path,
                None => locate_sudo(SANITIZED_PATH).map_err(|e| ZpeError::Config {
                    message: format!("escalation mode {} needs sudo_binary: {e}", file.escalation),
                })?,
            };
            check_executable("sudo_binary", &sudo)?;
            Some(sudo)
        } else {
            None
        };

        tracing::debug!(
            parent_dataset = %file.parent_dataset,
            parent_directory = %file.parent_directory.display(),
            privileged_binary = %file.privileged_binary.display(),
            escalation = %file.escalation,
            "policy loaded"
        );

        Ok(Self {
            parent_dataset: file.parent_dataset,
            parent_directory: file.parent_directory,
            privileged_binary: file.privileged_binary,
            escalation: file.escalation,
            sudo_binary,
        })
    }

    /// Reads, parses and validates the policy file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<Self> {
        Self::from_file(PolicyFile::load(path)?)
    }

    /// Dataset subtree root callers may operate within.
    #[must_use]
    pub fn parent_dataset(&self) -> &str {
        &self.parent_dataset
    }

    /// Directory subtree root mountpoints must resolve within.
    #[must_use]
    pub fn parent_directory(&self) -> &Path {
        &self.parent_directory
    }

    /// Storage-tool executable used for the privileged call.
    #[must_use]
    pub fn privileged_binary(&self) -> &Path {
        &self.privileged_binary
    }

    /// How privilege is obtained for the privileged call.
    #[must_use]
    pub const fn escalation(&self) -> EscalationMode {
        self.escalation
    }

    /// `sudo` executable; present exactly when the mode may escalate.
    #[must_use]
    pub fn sudo_binary(&self) -> Option<&Path> {
        self.sudo_binary.as_deref()
    }
}

/// Finds `sudo` on `search_path` only. The caller's `PATH` is never
/// consulted, so a setuid install cannot be pointed at another program.
fn locate_sudo(search_path: &str) -> which::Result<PathBuf> {
    which::which_in(SUDO_PROGRAM, Some(search_path), "/")
}

pub(crate) fn check_executable(field: &str, path: &Path) -> Result<()> {
    if !path.is_absolute() {
        return Err(ZpeError::Config {
            message: format!("{field} must be absolute: {}", path.display()),
        });
    }
    let metadata = std::fs::metadata(path).map_err(|e| ZpeError::Config {
        message: format!("{field} {}: {e}", path.display()),
    })?;
    if !metadata.is_file() {
        return Err(ZpeError::Config {
            message: format!("{field} must be a file: {}", path.display()),
        });
    }
    access(path, AccessFlags::X_OK).map_err(|e| ZpeError::Config {
        message: format!("{field} must be executable: {} ({e})", path.display()),
    })?;
    Ok(())
}
