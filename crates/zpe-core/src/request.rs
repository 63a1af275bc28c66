//! Caller-supplied action requests.

use std::fmt;

use zpe_common::constants::{ACTION_CREATE, ACTION_DESTROY, ACTION_SET_MOUNTPOINT};
use zpe_common::types::ReasonCode;

use crate::validate::{validate_character_set, validate_dataset_syntax};

/// One privileged action asked for by an unprivileged caller.
///
/// Built per invocation from untrusted arguments, validated, and dropped
/// once the executor returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionRequest {
    /// Create a fileset mounted at `mountpoint`.
    CreateFileset {
        /// Full path of the new dataset.
        dataset_path: String,
        /// Requested mountpoint.
        mountpoint: String,
    },
    /// Destroy a fileset (non-recursively).
    DestroyFileset {
        /// Full path of the dataset.
        dataset_path: String,
    },
    /// Change the mountpoint of an existing fileset.
    SetMountpoint {
        /// Full path of the dataset.
        dataset_path: String,
        /// Requested new mountpoint.
        new_mountpoint: String,
    },
}

impl ActionRequest {
    /// Action name as used on the command line.
    #[must_use]
    pub const fn action(&self) -> &'static str {
        match self {
            Self::CreateFileset { .. } => ACTION_CREATE,
            Self::DestroyFileset { .. } => ACTION_DESTROY,
            Self::SetMountpoint { .. } => ACTION_SET_MOUNTPOINT,
        }
    }

    /// Target dataset of the request.
    #[must_use]
    pub fn dataset_path(&self) -> &str {
        match self {
            Self::CreateFileset { dataset_path, .. }
            | Self::DestroyFileset { dataset_path }
            | Self::SetMountpoint { dataset_path, .. } => dataset_path,
        }
    }

    /// Requested mountpoint, for actions that take one.
    #[must_use]
    pub fn requested_mountpoint(&self) -> Option<&str> {
        match self {
            Self::CreateFileset { mountpoint, .. } => Some(mountpoint),
            Self::SetMountpoint { new_mountpoint, .. } => Some(new_mountpoint),
            Self::DestroyFileset { .. } => None,
        }
    }

    /// Syntactic checks on every caller-supplied string, run before any
    /// lookup or command construction.
    ///
    /// # Errors
    ///
    /// Returns [`ReasonCode::DisallowedCharacters`] or
    /// [`ReasonCode::MalformedName`].
    pub fn check_syntax(&self) -> Result<(), ReasonCode> {
        validate_character_set(self.dataset_path()).into_result()?;
        if let Some(mountpoint) = self.requested_mountpoint() {
            validate_character_set(mountpoint).into_result()?;
        }
        validate_dataset_syntax(self.dataset_path()).into_result()
    }
}

impl fmt::Display for ActionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.action(), self.dataset_path())?;
        if let Some(mountpoint) = self.requested_mountpoint() {
            write!(f, " {mountpoint}")?;
        }
        Ok(())
    }
}
