//! On-disk policy file model.
//!
//! This is the raw, administrator-written shape of the policy. Semantic
//! checks live in `zpe_core::policy::Policy`, which is the only thing the
//! mediation code ever sees.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, ZpeError};
use crate::types::EscalationMode;

/// Policy file contents as written by the administrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyFile {
    /// Dataset subtree root callers may operate within.
    pub parent_dataset: String,
    /// Directory subtree root mountpoints must resolve within.
    pub parent_directory: PathBuf,
    /// Storage-tool executable used for the privileged call.
    #[serde(default = "default_privileged_binary")]
    pub privileged_binary: PathBuf,
    /// How privilege is obtained for the privileged call.
    #[serde(default)]
    pub escalation: EscalationMode,
    /// `sudo` executable; looked up on `PATH` when absent and needed.
    #[serde(default)]
    pub sudo_binary: Option<PathBuf>,
}

fn default_privileged_binary() -> PathBuf {
    PathBuf::from(crate::constants::DEFAULT_PRIVILEGED_BINARY)
}

impl PolicyFile {
    /// Parses a policy from its JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid policy document.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Reads and parses the policy file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ZpeError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json(&text)
    }
}
