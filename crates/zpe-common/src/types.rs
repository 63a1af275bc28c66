//! Domain primitive types used across the zpe workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Why a request was refused before any privileged call was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReasonCode {
    /// The configured parent directory is missing or not a directory.
    ParentDirectoryMissing,
    /// The configured parent dataset does not exist.
    ParentDatasetMissing,
    /// The target dataset is not below the configured parent dataset.
    NotChildOfParentDataset,
    /// The dataset one level above the new dataset does not exist.
    ParentOfNewDatasetMissing,
    /// The resolved mountpoint lies outside the configured parent directory.
    MountpointNotUnderParentDirectory,
    /// The target dataset does not exist.
    DatasetMissing,
    /// The target dataset exists but is not a fileset.
    DatasetNotAFileset,
    /// The mountpoint could not be resolved to a real path.
    MountpointUnresolvable,
    /// An argument is empty or contains a character outside the allow-list.
    DisallowedCharacters,
    /// A dataset path has empty, `.` or `..` components or is too long.
    MalformedName,
}

impl ReasonCode {
    /// Every reason code, in declaration order.
    pub const ALL: [Self; 10] = [
        Self::ParentDirectoryMissing,
        Self::ParentDatasetMissing,
        Self::NotChildOfParentDataset,
        Self::ParentOfNewDatasetMissing,
        Self::MountpointNotUnderParentDirectory,
        Self::DatasetMissing,
        Self::DatasetNotAFileset,
        Self::MountpointUnresolvable,
        Self::DisallowedCharacters,
        Self::MalformedName,
    ];

    /// Returns the exit status this rejection is reported with.
    #[must_use]
    pub const fn exit_status(self) -> ExitStatus {
        match self {
            Self::DisallowedCharacters | Self::MalformedName => ExitStatus::General,
            Self::ParentDirectoryMissing => ExitStatus::ParentDirectory,
            Self::ParentDatasetMissing => ExitStatus::ParentDataset,
            Self::NotChildOfParentDataset
            | Self::ParentOfNewDatasetMissing
            | Self::DatasetMissing => ExitStatus::DatasetContainment,
            Self::MountpointNotUnderParentDirectory
            | Self::MountpointUnresolvable
            | Self::DatasetNotAFileset => ExitStatus::MountpointContainment,
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::ParentDirectoryMissing => "parent directory does not exist or is not a directory",
            Self::ParentDatasetMissing => "parent dataset does not exist",
            Self::NotChildOfParentDataset => "dataset is not a child of the parent dataset",
            Self::ParentOfNewDatasetMissing => "parent of the new dataset does not exist",
            Self::MountpointNotUnderParentDirectory => {
                "mountpoint is not inside the parent directory"
            }
            Self::DatasetMissing => "dataset does not exist",
            Self::DatasetNotAFileset => "dataset is not a fileset",
            Self::MountpointUnresolvable => "mountpoint cannot be resolved",
            Self::DisallowedCharacters => "argument is empty or contains disallowed characters",
            Self::MalformedName => "dataset path is malformed",
        };
        f.write_str(text)
    }
}

/// Stable process exit codes of the privileged helper.
///
/// Callers treat these as authoritative; the numeric values never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ExitStatus {
    /// The privileged call succeeded.
    Success = 0,
    /// Bad arity, unknown action, bad argument text, or unusable policy.
    General = 1,
    /// Configured parent directory missing or not a directory.
    ParentDirectory = 2,
    /// Configured parent dataset missing.
    ParentDataset = 3,
    /// Dataset outside the parent dataset, or a required level missing.
    DatasetContainment = 4,
    /// Mountpoint outside the parent directory, unresolvable, or not a fileset.
    MountpointContainment = 5,
    /// The storage tool ran and reported failure.
    ExecutionFailed = 6,
}

impl ExitStatus {
    /// Returns the numeric process exit code.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Maps a process exit code back to its status, if it is one of ours.
    #[must_use]
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Success),
            1 => Some(Self::General),
            2 => Some(Self::ParentDirectory),
            3 => Some(Self::ParentDataset),
            4 => Some(Self::DatasetContainment),
            5 => Some(Self::MountpointContainment),
            6 => Some(Self::ExecutionFailed),
            _ => None,
        }
    }

    /// Human-readable meaning of the code.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::General => "general error: wrong parameters or configuration problem",
            Self::ParentDirectory => "parent directory does not exist or is not a directory",
            Self::ParentDataset => "parent dataset does not exist",
            Self::DatasetContainment => {
                "target fileset is not a (grand)child of parent or parent does not exist"
            }
            Self::MountpointContainment => {
                "mountpoint is not inside the parent directory or otherwise invalid"
            }
            Self::ExecutionFailed => "calling the storage tool failed",
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.code(), self.description())
    }
}

/// How the executor obtains the privilege needed for the storage-tool call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscalationMode {
    /// Already privileged; call the storage tool directly.
    #[default]
    Direct,
    /// Always go through `sudo`.
    Proactive,
    /// Try at ambient privilege, retry once through `sudo` on a permission failure.
    Reactive,
    /// Never escalate; permission failures surface as-is.
    Disabled,
}

impl EscalationMode {
    /// Returns whether this mode may ever invoke the escalation mechanism.
    #[must_use]
    pub const fn needs_escalator(self) -> bool {
        matches!(self, Self::Proactive | Self::Reactive)
    }
}

impl fmt::Display for EscalationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Proactive => write!(f, "proactive"),
            Self::Reactive => write!(f, "reactive"),
            Self::Disabled => write!(f, "disabled"),
        }
    }
}

/// Kind of a dataset as reported by the storage tool's `type` property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetType {
    /// A mountable fileset (`filesystem`).
    Fileset,
    /// A block volume.
    Volume,
    /// A snapshot.
    Snapshot,
    /// A bookmark.
    Bookmark,
}

impl DatasetType {
    /// Parses the value of the storage tool's `type` property.
    #[must_use]
    pub fn from_property(value: &str) -> Option<Self> {
        match value.trim() {
            "filesystem" => Some(Self::Fileset),
            "volume" => Some(Self::Volume),
            "snapshot" => Some(Self::Snapshot),
            "bookmark" => Some(Self::Bookmark),
            _ => None,
        }
    }
}

impl fmt::Display for DatasetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fileset => write!(f, "filesystem"),
            Self::Volume => write!(f, "volume"),
            Self::Snapshot => write!(f, "snapshot"),
            Self::Bookmark => write!(f, "bookmark"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_stable() {
        assert_eq!(ExitStatus::Success.code(), 0);
        assert_eq!(ExitStatus::General.code(), 1);
        assert_eq!(ExitStatus::ParentDirectory.code(), 2);
        assert_eq!(ExitStatus::ParentDataset.code(), 3);
        assert_eq!(ExitStatus::DatasetContainment.code(), 4);
        assert_eq!(ExitStatus::MountpointContainment.code(), 5);
        assert_eq!(ExitStatus::ExecutionFailed.code(), 6);
    }

    #[test]
    fn from_code_inverts_code() {
        for code in 0..=6 {
            let status = ExitStatus::from_code(code).unwrap();
            assert_eq!(i32::from(status.code()), code);
        }
        assert_eq!(ExitStatus::from_code(7), None);
        assert_eq!(ExitStatus::from_code(-1), None);
    }

    #[test]
    fn no_reason_maps_to_success_or_execution_failure() {
        for reason in ReasonCode::ALL {
            let status = reason.exit_status();
            assert_ne!(status, ExitStatus::Success, "{reason:?}");
            assert_ne!(status, ExitStatus::ExecutionFailed, "{reason:?}");
        }
    }

    #[test]
    fn containment_reasons_map_to_documented_codes() {
        assert_eq!(ReasonCode::NotChildOfParentDataset.exit_status().code(), 4);
        assert_eq!(ReasonCode::ParentOfNewDatasetMissing.exit_status().code(), 4);
        assert_eq!(ReasonCode::MountpointNotUnderParentDirectory.exit_status().code(), 5);
        assert_eq!(ReasonCode::MountpointUnresolvable.exit_status().code(), 5);
        assert_eq!(ReasonCode::DatasetNotAFileset.exit_status().code(), 5);
        assert_eq!(ReasonCode::ParentDirectoryMissing.exit_status().code(), 2);
        assert_eq!(ReasonCode::ParentDatasetMissing.exit_status().code(), 3);
    }

    #[test]
    fn escalation_mode_deserializes_lowercase() {
        let mode: EscalationMode = serde_json::from_str("\"reactive\"").unwrap();
        assert_eq!(mode, EscalationMode::Reactive);
        assert!(serde_json::from_str::<EscalationMode>("\"Reactive\"").is_err());
    }

    #[test]
    fn only_sudo_modes_need_escalator() {
        assert!(EscalationMode::Proactive.needs_escalator());
        assert!(EscalationMode::Reactive.needs_escalator());
        assert!(!EscalationMode::Direct.needs_escalator());
        assert!(!EscalationMode::Disabled.needs_escalator());
    }

    #[test]
    fn dataset_type_parses_property_values() {
        assert_eq!(DatasetType::from_property("filesystem\n"), Some(DatasetType::Fileset));
        assert_eq!(DatasetType::from_property("volume"), Some(DatasetType::Volume));
        assert_eq!(DatasetType::from_property("-"), None);
    }
}
