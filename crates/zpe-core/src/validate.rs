//! Name and path validation.
//!
//! Everything here is side-effect free apart from read-only filesystem
//! lookups (`realpath`) and read-only dataset metadata queries. A check
//! either passes or names exactly one [`ReasonCode`]; any ambiguity is a
//! rejection.
//!
//! Ordering matters for mountpoints: the character check runs on the
//! requested text first, then the path is resolved through symbolic
//! links, and only the *resolved* path is compared against the parent
//! directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use zpe_common::constants::{ALLOWED_PUNCTUATION, DATASET_NAME_MAX_LEN};
use zpe_common::types::ReasonCode;

use crate::store::DatasetStore;

/// Result of a single validation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// The check passed.
    Valid,
    /// The check failed for the given reason.
    Rejected(ReasonCode),
}

impl ValidationOutcome {
    /// Returns whether the check passed.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        matches!(self, Self::Valid)
    }

    /// Returns the rejection reason, if any.
    #[must_use]
    pub const fn reason(self) -> Option<ReasonCode> {
        match self {
            Self::Valid => None,
            Self::Rejected(reason) => Some(reason),
        }
    }

    /// Converts into a `Result` so validation sequences can short-circuit with `?`.
    ///
    /// # Errors
    ///
    /// Returns the rejection reason if the check failed.
    pub const fn into_result(self) -> Result<(), ReasonCode> {
        match self {
            Self::Valid => Ok(()),
            Self::Rejected(reason) => Err(reason),
        }
    }
}

impl<T> From<Result<T, ReasonCode>> for ValidationOutcome {
    fn from(result: Result<T, ReasonCode>) -> Self {
        match result {
            Ok(_) => Self::Valid,
            Err(reason) => Self::Rejected(reason),
        }
    }
}

fn is_allowed_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || ALLOWED_PUNCTUATION.contains(&c)
}

/// Rejects empty strings and strings with characters outside
/// `[A-Za-z0-9_\-/.]`.
///
/// This runs before anything else touches caller input.
#[must_use]
pub fn validate_character_set(value: &str) -> ValidationOutcome {
    if !value.is_empty() && value.chars().all(is_allowed_char) {
        ValidationOutcome::Valid
    } else {
        ValidationOutcome::Rejected(ReasonCode::DisallowedCharacters)
    }
}

/// Checks the structure of a dataset path: bounded length and no empty,
/// `.` or `..` components.
#[must_use]
pub fn validate_dataset_syntax(name: &str) -> ValidationOutcome {
    if name.len() > DATASET_NAME_MAX_LEN {
        return ValidationOutcome::Rejected(ReasonCode::MalformedName);
    }
    let malformed = name
        .split('/')
        .any(|component| component.is_empty() || component == "." || component == "..");
    if malformed {
        ValidationOutcome::Rejected(ReasonCode::MalformedName)
    } else {
        ValidationOutcome::Valid
    }
}

/// Character-set check followed by the structural check.
#[must_use]
pub fn validate_dataset_name(name: &str) -> ValidationOutcome {
    validate_character_set(name)
        .into_result()
        .and_then(|()| validate_dataset_syntax(name).into_result())
        .into()
}

/// Pool names that are vdev keywords in `zpool create`.
const RESERVED_POOL_NAMES: &[&str] = &["mirror", "raidz", "spare", "log"];
/// Pool names may not even start with these.
const RESERVED_POOL_PREFIXES: &[&str] = &["mirror", "raidz", "spare"];

/// Checks the pool component of `name` (everything before the first `/`):
/// it starts with a letter, is not a vdev keyword, and does not look like a
/// Solaris disk name (`c0...`).
#[must_use]
pub fn validate_pool_name(name: &str) -> ValidationOutcome {
    let pool = name.split('/').next().unwrap_or_default();
    let mut chars = pool.chars();
    let starts_with_letter = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    let disk_like = pool.starts_with('c') && chars.next().is_some_and(|c| c.is_ascii_digit());
    let reserved = RESERVED_POOL_NAMES.contains(&pool)
        || RESERVED_POOL_PREFIXES
            .iter()
            .any(|prefix| pool.starts_with(prefix));
    if starts_with_letter && !disk_like && !reserved {
        ValidationOutcome::Valid
    } else {
        ValidationOutcome::Rejected(ReasonCode::MalformedName)
    }
}

/// `candidate` is contained iff it is textually `parent + "/" + suffix`
/// with a non-empty suffix. The candidate need not exist.
#[must_use]
pub fn validate_dataset_containment(candidate: &str, parent_dataset: &str) -> ValidationOutcome {
    let suffix = candidate
        .strip_prefix(parent_dataset)
        .and_then(|rest| rest.strip_prefix('/'));
    match suffix {
        Some(rest) if !rest.is_empty() => ValidationOutcome::Valid,
        _ => ValidationOutcome::Rejected(ReasonCode::NotChildOfParentDataset),
    }
}

/// Returns the dataset one level above `name`, or `None` for a pool root.
#[must_use]
pub fn immediate_parent_dataset(name: &str) -> Option<&str> {
    name.rsplit_once('/').map(|(parent, _)| parent)
}

/// Asks the store whether `name` exists.
///
/// A query failure is treated like a negative answer.
#[must_use]
pub fn validate_existing_dataset(store: &dyn DatasetStore, name: &str) -> ValidationOutcome {
    match store.exists(name) {
        Ok(true) => ValidationOutcome::Valid,
        Ok(false) => ValidationOutcome::Rejected(ReasonCode::DatasetMissing),
        Err(e) => {
            tracing::warn!(dataset = %name, error = %e, "dataset existence query failed");
            ValidationOutcome::Rejected(ReasonCode::DatasetMissing)
        }
    }
}

/// How much of a mountpoint must already exist on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The leaf may be missing, but its parent directory must resolve.
    LeafMayBeMissing,
    /// The whole path must resolve.
    MustExist,
}

/// Canonicalizes the configured parent directory and checks it is a directory.
///
/// # Errors
///
/// Returns [`ReasonCode::ParentDirectoryMissing`] if it does not resolve
/// or is not a directory.
pub fn canonical_parent_directory(parent_directory: &Path) -> Result<PathBuf, ReasonCode> {
    let canonical =
        fs::canonicalize(parent_directory).map_err(|_| ReasonCode::ParentDirectoryMissing)?;
    if canonical.is_dir() {
        Ok(canonical)
    } else {
        Err(ReasonCode::ParentDirectoryMissing)
    }
}

/// Resolves `path` through symbolic links to its real location.
///
/// # Errors
///
/// Returns [`ReasonCode::MountpointUnresolvable`] if the path is relative
/// or the required part of it does not resolve.
pub fn resolve_mountpoint(path: &Path, resolution: Resolution) -> Result<PathBuf, ReasonCode> {
    if !path.is_absolute() {
        return Err(ReasonCode::MountpointUnresolvable);
    }
    match resolution {
        Resolution::MustExist => {
            fs::canonicalize(path).map_err(|_| ReasonCode::MountpointUnresolvable)
        }
        Resolution::LeafMayBeMissing => match fs::symlink_metadata(path) {
            // Covers a leaf that is itself a symlink; dangling ones fail here.
            Ok(_) => fs::canonicalize(path).map_err(|_| ReasonCode::MountpointUnresolvable),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let leaf = path.file_name().ok_or(ReasonCode::MountpointUnresolvable)?;
                let parent = path.parent().ok_or(ReasonCode::MountpointUnresolvable)?;
                let parent =
                    fs::canonicalize(parent).map_err(|_| ReasonCode::MountpointUnresolvable)?;
                if !parent.is_dir() {
                    return Err(ReasonCode::MountpointUnresolvable);
                }
                Ok(parent.join(leaf))
            }
            Err(_) => Err(ReasonCode::MountpointUnresolvable),
        },
    }
}

/// Component-wise containment: equal to `root` or below it.
///
/// `/data2/x` is not within `/data`.
#[must_use]
pub fn is_within(path: &Path, root: &Path) -> bool {
    path.starts_with(root)
}

/// Resolves `path` and checks the real location is inside `parent_directory`.
///
/// Returns the resolved path so the caller can hand exactly the checked
/// location to the storage tool.
///
/// # Errors
///
/// Returns the first failing [`ReasonCode`].
pub fn resolve_contained_mountpoint(
    path: &Path,
    parent_directory: &Path,
    resolution: Resolution,
) -> Result<PathBuf, ReasonCode> {
    let root = canonical_parent_directory(parent_directory)?;
    let resolved = resolve_mountpoint(path, resolution)?;
    if is_within(&resolved, &root) {
        Ok(resolved)
    } else {
        tracing::debug!(
            requested = %path.display(),
            resolved = %resolved.display(),
            root = %root.display(),
            "mountpoint escapes parent directory"
        );
        Err(ReasonCode::MountpointNotUnderParentDirectory)
    }
}

/// [`resolve_contained_mountpoint`] reduced to a pass/fail outcome.
#[must_use]
pub fn validate_mountpoint_containment(
    path: &Path,
    parent_directory: &Path,
    resolution: Resolution,
) -> ValidationOutcome {
    resolve_contained_mountpoint(path, parent_directory, resolution).into()
}
