//! Recognition of permission-class failures reported by the storage tool.
//!
//! Used only by reactive escalation. The wording of these messages has
//! changed between releases and will change again; matching them is a
//! best-effort heuristic. Proactive escalation does not depend on it and
//! is the mode to use when this table cannot be kept current.

use std::fmt;

/// Storage-tool release families with distinct permission-error wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolRelease {
    /// ZFS on Linux 0.7.x.
    ZolV07,
    /// ZFS on Linux 0.8.x.
    ZolV08,
    /// OpenZFS 2.x.
    OpenZfs2,
}

impl fmt::Display for ToolRelease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZolV07 => write!(f, "zfsonlinux-0.7"),
            Self::ZolV08 => write!(f, "zfsonlinux-0.8"),
            Self::OpenZfs2 => write!(f, "openzfs-2"),
        }
    }
}

/// What a recognized permission failure left behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// Nothing changed; the whole call may be repeated with privilege.
    Denied,
    /// The dataset was created but the mount was refused; only the mount
    /// may be repeated.
    CreatedNotMounted,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Denied => write!(f, "denied"),
            Self::CreatedNotMounted => write!(f, "created-not-mounted"),
        }
    }
}

const CREATED_NOT_MOUNTED: &str =
    "filesystem successfully created, but it may only be mounted by root";

/// Lower-case stderr fragments that mark a permission failure, per release.
pub const PERMISSION_ERROR_TABLE: &[(ToolRelease, &[(&str, FailureClass)])] = &[
    (
        ToolRelease::ZolV07,
        &[
            (CREATED_NOT_MOUNTED, FailureClass::CreatedNotMounted),
            ("permission denied", FailureClass::Denied),
            ("only root can do that", FailureClass::Denied),
        ],
    ),
    (
        ToolRelease::ZolV08,
        &[
            (CREATED_NOT_MOUNTED, FailureClass::CreatedNotMounted),
            ("permission denied", FailureClass::Denied),
            ("insufficient privileges", FailureClass::Denied),
            ("umount: only root can", FailureClass::Denied),
        ],
    ),
    (
        ToolRelease::OpenZfs2,
        &[
            (CREATED_NOT_MOUNTED, FailureClass::CreatedNotMounted),
            ("permission denied", FailureClass::Denied),
            ("insufficient privileges", FailureClass::Denied),
            ("operation not permitted", FailureClass::Denied),
            ("only root can", FailureClass::Denied),
        ],
    ),
];

/// A table entry that matched the storage tool's stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionFailure {
    /// Release family whose entry matched.
    pub release: ToolRelease,
    /// The matching fragment.
    pub fragment: &'static str,
    /// What the failed call left behind.
    pub class: FailureClass,
}

/// Classifies `stderr` against [`PERMISSION_ERROR_TABLE`].
///
/// A created-but-not-mounted match wins over any other match, since
/// repeating a create that already happened can only fail.
#[must_use]
pub fn match_permission_failure(stderr: &str) -> Option<PermissionFailure> {
    let lowered = stderr.to_ascii_lowercase();
    let haystack = lowered.as_str();
    let mut matches = PERMISSION_ERROR_TABLE.iter().flat_map(move |(release, entries)| {
        entries
            .iter()
            .filter(move |(fragment, _)| haystack.contains(fragment))
            .map(|(fragment, class)| PermissionFailure {
                release: *release,
                fragment,
                class: *class,
            })
    });
    let first = matches.next()?;
    if first.class == FailureClass::CreatedNotMounted {
        return Some(first);
    }
    Some(
        matches
            .find(|m| m.class == FailureClass::CreatedNotMounted)
            .unwrap_or(first),
    )
}
