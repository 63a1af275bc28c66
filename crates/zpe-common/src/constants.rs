//! System-wide constants and default paths.

/// Location of the administrator-owned policy file.
///
/// Fixed at build time through `ZPE_POLICY_FILE`; never taken from the
/// caller's argv or environment.
pub const POLICY_FILE: &str = match option_env!("ZPE_POLICY_FILE") {
    Some(path) => path,
    None => "/etc/zpe/policy.json",
};

/// Default storage-tool executable when the policy does not name one.
pub const DEFAULT_PRIVILEGED_BINARY: &str = "/usr/sbin/zfs";

/// Name looked up on [`SANITIZED_PATH`] when the policy needs `sudo` but
/// does not name it.
pub const SUDO_PROGRAM: &str = "sudo";

/// Maximum length of a dataset path in bytes (`ZFS_MAX_DATASET_NAME_LEN - 1`).
pub const DATASET_NAME_MAX_LEN: usize = 255;

/// Non-alphanumeric characters allowed in dataset paths and mountpoints.
pub const ALLOWED_PUNCTUATION: &[char] = &['_', '-', '/', '.'];

/// `PATH` handed to every spawned storage-tool or `sudo` process.
pub const SANITIZED_PATH: &str = "/usr/sbin:/usr/bin:/sbin:/bin";

/// Action names accepted by the helper.
pub const ACTION_CREATE: &str = "create";
/// See [`ACTION_CREATE`].
pub const ACTION_DESTROY: &str = "destroy";
/// See [`ACTION_CREATE`].
pub const ACTION_SET_MOUNTPOINT: &str = "set_mountpoint";
