//! Action resolution.
//!
//! Maps each [`ActionRequest`] to its validation sequence and, when every
//! step passes, to the one [`PrivilegedCall`] that implements it. The
//! first failing step ends resolution; nothing is executed or committed
//! on a rejection.

use std::path::{Path, PathBuf};

use zpe_common::types::{DatasetType, ReasonCode};

use crate::executor::PrivilegedCall;
use crate::policy::Policy;
use crate::request::ActionRequest;
use crate::store::DatasetStore;
use crate::validate::{
    Resolution, ValidationOutcome, canonical_parent_directory,
    immediate_parent_dataset, resolve_contained_mountpoint, validate_character_set,
    validate_dataset_containment, validate_existing_dataset,
};

/// Validates requests against a policy using live dataset metadata.
pub struct Resolver<'a> {
    policy: &'a Policy,
    store: &'a dyn DatasetStore,
}

impl<'a> Resolver<'a> {
    /// Creates a resolver for `policy` that queries `store`.
    #[must_use]
    pub fn new(policy: &'a Policy, store: &'a dyn DatasetStore) -> Self {
        Self { policy, store }
    }

    /// Runs the validation sequence for `request`.
    ///
    /// Expects [`ActionRequest::check_syntax`] to have passed.
    ///
    /// # Errors
    ///
    /// Returns the [`ReasonCode`] of the first failing step.
    pub fn resolve(&self, request: &ActionRequest) -> Result<PrivilegedCall, ReasonCode> {
        self.check_policy_roots()?;
        let dataset = request.dataset_path();
        validate_dataset_containment(dataset, self.policy.parent_dataset()).into_result()?;

        match request {
            ActionRequest::CreateFileset { mountpoint, .. } => {
                self.require_parent_of_new(dataset)?;
                let mountpoint = self.contained(Path::new(mountpoint), Resolution::LeafMayBeMissing)?;
                Ok(PrivilegedCall::create(dataset, mountpoint))
            }
            ActionRequest::DestroyFileset { .. } => {
                self.require_fileset(dataset)?;
                self.require_contained_current_mountpoint(dataset)?;
                Ok(PrivilegedCall::destroy(dataset))
            }
            ActionRequest::SetMountpoint { new_mountpoint, .. } => {
                self.require_fileset(dataset)?;
                self.require_contained_current_mountpoint(dataset)?;
                let mountpoint =
                    self.contained(Path::new(new_mountpoint), Resolution::LeafMayBeMissing)?;
                Ok(PrivilegedCall::set_mountpoint(dataset, mountpoint))
            }
        }
    }

    /// Steps 1 and 2: both configured roots exist right now.
    fn check_policy_roots(&self) -> Result<(), ReasonCode> {
        let _root = canonical_parent_directory(self.policy.parent_directory())?;
        match validate_existing_dataset(self.store, self.policy.parent_dataset()) {
            ValidationOutcome::Valid => Ok(()),
            ValidationOutcome::Rejected(_) => Err(ReasonCode::ParentDatasetMissing),
        }
    }

    fn require_parent_of_new(&self, dataset: &str) -> Result<(), ReasonCode> {
        let parent = immediate_parent_dataset(dataset).ok_or(ReasonCode::ParentOfNewDatasetMissing)?;
        match validate_existing_dataset(self.store, parent) {
            ValidationOutcome::Valid => Ok(()),
            ValidationOutcome::Rejected(_) => Err(ReasonCode::ParentOfNewDatasetMissing),
        }
    }

    fn require_fileset(&self, dataset: &str) -> Result<(), ReasonCode> {
        validate_existing_dataset(self.store, dataset).into_result()?;
        match self.store.dataset_type(dataset) {
            Ok(Some(DatasetType::Fileset)) => Ok(()),
            Ok(other) => {
                tracing::debug!(dataset = %dataset, kind = ?other, "not a fileset");
                Err(ReasonCode::DatasetNotAFileset)
            }
            Err(e) => {
                tracing::warn!(dataset = %dataset, error = %e, "type query failed");
                Err(ReasonCode::DatasetNotAFileset)
            }
        }
    }

    fn require_contained_current_mountpoint(&self, dataset: &str) -> Result<(), ReasonCode> {
        let current = match self.store.mountpoint(dataset) {
            Ok(Some(value)) => value,
            Ok(None) => return Err(ReasonCode::MountpointUnresolvable),
            Err(e) => {
                tracing::warn!(dataset = %dataset, error = %e, "mountpoint query failed");
                return Err(ReasonCode::MountpointUnresolvable);
            }
        };
        // `none`, `legacy` and `-` are relative and fail resolution.
        let _resolved = self.contained(Path::new(&current), Resolution::MustExist)?;
        Ok(())
    }

    /// Resolves and contains `path`, then re-checks the resolved text so
    /// only allow-listed characters ever reach the privileged call.
    fn contained(&self, path: &Path, resolution: Resolution) -> Result<PathBuf, ReasonCode> {
        let resolved =
            resolve_contained_mountpoint(path, self.policy.parent_directory(), resolution)?;
        let text = resolved.to_str().ok_or(ReasonCode::MountpointUnresolvable)?;
        if validate_character_set(text).is_valid() {
            Ok(resolved)
        } else {
            Err(ReasonCode::MountpointUnresolvable)
        }
    }
}
