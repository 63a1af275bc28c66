//! Request mediation: syntax check, resolution, execution.
//!
//! One request, one synchronous pass, no retained state between requests.

use std::io::Write;

use zpe_common::error::Result;
use zpe_common::types::{ExitStatus, ReasonCode};

use crate::command::CommandOutput;
use crate::executor::{Execution, Executor};
use crate::policy::Policy;
use crate::request::ActionRequest;
use crate::resolver::Resolver;
use crate::store::{DatasetStore, ZfsCli};

/// Terminal state of a mediated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Validation passed and the storage tool succeeded.
    Succeeded(CommandOutput),
    /// Validation failed; no privileged call was made.
    Rejected(ReasonCode),
    /// Validation passed but the storage tool failed.
    ExecutionFailed(CommandOutput),
}

impl Outcome {
    /// Exit status reported to the caller.
    #[must_use]
    pub const fn exit_status(&self) -> ExitStatus {
        match self {
            Self::Succeeded(_) => ExitStatus::Success,
            Self::Rejected(reason) => reason.exit_status(),
            Self::ExecutionFailed(_) => ExitStatus::ExecutionFailed,
        }
    }

    /// Storage-tool output, if a call was made.
    #[must_use]
    pub const fn output(&self) -> Option<&CommandOutput> {
        match self {
            Self::Succeeded(output) | Self::ExecutionFailed(output) => Some(output),
            Self::Rejected(_) => None,
        }
    }
}

/// Owns the policy, the metadata source and the executor.
pub struct Mediator {
    policy: Policy,
    store: Box<dyn DatasetStore>,
    executor: Executor,
}

impl Mediator {
    /// Creates a mediator that queries and executes through the policy's
    /// storage-tool binary.
    ///
    /// # Errors
    ///
    /// Returns an error if the executor cannot be built from the policy.
    pub fn new(policy: Policy) -> Result<Self> {
        let store = Box::new(ZfsCli::new(policy.privileged_binary()));
        let executor = Executor::new(&policy)?;
        Ok(Self::with_parts(policy, store, executor))
    }

    /// Assembles a mediator from explicit parts.
    #[must_use]
    pub fn with_parts(policy: Policy, store: Box<dyn DatasetStore>, executor: Executor) -> Self {
        Self {
            policy,
            store,
            executor,
        }
    }

    /// Validates `request` and, if it passes, performs it.
    ///
    /// The action name and every issued command line are written to
    /// `audit`; the returned [`Outcome`] is authoritative.
    pub fn handle(&self, request: &ActionRequest, audit: &mut dyn Write) -> Outcome {
        if let Err(e) = writeln!(audit, "{}", request.action()) {
            tracing::warn!(error = %e, "failed to write audit line");
        }

        if let Err(reason) = request.check_syntax() {
            tracing::warn!(action = request.action(), ?reason, "request rejected");
            return Outcome::Rejected(reason);
        }

        let call = match Resolver::new(&self.policy, self.store.as_ref()).resolve(request) {
            Ok(call) => call,
            Err(reason) => {
                tracing::warn!(%request, ?reason, "request rejected");
                return Outcome::Rejected(reason);
            }
        };

        match self.executor.execute(&call, audit) {
            Execution::Succeeded(output) => {
                tracing::info!(%request, "request completed");
                Outcome::Succeeded(output)
            }
            Execution::Failed(output) => {
                tracing::error!(%request, exit_code = output.exit_code, "storage tool failed");
                Outcome::ExecutionFailed(output)
            }
        }
    }
}
