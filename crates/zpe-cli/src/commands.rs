//! Argument contract and dispatch.

use std::io::Write;
use std::path::Path;

use anyhow::Context;
use clap::{Parser, Subcommand};
use zpe_common::constants::{ACTION_CREATE, ACTION_DESTROY, ACTION_SET_MOUNTPOINT, POLICY_FILE};
use zpe_common::types::ExitStatus;
use zpe_core::{ActionRequest, Mediator, Outcome, Policy};

/// zpe-helper: mediated fileset create/destroy/mountpoint changes.
#[derive(Parser, Debug)]
#[command(name = "zpe-helper", version, about, long_about = None)]
pub struct Cli {
    /// Action to perform.
    #[command(subcommand)]
    pub action: Action,
}

/// Supported privileged actions.
///
/// This is the only definition of the argument contract: action name
/// followed by exactly the arguments that action takes.
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Action {
    /// Create a fileset mounted inside the parent directory.
    #[command(name = ACTION_CREATE)]
    Create {
        /// Full dataset path, below the parent dataset.
        dataset: String,
        /// Absolute mountpoint, inside the parent directory.
        mountpoint: String,
    },
    /// Destroy a fileset (never recursive).
    #[command(name = ACTION_DESTROY)]
    Destroy {
        /// Full dataset path, below the parent dataset.
        dataset: String,
    },
    /// Change the mountpoint of a fileset.
    #[command(name = ACTION_SET_MOUNTPOINT)]
    SetMountpoint {
        /// Full dataset path, below the parent dataset.
        dataset: String,
        /// New absolute mountpoint, inside the parent directory.
        mountpoint: String,
    },
}

impl From<Action> for ActionRequest {
    fn from(action: Action) -> Self {
        match action {
            Action::Create {
                dataset,
                mountpoint,
            } => Self::CreateFileset {
                dataset_path: dataset,
                mountpoint,
            },
            Action::Destroy { dataset } => Self::DestroyFileset {
                dataset_path: dataset,
            },
            Action::SetMountpoint {
                dataset,
                mountpoint,
            } => Self::SetMountpoint {
                dataset_path: dataset,
                new_mountpoint: mountpoint,
            },
        }
    }
}

/// Reports an argument error and returns the status to exit with.
///
/// Bad arity and unknown actions exit with [`ExitStatus::General`], not
/// clap's own usage code, which would read as a missing parent directory.
pub fn usage_error(err: &clap::Error) -> ExitStatus {
    if let Err(e) = err.print() {
        tracing::warn!(error = %e, "failed to print usage");
    }
    usage_status(err)
}

fn usage_status(err: &clap::Error) -> ExitStatus {
    if err.use_stderr() {
        ExitStatus::General
    } else {
        ExitStatus::Success
    }
}

/// Loads the policy, mediates the request, and reports the outcome.
///
/// # Errors
///
/// Returns an error if the policy cannot be loaded or is unusable.
pub fn execute(cli: Cli) -> anyhow::Result<ExitStatus> {
    let request = ActionRequest::from(cli.action);
    let policy = Policy::load(Path::new(POLICY_FILE))
        .with_context(|| format!("loading policy from {POLICY_FILE}"))?;
    let mediator = Mediator::new(policy).context("preparing executor")?;

    let stdout = std::io::stdout();
    let mut audit = stdout.lock();
    let outcome = mediator.handle(&request, &mut audit);
    audit.flush().context("flushing audit output")?;

    report(&outcome, &mut std::io::stderr().lock());
    Ok(outcome.exit_status())
}

/// Writes diagnostics for a non-successful outcome.
fn report(outcome: &Outcome, diag: &mut dyn Write) {
    let written = match outcome {
        Outcome::Succeeded(_) => Ok(()),
        Outcome::Rejected(reason) => {
            writeln!(diag, "rejected: {reason} (exit {})", reason.exit_status().code())
        }
        Outcome::ExecutionFailed(output) => write!(diag, "{}", output.stderr),
    };
    if let Err(e) = written {
        tracing::warn!(error = %e, "failed to write diagnostics");
    }
}
