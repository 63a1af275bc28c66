//! The privileged executor.
//!
//! The only component that runs the storage tool with write intent. It
//! receives a [`PrivilegedCall`], which can only be built by the resolver
//! from validated fields, turns it into a discrete argv, and runs it with
//! the escalation strategy fixed by the policy.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use zpe_common::error::{Result, ZpeError};
use zpe_common::types::EscalationMode;

use crate::command::{CommandOutput, CommandRunner, Invocation, SystemRunner};
use crate::escalation::{FailureClass, match_permission_failure};
use crate::policy::Policy;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Operation {
    Create { dataset: String, mountpoint: PathBuf },
    Destroy { dataset: String },
    SetMountpoint { dataset: String, mountpoint: PathBuf },
}

/// A fully validated storage-tool operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivilegedCall {
    op: Operation,
}

impl PrivilegedCall {
    pub(crate) fn create(dataset: &str, mountpoint: PathBuf) -> Self {
        Self {
            op: Operation::Create {
                dataset: dataset.to_owned(),
                mountpoint,
            },
        }
    }

    pub(crate) fn destroy(dataset: &str) -> Self {
        Self {
            op: Operation::Destroy {
                dataset: dataset.to_owned(),
            },
        }
    }

    pub(crate) fn set_mountpoint(dataset: &str, mountpoint: PathBuf) -> Self {
        Self {
            op: Operation::SetMountpoint {
                dataset: dataset.to_owned(),
                mountpoint,
            },
        }
    }

    /// Dataset the call operates on.
    #[must_use]
    pub fn dataset(&self) -> &str {
        match &self.op {
            Operation::Create { dataset, .. }
            | Operation::Destroy { dataset }
            | Operation::SetMountpoint { dataset, .. } => dataset,
        }
    }

    /// Resolved mountpoint the call will set, if any.
    #[must_use]
    pub fn mountpoint(&self) -> Option<&Path> {
        match &self.op {
            Operation::Create { mountpoint, .. } | Operation::SetMountpoint { mountpoint, .. } => {
                Some(mountpoint)
            }
            Operation::Destroy { .. } => None,
        }
    }

    /// Storage-tool arguments, one argv entry each.
    ///
    /// Destroy is never recursive and never forces an unmount.
    #[must_use]
    pub fn args(&self) -> Vec<String> {
        match &self.op {
            Operation::Create {
                dataset,
                mountpoint,
            } => vec![
                "create".into(),
                "-o".into(),
                format!("mountpoint={}", mountpoint.display()),
                dataset.clone(),
            ],
            Operation::Destroy { dataset } => vec!["destroy".into(), dataset.clone()],
            Operation::SetMountpoint {
                dataset,
                mountpoint,
            } => vec![
                "set".into(),
                format!("mountpoint={}", mountpoint.display()),
                dataset.clone(),
            ],
        }
    }
}

impl PrivilegedCall {
    /// Arguments that mount the dataset of a create whose mount was
    /// refused; `None` for every other operation.
    fn mount_args(&self) -> Option<Vec<String>> {
        match &self.op {
            Operation::Create { dataset, .. } => Some(vec!["mount".into(), dataset.clone()]),
            Operation::Destroy { .. } | Operation::SetMountpoint { .. } => None,
        }
    }
}

impl fmt::Display for PrivilegedCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.args().join(" "))
    }
}

/// Outcome of running a privileged call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Execution {
    /// The storage tool exited with code 0.
    Succeeded(CommandOutput),
    /// The storage tool failed or could not be started.
    Failed(CommandOutput),
}

impl Execution {
    /// Captured output of the last attempt.
    #[must_use]
    pub const fn output(&self) -> &CommandOutput {
        match self {
            Self::Succeeded(output) | Self::Failed(output) => output,
        }
    }

    /// Returns whether the call succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }
}

/// Escalation strategy, resolved once from the policy.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Strategy {
    Direct,
    Disabled,
    Proactive { sudo: PathBuf },
    Reactive { sudo: PathBuf },
}

/// Runs validated calls against the storage tool.
pub struct Executor {
    binary: PathBuf,
    strategy: Strategy,
    runner: Box<dyn CommandRunner>,
}

impl Executor {
    /// Creates an executor that spawns real processes.
    ///
    /// # Errors
    ///
    /// Returns an error if the policy's mode needs `sudo` but names none.
    pub fn new(policy: &Policy) -> Result<Self> {
        Self::with_runner(policy, Box::new(SystemRunner))
    }

    /// Creates an executor that runs through `runner`.
    ///
    /// # Errors
    ///
    /// Returns an error if the policy's mode needs `sudo` but names none.
    pub fn with_runner(policy: &Policy, runner: Box<dyn CommandRunner>) -> Result<Self> {
        let sudo = || {
            policy
                .sudo_binary()
                .map(Path::to_path_buf)
                .ok_or_else(|| ZpeError::Config {
                    message: format!("escalation mode {} needs sudo_binary", policy.escalation()),
                })
        };
        let strategy = match policy.escalation() {
            EscalationMode::Direct => Strategy::Direct,
            EscalationMode::Disabled => Strategy::Disabled,
            EscalationMode::Proactive => Strategy::Proactive { sudo: sudo()? },
            EscalationMode::Reactive => Strategy::Reactive { sudo: sudo()? },
        };
        Ok(Self {
            binary: policy.privileged_binary().to_path_buf(),
            strategy,
            runner,
        })
    }

    /// Runs `call`, echoing every issued command line to `audit` first.
    ///
    /// Reactive mode retries at most once, and only after a recognized
    /// permission failure. When a create succeeded but its mount was
    /// refused, the retry mounts the new dataset instead of creating it
    /// again.
    pub fn execute(&self, call: &PrivilegedCall, audit: &mut dyn Write) -> Execution {
        let direct = Invocation::new(&self.binary, call.args());
        match &self.strategy {
            Strategy::Direct => {
                if !nix::unistd::geteuid().is_root() {
                    tracing::warn!("direct escalation mode but not running as root");
                }
                self.attempt(&direct, audit)
            }
            Strategy::Disabled => self.attempt(&direct, audit),
            Strategy::Proactive { sudo } => self.attempt(&direct.through_sudo(sudo), audit),
            Strategy::Reactive { sudo } => match self.attempt(&direct, audit) {
                Execution::Failed(output) => match match_permission_failure(&output.stderr) {
                    Some(failure) => {
                        tracing::info!(
                            dataset = %call.dataset(),
                            release = %failure.release,
                            class = %failure.class,
                            fragment = failure.fragment,
                            "permission failure, retrying through sudo"
                        );
                        let retry = match (failure.class, call.mount_args()) {
                            (FailureClass::CreatedNotMounted, Some(args)) => {
                                Invocation::new(&self.binary, args)
                            }
                            _ => direct,
                        };
                        self.attempt(&retry.through_sudo(sudo), audit)
                    }
                    None => Execution::Failed(output),
                },
                succeeded @ Execution::Succeeded(_) => succeeded,
            },
        }
    }

    fn attempt(&self, invocation: &Invocation, audit: &mut dyn Write) -> Execution {
        if let Err(e) = writeln!(audit, "{invocation}") {
            tracing::warn!(error = %e, "failed to write audit line");
        }
        tracing::info!(command = %invocation, "issuing privileged call");
        match self.runner.run(invocation) {
            Ok(output) if output.success() => Execution::Succeeded(output),
            Ok(output) => {
                tracing::warn!(
                    command = %invocation,
                    exit_code = output.exit_code,
                    stderr = %output.stderr.trim(),
                    "privileged call failed"
                );
                Execution::Failed(output)
            }
            Err(e) => {
                tracing::error!(command = %invocation, error = %e, "privileged call not started");
                Execution::Failed(CommandOutput {
                    stdout: String::new(),
                    stderr: e.to_string(),
                    exit_code: -1,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use zpe_common::config::PolicyFile;

    use super::*;

    #[derive(Default)]
    struct ScriptedRunner {
        replies: Mutex<VecDeque<CommandOutput>>,
        seen: Mutex<Vec<Invocation>>,
    }

    impl ScriptedRunner {
        fn replying(replies: &[(i32, &str)]) -> Arc<Self> {
            let runner = Self::default();
            for (exit_code, stderr) in replies {
                runner.replies.lock().unwrap().push_back(CommandOutput {
                    stdout: String::new(),
                    stderr: (*stderr).into(),
                    exit_code: *exit_code,
                });
            }
            Arc::new(runner)
        }

        fn seen(&self) -> Vec<Invocation> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
            self.seen.lock().unwrap().push(invocation.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ZpeError::Spawn {
                    program: invocation.program.clone(),
                    source: std::io::Error::other("no scripted reply"),
                })
        }
    }

    fn exe() -> PathBuf {
        std::env::current_exe().unwrap()
    }

    fn policy(escalation: EscalationMode) -> Policy {
        Policy::from_file(PolicyFile {
            parent_dataset: "rpool/test".into(),
            parent_directory: PathBuf::from("/data"),
            privileged_binary: exe(),
            escalation,
            sudo_binary: Some(exe()),
        })
        .unwrap()
    }

    fn executor(mode: EscalationMode, runner: &Arc<ScriptedRunner>) -> Executor {
        Executor::with_runner(&policy(mode), Box::new(Arc::clone(runner))).unwrap()
    }

    fn destroy() -> PrivilegedCall {
        PrivilegedCall::destroy("rpool/test/web")
    }

    #[test]
    fn call_arguments_match_storage_tool_syntax() {
        let create = PrivilegedCall::create("rpool/test/web", PathBuf::from("/data/web"));
        assert_eq!(create.to_string(), "create -o mountpoint=/data/web rpool/test/web");
        let set = PrivilegedCall::set_mountpoint("rpool/test/web", PathBuf::from("/data/www"));
        assert_eq!(set.to_string(), "set mountpoint=/data/www rpool/test/web");
        assert_eq!(destroy().to_string(), "destroy rpool/test/web");
        assert_eq!(destroy().mountpoint(), None);
    }

    #[test]
    fn disabled_runs_once_and_echoes_command() {
        let runner = ScriptedRunner::replying(&[(0, "")]);
        let mut audit = Vec::new();
        let result = executor(EscalationMode::Disabled, &runner).execute(&destroy(), &mut audit);
        assert!(result.is_success());
        let seen = runner.seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].program, exe());
        let echoed = String::from_utf8(audit).unwrap();
        assert_eq!(echoed, format!("{}\n", seen[0]));
    }

    #[test]
    fn disabled_surfaces_permission_failure_without_retry() {
        let runner = ScriptedRunner::replying(&[(1, "permission denied")]);
        let result = executor(EscalationMode::Disabled, &runner).execute(&destroy(), &mut Vec::new());
        assert!(!result.is_success());
        assert_eq!(result.output().stderr, "permission denied");
        assert_eq!(runner.seen().len(), 1);
    }

    #[test]
    fn proactive_always_goes_through_sudo() {
        let runner = ScriptedRunner::replying(&[(0, "")]);
        let result = executor(EscalationMode::Proactive, &runner).execute(&destroy(), &mut Vec::new());
        assert!(result.is_success());
        let seen = runner.seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].args[0], "-n");
        assert_eq!(seen[0].args[2..], ["destroy", "rpool/test/web"]);
    }

    #[test]
    fn reactive_retries_once_after_permission_failure() {
        let runner = ScriptedRunner::replying(&[
            (1, "cannot destroy 'rpool/test/web': permission denied\n"),
            (0, ""),
        ]);
        let mut audit = Vec::new();
        let result = executor(EscalationMode::Reactive, &runner).execute(&destroy(), &mut audit);
        assert!(result.is_success());
        let seen = runner.seen();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].args, vec!["destroy", "rpool/test/web"]);
        assert_eq!(seen[1].args[0], "-n");
        assert_eq!(String::from_utf8(audit).unwrap().lines().count(), 2);
    }

    #[test]
    fn reactive_mounts_a_created_dataset_instead_of_recreating_it() {
        let runner = ScriptedRunner::replying(&[
            (1, "filesystem successfully created, but it may only be mounted by root\n"),
            (0, ""),
        ]);
        let call = PrivilegedCall::create("rpool/test/web", PathBuf::from("/data/web"));
        let result = executor(EscalationMode::Reactive, &runner).execute(&call, &mut Vec::new());
        assert!(result.is_success());
        let seen = runner.seen();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].args[0], "create");
        assert_eq!(seen[1].program, exe());
        assert_eq!(
            seen[1].args,
            vec![
                "-n".to_owned(),
                exe().to_string_lossy().into_owned(),
                "mount".into(),
                "rpool/test/web".into(),
            ]
        );
    }

    #[test]
    fn reactive_repeats_full_create_after_plain_denial() {
        let runner = ScriptedRunner::replying(&[
            (1, "cannot create 'rpool/test/web': permission denied\n"),
            (0, ""),
        ]);
        let call = PrivilegedCall::create("rpool/test/web", PathBuf::from("/data/web"));
        let result = executor(EscalationMode::Reactive, &runner).execute(&call, &mut Vec::new());
        assert!(result.is_success());
        assert_eq!(
            runner.seen()[1].args[2..],
            ["create", "-o", "mountpoint=/data/web", "rpool/test/web"]
        );
    }

    #[test]
    fn reactive_does_not_retry_twice() {
        let runner = ScriptedRunner::replying(&[(1, "permission denied"), (1, "permission denied")]);
        let result = executor(EscalationMode::Reactive, &runner).execute(&destroy(), &mut Vec::new());
        assert!(!result.is_success());
        assert_eq!(runner.seen().len(), 2);
    }

    #[test]
    fn reactive_does_not_retry_other_failures() {
        let runner = ScriptedRunner::replying(&[(1, "dataset is busy")]);
        let result = executor(EscalationMode::Reactive, &runner).execute(&destroy(), &mut Vec::new());
        assert!(!result.is_success());
        assert_eq!(runner.seen().len(), 1);
    }

    #[test]
    fn reactive_success_needs_no_escalation() {
        let runner = ScriptedRunner::replying(&[(0, "")]);
        let result = executor(EscalationMode::Reactive, &runner).execute(&destroy(), &mut Vec::new());
        assert!(result.is_success());
        assert_eq!(runner.seen().len(), 1);
    }

    #[test]
    fn spawn_failure_is_an_execution_failure() {
        let runner = ScriptedRunner::replying(&[]);
        let result = executor(EscalationMode::Disabled, &runner).execute(&destroy(), &mut Vec::new());
        assert_eq!(result.output().exit_code, -1);
        assert!(result.output().stderr.contains("no scripted reply"));
    }
}
