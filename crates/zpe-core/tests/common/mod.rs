//! Shared fixtures: an in-memory dataset store, a recording runner and a
//! temporary parent directory.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use zpe_common::error::Result;
use zpe_common::types::{DatasetType, EscalationMode};
use zpe_core::command::{CommandOutput, CommandRunner, Invocation};
use zpe_core::executor::Executor;
use zpe_core::store::DatasetStore;
use zpe_core::{Mediator, Policy};

pub const PARENT_DATASET: &str = "rpool/test";

/// Dataset metadata held in memory.
#[derive(Default, Clone)]
pub struct MemoryStore {
    datasets: HashMap<String, (DatasetType, Option<String>)>,
}

impl MemoryStore {
    pub fn with_fileset(mut self, name: &str, mountpoint: Option<&Path>) -> Self {
        let mountpoint = mountpoint.map(|p| p.to_string_lossy().into_owned());
        let _ = self
            .datasets
            .insert(name.into(), (DatasetType::Fileset, mountpoint));
        self
    }

    pub fn with_raw_mountpoint(mut self, name: &str, mountpoint: &str) -> Self {
        let _ = self
            .datasets
            .insert(name.into(), (DatasetType::Fileset, Some(mountpoint.into())));
        self
    }

    pub fn with_volume(mut self, name: &str) -> Self {
        let _ = self
            .datasets
            .insert(name.into(), (DatasetType::Volume, Some("-".into())));
        self
    }
}

impl DatasetStore for MemoryStore {
    fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.datasets.contains_key(name))
    }

    fn dataset_type(&self, name: &str) -> Result<Option<DatasetType>> {
        Ok(self.datasets.get(name).map(|(kind, _)| *kind))
    }

    fn mountpoint(&self, name: &str) -> Result<Option<String>> {
        Ok(self.datasets.get(name).and_then(|(_, mp)| mp.clone()))
    }
}

/// Records every invocation and replies from a script, defaulting to
/// success once the script is exhausted.
#[derive(Default)]
pub struct RecordingRunner {
    replies: Mutex<VecDeque<CommandOutput>>,
    calls: Mutex<Vec<Invocation>>,
}

impl RecordingRunner {
    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn replying(replies: &[(i32, &str)]) -> Arc<Self> {
        let runner = Self::default();
        runner
            .replies
            .lock()
            .unwrap()
            .extend(replies.iter().map(|(exit_code, stderr)| CommandOutput {
                stdout: String::new(),
                stderr: (*stderr).into(),
                exit_code: *exit_code,
            }));
        Arc::new(runner)
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(invocation.clone());
        Ok(self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(CommandOutput {
                stdout: String::new(),
                stderr: String::new(),
                exit_code: 0,
            }))
    }
}

/// A canonical temporary directory with a `data` parent directory inside.
pub struct Sandbox {
    _dir: tempfile::TempDir,
    pub base: PathBuf,
    pub root: PathBuf,
}

impl Sandbox {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let base = fs::canonicalize(dir.path()).unwrap();
        let root = base.join("data");
        fs::create_dir(&root).unwrap();
        Self {
            _dir: dir,
            base,
            root,
        }
    }

    pub fn policy(&self, escalation: EscalationMode) -> Policy {
        let sudo_needed = escalation.needs_escalator();
        let file = zpe_common::config::PolicyFile {
            parent_dataset: PARENT_DATASET.into(),
            parent_directory: self.root.clone(),
            privileged_binary: executable(),
            escalation,
            sudo_binary: sudo_needed.then(executable),
        };
        Policy::from_file(file).unwrap()
    }

    pub fn mediator(&self, store: MemoryStore, runner: &Arc<RecordingRunner>) -> Mediator {
        self.mediator_with(EscalationMode::Disabled, store, runner)
    }

    pub fn mediator_with(
        &self,
        escalation: EscalationMode,
        store: MemoryStore,
        runner: &Arc<RecordingRunner>,
    ) -> Mediator {
        let policy = self.policy(escalation);
        let executor = Executor::with_runner(&policy, Box::new(Arc::clone(runner))).unwrap();
        Mediator::with_parts(policy, Box::new(store), executor)
    }
}

/// Any absolute path to an executable regular file.
pub fn executable() -> PathBuf {
    std::env::current_exe().unwrap()
}

/// Store containing only the parent dataset.
pub fn base_store() -> MemoryStore {
    MemoryStore::default().with_fileset(PARENT_DATASET, None)
}
