//! Read-only storage metadata queries.
//!
//! Each query is a single, non-recursive lookup of one dataset by name and
//! runs at the caller's ambient privilege. Nothing is cached: every
//! validation step asks the live system again.

use std::path::PathBuf;

use zpe_common::error::Result;
use zpe_common::types::DatasetType;

use crate::command::{CommandRunner, Invocation, SystemRunner};

/// Source of dataset metadata consulted during validation.
pub trait DatasetStore: Send + Sync {
    /// Returns whether a dataset named `name` exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the query could not be issued.
    fn exists(&self, name: &str) -> Result<bool>;

    /// Returns the type of `name`, or `None` if it does not exist or
    /// reports an unknown type.
    ///
    /// # Errors
    ///
    /// Returns an error if the query could not be issued.
    fn dataset_type(&self, name: &str) -> Result<Option<DatasetType>>;

    /// Returns the raw `mountpoint` property value of `name`, or `None` if
    /// the dataset does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the query could not be issued.
    fn mountpoint(&self, name: &str) -> Result<Option<String>>;
}

/// [`DatasetStore`] backed by the `zfs(8)` command line tool.
pub struct ZfsCli {
    binary: PathBuf,
    runner: Box<dyn CommandRunner>,
}

impl ZfsCli {
    /// Creates a store that runs `binary` as a real child process.
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self::with_runner(binary, Box::new(SystemRunner))
    }

    /// Creates a store that runs `binary` through `runner`.
    #[must_use]
    pub fn with_runner(binary: impl Into<PathBuf>, runner: Box<dyn CommandRunner>) -> Self {
        Self {
            binary: binary.into(),
            runner,
        }
    }

    /// `zfs get -H -p -o value <property> <name>`; `None` on any failure.
    fn property(&self, name: &str, property: &str) -> Result<Option<String>> {
        let invocation = Invocation::new(
            &self.binary,
            vec![
                "get".into(),
                "-H".into(),
                "-p".into(),
                "-o".into(),
                "value".into(),
                property.into(),
                name.into(),
            ],
        );
        let output = self.runner.run(&invocation)?;
        if !output.success() {
            tracing::debug!(
                dataset = %name,
                property,
                stderr = %output.stderr.trim(),
                "property lookup failed"
            );
            return Ok(None);
        }
        let value = output.stdout.trim();
        if value.is_empty() || value.contains('\n') {
            return Ok(None);
        }
        Ok(Some(value.to_owned()))
    }
}

impl DatasetStore for ZfsCli {
    fn exists(&self, name: &str) -> Result<bool> {
        let invocation = Invocation::new(
            &self.binary,
            vec![
                "list".into(),
                "-H".into(),
                "-o".into(),
                "name".into(),
                name.into(),
            ],
        );
        let output = self.runner.run(&invocation)?;
        let found = output.success() && output.stdout.trim() == name;
        tracing::debug!(dataset = %name, found, "dataset lookup");
        Ok(found)
    }

    fn dataset_type(&self, name: &str) -> Result<Option<DatasetType>> {
        Ok(self
            .property(name, "type")?
            .as_deref()
            .and_then(DatasetType::from_property))
    }

    fn mountpoint(&self, name: &str) -> Result<Option<String>> {
        self.property(name, "mountpoint")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use zpe_common::error::ZpeError;

    use super::*;
    use crate::command::CommandOutput;

    #[derive(Default)]
    struct ScriptedRunner {
        replies: Mutex<VecDeque<CommandOutput>>,
        seen: Mutex<Vec<Invocation>>,
    }

    impl ScriptedRunner {
        fn reply(self: &Arc<Self>, exit_code: i32, stdout: &str, stderr: &str) -> Arc<Self> {
            self.replies.lock().unwrap().push_back(CommandOutput {
                stdout: stdout.into(),
                stderr: stderr.into(),
                exit_code,
            });
            Arc::clone(self)
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

    fn store(runner: &Arc<ScriptedRunner>) -> ZfsCli {
        ZfsCli::with_runner("/usr/sbin/zfs", Box::new(Arc::clone(runner)))
    }

    #[test]
    fn exists_issues_single_non_recursive_list() {
        let runner = Arc::new(ScriptedRunner::default()).reply(0, "rpool/test\n", "");
        assert!(store(&runner).exists("rpool/test").unwrap());

        let seen = runner.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].args, vec!["list", "-H", "-o", "name", "rpool/test"]);
        assert!(!seen[0].args.iter().any(|a| a == "-r"));
    }

    #[test]
    fn exists_is_false_when_tool_reports_missing_dataset() {
        let runner = Arc::new(ScriptedRunner::default()).reply(
            1,
            "",
            "cannot open 'rpool/nope': dataset does not exist\n",
        );
        assert!(!store(&runner).exists("rpool/nope").unwrap());
    }

    #[test]
    fn exists_is_false_when_output_names_other_dataset() {
        let runner = Arc::new(ScriptedRunner::default()).reply(0, "rpool/other\n", "");
        assert!(!store(&runner).exists("rpool/test").unwrap());
    }

    #[test]
    fn dataset_type_parses_get_output() {
        let runner = Arc::new(ScriptedRunner::default()).reply(0, "filesystem\n", "");
        assert_eq!(
            store(&runner).dataset_type("rpool/test/web").unwrap(),
            Some(DatasetType::Fileset)
        );
        let seen = runner.seen.lock().unwrap();
        assert_eq!(
            seen[0].args,
            vec!["get", "-H", "-p", "-o", "value", "type", "rpool/test/web"]
        );
    }

    #[test]
    fn mountpoint_is_none_for_missing_dataset() {
        let runner = Arc::new(ScriptedRunner::default()).reply(1, "", "dataset does not exist");
        assert_eq!(store(&runner).mountpoint("rpool/test/x").unwrap(), None);
    }

    #[test]
    fn mountpoint_returns_trimmed_value() {
        let runner = Arc::new(ScriptedRunner::default()).reply(0, "/data/web\n", "");
        assert_eq!(
            store(&runner).mountpoint("rpool/test/web").unwrap().as_deref(),
            Some("/data/web")
        );
    }

    #[test]
    fn multi_line_property_output_is_ignored() {
        let runner = Arc::new(ScriptedRunner::default()).reply(0, "/a\n/b\n", "");
        assert_eq!(store(&runner).mountpoint("rpool/test/web").unwrap(), None);
    }

    #[test]
    fn spawn_failure_propagates() {
        let runner = Arc::new(ScriptedRunner::default());
        assert!(store(&runner).exists("rpool/test").is_err());
    }
}
