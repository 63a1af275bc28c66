//! # zpe-helper
//!
//! Privileged helper for fileset operations. Installed setuid-root or
//! reachable through `sudo`, it lets unprivileged callers create, destroy
//! and re-mount filesets inside the subtree named by the policy file, and
//! nowhere else.
//!
//! The exit code is the contract; stdout carries the audit echo and
//! stderr carries diagnostics.

mod commands;

use std::process::ExitCode;

use clap::Parser;
use zpe_common::types::ExitStatus;

use crate::commands::Cli;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => return ExitCode::from(commands::usage_error(&err).code()),
    };

    match commands::execute(cli) {
        Ok(status) => ExitCode::from(status.code()),
        Err(e) => {
            tracing::error!(error = ?e, "helper setup failed");
            ExitCode::from(ExitStatus::General.code())
        }
    }
}
