//! # zpe-common
//!
//! Shared types, error definitions, configuration models, and constants
//! used across the zpe workspace.
//!
//! This crate is the leaf of the dependency graph. It carries the stable
//! exit-code table that the privileged helper and its unprivileged callers
//! both agree on, so it must not depend on any other internal crate.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod constants;
pub mod error;
pub mod types;
