//! # zpe-core
//!
//! Privilege escalation mediation for fileset operations.
//!
//! An unprivileged caller asks for one of three actions (create a
//! fileset, destroy a fileset, change a fileset's mountpoint). This crate
//! decides whether the request stays inside an administrator-configured
//! dataset subtree and directory subtree and, only if it does, performs
//! the single storage-tool call that implements it:
//!
//! - [`validate`]: pure name/path checks and symlink-aware containment.
//! - [`resolver`]: per-action validation sequences.
//! - [`executor`]: the privileged call and its escalation strategy.
//! - [`mediator`]: glue from request to [`mediator::Outcome`].
//! - [`client`]: the unprivileged side that invokes the helper binary.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod client;
pub mod command;
pub mod escalation;
pub mod executor;
pub mod mediator;
pub mod policy;
pub mod request;
pub mod resolver;
pub mod store;
pub mod validate;

pub use mediator::{Mediator, Outcome};
pub use policy::Policy;
pub use request::ActionRequest;
