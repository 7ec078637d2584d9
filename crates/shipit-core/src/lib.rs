//! Core domain types and traits for the Shipit deploy platform.
//!
//! This crate contains:
//! - Resource identifiers and common types
//! - The Deploy/Job state machine and its invariants
//! - Project, Stage, User and OutboundWebhook records
//! - Changeset helpers (commit message scanning)
//! - Executor trait for running deploy commands
//! - SourceControl trait for commit lookups
//! - Lifecycle events and the hook registry

pub mod changeset;
pub mod deploy;
pub mod error;
pub mod events;
pub mod executor;
pub mod id;
pub mod job;
pub mod project;
pub mod reference;
pub mod scm;
pub mod stage;
pub mod user;
pub mod webhook;

pub use error::{Error, Result};
pub use id::ResourceId;
