//! Command execution backends for Shipit.
//!
//! Deploy commands run as local child processes on the deployment host.
//! The `Executor` seam in shipit-core keeps room for containerized backends.

pub mod local;

pub use local::LocalProcessExecutor;
pub use shipit_core::executor::{CommandSpec, Execution, Executor, OutputChunk, OutputStream};
