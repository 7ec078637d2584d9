//! Executor trait and command execution types.
//!
//! Executors run deploy commands and expose their output incrementally. The
//! engine only depends on this seam, so the local process executor can be
//! swapped for a containerized one without touching the deploy lifecycle.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::{ResourceId, Result};

/// Specification for a command to execute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Job this command belongs to.
    pub id: ResourceId,
    /// Shell script to run.
    pub script: String,
    /// Environment variables.
    pub env: HashMap<String, String>,
    /// Working directory, defaults to the server's cwd.
    pub working_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(id: ResourceId, script: impl Into<String>) -> Self {
        Self {
            id,
            script: script.into(),
            env: HashMap::new(),
            working_dir: None,
        }
    }
}

/// A chunk of execution output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputChunk {
    pub timestamp: DateTime<Utc>,
    pub stream: OutputStream,
    pub content: String,
}

impl OutputChunk {
    pub fn now(stream: OutputStream, content: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            stream,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputStream {
    Stdout,
    Stderr,
    /// Messages from the engine itself (cancellation notices, faults).
    System,
}

/// Trait for command executors.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Name of this executor.
    fn name(&self) -> &'static str;

    /// Spawn a command, returning a handle to its live execution.
    async fn spawn(&self, spec: CommandSpec) -> Result<Box<dyn Execution>>;
}

/// A single in-flight execution.
#[async_trait]
pub trait Execution: Send {
    /// Next chunk of output, or `None` once both output streams are closed.
    async fn next_chunk(&mut self) -> Option<OutputChunk>;

    /// Wait for the process to exit. Returns the exit code, or `None` if the
    /// process was terminated by a signal.
    async fn wait(&mut self) -> Result<Option<i32>>;

    /// Ask the process to stop gracefully. Callers give it a grace period to
    /// exit before resorting to `kill`.
    async fn terminate(&mut self) -> Result<()>;

    /// Forcefully terminate the process.
    async fn kill(&mut self) -> Result<()>;
}
