//! Job records and the execution status state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::ResourceId;

/// Execution status of a job.
///
/// Transitions are monotonic: once a job reaches a terminal status it never
/// changes again, and a job never moves backward (e.g. `Running -> Queued`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created but not yet handed to the execution engine (may be waiting
    /// for a buddy check).
    Pending,
    /// Accepted by the engine, waiting for a free worker.
    Queued,
    /// The underlying process is executing.
    Running,
    /// Process exited 0.
    Succeeded,
    /// Process exited non-zero.
    Failed,
    /// Cancelled by a user before or during execution.
    Cancelled,
    /// Unrecoverable internal fault (spawn failure, infrastructure error).
    Errored,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled | JobStatus::Errored
        )
    }

    /// Pending, queued or running.
    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }

    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// Success/failure is only reachable through `Running`; cancellation is
    /// allowed from any non-terminal state; `Errored` is reachable from any
    /// non-terminal state.
    pub fn can_transition(self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (Pending, Queued) => true,
            (Queued, Running) => true,
            (Running, Succeeded) | (Running, Failed) => true,
            (Pending | Queued | Running, Cancelled) => true,
            (from, Errored) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Errored => "errored",
        };
        f.write_str(s)
    }
}

/// The execution record backing a deploy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: ResourceId,
    pub status: JobStatus,
    /// Shell command executed by the engine.
    pub command: String,
    /// Environment variables injected into the command.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Append-only output log (stdout and stderr interleaved).
    pub output: String,
    pub exit_code: Option<i32>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            id: ResourceId::new(),
            status: JobStatus::Pending,
            command: command.into(),
            env: HashMap::new(),
            output: String::new(),
            exit_code: None,
            started_at: None,
            finished_at: None,
            created_at: Utc::now(),
        }
    }
}
