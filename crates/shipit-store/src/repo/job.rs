//! Job repository. Enforces the status state machine: every status change
//! goes through `transition`, which rejects anything the state machine does
//! not allow, and the output log is append-only.

use async_trait::async_trait;
use chrono::Utc;
use shipit_core::ResourceId;
use shipit_core::job::{Job, JobStatus};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::{StoreError, StoreResult};

#[async_trait]
pub trait JobRepo: Send + Sync {
    async fn create(&self, job: Job) -> StoreResult<Job>;
    async fn get(&self, id: ResourceId) -> StoreResult<Job>;
    /// Move a job to `next`, stamping started/finished timestamps. Fails
    /// with `InvalidTransition` when the state machine forbids the move.
    async fn transition(&self, id: ResourceId, next: JobStatus) -> StoreResult<Job>;
    async fn set_exit_code(&self, id: ResourceId, exit_code: Option<i32>) -> StoreResult<()>;
    /// Append a chunk to the job's output log, returning the byte offset it
    /// was written at.
    async fn append_output(&self, id: ResourceId, chunk: &str) -> StoreResult<usize>;
    /// Remove a job record. Used when the owning project is deleted.
    async fn delete(&self, id: ResourceId) -> StoreResult<()>;
}

pub struct MemoryJobRepo {
    jobs: RwLock<HashMap<ResourceId, Job>>,
}

impl MemoryJobRepo {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryJobRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobRepo for MemoryJobRepo {
    async fn create(&self, job: Job) -> StoreResult<Job> {
        self.jobs
            .write()
            .expect("jobs lock")
            .insert(job.id, job.clone());
        Ok(job)
    }

    async fn get(&self, id: ResourceId) -> StoreResult<Job> {
        self.jobs
            .read()
            .expect("jobs lock")
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("job {id}")))
    }

    async fn transition(&self, id: ResourceId, next: JobStatus) -> StoreResult<Job> {
        let mut jobs = self.jobs.write().expect("jobs lock");
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("job {id}")))?;

        if !job.status.can_transition(next) {
            return Err(StoreError::InvalidTransition(format!(
                "job {id}: {} -> {}",
                job.status, next
            )));
        }

        job.status = next;
        let now = Utc::now();
        if next == JobStatus::Running {
            job.started_at = Some(now);
        }
        if next.is_terminal() {
            job.finished_at = Some(now);
        }
        Ok(job.clone())
    }

    async fn set_exit_code(&self, id: ResourceId, exit_code: Option<i32>) -> StoreResult<()> {
        let mut jobs = self.jobs.write().expect("jobs lock");
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("job {id}")))?;
        job.exit_code = exit_code;
        Ok(())
    }

    async fn append_output(&self, id: ResourceId, chunk: &str) -> StoreResult<usize> {
        let mut jobs = self.jobs.write().expect("jobs lock");
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("job {id}")))?;
        let offset = job.output.len();
        job.output.push_str(chunk);
        Ok(offset)
    }

    async fn delete(&self, id: ResourceId) -> StoreResult<()> {
        self.jobs.write().expect("jobs lock").remove(&id);
        Ok(())
    }
}
