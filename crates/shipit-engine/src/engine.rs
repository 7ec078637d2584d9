//! Engine front-end: enqueueing, cancellation and live observation.

use shipit_core::ResourceId;
use shipit_core::executor::{Executor, OutputChunk};
use shipit_core::job::JobStatus;
use shipit_core::{Error, Result};
use shipit_store::JobRepo;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

use crate::queue::JobQueue;
use crate::worker::Worker;

const QUEUE_CAPACITY: usize = 1024;
const TRANSITION_BUFFER: usize = 256;

/// Tuning knobs for the engine.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Number of concurrent workers.
    pub workers: usize,
    /// How long a cancelled job may keep running before it is killed.
    pub cancel_grace: Duration,
    /// Per-job output broadcast capacity. Observers that fall further behind
    /// than this lose chunks.
    pub output_buffer: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            cancel_grace: Duration::from_secs(10),
            output_buffer: 1024,
        }
    }
}

/// A status change of a job, published to engine subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobTransition {
    pub job_id: ResourceId,
    pub status: JobStatus,
}

/// A broadcast output chunk, tagged with the byte offset it occupies in the
/// stored log. Followers that replay the log first skip live chunks below
/// the replayed length instead of sending them twice.
#[derive(Debug, Clone)]
pub struct LiveChunk {
    pub offset: usize,
    pub chunk: OutputChunk,
}

/// Per-job handles that exist from enqueue until the job reaches a terminal
/// status.
pub(crate) struct JobRuntime {
    pub cancel: watch::Sender<bool>,
    pub output: broadcast::Sender<LiveChunk>,
}

pub(crate) type RuntimeMap = Arc<Mutex<HashMap<ResourceId, JobRuntime>>>;

/// Owns the queue and worker pool and tracks in-flight jobs.
pub struct JobEngine {
    queue: Arc<JobQueue>,
    jobs: Arc<dyn JobRepo>,
    runtimes: RuntimeMap,
    transitions: broadcast::Sender<JobTransition>,
    output_buffer: usize,
}

impl JobEngine {
    /// Spawn the worker pool and return the engine handle.
    pub fn start(
        jobs: Arc<dyn JobRepo>,
        executor: Arc<dyn Executor>,
        settings: EngineSettings,
    ) -> Arc<Self> {
        let queue = Arc::new(JobQueue::new(QUEUE_CAPACITY));
        let runtimes: RuntimeMap = Arc::new(Mutex::new(HashMap::new()));
        let (transitions, _) = broadcast::channel(TRANSITION_BUFFER);

        info!(
            workers = settings.workers,
            executor = executor.name(),
            "Starting job engine"
        );

        for index in 0..settings.workers {
            let worker = Worker::new(
                index,
                Arc::clone(&queue),
                Arc::clone(&jobs),
                Arc::clone(&executor),
                Arc::clone(&runtimes),
                transitions.clone(),
                settings.cancel_grace,
            );
            tokio::spawn(worker.run());
        }

        Arc::new(Self {
            queue,
            jobs,
            runtimes,
            transitions,
            output_buffer: settings.output_buffer,
        })
    }

    /// Accept a pending job for execution: registers its runtime, moves it to
    /// `Queued` and hands it to the worker pool.
    pub async fn enqueue(&self, job_id: ResourceId) -> Result<()> {
        let job = self.jobs.get(job_id).await?;
        if job.status != JobStatus::Pending {
            return Err(Error::Conflict(format!(
                "job {job_id} is {} and cannot be queued",
                job.status
            )));
        }

        self.jobs.transition(job_id, JobStatus::Queued).await?;

        {
            let (cancel, _) = watch::channel(false);
            let (output, _) = broadcast::channel(self.output_buffer);
            self.runtimes
                .lock()
                .expect("runtimes lock")
                .insert(job_id, JobRuntime { cancel, output });
        }

        self.queue.push(job_id).await?;
        self.emit(job_id, JobStatus::Queued);
        debug!(job_id = %job_id, "Job queued");
        Ok(())
    }

    /// Cancel a job. Pending and queued jobs are cancelled immediately;
    /// running jobs are flagged and get `cancel_grace` to exit before they
    /// are killed. Cancelling a finished job is a conflict.
    pub async fn cancel(&self, job_id: ResourceId) -> Result<()> {
        let job = self.jobs.get(job_id).await?;
        match job.status {
            JobStatus::Pending | JobStatus::Queued => {
                self.jobs.transition(job_id, JobStatus::Cancelled).await?;
                self.runtimes
                    .lock()
                    .expect("runtimes lock")
                    .remove(&job_id);
                self.emit(job_id, JobStatus::Cancelled);
                info!(job_id = %job_id, "Cancelled job before execution");
                Ok(())
            }
            JobStatus::Running => {
                let runtimes = self.runtimes.lock().expect("runtimes lock");
                if let Some(runtime) = runtimes.get(&job_id) {
                    let _ = runtime.cancel.send(true);
                }
                info!(job_id = %job_id, "Requested cancellation of running job");
                Ok(())
            }
            status => Err(Error::Conflict(format!("job {job_id} is already {status}"))),
        }
    }

    /// Follow live output of an in-flight job. Returns `None` once the job
    /// has finished (or never entered the engine); callers read the stored
    /// output log instead.
    pub fn follow(&self, job_id: ResourceId) -> Option<broadcast::Receiver<LiveChunk>> {
        self.runtimes
            .lock()
            .expect("runtimes lock")
            .get(&job_id)
            .map(|runtime| runtime.output.subscribe())
    }

    /// Subscribe to status transitions of all jobs.
    pub fn subscribe(&self) -> broadcast::Receiver<JobTransition> {
        self.transitions.subscribe()
    }

    fn emit(&self, job_id: ResourceId, status: JobStatus) {
        let _ = self.transitions.send(JobTransition { job_id, status });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipit_core::job::Job;
    use shipit_executor::LocalProcessExecutor;
    use shipit_store::MemoryJobRepo;
    use tokio::time::{Instant, sleep, timeout};

    fn engine_with(settings: EngineSettings) -> (Arc<JobEngine>, Arc<dyn JobRepo>) {
        let jobs: Arc<dyn JobRepo> = Arc::new(MemoryJobRepo::new());
        let executor: Arc<dyn Executor> = Arc::new(LocalProcessExecutor::new());
        let engine = JobEngine::start(Arc::clone(&jobs), executor, settings);
        (engine, jobs)
    }

    async fn wait_for_status(jobs: &Arc<dyn JobRepo>, id: ResourceId, status: JobStatus) {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if jobs.get(id).await.unwrap().status == status {
                return;
            }
            assert!(
                Instant::now() < deadline,
                "timed out waiting for job {id} to reach {status}"
            );
            sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn runs_a_job_to_success() {
        let (engine, jobs) = engine_with(EngineSettings::default());
        let job = jobs.create(Job::new("echo deployed")).await.unwrap();

        engine.enqueue(job.id).await.unwrap();
        wait_for_status(&jobs, job.id, JobStatus::Succeeded).await;

        let job = jobs.get(job.id).await.unwrap();
        assert!(job.output.contains("deployed"));
        assert_eq!(job.exit_code, Some(0));
        assert!(job.started_at.is_some());
        assert!(job.finished_at.is_some());
    }

    #[tokio::test]
    async fn non_zero_exit_fails_the_job() {
        let (engine, jobs) = engine_with(EngineSettings::default());
        let job = jobs.create(Job::new("echo broken; exit 2")).await.unwrap();

        engine.enqueue(job.id).await.unwrap();
        wait_for_status(&jobs, job.id, JobStatus::Failed).await;

        let job = jobs.get(job.id).await.unwrap();
        assert_eq!(job.exit_code, Some(2));
        assert!(job.output.contains("broken"));
    }

    #[tokio::test]
    async fn job_env_reaches_the_command() {
        let (engine, jobs) = engine_with(EngineSettings::default());
        let mut job = Job::new("echo deploying $DEPLOY_REFERENCE");
        job.env
            .insert("DEPLOY_REFERENCE".to_string(), "v2.0.1".to_string());
        let job = jobs.create(job).await.unwrap();

        engine.enqueue(job.id).await.unwrap();
        wait_for_status(&jobs, job.id, JobStatus::Succeeded).await;

        let job = jobs.get(job.id).await.unwrap();
        assert!(job.output.contains("deploying v2.0.1"));
    }

    #[tokio::test]
    async fn enqueue_is_rejected_for_non_pending_jobs() {
        let (engine, jobs) = engine_with(EngineSettings::default());
        let job = jobs.create(Job::new("echo once")).await.unwrap();

        engine.enqueue(job.id).await.unwrap();
        let second = engine.enqueue(job.id).await;
        assert!(matches!(second, Err(Error::Conflict(_))));
    }

    #[tokio::test]
    async fn cancel_of_a_queued_job_is_immediate() {
        // one worker, keep it busy so the second job stays queued
        let settings = EngineSettings {
            workers: 1,
            ..EngineSettings::default()
        };
        let (engine, jobs) = engine_with(settings);

        let busy = jobs.create(Job::new("sleep 30")).await.unwrap();
        let waiting = jobs.create(Job::new("echo never")).await.unwrap();

        engine.enqueue(busy.id).await.unwrap();
        wait_for_status(&jobs, busy.id, JobStatus::Running).await;
        engine.enqueue(waiting.id).await.unwrap();

        engine.cancel(waiting.id).await.unwrap();
        let waiting = jobs.get(waiting.id).await.unwrap();
        assert_eq!(waiting.status, JobStatus::Cancelled);
        assert!(waiting.output.is_empty());

        engine.cancel(busy.id).await.unwrap();
        wait_for_status(&jobs, busy.id, JobStatus::Cancelled).await;
    }

    #[tokio::test]
    async fn cancel_kills_a_running_job_after_the_grace_period() {
        let settings = EngineSettings {
            cancel_grace: Duration::from_millis(100),
            ..EngineSettings::default()
        };
        let (engine, jobs) = engine_with(settings);
        // ignores SIGTERM, so only the grace-period kill can stop it
        let job = jobs
            .create(Job::new("trap '' TERM; sleep 30 >/dev/null 2>&1 & wait"))
            .await
            .unwrap();

        engine.enqueue(job.id).await.unwrap();
        wait_for_status(&jobs, job.id, JobStatus::Running).await;

        engine.cancel(job.id).await.unwrap();
        wait_for_status(&jobs, job.id, JobStatus::Cancelled).await;

        let job = jobs.get(job.id).await.unwrap();
        assert_eq!(job.exit_code, None);
        assert!(job.output.contains("process killed"));
    }

    #[tokio::test]
    async fn cancel_of_a_finished_job_is_a_conflict() {
        let (engine, jobs) = engine_with(EngineSettings::default());
        let job = jobs.create(Job::new("true")).await.unwrap();

        engine.enqueue(job.id).await.unwrap();
        wait_for_status(&jobs, job.id, JobStatus::Succeeded).await;

        assert!(matches!(
            engine.cancel(job.id).await,
            Err(Error::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn followers_see_live_output() {
        let (engine, jobs) = engine_with(EngineSettings::default());
        let job = jobs
            .create(Job::new("echo one; sleep 0.2; echo two"))
            .await
            .unwrap();

        engine.enqueue(job.id).await.unwrap();
        let mut output = engine.follow(job.id).expect("runtime registered");

        let mut seen = String::new();
        while let Ok(Ok(live)) = timeout(Duration::from_secs(5), output.recv()).await {
            seen.push_str(&live.chunk.content);
        }
        assert!(seen.contains("one"));
        assert!(seen.contains("two"));
    }

    #[tokio::test]
    async fn live_chunks_are_offset_into_the_stored_log() {
        let (engine, jobs) = engine_with(EngineSettings::default());
        let job = jobs
            .create(Job::new("echo one; sleep 0.1; echo two"))
            .await
            .unwrap();

        engine.enqueue(job.id).await.unwrap();
        let mut output = engine.follow(job.id).expect("runtime registered");

        let mut chunks = Vec::new();
        while let Ok(Ok(live)) = timeout(Duration::from_secs(5), output.recv()).await {
            chunks.push(live);
        }
        assert!(!chunks.is_empty());

        // each live chunk sits at its offset in the final log, so a follower
        // replaying the log can tell which chunks it already has
        let job = jobs.get(job.id).await.unwrap();
        for live in chunks {
            assert!(job.output[live.offset..].starts_with(&live.chunk.content));
        }
    }

    #[tokio::test]
    async fn subscribers_see_the_full_transition_sequence() {
        let (engine, jobs) = engine_with(EngineSettings::default());
        let mut transitions = engine.subscribe();
        let job = jobs.create(Job::new("echo hi")).await.unwrap();

        engine.enqueue(job.id).await.unwrap();
        wait_for_status(&jobs, job.id, JobStatus::Succeeded).await;

        let mut seen = Vec::new();
        while let Ok(Ok(transition)) =
            timeout(Duration::from_millis(200), transitions.recv()).await
        {
            if transition.job_id == job.id {
                seen.push(transition.status);
            }
            if transition.status.is_terminal() {
                break;
            }
        }
        assert_eq!(
            seen,
            vec![JobStatus::Queued, JobStatus::Running, JobStatus::Succeeded]
        );
    }

    #[tokio::test]
    async fn follow_returns_none_for_finished_jobs() {
        let (engine, jobs) = engine_with(EngineSettings::default());
        let job = jobs.create(Job::new("true")).await.unwrap();

        engine.enqueue(job.id).await.unwrap();
        wait_for_status(&jobs, job.id, JobStatus::Succeeded).await;
        // runtime is dropped with the job, give the worker a beat to clean up
        sleep(Duration::from_millis(50)).await;

        assert!(engine.follow(job.id).is_none());
    }
}
