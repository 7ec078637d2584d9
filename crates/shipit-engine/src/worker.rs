//! Worker loop: claims queued jobs, runs them through the executor and
//! records their output and final status.

use shipit_core::ResourceId;
use shipit_core::executor::{CommandSpec, Execution, Executor, OutputChunk, OutputStream};
use shipit_core::job::JobStatus;
use shipit_store::JobRepo;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use crate::engine::{JobTransition, LiveChunk, RuntimeMap};
use crate::queue::JobQueue;

pub(crate) struct Worker {
    id: String,
    queue: Arc<JobQueue>,
    jobs: Arc<dyn JobRepo>,
    executor: Arc<dyn Executor>,
    runtimes: RuntimeMap,
    transitions: broadcast::Sender<JobTransition>,
    cancel_grace: Duration,
}

impl Worker {
    pub(crate) fn new(
        index: usize,
        queue: Arc<JobQueue>,
        jobs: Arc<dyn JobRepo>,
        executor: Arc<dyn Executor>,
        runtimes: RuntimeMap,
        transitions: broadcast::Sender<JobTransition>,
        cancel_grace: Duration,
    ) -> Self {
        Self {
            id: format!("worker-{index}"),
            queue,
            jobs,
            executor,
            runtimes,
            transitions,
            cancel_grace,
        }
    }

    pub(crate) async fn run(self) {
        debug!(worker = %self.id, "Worker started");
        while let Some(job_id) = self.queue.claim().await {
            if let Err(e) = self.process(job_id).await {
                error!(worker = %self.id, job_id = %job_id, error = %e, "Job processing failed");
            }
        }
        debug!(worker = %self.id, "Worker stopped");
    }

    async fn process(&self, job_id: ResourceId) -> shipit_core::Result<()> {
        let job = self.jobs.get(job_id).await?;
        if job.status != JobStatus::Queued {
            // cancelled while waiting in the queue
            debug!(worker = %self.id, job_id = %job_id, status = %job.status, "Skipping claimed job");
            return Ok(());
        }

        let (cancel, output) = {
            let runtimes = self.runtimes.lock().expect("runtimes lock");
            match runtimes.get(&job_id) {
                Some(runtime) => (runtime.cancel.subscribe(), runtime.output.clone()),
                None => {
                    warn!(worker = %self.id, job_id = %job_id, "No runtime for claimed job");
                    return Ok(());
                }
            }
        };

        self.jobs.transition(job_id, JobStatus::Running).await?;
        self.emit(job_id, JobStatus::Running);
        info!(worker = %self.id, job_id = %job_id, "Job started");

        let mut spec = CommandSpec::new(job_id, &job.command);
        spec.env = job.env.clone();

        let status = match self.executor.spawn(spec).await {
            Ok(execution) => self.drive(job_id, execution, cancel, output).await,
            Err(e) => {
                self.log(job_id, &output, format!("failed to start: {e}\n"))
                    .await;
                JobStatus::Errored
            }
        };

        self.finish(job_id, status).await;
        Ok(())
    }

    /// Pump output until the process finishes or cancellation is requested.
    async fn drive(
        &self,
        job_id: ResourceId,
        mut execution: Box<dyn Execution>,
        mut cancel: watch::Receiver<bool>,
        output: broadcast::Sender<LiveChunk>,
    ) -> JobStatus {
        let mut cancelled = false;
        loop {
            tokio::select! {
                chunk = execution.next_chunk() => match chunk {
                    Some(chunk) => {
                        let offset = match self.jobs.append_output(job_id, &chunk.content).await {
                            Ok(offset) => offset,
                            Err(e) => {
                                warn!(job_id = %job_id, error = %e, "Failed to record output");
                                // not in the log, so never covered by a replay
                                usize::MAX
                            }
                        };
                        // lagged observers drop chunks instead of blocking us
                        let _ = output.send(LiveChunk { offset, chunk });
                    }
                    None => break,
                },
                changed = cancel.changed() => {
                    if changed.is_ok() && *cancel.borrow_and_update() {
                        cancelled = true;
                        break;
                    }
                }
            }
        }

        if cancelled {
            self.log(job_id, &output, "cancellation requested\n".to_string())
                .await;
            if let Err(e) = execution.terminate().await {
                warn!(job_id = %job_id, error = %e, "Failed to signal process");
            }
            match tokio::time::timeout(self.cancel_grace, execution.wait()).await {
                Ok(Ok(code)) => {
                    let _ = self.jobs.set_exit_code(job_id, code).await;
                }
                Ok(Err(e)) => {
                    warn!(job_id = %job_id, error = %e, "Wait failed after cancellation");
                }
                Err(_) => {
                    if let Err(e) = execution.kill().await {
                        warn!(job_id = %job_id, error = %e, "Failed to kill process");
                    }
                    let _ = execution.wait().await;
                    self.log(job_id, &output, "process killed\n".to_string())
                        .await;
                }
            }
            return JobStatus::Cancelled;
        }

        match execution.wait().await {
            Ok(code) => {
                let _ = self.jobs.set_exit_code(job_id, code).await;
                if code == Some(0) {
                    JobStatus::Succeeded
                } else {
                    JobStatus::Failed
                }
            }
            Err(e) => {
                self.log(job_id, &output, format!("wait failed: {e}\n")).await;
                JobStatus::Errored
            }
        }
    }

    /// Record an engine-originated message in the log and on the live stream.
    async fn log(&self, job_id: ResourceId, output: &broadcast::Sender<LiveChunk>, message: String) {
        let offset = self
            .jobs
            .append_output(job_id, &message)
            .await
            .unwrap_or(usize::MAX);
        let _ = output.send(LiveChunk {
            offset,
            chunk: OutputChunk::now(OutputStream::System, message),
        });
    }

    async fn finish(&self, job_id: ResourceId, status: JobStatus) {
        // dropping the runtime closes the output stream for followers
        self.runtimes
            .lock()
            .expect("runtimes lock")
            .remove(&job_id);

        match self.jobs.transition(job_id, status).await {
            Ok(_) => {
                self.emit(job_id, status);
                info!(worker = %self.id, job_id = %job_id, status = %status, "Job finished");
            }
            Err(e) => {
                error!(worker = %self.id, job_id = %job_id, error = %e, "Failed to record final status");
            }
        }
    }

    fn emit(&self, job_id: ResourceId, status: JobStatus) {
        let _ = self.transitions.send(JobTransition { job_id, status });
    }
}
