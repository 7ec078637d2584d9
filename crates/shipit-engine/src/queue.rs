//! FIFO job queue shared between the engine and its workers.

use shipit_core::{Error, ResourceId, Result};
use tokio::sync::{Mutex, mpsc};

/// A bounded multi-producer queue of job ids. Workers take turns claiming
/// the receiver, so each queued job is handed to exactly one worker.
pub struct JobQueue {
    tx: mpsc::Sender<ResourceId>,
    rx: Mutex<mpsc::Receiver<ResourceId>>,
}

impl JobQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Enqueue a job id, waiting if the queue is at capacity.
    pub async fn push(&self, job_id: ResourceId) -> Result<()> {
        self.tx
            .send(job_id)
            .await
            .map_err(|_| Error::Internal("job queue is closed".to_string()))
    }

    /// Claim the next job id. Returns `None` once the queue is closed and
    /// drained.
    pub async fn claim(&self) -> Option<ResourceId> {
        self.rx.lock().await.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_in_fifo_order() {
        let queue = JobQueue::new(8);
        let first = ResourceId::new();
        let second = ResourceId::new();

        queue.push(first).await.unwrap();
        queue.push(second).await.unwrap();

        assert_eq!(queue.claim().await, Some(first));
        assert_eq!(queue.claim().await, Some(second));
    }

    #[tokio::test]
    async fn each_job_goes_to_one_claimer() {
        let queue = std::sync::Arc::new(JobQueue::new(8));
        for _ in 0..4 {
            queue.push(ResourceId::new()).await.unwrap();
        }

        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(queue.claim().await.unwrap());
        }
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 4);
    }
}
