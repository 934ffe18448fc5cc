//! Background job execution: a bounded in-process queue feeding a single
//! worker task. Submission is fire-and-forget; job outcomes land in the
//! store, not in the HTTP response.

use async_trait::async_trait;
use entitylens_research::dispatch::JobDispatcher;
use entitylens_research::researcher::Researcher;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

/// Dispatcher backed by the worker queue.
pub struct QueueDispatcher {
    tx: mpsc::Sender<Uuid>,
}

/// Create the bounded job queue and its dispatcher half.
pub fn job_queue(depth: usize) -> (QueueDispatcher, mpsc::Receiver<Uuid>) {
    let (tx, rx) = mpsc::channel(depth);
    (QueueDispatcher { tx }, rx)
}

#[async_trait]
impl JobDispatcher for QueueDispatcher {
    async fn dispatch(&self, job_id: Uuid) {
        // Backpressure: waits when the queue is full. A closed queue means
        // shutdown is in progress; the job stays pending in the store.
        if self.tx.send(job_id).await.is_err() {
            error!(job_id = %job_id, "Job queue closed, job left pending");
        }
    }
}

/// Spawn the worker loop. Failed jobs are already recorded in the store
/// by the researcher; here they are only logged.
pub fn spawn_worker(researcher: Arc<Researcher>, mut rx: mpsc::Receiver<Uuid>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(job_id) = rx.recv().await {
            info!(job_id = %job_id, "Worker picked up job");
            if let Err(e) = researcher.execute(job_id).await {
                error!(job_id = %job_id, error = %e, "Research job execution failed");
            }
        }
        info!("Job queue closed, worker exiting");
    })
}
