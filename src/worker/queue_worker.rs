//! Queue worker — claims pipeline jobs for one group and dispatches them.

use std::sync::Arc;
use std::time::Duration;

use crate::error::Error;
use crate::queue::{ClaimedJob, JobQueue};

use super::dispatcher::PipelineDispatcher;

/// Counts from one [`QueueWorker::tick`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub processed: usize,
    pub failed: usize,
}

pub struct QueueWorker {
    queue: Arc<dyn JobQueue>,
    dispatcher: PipelineDispatcher,
    group: String,
    batch: usize,
}

impl QueueWorker {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        dispatcher: PipelineDispatcher,
        group: impl Into<String>,
        batch: usize,
    ) -> Self {
        Self {
            queue,
            dispatcher,
            group: group.into(),
            batch: batch.max(1),
        }
    }

    /// Claim and run up to `batch` jobs, one at a time.
    pub async fn tick(&self) -> TickSummary {
        let mut summary = TickSummary::default();

        for _ in 0..self.batch {
            let job = match self.queue.claim_next(&self.group).await {
                Ok(Some(job)) => job,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(group = %self.group, "Failed to claim job: {}", e);
                    break;
                }
            };

            summary.processed += 1;
            if !self.process(job).await {
                summary.failed += 1;
            }
        }

        if summary.processed > 0 {
            tracing::debug!(
                processed = summary.processed,
                failed = summary.failed,
                "Queue tick finished"
            );
        }
        summary
    }

    /// Tick until the queue is empty or `max_ticks` is reached. Returns the
    /// number of jobs processed.
    pub async fn run_until_idle(&self, max_ticks: usize) -> usize {
        let mut total = 0;
        for _ in 0..max_ticks {
            let summary = self.tick().await;
            if summary.processed == 0 {
                break;
            }
            total += summary.processed;
        }
        total
    }

    /// Run one claimed job and record its result. Returns false on failure.
    async fn process(&self, job: ClaimedJob) -> bool {
        let result: Result<(), Error> = match job.decode() {
            Ok(pipeline_job) => self.dispatcher.dispatch(pipeline_job).await.map(|_| ()),
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(()) => {
                if let Err(e) = self.queue.complete(job.id).await {
                    tracing::error!(job_id = job.id, "Failed to mark job complete: {}", e);
                }
                true
            }
            Err(e) => {
                tracing::error!(job_id = job.id, hook = %job.hook, attempts = job.attempts, "Job failed: {}", e);
                if let Err(e) = self.queue.fail(job.id, &e.to_string()).await {
                    tracing::error!(job_id = job.id, "Failed to mark job failed: {}", e);
                }
                false
            }
        }
    }
}

/// Spawn the queue polling background task.
pub fn spawn_queue_worker(
    worker: Arc<QueueWorker>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // Skip immediate first tick
        ticker.tick().await;

        loop {
            ticker.tick().await;
            worker.tick().await;
        }
    })
}
