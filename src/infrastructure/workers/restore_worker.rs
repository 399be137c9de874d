use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::application::services::{JobTracker, RestoreRunner, RestoreTask};
use crate::domain::entities::{Job, JobState};

/// Drains the background restore queue. Several processors may share one
/// receiver; each task is picked up by exactly one of them.
pub struct RestoreProcessor {
    id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<RestoreTask>>>,
    runner: RestoreRunner,
}

impl RestoreProcessor {
    pub fn new(
        id: usize,
        receiver: Arc<Mutex<mpsc::Receiver<RestoreTask>>>,
        runner: RestoreRunner,
    ) -> Self {
        Self {
            id,
            receiver,
            runner,
        }
    }

    pub async fn run(&self) {
        info!(worker = self.id, "Starting RestoreProcessor...");
        loop {
            let task = {
                let mut receiver = self.receiver.lock().await;
                receiver.recv().await
            };
            match task {
                Some(task) => self.process(task).await,
                None => break,
            }
        }
        info!(worker = self.id, "Restore queue closed, RestoreProcessor exiting");
    }

    pub async fn process(&self, task: RestoreTask) {
        let tracker = self.runner.tracker();
        let Some(token) = tracker.cancellation_token(&task.job_id).await else {
            error!(job_id = %task.job_id, "Restore job is no longer tracked, dropping task");
            return;
        };

        if token.is_cancelled() {
            info!(job_id = %task.job_id, "Restore job cancelled before it started");
            finish(tracker, &task.job_id, |job| job.cancel()).await;
            return;
        }

        info!(job_id = %task.job_id, items = task.request.email_ids.len(), "Processing restore job");
        finish(tracker, &task.job_id, |job| job.start(JobState::Running)).await;

        match self
            .runner
            .run(&task.request, Some(&task.job_id), &token)
            .await
        {
            Ok(report) if report.cancelled => {
                info!(job_id = %task.job_id, restored = report.restored(), "Restore job cancelled");
                finish(tracker, &task.job_id, |job| job.cancel()).await;
            }
            Ok(report) => {
                info!(
                    job_id = %task.job_id,
                    restored = report.restored(),
                    failed = report.failed(),
                    "Restore job completed"
                );
                finish(tracker, &task.job_id, |job| job.complete()).await;
            }
            Err(e) => {
                error!(job_id = %task.job_id, "Restore job failed: {}", e);
                let reason = e.to_string();
                finish(tracker, &task.job_id, move |job| job.fail(reason)).await;
            }
        }
    }
}

async fn finish<F>(tracker: &JobTracker, job_id: &str, f: F)
where
    F: FnOnce(&mut Job),
{
    if let Err(e) = tracker.update(job_id, f).await {
        error!(job_id, "Failed to update restore job: {}", e);
    }
}

/// Start `count` processors sharing one queue receiver.
pub fn spawn_restore_workers(
    count: usize,
    receiver: mpsc::Receiver<RestoreTask>,
    runner: RestoreRunner,
) -> Vec<JoinHandle<()>> {
    let receiver = Arc::new(Mutex::new(receiver));
    (0..count.max(1))
        .map(|id| {
            let processor = RestoreProcessor::new(id, receiver.clone(), runner.clone());
            tokio::spawn(async move { processor.run().await })
        })
        .collect()
}
