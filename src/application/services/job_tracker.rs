//! In-memory registry of in-flight jobs.
//!
//! Every read-modify-write runs under a single write lock, so concurrent
//! progress increments are never lost. Cancellation is cooperative: `cancel`
//! only trips the job's token and the owning worker reaches the terminal
//! state itself at its next checkpoint.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::entities::{Job, JobKind};
use crate::domain::errors::{DomainError, DomainResult};

struct TrackedJob {
    job: Job,
    token: CancellationToken,
}

#[derive(Clone, Default)]
pub struct JobTracker {
    jobs: Arc<RwLock<HashMap<String, TrackedJob>>>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new job in the Queued state and return its id.
    pub async fn create(&self, kind: JobKind, subject_id: &str, subject_name: &str) -> String {
        let mut jobs = self.jobs.write().await;
        Self::insert(&mut jobs, kind, subject_id, subject_name)
    }

    /// Register a job unless another job of the same kind is still active for
    /// the same subject. Check and insert happen under one lock.
    pub async fn try_create_exclusive(
        &self,
        kind: JobKind,
        subject_id: &str,
        subject_name: &str,
    ) -> Option<String> {
        let mut jobs = self.jobs.write().await;
        let busy = jobs.values().any(|tracked| {
            tracked.job.kind == kind
                && tracked.job.subject_id == subject_id
                && tracked.job.is_active()
        });
        if busy {
            return None;
        }
        Some(Self::insert(&mut jobs, kind, subject_id, subject_name))
    }

    fn insert(
        jobs: &mut HashMap<String, TrackedJob>,
        kind: JobKind,
        subject_id: &str,
        subject_name: &str,
    ) -> String {
        let id = Uuid::new_v4().to_string();
        let job = Job::new(
            id.clone(),
            kind,
            subject_id.to_string(),
            subject_name.to_string(),
        );
        jobs.insert(
            id.clone(),
            TrackedJob {
                job,
                token: CancellationToken::new(),
            },
        );
        tracing::debug!(job_id = %id, kind = %kind, subject_id, "Job registered");
        id
    }

    /// Apply `mutator` atomically. Terminal jobs are left untouched and a
    /// mutation that would move the state backwards keeps the old state.
    /// Returns whether the mutation was applied.
    pub async fn update<F>(&self, job_id: &str, mutator: F) -> DomainResult<bool>
    where
        F: FnOnce(&mut Job),
    {
        let mut jobs = self.jobs.write().await;
        let tracked = jobs
            .get_mut(job_id)
            .ok_or_else(|| DomainError::NotFound(format!("Job {}", job_id)))?;

        if tracked.job.state.is_terminal() {
            return Ok(false);
        }

        let previous = tracked.job.state;
        let mut next = tracked.job.clone();
        mutator(&mut next);

        if next.state != previous && !previous.can_transition_to(next.state) {
            tracing::warn!(
                job_id,
                from = %previous,
                to = %next.state,
                "Ignoring backwards job state transition"
            );
            next.state = previous;
            next.finished_at = None;
        }

        if next.state.is_terminal() {
            tracing::info!(
                job_id,
                kind = %next.kind,
                state = %next.state,
                processed = next.processed,
                errors = next.error_count,
                "Job finished"
            );
        }

        tracked.job = next;
        Ok(true)
    }

    pub async fn get(&self, job_id: &str) -> DomainResult<Job> {
        self.jobs
            .read()
            .await
            .get(job_id)
            .map(|tracked| tracked.job.clone())
            .ok_or_else(|| DomainError::NotFound(format!("Job {}", job_id)))
    }

    /// Signal cancellation. False when the job is unknown or already terminal.
    pub async fn cancel(&self, job_id: &str) -> bool {
        let jobs = self.jobs.read().await;
        match jobs.get(job_id) {
            Some(tracked) if tracked.job.is_active() => {
                tracked.token.cancel();
                tracing::info!(job_id, kind = %tracked.job.kind, "Job cancellation requested");
                true
            }
            _ => false,
        }
    }

    /// Signal cancellation to every active job of `kind`; returns how many were signalled.
    pub async fn cancel_all(&self, kind: JobKind) -> usize {
        let jobs = self.jobs.read().await;
        let mut signalled = 0;
        for tracked in jobs.values() {
            if tracked.job.kind == kind && tracked.job.is_active() {
                tracked.token.cancel();
                signalled += 1;
            }
        }
        signalled
    }

    pub async fn cancellation_token(&self, job_id: &str) -> Option<CancellationToken> {
        self.jobs
            .read()
            .await
            .get(job_id)
            .map(|tracked| tracked.token.clone())
    }

    pub async fn list_active(&self) -> Vec<Job> {
        let mut active: Vec<Job> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|tracked| tracked.job.is_active())
            .map(|tracked| tracked.job.clone())
            .collect();
        active.sort_by_key(|job| job.created_at);
        active
    }

    pub async fn is_active_for(&self, kind: JobKind, subject_id: &str) -> bool {
        self.jobs.read().await.values().any(|tracked| {
            tracked.job.kind == kind
                && tracked.job.subject_id == subject_id
                && tracked.job.is_active()
        })
    }

    pub async fn active_count(&self, kind: JobKind) -> usize {
        self.jobs
            .read()
            .await
            .values()
            .filter(|tracked| tracked.job.kind == kind && tracked.job.is_active())
            .count()
    }

    /// Drop terminal jobs that finished more than `retention` ago.
    pub async fn purge_finished(&self, retention: chrono::Duration) -> usize {
        let cutoff = Utc::now() - retention;
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, tracked| match tracked.job.finished_at {
            Some(finished_at) => finished_at > cutoff,
            None => true,
        });
        let purged = before - jobs.len();
        if purged > 0 {
            tracing::debug!(purged, "Purged finished jobs");
        }
        purged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::JobState;

    #[tokio::test]
    async fn test_create_and_get() {
        let tracker = JobTracker::new();
        let id = tracker.create(JobKind::Sync, "acc-1", "Work").await;

        let job = tracker.get(&id).await.unwrap();
        assert_eq!(job.kind, JobKind::Sync);
        assert_eq!(job.subject_id, "acc-1");
        assert_eq!(job.state, JobState::Queued);
        assert!(matches!(
            tracker.get("missing").await,
            Err(DomainError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_exclusive_create_per_subject() {
        let tracker = JobTracker::new();
        let first = tracker
            .try_create_exclusive(JobKind::Sync, "acc-1", "Work")
            .await;
        assert!(first.is_some());
        assert!(tracker
            .try_create_exclusive(JobKind::Sync, "acc-1", "Work")
            .await
            .is_none());
        // Other accounts and other kinds are unaffected
        assert!(tracker
            .try_create_exclusive(JobKind::Sync, "acc-2", "Home")
            .await
            .is_some());
        assert!(tracker
            .try_create_exclusive(JobKind::MboxImport, "acc-1", "Work")
            .await
            .is_some());

        let first = first.unwrap();
        tracker.update(&first, |job| job.complete()).await.unwrap();
        assert!(tracker
            .try_create_exclusive(JobKind::Sync, "acc-1", "Work")
            .await
            .is_some());
    }

    #[tokio::test]
    async fn test_update_on_terminal_job_is_noop() {
        let tracker = JobTracker::new();
        let id = tracker.create(JobKind::MboxImport, "acc-1", "Work").await;
        tracker
            .update(&id, |job| job.start(JobState::Importing))
            .await
            .unwrap();
        tracker.update(&id, |job| job.cancel()).await.unwrap();

        let applied = tracker
            .update(&id, |job| {
                job.processed = 99;
                job.complete();
            })
            .await
            .unwrap();
        assert!(!applied);

        let job = tracker.get(&id).await.unwrap();
        assert_eq!(job.state, JobState::Cancelled);
        assert_eq!(job.processed, 0);
    }

    #[tokio::test]
    async fn test_backwards_transition_keeps_state() {
        let tracker = JobTracker::new();
        let id = tracker.create(JobKind::MboxImport, "acc-1", "Work").await;
        tracker
            .update(&id, |job| job.start(JobState::Importing))
            .await
            .unwrap();
        tracker
            .update(&id, |job| {
                job.state = JobState::Estimating;
                job.processed = 3;
            })
            .await
            .unwrap();

        let job = tracker.get(&id).await.unwrap();
        assert_eq!(job.state, JobState::Importing);
        assert_eq!(job.processed, 3);
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_not_lost() {
        let tracker = JobTracker::new();
        let id = tracker.create(JobKind::BatchRestore, "acc-1", "Work").await;

        let mut handles = Vec::new();
        for _ in 0..16 {
            let tracker = tracker.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..50 {
                    tracker.update(&id, |job| job.processed += 1).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(tracker.get(&id).await.unwrap().processed, 800);
    }

    #[tokio::test]
    async fn test_cancel_signals_token_only() {
        let tracker = JobTracker::new();
        let id = tracker.create(JobKind::Sync, "acc-1", "Work").await;
        let token = tracker.cancellation_token(&id).await.unwrap();

        assert!(tracker.cancel(&id).await);
        assert!(token.is_cancelled());
        // The worker has not acknowledged yet
        assert!(tracker.get(&id).await.unwrap().is_active());

        tracker.update(&id, |job| job.cancel()).await.unwrap();
        assert!(!tracker.cancel(&id).await);
        assert!(!tracker.cancel("unknown").await);
    }

    #[tokio::test]
    async fn test_list_active_and_purge() {
        let tracker = JobTracker::new();
        let running = tracker.create(JobKind::Sync, "acc-1", "Work").await;
        let done = tracker.create(JobKind::Sync, "acc-2", "Home").await;
        tracker.update(&done, |job| job.complete()).await.unwrap();

        let active = tracker.list_active().await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, running);

        assert_eq!(tracker.purge_finished(chrono::Duration::hours(1)).await, 0);
        assert_eq!(tracker.purge_finished(chrono::Duration::zero()).await, 1);
        assert!(tracker.get(&done).await.is_err());
        assert!(tracker.get(&running).await.is_ok());
    }
}
