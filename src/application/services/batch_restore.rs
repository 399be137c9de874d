//! Bulk restore of archived emails back into a live mailbox.
//!
//! Small selections run inline on the caller's task, larger ones become a
//! background job on the restore queue, and anything above the hard ceiling
//! is turned away before any work starts.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::application::services::JobTracker;
use crate::config::EngineSettings;
use crate::domain::entities::{
    BatchRestoreRequest, Job, JobKind, MailAccount, RestoreItemOutcome, RestoreReport,
};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{
    AccountRepository, ArchiveStore, MailSession, MailTransport, MessageContent, SelectionHandoff,
};

/// Work item handed to the restore workers
#[derive(Debug, Clone)]
pub struct RestoreTask {
    pub job_id: String,
    pub request: BatchRestoreRequest,
}

pub fn restore_queue(capacity: usize) -> (mpsc::Sender<RestoreTask>, mpsc::Receiver<RestoreTask>) {
    mpsc::channel(capacity.max(1))
}

/// Where the caller wants to go afterwards and how it stages the selection
#[derive(Clone, Default)]
pub struct ReturnContext {
    pub return_to: Option<String>,
    handoff: Option<Arc<dyn SelectionHandoff>>,
}

impl ReturnContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_return_to(mut self, return_to: impl Into<String>) -> Self {
        self.return_to = Some(return_to.into());
        self
    }

    pub fn with_handoff(mut self, handoff: Arc<dyn SelectionHandoff>) -> Self {
        self.handoff = Some(handoff);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// Ran on the caller's task; every item has an outcome
    Inline {
        report: RestoreReport,
        return_to: Option<String>,
    },
    /// Handed to the background workers; poll the job for progress
    Queued {
        job_id: String,
        return_to: Option<String>,
    },
    /// Selection exceeds the hard ceiling; nothing was started
    TooManyItems { requested: usize, limit: usize },
}

/// Delivers a batch of archived emails to the target mailbox, one item at a time.
#[derive(Clone)]
pub struct RestoreRunner {
    accounts: Arc<dyn AccountRepository>,
    archive: Arc<dyn ArchiveStore>,
    transport: Arc<dyn MailTransport>,
    tracker: JobTracker,
    io_timeout: Duration,
}

impl RestoreRunner {
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        archive: Arc<dyn ArchiveStore>,
        transport: Arc<dyn MailTransport>,
        tracker: JobTracker,
        io_timeout: Duration,
    ) -> Self {
        Self {
            accounts,
            archive,
            transport,
            tracker,
            io_timeout,
        }
    }

    pub fn tracker(&self) -> &JobTracker {
        &self.tracker
    }

    pub async fn load_target(&self, account_id: &str) -> DomainResult<MailAccount> {
        let account = self
            .accounts
            .get_account(account_id)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("Account {}", account_id)))?;
        if account.mbox_only {
            return Err(DomainError::ValidationError(
                "Cannot restore into an mbox-only account".to_string(),
            ));
        }
        Ok(account)
    }

    /// Restore every requested email. Item failures are recorded and skipped;
    /// only a missing target or an unopenable session fail the whole batch.
    /// When `job_id` is given, progress goes to that job and the token is
    /// checked between items.
    pub async fn run(
        &self,
        request: &BatchRestoreRequest,
        job_id: Option<&str>,
        token: &CancellationToken,
    ) -> DomainResult<RestoreReport> {
        let span = tracing::info_span!(
            "batch_restore",
            target_account_id = %request.target_account_id,
            items = request.email_ids.len(),
            job_id = job_id.unwrap_or("inline")
        );
        self.run_batch(request, job_id, token).instrument(span).await
    }

    async fn run_batch(
        &self,
        request: &BatchRestoreRequest,
        job_id: Option<&str>,
        token: &CancellationToken,
    ) -> DomainResult<RestoreReport> {
        let target = self.load_target(&request.target_account_id).await?;

        let mut session = match tokio::time::timeout(self.io_timeout, self.transport.open(&target)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(DomainError::Connection(format!(
                    "Connecting to {}:{} timed out",
                    target.host, target.port
                )))
            }
        };

        let mut report = RestoreReport::default();
        for email_id in &request.email_ids {
            if token.is_cancelled() {
                tracing::info!(restored = report.restored(), "Restore cancelled");
                report.cancelled = true;
                break;
            }

            let outcome = match self.restore_item(session.as_mut(), request, email_id).await {
                Ok(()) => {
                    metrics::counter!("mailvault_restore_items_total", "outcome" => "restored")
                        .increment(1);
                    RestoreItemOutcome::success(email_id)
                }
                Err(e) => {
                    tracing::warn!(email_id = %email_id, "Restore item failed: {}", e);
                    metrics::counter!("mailvault_restore_items_total", "outcome" => "failed")
                        .increment(1);
                    RestoreItemOutcome::failure(email_id, e.to_string())
                }
            };

            if let Some(job_id) = job_id {
                let update = self
                    .tracker
                    .update(job_id, |job: &mut Job| match &outcome.error {
                        None => job.processed += 1,
                        Some(error) => job.record_error(format!("{}: {}", outcome.email_id, error)),
                    })
                    .await;
                if let Err(e) = update {
                    tracing::warn!(job_id, "Job update failed: {}", e);
                }
            }
            report.items.push(outcome);
        }

        if let Err(e) = self.timed(session.close()).await {
            tracing::debug!("Ignoring error while closing session: {}", e);
        }
        tracing::info!(
            restored = report.restored(),
            failed = report.failed(),
            "Restore batch finished"
        );
        Ok(report)
    }

    async fn restore_item(
        &self,
        session: &mut dyn MailSession,
        request: &BatchRestoreRequest,
        email_id: &str,
    ) -> DomainResult<()> {
        let email = self
            .archive
            .get_email(email_id)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("Archived email {}", email_id)))?;

        let folder = request
            .target_folder
            .clone()
            .unwrap_or_else(|| email.folder.clone());
        let content = MessageContent::new(email.raw);
        self.timed(session.deliver(&folder, &content)).await?;

        if let Err(e) = self.archive.mark_restored(email_id, Utc::now()).await {
            tracing::warn!(email_id, "Delivered but could not record restore: {}", e);
        }
        Ok(())
    }

    async fn timed<T, F>(&self, future: F) -> DomainResult<T>
    where
        F: Future<Output = DomainResult<T>>,
    {
        match tokio::time::timeout(self.io_timeout, future).await {
            Ok(result) => result,
            Err(_) => Err(DomainError::Transient(format!(
                "Mail server did not answer within {:?}",
                self.io_timeout
            ))),
        }
    }
}

#[derive(Clone)]
pub struct BatchRestoreDispatcher {
    runner: RestoreRunner,
    queue: mpsc::Sender<RestoreTask>,
    async_threshold: usize,
    max_async_emails: usize,
}

impl BatchRestoreDispatcher {
    pub fn new(
        runner: RestoreRunner,
        queue: mpsc::Sender<RestoreTask>,
        settings: &EngineSettings,
    ) -> Self {
        Self {
            runner,
            queue,
            async_threshold: settings.restore_async_threshold,
            max_async_emails: settings.restore_max_async_emails,
        }
    }

    pub async fn dispatch(
        &self,
        request: BatchRestoreRequest,
        context: ReturnContext,
    ) -> DomainResult<DispatchOutcome> {
        let requested = request.email_ids.len();
        if requested > self.max_async_emails {
            tracing::info!(
                requested,
                limit = self.max_async_emails,
                "Restore selection rejected"
            );
            return Ok(DispatchOutcome::TooManyItems {
                requested,
                limit: self.max_async_emails,
            });
        }
        if requested == 0 {
            return Err(DomainError::ValidationError(
                "No emails selected for restore".to_string(),
            ));
        }

        let target = self.runner.load_target(&request.target_account_id).await?;

        if requested > self.async_threshold {
            return self.enqueue(&target, request, context.return_to).await;
        }

        if let Some(handoff) = &context.handoff {
            if let Err(e) = handoff.stage(&request.email_ids) {
                tracing::warn!(
                    requested,
                    "Staging restore selection failed, running in background: {}",
                    e
                );
                return self.enqueue(&target, request, context.return_to).await;
            }
        }

        let report = self
            .runner
            .run(&request, None, &CancellationToken::new())
            .await?;
        Ok(DispatchOutcome::Inline {
            report,
            return_to: context.return_to,
        })
    }

    async fn enqueue(
        &self,
        target: &MailAccount,
        request: BatchRestoreRequest,
        return_to: Option<String>,
    ) -> DomainResult<DispatchOutcome> {
        let tracker = self.runner.tracker();
        let job_id = tracker
            .create(JobKind::BatchRestore, &target.id, &target.name)
            .await;
        let total = request.email_ids.len() as u64;
        let folder = request.target_folder.clone();
        tracker
            .update(&job_id, |job| {
                job.total = Some(total);
                if let Some(folder) = folder {
                    job.metadata.insert("target_folder".to_string(), folder);
                }
            })
            .await?;

        let task = RestoreTask {
            job_id: job_id.clone(),
            request,
        };
        if self.queue.send(task).await.is_err() {
            tracker
                .update(&job_id, |job| job.fail("Restore queue is closed"))
                .await?;
            return Err(DomainError::Internal("Restore queue is closed".to_string()));
        }

        tracing::info!(job_id = %job_id, items = total, "Restore queued for background execution");
        Ok(DispatchOutcome::Queued { job_id, return_to })
    }
}
