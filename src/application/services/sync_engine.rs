//! One account's synchronization pass, plus the connection helpers used by
//! account configuration.
//!
//! A pass opens a single transport session, walks the folders in server
//! order and archives every message it has not seen before. Folder-level
//! failures are counted and skipped; connection or storage failures end the
//! pass as Failed. The watermark only moves, to the pass start time, when
//! nothing at all went wrong.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::Instrument;

use crate::application::services::JobTracker;
use crate::domain::entities::{
    never_synced, ArchiveSource, Job, JobKind, JobState, MailAccount, UpsertOutcome,
};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{
    AccountRepository, ArchiveStore, MailSession, MailTransport, MessageRef, TaskSpawner,
};
use crate::domain::services::fingerprint;
use crate::infrastructure::providers::EmailParser;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Only messages newer than the account watermark
    Incremental,
    /// Every message, regardless of the watermark
    Full,
}

/// What a pass did, reported to whoever ran it
#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    pub job_id: String,
    pub state: JobState,
    pub folders_completed: Vec<String>,
    pub messages_added: u64,
    pub messages_skipped: u64,
    pub error_count: u64,
    pub watermark_advanced: bool,
    pub failure: Option<String>,
}

impl SyncResult {
    fn new(job_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            state: JobState::Running,
            folders_completed: Vec::new(),
            messages_added: 0,
            messages_skipped: 0,
            error_count: 0,
            watermark_advanced: false,
            failure: None,
        }
    }
}

#[derive(Default)]
struct FolderStats {
    added: u64,
    skipped: u64,
    errors: u64,
}

#[derive(Clone)]
pub struct SyncEngine {
    accounts: Arc<dyn AccountRepository>,
    archive: Arc<dyn ArchiveStore>,
    transport: Arc<dyn MailTransport>,
    tracker: JobTracker,
    spawner: Arc<dyn TaskSpawner>,
    slots: Arc<Semaphore>,
    io_timeout: Duration,
    parser: EmailParser,
}

impl SyncEngine {
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        archive: Arc<dyn ArchiveStore>,
        transport: Arc<dyn MailTransport>,
        tracker: JobTracker,
        spawner: Arc<dyn TaskSpawner>,
        max_concurrent_syncs: usize,
        io_timeout: Duration,
    ) -> Self {
        Self {
            accounts,
            archive,
            transport,
            tracker,
            spawner,
            slots: Arc::new(Semaphore::new(max_concurrent_syncs.max(1))),
            io_timeout,
            parser: EmailParser::new(),
        }
    }

    pub fn tracker(&self) -> &JobTracker {
        &self.tracker
    }

    /// Run one pass for `account` under the already registered `job_id`.
    pub async fn sync(&self, account: &MailAccount, job_id: &str, mode: SyncMode) -> SyncResult {
        let span = tracing::info_span!(
            "sync_pass",
            account_id = %account.id,
            job_id,
            mode = ?mode
        );
        self.run_pass(account, job_id, mode).instrument(span).await
    }

    async fn run_pass(&self, account: &MailAccount, job_id: &str, mode: SyncMode) -> SyncResult {
        let started_at = Utc::now();
        let mut result = SyncResult::new(job_id);
        let token = self
            .tracker
            .cancellation_token(job_id)
            .await
            .unwrap_or_default();

        self.track(job_id, |job| job.start(JobState::Running)).await;

        if account.mbox_only {
            return self
                .fail(result, "Account is mbox-only and has no live connection")
                .await;
        }
        if !account.enabled && mode == SyncMode::Incremental {
            return self.fail(result, "Account is disabled").await;
        }
        if token.is_cancelled() {
            return self.cancel(result).await;
        }

        let mut session = match self.open_session(account).await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!("Could not open mail session: {}", e);
                return self.fail(result, e.to_string()).await;
            }
        };

        let folders = match self.timed("list folders", session.list_folders()).await {
            Ok(folders) => folders,
            Err(e) => {
                self.close_session(session.as_mut()).await;
                return self.fail(result, e.to_string()).await;
            }
        };

        let since = match mode {
            SyncMode::Full => None,
            SyncMode::Incremental if account.has_synced() => Some(account.last_sync),
            SyncMode::Incremental => None,
        };
        tracing::info!(folders = folders.len(), since = ?since, "Sync pass started");

        let mut cancelled = false;
        for folder in folders {
            if account.is_folder_excluded(&folder) {
                tracing::debug!(folder = %folder, "Skipping excluded folder");
                continue;
            }

            match self
                .sync_folder(session.as_mut(), account, &folder, since, job_id)
                .await
            {
                Ok(stats) => {
                    result.messages_added += stats.added;
                    result.messages_skipped += stats.skipped;
                    result.error_count += stats.errors;
                    if stats.errors == 0 {
                        result.folders_completed.push(folder.clone());
                    }
                }
                Err(e) if e.is_account_level() => {
                    tracing::error!(folder = %folder, "Aborting sync pass: {}", e);
                    self.close_session(session.as_mut()).await;
                    return self.fail(result, e.to_string()).await;
                }
                Err(e) => {
                    tracing::warn!(folder = %folder, "Folder sync failed: {}", e);
                    result.error_count += 1;
                    let message = format!("{}: {}", folder, e);
                    self.track(job_id, |job| job.record_error(message)).await;
                }
            }
            self.track(job_id, |job| job.folders_processed += 1).await;

            if token.is_cancelled() {
                tracing::info!(folder = %folder, "Sync pass cancelled after folder");
                cancelled = true;
                break;
            }
        }

        self.close_session(session.as_mut()).await;

        if cancelled {
            return self.cancel(result).await;
        }

        if result.error_count == 0 {
            match self.accounts.advance_watermark(&account.id, started_at).await {
                Ok(advanced) => result.watermark_advanced = advanced,
                Err(e) => {
                    tracing::error!("Failed to advance watermark: {}", e);
                    result.error_count += 1;
                    let message = format!("watermark: {}", e);
                    self.track(job_id, |job| job.record_error(message)).await;
                }
            }
        } else {
            tracing::warn!(
                errors = result.error_count,
                "Sync pass finished with errors, watermark unchanged"
            );
        }

        self.track(job_id, |job| job.complete()).await;
        metrics::counter!("mailvault_sync_passes_total", "outcome" => "completed").increment(1);
        tracing::info!(
            added = result.messages_added,
            skipped = result.messages_skipped,
            errors = result.error_count,
            "Sync pass completed"
        );
        result.state = JobState::Completed;
        result
    }

    async fn sync_folder(
        &self,
        session: &mut dyn MailSession,
        account: &MailAccount,
        folder: &str,
        since: Option<DateTime<Utc>>,
        job_id: &str,
    ) -> DomainResult<FolderStats> {
        let refs = self
            .timed("fetch message list", session.fetch_since(folder, since))
            .await?;
        tracing::debug!(folder, messages = refs.len(), "Fetched message list");

        let mut stats = FolderStats::default();
        for message in refs {
            match self.archive_message(session, account, folder, &message).await {
                Ok(Some(UpsertOutcome::Inserted)) => {
                    stats.added += 1;
                    self.track(job_id, |job| job.processed += 1).await;
                }
                Ok(_) => {
                    stats.skipped += 1;
                    self.track(job_id, |job| job.skipped += 1).await;
                }
                Err(e) if e.is_account_level() => return Err(e),
                Err(e) => {
                    tracing::warn!(folder, uid = message.uid, "Failed to archive message: {}", e);
                    stats.errors += 1;
                    let text = format!("{} UID {}: {}", folder, message.uid, e);
                    self.track(job_id, |job| job.record_error(text)).await;
                }
            }
        }

        if stats.added > 0 {
            metrics::counter!("mailvault_messages_archived_total", "source" => "imap")
                .increment(stats.added);
        }
        Ok(stats)
    }

    /// Archive one message. `Ok(None)` means it was already archived and
    /// its body was never downloaded.
    async fn archive_message(
        &self,
        session: &mut dyn MailSession,
        account: &MailAccount,
        folder: &str,
        message: &MessageRef,
    ) -> DomainResult<Option<UpsertOutcome>> {
        let known = message
            .message_id
            .as_deref()
            .and_then(|id| fingerprint::from_message_id(&account.id, folder, id));

        if let Some(fp) = &known {
            if self.archive.contains(&account.id, fp).await? {
                return Ok(None);
            }
        }

        let content = self.timed("fetch body", session.fetch_body(message)).await?;
        let parsed = self.parser.parse_email(&content.raw)?;

        let fp = match known {
            Some(fp) => fp,
            None => {
                let fp = fingerprint::compute(
                    &account.id,
                    folder,
                    parsed.message_id.as_deref(),
                    &content.raw,
                );
                if self.archive.contains(&account.id, &fp).await? {
                    return Ok(None);
                }
                fp
            }
        };

        let email = parsed.into_archived(&account.id, folder, fp, ArchiveSource::Imap, content.raw);
        self.archive.upsert_if_absent(&email).await.map(Some)
    }

    async fn open_session(&self, account: &MailAccount) -> DomainResult<Box<dyn MailSession>> {
        match tokio::time::timeout(self.io_timeout, self.transport.open(account)).await {
            Ok(result) => result,
            Err(_) => Err(DomainError::Connection(format!(
                "Connecting to {}:{} timed out after {:?}",
                account.host, account.port, self.io_timeout
            ))),
        }
    }

    async fn close_session(&self, session: &mut dyn MailSession) {
        if let Err(e) = self.timed("logout", session.close()).await {
            tracing::debug!("Ignoring error while closing session: {}", e);
        }
    }

    /// Apply the per-operation deadline; an elapsed deadline is a transient error.
    async fn timed<T, F>(&self, operation: &str, future: F) -> DomainResult<T>
    where
        F: Future<Output = DomainResult<T>>,
    {
        match tokio::time::timeout(self.io_timeout, future).await {
            Ok(result) => result,
            Err(_) => Err(DomainError::Transient(format!(
                "{} timed out after {:?}",
                operation, self.io_timeout
            ))),
        }
    }

    async fn track<F>(&self, job_id: &str, mutator: F)
    where
        F: FnOnce(&mut Job),
    {
        if let Err(e) = self.tracker.update(job_id, mutator).await {
            tracing::warn!(job_id, "Job update failed: {}", e);
        }
    }

    async fn fail(&self, mut result: SyncResult, reason: impl Into<String>) -> SyncResult {
        let reason = reason.into();
        let failure = reason.clone();
        self.track(&result.job_id, |job| job.fail(failure)).await;
        metrics::counter!("mailvault_sync_passes_total", "outcome" => "failed").increment(1);
        result.state = JobState::Failed;
        result.failure = Some(reason);
        result
    }

    async fn cancel(&self, mut result: SyncResult) -> SyncResult {
        self.track(&result.job_id, |job| job.cancel()).await;
        metrics::counter!("mailvault_sync_passes_total", "outcome" => "cancelled").increment(1);
        result.state = JobState::Cancelled;
        result
    }

    /// Register a sync job for `account` and run it on the bounded sync pool.
    /// `None` when a pass for this account is already queued or running.
    pub async fn spawn_pass(&self, account: MailAccount, mode: SyncMode) -> Option<String> {
        let job_id = self
            .tracker
            .try_create_exclusive(JobKind::Sync, &account.id, &account.name)
            .await?;
        self.run_on_pool(account, job_id.clone(), mode);
        Some(job_id)
    }

    fn run_on_pool(&self, account: MailAccount, job_id: String, mode: SyncMode) {
        let engine = self.clone();
        self.spawner.spawn(Box::pin(async move {
            let token = engine
                .tracker
                .cancellation_token(&job_id)
                .await
                .unwrap_or_default();

            let permit = tokio::select! {
                permit = engine.slots.clone().acquire_owned() => permit,
                _ = token.cancelled() => {
                    engine.track(&job_id, |job| job.cancel()).await;
                    return;
                }
            };
            let _permit = match permit {
                Ok(permit) => permit,
                Err(_) => {
                    engine.track(&job_id, |job| job.fail("Sync pool is closed")).await;
                    return;
                }
            };

            engine.sync(&account, &job_id, mode).await;
        }));
    }

    /// Queue an incremental pass for `account_id` right away.
    pub async fn sync_now(&self, account_id: &str) -> DomainResult<String> {
        let account = self
            .accounts
            .get_account(account_id)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("Account {}", account_id)))?;

        if account.mbox_only {
            return Err(DomainError::ValidationError(
                "Account is mbox-only and cannot be synchronized".to_string(),
            ));
        }
        if !account.enabled {
            return Err(DomainError::ValidationError(
                "Account is disabled".to_string(),
            ));
        }

        self.spawn_pass(account, SyncMode::Incremental)
            .await
            .ok_or_else(|| DomainError::Conflict("A sync is already running for this account".to_string()))
    }

    /// Forget the watermark and queue a full pass. False when the account is
    /// unknown, mbox-only, busy, or the watermark could not be reset.
    pub async fn resync(&self, account_id: &str) -> bool {
        let mut account = match self.accounts.get_account(account_id).await {
            Ok(Some(account)) => account,
            Ok(None) => return false,
            Err(e) => {
                tracing::error!(account_id, "Failed to load account for resync: {}", e);
                return false;
            }
        };
        if account.mbox_only {
            return false;
        }

        // Hold the account's sync slot while the watermark is reset
        let Some(job_id) = self
            .tracker
            .try_create_exclusive(JobKind::Sync, &account.id, &account.name)
            .await
        else {
            tracing::info!(account_id, "Sync already active, resync not started");
            return false;
        };

        if let Err(e) = self.accounts.reset_watermark(account_id).await {
            tracing::error!(account_id, "Failed to reset watermark: {}", e);
            let reason = format!("Failed to reset watermark: {}", e);
            self.track(&job_id, |job| job.fail(reason)).await;
            return false;
        }
        account.last_sync = never_synced();
        tracing::info!(account_id, job_id = %job_id, "Watermark reset, starting full resync");

        self.run_on_pool(account, job_id, SyncMode::Full);
        true
    }

    /// Open and close a session without touching anything.
    pub async fn test_connection(&self, account: &MailAccount) -> bool {
        match self.open_session(account).await {
            Ok(mut session) => {
                self.close_session(session.as_mut()).await;
                true
            }
            Err(e) => {
                tracing::info!(account_id = %account.id, "Connection test failed: {}", e);
                false
            }
        }
    }

    /// Folder names for account configuration. Advisory: empty on any failure.
    pub async fn list_folders(&self, account_id: &str) -> Vec<String> {
        let account = match self.accounts.get_account(account_id).await {
            Ok(Some(account)) if !account.mbox_only => account,
            Ok(_) => return Vec::new(),
            Err(e) => {
                tracing::warn!(account_id, "Failed to load account: {}", e);
                return Vec::new();
            }
        };

        let mut session = match self.open_session(&account).await {
            Ok(session) => session,
            Err(e) => {
                tracing::info!(account_id, "Cannot list folders: {}", e);
                return Vec::new();
            }
        };
        let folders = self
            .timed("list folders", session.list_folders())
            .await
            .unwrap_or_else(|e| {
                tracing::info!(account_id, "Cannot list folders: {}", e);
                Vec::new()
            });
        self.close_session(session.as_mut()).await;
        folders
    }
}
