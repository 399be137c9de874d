//! Queue-gated import of uploaded mbox files.
//!
//! An accepted upload becomes a Queued job that waits for one of the import
//! slots. Once running it counts the records (Estimating), then streams the
//! file record by record (Importing). Already archived messages are skipped,
//! malformed records are counted and skipped, and cancellation is observed
//! after every record with earlier work kept.

use std::path::Path;
use std::sync::Arc;

use tokio::fs::File;
use tokio::io::BufReader;
use tokio::sync::Semaphore;
use tracing::Instrument;

use crate::application::services::JobTracker;
use crate::domain::entities::{
    ArchiveSource, ImportRequest, Job, JobKind, JobState, MailAccount, UpsertOutcome,
};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{AccountRepository, ArchiveStore, TaskSpawner};
use crate::domain::services::fingerprint;
use crate::infrastructure::providers::{count_boundaries, EmailParser, MboxReader};

#[derive(Clone)]
pub struct MboxImportPipeline {
    accounts: Arc<dyn AccountRepository>,
    archive: Arc<dyn ArchiveStore>,
    tracker: JobTracker,
    spawner: Arc<dyn TaskSpawner>,
    slots: Arc<Semaphore>,
    parser: EmailParser,
}

impl MboxImportPipeline {
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        archive: Arc<dyn ArchiveStore>,
        tracker: JobTracker,
        spawner: Arc<dyn TaskSpawner>,
        max_concurrent_imports: usize,
    ) -> Self {
        Self {
            accounts,
            archive,
            tracker,
            spawner,
            slots: Arc::new(Semaphore::new(max_concurrent_imports.max(1))),
            parser: EmailParser::new(),
        }
    }

    /// Accept an upload and queue it. The job id is returned straight away;
    /// the import itself starts once an import slot is free.
    pub async fn submit(&self, request: ImportRequest) -> DomainResult<String> {
        let account = self
            .accounts
            .get_account(&request.target_account_id)
            .await?
            .ok_or_else(|| {
                DomainError::NotFound(format!("Account {}", request.target_account_id))
            })?;

        let file_size = match tokio::fs::metadata(&request.file_path).await {
            Ok(meta) if meta.is_file() => meta.len(),
            Ok(_) => {
                return Err(DomainError::ValidationError(format!(
                    "{} is not a file",
                    request.file_path.display()
                )))
            }
            Err(e) => {
                return Err(DomainError::ValidationError(format!(
                    "Cannot read {}: {}",
                    request.file_path.display(),
                    e
                )))
            }
        };

        let job_id = self
            .tracker
            .create(JobKind::MboxImport, &account.id, &account.name)
            .await;
        let metadata = [
            ("file_path", request.file_path.display().to_string()),
            ("file_size", file_size.to_string()),
            ("target_folder", request.target_folder.clone()),
        ];
        let owner = request.owner.clone();
        self.tracker
            .update(&job_id, |job| {
                for (key, value) in metadata {
                    job.metadata.insert(key.to_string(), value);
                }
                if let Some(owner) = owner {
                    job.metadata.insert("owner".to_string(), owner);
                }
            })
            .await?;

        tracing::info!(
            job_id = %job_id,
            account_id = %account.id,
            file_size,
            "Mbox import queued"
        );

        let pipeline = self.clone();
        let id = job_id.clone();
        self.spawner.spawn(Box::pin(async move {
            let token = pipeline
                .tracker
                .cancellation_token(&id)
                .await
                .unwrap_or_default();

            let permit = tokio::select! {
                permit = pipeline.slots.clone().acquire_owned() => permit,
                _ = token.cancelled() => {
                    pipeline.track(&id, |job| job.cancel()).await;
                    return;
                }
            };
            let _permit = match permit {
                Ok(permit) => permit,
                Err(_) => {
                    pipeline.track(&id, |job| job.fail("Import pool is closed")).await;
                    return;
                }
            };

            pipeline.import(&id, &request).await;
        }));

        Ok(job_id)
    }

    /// Count message boundaries without holding any message in memory.
    pub async fn estimate(path: &Path) -> DomainResult<u64> {
        let file = File::open(path).await?;
        Ok(count_boundaries(BufReader::new(file)).await?)
    }

    /// Run the import for an already registered job and return its final state.
    pub async fn import(&self, job_id: &str, request: &ImportRequest) -> JobState {
        let span = tracing::info_span!(
            "mbox_import",
            job_id,
            account_id = %request.target_account_id,
            file = %request.file_path.display()
        );
        self.run_import(job_id, request).instrument(span).await
    }

    async fn run_import(&self, job_id: &str, request: &ImportRequest) -> JobState {
        let token = self
            .tracker
            .cancellation_token(job_id)
            .await
            .unwrap_or_default();
        if token.is_cancelled() {
            return self.cancel(job_id).await;
        }

        let account = match self.accounts.get_account(&request.target_account_id).await {
            Ok(Some(account)) => account,
            Ok(None) => {
                return self
                    .fail(job_id, format!("Account {} not found", request.target_account_id))
                    .await
            }
            Err(e) => return self.fail(job_id, e.to_string()).await,
        };

        if token.is_cancelled() {
            return self.cancel(job_id).await;
        }
        self.track(job_id, |job| job.start(JobState::Estimating)).await;
        let estimate = tokio::select! {
            estimate = Self::estimate(&request.file_path) => estimate,
            _ = token.cancelled() => {
                tracing::info!("Mbox import cancelled while estimating");
                return self.cancel(job_id).await;
            }
        };
        let total = match estimate {
            Ok(total) => total,
            Err(e) => return self.fail(job_id, format!("Cannot read mbox file: {}", e)).await,
        };
        if token.is_cancelled() {
            return self.cancel(job_id).await;
        }
        tracing::info!(total, "Mbox estimate finished");
        self.track(job_id, |job| {
            job.total = Some(total);
            job.start(JobState::Importing);
        })
        .await;

        let file = match File::open(&request.file_path).await {
            Ok(file) => file,
            Err(e) => return self.fail(job_id, format!("Cannot open mbox file: {}", e)).await,
        };
        let mut reader = MboxReader::new(BufReader::new(file));

        let mut imported = 0u64;
        loop {
            let record = match reader.next_record().await {
                Ok(Some(record)) => record,
                Ok(None) => break,
                Err(e) => {
                    return self
                        .fail(job_id, format!("Mbox file became unreadable: {}", e))
                        .await
                }
            };

            match self.import_record(&account, &request.target_folder, record.raw).await {
                Ok(UpsertOutcome::Inserted) => {
                    imported += 1;
                    metrics::counter!("mailvault_import_records_total", "outcome" => "imported")
                        .increment(1);
                    self.track(job_id, |job| job.processed += 1).await;
                }
                Ok(UpsertOutcome::AlreadyPresent) => {
                    metrics::counter!("mailvault_import_records_total", "outcome" => "duplicate")
                        .increment(1);
                    self.track(job_id, |job| job.skipped += 1).await;
                }
                Err(e) if e.is_account_level() => {
                    tracing::error!(record = record.index, "Aborting import: {}", e);
                    return self.fail(job_id, e.to_string()).await;
                }
                Err(e) => {
                    tracing::warn!(record = record.index, separator = %record.separator, "Skipping record: {}", e);
                    metrics::counter!("mailvault_import_records_total", "outcome" => "corrupt")
                        .increment(1);
                    let message = format!("record {}: {}", record.index + 1, e);
                    self.track(job_id, |job| job.record_error(message)).await;
                }
            }

            if token.is_cancelled() {
                tracing::info!(imported, "Mbox import cancelled");
                return self.cancel(job_id).await;
            }
        }

        if imported > 0 {
            metrics::counter!("mailvault_messages_archived_total", "source" => "mbox")
                .increment(imported);
        }
        tracing::info!(imported, "Mbox import completed");
        self.track(job_id, |job| job.complete()).await;
        JobState::Completed
    }

    async fn import_record(
        &self,
        account: &MailAccount,
        folder: &str,
        raw: Vec<u8>,
    ) -> DomainResult<UpsertOutcome> {
        let parsed = self.parser.parse_email(&raw)?;
        let fp = fingerprint::compute(&account.id, folder, parsed.message_id.as_deref(), &raw);
        if self.archive.contains(&account.id, &fp).await? {
            return Ok(UpsertOutcome::AlreadyPresent);
        }
        let email = parsed.into_archived(&account.id, folder, fp, ArchiveSource::Mbox, raw);
        self.archive.upsert_if_absent(&email).await
    }

    async fn track<F>(&self, job_id: &str, mutator: F)
    where
        F: FnOnce(&mut Job),
    {
        if let Err(e) = self.tracker.update(job_id, mutator).await {
            tracing::warn!(job_id, "Job update failed: {}", e);
        }
    }

    async fn fail(&self, job_id: &str, reason: String) -> JobState {
        tracing::error!(job_id, "Mbox import failed: {}", reason);
        self.track(job_id, |job| job.fail(reason)).await;
        JobState::Failed
    }

    async fn cancel(&self, job_id: &str) -> JobState {
        self.track(job_id, |job| job.cancel()).await;
        JobState::Cancelled
    }
}
