use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::application::services::{SyncEngine, SyncMode};
use crate::config::EngineSettings;
use crate::domain::entities::JobKind;
use crate::domain::ports::AccountRepository;

/// Periodic driver for account synchronization.
///
/// Each tick hands every enabled IMAP account to the engine's bounded sync
/// pool and returns immediately; an account whose previous pass is still
/// queued or running is skipped for that tick.
pub struct SyncScheduler {
    engine: SyncEngine,
    accounts: Arc<dyn AccountRepository>,
    interval: Duration,
    retention: chrono::Duration,
    drain_timeout: Duration,
    shutdown: CancellationToken,
}

const DRAIN_POLL: Duration = Duration::from_millis(25);

impl SyncScheduler {
    pub fn new(
        engine: SyncEngine,
        accounts: Arc<dyn AccountRepository>,
        settings: &EngineSettings,
    ) -> Self {
        let retention = chrono::Duration::from_std(settings.job_retention)
            .unwrap_or_else(|_| chrono::Duration::hours(1));
        Self {
            engine,
            accounts,
            interval: settings.sync_interval,
            retention,
            drain_timeout: settings.imap_timeout,
            shutdown: CancellationToken::new(),
        }
    }

    /// Run one scheduling round and return the ids of the jobs it queued.
    pub async fn tick(&self) -> Vec<String> {
        self.engine.tracker().purge_finished(self.retention).await;

        let accounts = match self.accounts.list_syncable_accounts().await {
            Ok(accounts) => accounts,
            Err(e) => {
                tracing::error!("Failed to load accounts for sync: {}", e);
                return Vec::new();
            }
        };
        tracing::debug!(accounts = accounts.len(), "Sync tick");

        let mut dispatched = Vec::new();
        for account in accounts {
            if !account.enabled || account.mbox_only {
                continue;
            }
            let account_id = account.id.clone();
            match self.engine.spawn_pass(account, SyncMode::Incremental).await {
                Some(job_id) => {
                    tracing::info!(account_id = %account_id, job_id = %job_id, "Sync pass queued");
                    dispatched.push(job_id);
                }
                None => {
                    tracing::debug!(account_id = %account_id, "Previous sync still active, skipping");
                }
            }
        }
        dispatched
    }

    /// Tick until `shutdown` is called, then signal every active sync pass
    /// to stop at its next folder boundary and wait for them to get there.
    /// The wait is bounded by the transport I/O timeout.
    pub async fn run(&self) {
        tracing::info!(interval = ?self.interval, "Sync scheduler started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }

        let tracker = self.engine.tracker();
        let signalled = tracker.cancel_all(JobKind::Sync).await;
        tracing::info!(signalled, "Waiting for sync passes to reach a checkpoint");

        let drained = tokio::time::timeout(self.drain_timeout, async {
            while tracker.active_count(JobKind::Sync).await > 0 {
                tokio::time::sleep(DRAIN_POLL).await;
            }
        })
        .await;
        match drained {
            Ok(()) => tracing::info!(signalled, "Sync scheduler stopped"),
            Err(_) => {
                let remaining = tracker.active_count(JobKind::Sync).await;
                tracing::warn!(
                    remaining,
                    "Sync scheduler stopped with passes still running"
                )
            }
        }
    }

    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
