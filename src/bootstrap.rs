use crate::application::services::{
    restore_queue, BatchRestoreDispatcher, JobTracker, MboxImportPipeline, RestoreRunner,
    SyncEngine, SyncScheduler,
};
use crate::config::{Config, EngineSettings};
use crate::domain::ports::{AccountRepository, ArchiveStore, MailTransport, TaskSpawner};
use crate::infrastructure::http::middleware::AppState;
use crate::infrastructure::persistence::Database;
use crate::infrastructure::providers::ImapTransport;
use crate::infrastructure::runtime::TokioTaskSpawner;
use crate::infrastructure::storage::SelectionStash;
use crate::infrastructure::workers::spawn_restore_workers;
use std::sync::Arc;
use tokio::task::JoinHandle;

const STASHED_SELECTIONS: usize = 32;

/// Wired engine plus the background tasks it already started
pub struct Services {
    pub state: AppState,
    pub restore_workers: Vec<JoinHandle<()>>,
}

pub async fn build_app_state(db: Database, config: &Config) -> Services {
    let accounts = Arc::new(db.clone()) as Arc<dyn AccountRepository>;
    let archive = Arc::new(db) as Arc<dyn ArchiveStore>;
    let transport = Arc::new(ImapTransport::new()) as Arc<dyn MailTransport>;
    build_services(accounts, archive, transport, &config.engine)
}

/// Wire every engine component against the given ports and start the
/// restore workers. The scheduler is built but not started.
pub fn build_services(
    accounts: Arc<dyn AccountRepository>,
    archive: Arc<dyn ArchiveStore>,
    transport: Arc<dyn MailTransport>,
    settings: &EngineSettings,
) -> Services {
    let task_spawner = Arc::new(TokioTaskSpawner::new()) as Arc<dyn TaskSpawner>;
    let tracker = JobTracker::new();

    let sync_engine = SyncEngine::new(
        accounts.clone(),
        archive.clone(),
        transport.clone(),
        tracker.clone(),
        task_spawner.clone(),
        settings.max_concurrent_syncs,
        settings.imap_timeout,
    );
    tracing::info!(
        max_concurrent_syncs = settings.max_concurrent_syncs,
        "Sync engine initialized"
    );

    let scheduler = Arc::new(SyncScheduler::new(
        sync_engine.clone(),
        accounts.clone(),
        settings,
    ));

    let runner = RestoreRunner::new(
        accounts.clone(),
        archive.clone(),
        transport,
        tracker.clone(),
        settings.imap_timeout,
    );
    let (queue, receiver) = restore_queue(settings.restore_queue_capacity);
    let restore_workers = spawn_restore_workers(settings.restore_workers, receiver, runner.clone());
    let restore_dispatcher = BatchRestoreDispatcher::new(runner, queue, settings);
    tracing::info!(
        workers = settings.restore_workers,
        async_threshold = settings.restore_async_threshold,
        max_async_emails = settings.restore_max_async_emails,
        "Restore dispatcher initialized"
    );

    let import_pipeline = MboxImportPipeline::new(
        accounts.clone(),
        archive,
        tracker.clone(),
        task_spawner,
        settings.max_concurrent_imports,
    );
    tracing::info!(
        max_concurrent_imports = settings.max_concurrent_imports,
        "Mbox import pipeline initialized"
    );

    let selections = Arc::new(SelectionStash::new(
        STASHED_SELECTIONS,
        settings.restore_async_threshold,
    ));

    Services {
        state: AppState {
            accounts,
            tracker,
            sync_engine,
            scheduler,
            restore_dispatcher,
            import_pipeline,
            selections,
        },
        restore_workers,
    }
}
