use std::sync::Arc;

use crate::application::services::{
    BatchRestoreDispatcher, JobTracker, MboxImportPipeline, SyncEngine, SyncScheduler,
};
use crate::domain::ports::AccountRepository;
use crate::infrastructure::storage::SelectionStash;

#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<dyn AccountRepository>,
    pub tracker: JobTracker,
    pub sync_engine: SyncEngine,
    pub scheduler: Arc<SyncScheduler>,
    pub restore_dispatcher: BatchRestoreDispatcher,
    pub import_pipeline: MboxImportPipeline,
    pub selections: Arc<SelectionStash>,
}
