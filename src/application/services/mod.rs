pub mod batch_restore;
pub mod job_tracker;
pub mod mbox_import;
pub mod sync_engine;
pub mod sync_scheduler;

pub use batch_restore::*;
pub use job_tracker::*;
pub use mbox_import::*;
pub use sync_engine::*;
pub use sync_scheduler::*;
