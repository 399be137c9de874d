pub mod account_repository;
pub mod archive_store;
pub mod mail_transport;
pub mod selection_handoff;
pub mod task_spawner;

pub use account_repository::AccountRepository;
pub use archive_store::ArchiveStore;
pub use mail_transport::{MailSession, MailTransport, MessageContent, MessageRef};
pub use selection_handoff::SelectionHandoff;
pub use task_spawner::TaskSpawner;
