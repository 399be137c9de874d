use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Watermark of an account that has never completed a sync pass.
pub fn never_synced() -> DateTime<Utc> {
    DateTime::<Utc>::default()
}

/// Connection and archiving settings for one mailbox
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MailAccount {
    pub id: String,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    pub use_tls: bool,
    pub enabled: bool,
    /// Archive fed from uploaded mbox files only; never contacted over IMAP.
    pub mbox_only: bool,
    pub excluded_folders: BTreeSet<String>,
    /// Start time of the last sync pass that finished without any error.
    pub last_sync: DateTime<Utc>,
}

impl MailAccount {
    pub fn new(
        name: String,
        host: String,
        port: u16,
        username: String,
        password: String,
        use_tls: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            host,
            port,
            username,
            password,
            use_tls,
            enabled: true,
            mbox_only: false,
            excluded_folders: BTreeSet::new(),
            last_sync: never_synced(),
        }
    }

    pub fn has_synced(&self) -> bool {
        self.last_sync > never_synced()
    }

    /// IMAP mailbox names are matched case-insensitively for exclusion purposes.
    pub fn is_folder_excluded(&self, folder: &str) -> bool {
        self.excluded_folders
            .iter()
            .any(|excluded| excluded.trim().eq_ignore_ascii_case(folder.trim()))
    }
}
