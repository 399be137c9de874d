use serde::{Deserialize, Serialize};

/// A set of archived emails to put back into a live mailbox
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRestoreRequest {
    pub target_account_id: String,
    /// Destination mailbox; each email's original folder when absent
    #[serde(default)]
    pub target_folder: Option<String>,
    pub email_ids: Vec<String>,
}

impl BatchRestoreRequest {
    pub fn new(target_account_id: impl Into<String>, email_ids: Vec<String>) -> Self {
        Self {
            target_account_id: target_account_id.into(),
            target_folder: None,
            email_ids,
        }
    }

    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.target_folder = Some(folder.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RestoreItemOutcome {
    pub email_id: String,
    pub restored: bool,
    pub error: Option<String>,
}

impl RestoreItemOutcome {
    pub fn success(email_id: &str) -> Self {
        Self {
            email_id: email_id.to_string(),
            restored: true,
            error: None,
        }
    }

    pub fn failure(email_id: &str, error: impl Into<String>) -> Self {
        Self {
            email_id: email_id.to_string(),
            restored: false,
            error: Some(error.into()),
        }
    }
}

/// Per-item report of an inline restore
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestoreReport {
    pub items: Vec<RestoreItemOutcome>,
    pub cancelled: bool,
}

impl RestoreReport {
    pub fn restored(&self) -> usize {
        self.items.iter().filter(|item| item.restored).count()
    }

    pub fn failed(&self) -> usize {
        self.items.iter().filter(|item| !item.restored).count()
    }
}
