use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// An uploaded mbox file waiting to be archived
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRequest {
    pub file_path: PathBuf,
    pub target_account_id: String,
    /// Folder name recorded on every imported message
    #[serde(default = "default_import_folder")]
    pub target_folder: String,
    /// Operator who uploaded the file
    #[serde(default)]
    pub owner: Option<String>,
}

fn default_import_folder() -> String {
    "Imported".to_string()
}

impl ImportRequest {
    pub fn new(file_path: impl Into<PathBuf>, target_account_id: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            target_account_id: target_account_id.into(),
            target_folder: default_import_folder(),
            owner: None,
        }
    }

    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.target_folder = folder.into();
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }
}
