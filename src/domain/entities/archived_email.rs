use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where an archived message came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveSource {
    Imap,
    Mbox,
}

impl ArchiveSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveSource::Imap => "imap",
            ArchiveSource::Mbox => "mbox",
        }
    }
}

impl From<String> for ArchiveSource {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "mbox" => ArchiveSource::Mbox,
            _ => ArchiveSource::Imap,
        }
    }
}

impl std::fmt::Display for ArchiveSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Attachment metadata; the bytes stay inside the archived raw message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttachmentRef {
    pub filename: String,
    pub content_type: String,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedEmail {
    pub id: String,
    pub account_id: String,
    pub folder: String,
    pub fingerprint: String,
    pub message_id: Option<String>,
    pub subject: Option<String>,
    pub sender: String,
    pub recipients: Vec<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub archived_at: DateTime<Utc>,
    pub text_body: Option<String>,
    pub html_body: Option<String>,
    pub attachments: Vec<AttachmentRef>,
    pub source: ArchiveSource,
    pub restored_at: Option<DateTime<Utc>>,
    /// Full RFC 5322 message, replayed verbatim on restore.
    #[serde(skip)]
    pub raw: Vec<u8>,
}

impl ArchivedEmail {
    pub fn new(
        account_id: String,
        folder: String,
        fingerprint: String,
        source: ArchiveSource,
        raw: Vec<u8>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            account_id,
            folder,
            fingerprint,
            message_id: None,
            subject: None,
            sender: String::new(),
            recipients: Vec::new(),
            sent_at: None,
            archived_at: Utc::now(),
            text_body: None,
            html_body: None,
            attachments: Vec::new(),
            source,
            restored_at: None,
            raw,
        }
    }
}

/// Result of an idempotent insert keyed by fingerprint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    AlreadyPresent,
}
