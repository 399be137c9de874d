use crate::domain::entities::MailAccount;
use crate::domain::errors::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Lightweight handle on a remote message, enough to dedup before the body is fetched
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRef {
    pub folder: String,
    pub uid: u32,
    pub message_id: Option<String>,
    pub internal_date: Option<DateTime<Utc>>,
}

/// Raw RFC 5322 bytes of one message
#[derive(Debug, Clone, PartialEq)]
pub struct MessageContent {
    pub raw: Vec<u8>,
}

impl MessageContent {
    pub fn new(raw: Vec<u8>) -> Self {
        Self { raw }
    }
}

/// Opens authenticated sessions against a mail server.
///
/// `open` fails with `DomainError::Connection` when the host is unreachable or
/// the credentials are rejected.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn open(&self, account: &MailAccount) -> DomainResult<Box<dyn MailSession>>;
}

#[async_trait]
pub trait MailSession: Send {
    async fn list_folders(&mut self) -> DomainResult<Vec<String>>;

    /// Messages of `folder` newer than `since`; every message when `since` is `None`.
    async fn fetch_since(
        &mut self,
        folder: &str,
        since: Option<DateTime<Utc>>,
    ) -> DomainResult<Vec<MessageRef>>;

    async fn fetch_body(&mut self, message: &MessageRef) -> DomainResult<MessageContent>;

    async fn deliver(&mut self, folder: &str, content: &MessageContent) -> DomainResult<()>;

    async fn close(&mut self) -> DomainResult<()>;
}
