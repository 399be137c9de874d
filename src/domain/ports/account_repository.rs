use crate::domain::entities::MailAccount;
use crate::domain::errors::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn get_account(&self, account_id: &str) -> DomainResult<Option<MailAccount>>;

    /// Enabled accounts that can be synchronized over IMAP (mbox-only excluded).
    async fn list_syncable_accounts(&self) -> DomainResult<Vec<MailAccount>>;

    async fn create_account(&self, account: &MailAccount) -> DomainResult<MailAccount>;

    /// Move the watermark forward to `to`. Never moves it backwards; returns
    /// whether the stored value changed.
    async fn advance_watermark(&self, account_id: &str, to: DateTime<Utc>) -> DomainResult<bool>;

    /// Put the watermark back to the never-synced sentinel.
    async fn reset_watermark(&self, account_id: &str) -> DomainResult<()>;
}
