use crate::domain::entities::{ArchivedEmail, UpsertOutcome};
use crate::domain::errors::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Durable storage for archived messages, deduplicated by fingerprint
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Insert the email unless its fingerprint is already archived for the account.
    /// Two concurrent writers on the same fingerprint never produce two rows.
    async fn upsert_if_absent(&self, email: &ArchivedEmail) -> DomainResult<UpsertOutcome>;

    async fn contains(&self, account_id: &str, fingerprint: &str) -> DomainResult<bool>;

    async fn count_by_account(&self, account_id: &str) -> DomainResult<u64>;

    async fn get_email(&self, email_id: &str) -> DomainResult<Option<ArchivedEmail>>;

    async fn list_fingerprints(&self, account_id: &str) -> DomainResult<Vec<String>>;

    async fn mark_restored(&self, email_id: &str, at: DateTime<Utc>) -> DomainResult<()>;
}
