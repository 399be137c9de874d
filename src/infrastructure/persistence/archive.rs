use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;

use super::{format_timestamp, parse_optional_timestamp, parse_timestamp, Database};
use crate::domain::entities::{ArchiveSource, ArchivedEmail, AttachmentRef, UpsertOutcome};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::ArchiveStore;

#[async_trait]
impl ArchiveStore for Database {
    async fn upsert_if_absent(&self, email: &ArchivedEmail) -> DomainResult<UpsertOutcome> {
        let recipients = serde_json::to_string(&email.recipients)
            .map_err(|e| DomainError::Internal(format!("Failed to encode recipients: {}", e)))?;

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "INSERT INTO archived_emails (id, account_id, folder, fingerprint, message_id, subject,
                                          sender, recipients, sent_at, archived_at, text_body,
                                          html_body, source, restored_at, raw)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(account_id, fingerprint) DO NOTHING",
        )
        .bind(&email.id)
        .bind(&email.account_id)
        .bind(&email.folder)
        .bind(&email.fingerprint)
        .bind(email.message_id.clone())
        .bind(email.subject.clone())
        .bind(&email.sender)
        .bind(recipients)
        .bind(email.sent_at.map(format_timestamp))
        .bind(format_timestamp(email.archived_at))
        .bind(email.text_body.clone())
        .bind(email.html_body.clone())
        .bind(email.source.as_str())
        .bind(email.restored_at.map(format_timestamp))
        .bind(email.raw.clone())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(UpsertOutcome::AlreadyPresent);
        }

        for attachment in &email.attachments {
            sqlx::query(
                "INSERT INTO archived_attachments (email_id, filename, content_type, size)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&email.id)
            .bind(&attachment.filename)
            .bind(&attachment.content_type)
            .bind(i64::try_from(attachment.size).unwrap_or(i64::MAX))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(UpsertOutcome::Inserted)
    }

    async fn contains(&self, account_id: &str, fingerprint: &str) -> DomainResult<bool> {
        let row = sqlx::query(
            "SELECT 1 AS found FROM archived_emails WHERE account_id = ? AND fingerprint = ?",
        )
        .bind(account_id)
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn count_by_account(&self, account_id: &str) -> DomainResult<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM archived_emails WHERE account_id = ?")
            .bind(account_id)
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = row.try_get("count")?;
        Ok(count.max(0) as u64)
    }

    async fn get_email(&self, email_id: &str) -> DomainResult<Option<ArchivedEmail>> {
        let row = sqlx::query(
            "SELECT id, account_id, folder, fingerprint, message_id, subject, sender, recipients,
                    sent_at, archived_at, text_body, html_body, source, restored_at, raw
             FROM archived_emails WHERE id = ?",
        )
        .bind(email_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let recipients: String = row.try_get("recipients")?;
        let recipients: Vec<String> = serde_json::from_str(&recipients)
            .map_err(|e| DomainError::Storage(format!("Bad recipients: {}", e)))?;
        let archived_at: String = row.try_get("archived_at")?;
        let source: String = row.try_get("source")?;

        let attachment_rows = sqlx::query(
            "SELECT filename, content_type, size FROM archived_attachments
             WHERE email_id = ? ORDER BY id",
        )
        .bind(email_id)
        .fetch_all(&self.pool)
        .await?;

        let mut attachments = Vec::with_capacity(attachment_rows.len());
        for attachment in &attachment_rows {
            let size: i64 = attachment.try_get("size")?;
            attachments.push(AttachmentRef {
                filename: attachment.try_get("filename")?,
                content_type: attachment.try_get("content_type")?,
                size: size.max(0) as u64,
            });
        }

        Ok(Some(ArchivedEmail {
            id: row.try_get("id")?,
            account_id: row.try_get("account_id")?,
            folder: row.try_get("folder")?,
            fingerprint: row.try_get("fingerprint")?,
            message_id: row.try_get("message_id")?,
            subject: row.try_get("subject")?,
            sender: row.try_get("sender")?,
            recipients,
            sent_at: parse_optional_timestamp(row.try_get("sent_at")?)?,
            archived_at: parse_timestamp(&archived_at)?,
            text_body: row.try_get("text_body")?,
            html_body: row.try_get("html_body")?,
            attachments,
            source: ArchiveSource::from(source),
            restored_at: parse_optional_timestamp(row.try_get("restored_at")?)?,
            raw: row.try_get("raw")?,
        }))
    }

    async fn list_fingerprints(&self, account_id: &str) -> DomainResult<Vec<String>> {
        let rows = sqlx::query(
            "SELECT fingerprint FROM archived_emails WHERE account_id = ? ORDER BY fingerprint",
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| row.try_get("fingerprint").map_err(DomainError::from))
            .collect()
    }

    async fn mark_restored(&self, email_id: &str, at: DateTime<Utc>) -> DomainResult<()> {
        let result = sqlx::query("UPDATE archived_emails SET restored_at = ? WHERE id = ?")
            .bind(format_timestamp(at))
            .bind(email_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::NotFound(format!("Archived email {}", email_id)));
        }
        Ok(())
    }
}
