use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::any::AnyRow;
use sqlx::Row;
use std::collections::BTreeSet;

use super::{format_timestamp, parse_timestamp, Database};
use crate::domain::entities::{never_synced, MailAccount};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::AccountRepository;

const ACCOUNT_COLUMNS: &str = "id, name, host, port, username, password, use_tls, enabled, \
     mbox_only, excluded_folders, last_sync";

fn account_from_row(row: &AnyRow) -> DomainResult<MailAccount> {
    let port: i64 = row.try_get("port")?;
    let use_tls: i64 = row.try_get("use_tls")?;
    let enabled: i64 = row.try_get("enabled")?;
    let mbox_only: i64 = row.try_get("mbox_only")?;
    let excluded: String = row.try_get("excluded_folders")?;
    let last_sync: String = row.try_get("last_sync")?;

    let excluded_folders: BTreeSet<String> = serde_json::from_str(&excluded)
        .map_err(|e| DomainError::Storage(format!("Bad excluded_folders: {}", e)))?;

    Ok(MailAccount {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        host: row.try_get("host")?,
        port: u16::try_from(port)
            .map_err(|_| DomainError::Storage(format!("Port out of range: {}", port)))?,
        username: row.try_get("username")?,
        password: row.try_get("password")?,
        use_tls: use_tls != 0,
        enabled: enabled != 0,
        mbox_only: mbox_only != 0,
        excluded_folders,
        last_sync: parse_timestamp(&last_sync)?,
    })
}

#[async_trait]
impl AccountRepository for Database {
    async fn get_account(&self, account_id: &str) -> DomainResult<Option<MailAccount>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM mail_accounts WHERE id = ?",
            ACCOUNT_COLUMNS
        ))
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(account_from_row).transpose()
    }

    async fn list_syncable_accounts(&self) -> DomainResult<Vec<MailAccount>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM mail_accounts WHERE enabled = 1 AND mbox_only = 0 ORDER BY name",
            ACCOUNT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(account_from_row).collect()
    }

    async fn create_account(&self, account: &MailAccount) -> DomainResult<MailAccount> {
        let excluded = serde_json::to_string(&account.excluded_folders)
            .map_err(|e| DomainError::Internal(format!("Failed to encode folders: {}", e)))?;

        sqlx::query(
            "INSERT INTO mail_accounts (id, name, host, port, username, password, use_tls, enabled,
                                        mbox_only, excluded_folders, last_sync, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&account.id)
        .bind(&account.name)
        .bind(&account.host)
        .bind(i64::from(account.port))
        .bind(&account.username)
        .bind(&account.password)
        .bind(i64::from(account.use_tls))
        .bind(i64::from(account.enabled))
        .bind(i64::from(account.mbox_only))
        .bind(excluded)
        .bind(format_timestamp(account.last_sync))
        .bind(format_timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;

        tracing::info!(account_id = %account.id, name = %account.name, "Mail account created");
        Ok(account.clone())
    }

    async fn advance_watermark(&self, account_id: &str, to: DateTime<Utc>) -> DomainResult<bool> {
        let to = format_timestamp(to);
        let result = sqlx::query(
            "UPDATE mail_accounts SET last_sync = ? WHERE id = ? AND last_sync < ?",
        )
        .bind(&to)
        .bind(account_id)
        .bind(&to)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Either unknown or already at/after `to`
            if self.get_account(account_id).await?.is_none() {
                return Err(DomainError::NotFound(format!("Account {}", account_id)));
            }
            return Ok(false);
        }
        Ok(true)
    }

    async fn reset_watermark(&self, account_id: &str) -> DomainResult<()> {
        let result = sqlx::query("UPDATE mail_accounts SET last_sync = ? WHERE id = ?")
            .bind(format_timestamp(never_synced()))
            .bind(account_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::NotFound(format!("Account {}", account_id)));
        }
        Ok(())
    }
}
