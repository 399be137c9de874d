#![allow(dead_code)]
use mailvault::application::services::JobTracker;
use mailvault::config::EngineSettings;
use mailvault::domain::entities::{
    ArchiveSource, ArchivedEmail, Job, MailAccount, UpsertOutcome,
};
use mailvault::domain::ports::{AccountRepository, ArchiveStore};
use mailvault::domain::services::fingerprint;
use mailvault::infrastructure::persistence::Database;
use std::time::Duration;

use super::fake_transport::raw_message;

pub fn test_settings() -> EngineSettings {
    EngineSettings {
        imap_timeout: Duration::from_secs(5),
        restore_workers: 2,
        ..EngineSettings::default()
    }
}

/// Create an enabled IMAP account
pub async fn create_imap_account(db: &Database, name: &str) -> MailAccount {
    let account = MailAccount::new(
        name.to_string(),
        "imap.example.com".to_string(),
        993,
        format!("{}@example.com", name.to_lowercase()),
        "secret".to_string(),
        true,
    );
    db.create_account(&account)
        .await
        .expect("Failed to create account")
}

/// Create an IMAP account with the given folders excluded from sync
pub async fn create_account_excluding(
    db: &Database,
    name: &str,
    excluded: &[&str],
) -> MailAccount {
    let mut account = MailAccount::new(
        name.to_string(),
        "imap.example.com".to_string(),
        993,
        format!("{}@example.com", name.to_lowercase()),
        "secret".to_string(),
        true,
    );
    account.excluded_folders = excluded.iter().map(|f| f.to_string()).collect();
    db.create_account(&account)
        .await
        .expect("Failed to create account")
}

pub async fn create_mbox_account(db: &Database, name: &str) -> MailAccount {
    let mut account = MailAccount::new(
        name.to_string(),
        String::new(),
        0,
        String::new(),
        String::new(),
        false,
    );
    account.mbox_only = true;
    db.create_account(&account)
        .await
        .expect("Failed to create account")
}

pub async fn create_disabled_account(db: &Database, name: &str) -> MailAccount {
    let mut account = MailAccount::new(
        name.to_string(),
        "imap.example.com".to_string(),
        993,
        "disabled@example.com".to_string(),
        "secret".to_string(),
        true,
    );
    account.enabled = false;
    db.create_account(&account)
        .await
        .expect("Failed to create account")
}

/// Put `count` messages straight into the archive and return their ids.
pub async fn seed_archive(
    db: &Database,
    account: &MailAccount,
    folder: &str,
    count: usize,
) -> Vec<String> {
    let mut ids = Vec::with_capacity(count);
    for i in 0..count {
        let message_id = format!("seed-{}-{}@example.com", folder.to_lowercase(), i);
        let raw = raw_message(Some(&message_id), &format!("Seeded {}", i));
        let fp = fingerprint::compute(&account.id, folder, Some(&message_id), &raw);
        let mut email = ArchivedEmail::new(
            account.id.clone(),
            folder.to_string(),
            fp,
            ArchiveSource::Imap,
            raw,
        );
        email.message_id = Some(message_id);
        email.sender = "alice@example.com".to_string();
        let outcome = db
            .upsert_if_absent(&email)
            .await
            .expect("Failed to seed archive");
        assert_eq!(outcome, UpsertOutcome::Inserted);
        ids.push(email.id);
    }
    ids
}

/// Poll until the job reaches a terminal state.
pub async fn wait_for_terminal(tracker: &JobTracker, job_id: &str) -> Job {
    for _ in 0..500 {
        let job = tracker.get(job_id).await.expect("Job disappeared");
        if job.state.is_terminal() {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Job {} did not finish in time", job_id);
}
