mod helpers;

use helpers::*;
use mailvault::application::services::{DispatchOutcome, ReturnContext};
use mailvault::bootstrap::{build_services, Services};
use mailvault::domain::entities::{BatchRestoreRequest, JobState};
use mailvault::domain::errors::{DomainError, DomainResult};
use mailvault::domain::ports::{ArchiveStore, SelectionHandoff};
use mailvault::infrastructure::persistence::Database;
use std::sync::Arc;

fn services(db: &Database, transport: &FakeTransport) -> Services {
    build_services(
        Arc::new(db.clone()),
        Arc::new(db.clone()),
        Arc::new(transport.clone()),
        &test_settings(),
    )
}

struct BrokenHandoff;

impl SelectionHandoff for BrokenHandoff {
    fn stage(&self, _email_ids: &[String]) -> DomainResult<()> {
        Err(DomainError::Internal("session store unavailable".to_string()))
    }
}

#[tokio::test]
async fn test_small_selection_runs_inline() {
    let test_db = setup_test_db().await;
    let db = &test_db.db;
    let account = create_imap_account(db, "Target").await;
    let ids = seed_archive(db, &account, "INBOX", 10).await;
    let transport = FakeTransport::new();
    let services = services(db, &transport);

    let outcome = services
        .state
        .restore_dispatcher
        .dispatch(
            BatchRestoreRequest::new(&account.id, ids.clone()),
            ReturnContext::new().with_return_to("/archive?page=2"),
        )
        .await
        .unwrap();

    match outcome {
        DispatchOutcome::Inline { report, return_to } => {
            assert_eq!(report.restored(), 10);
            assert_eq!(report.failed(), 0);
            assert!(!report.cancelled);
            assert_eq!(return_to.as_deref(), Some("/archive?page=2"));
        }
        other => panic!("expected inline restore, got {:?}", other),
    }

    let delivered = transport.delivered();
    assert_eq!(delivered.len(), 10);
    assert!(delivered.iter().all(|(folder, _)| folder == "INBOX"));
    assert!(services.state.tracker.list_active().await.is_empty());

    let email = db.get_email(&ids[0]).await.unwrap().unwrap();
    assert!(email.restored_at.is_some());
}

#[tokio::test]
async fn test_selection_above_threshold_is_queued() {
    let test_db = setup_test_db().await;
    let db = &test_db.db;
    let account = create_imap_account(db, "Target").await;
    let ids = seed_archive(db, &account, "INBOX", 200).await;
    let transport = FakeTransport::new();
    let services = services(db, &transport);

    let outcome = services
        .state
        .restore_dispatcher
        .dispatch(
            BatchRestoreRequest::new(&account.id, ids).with_folder("Restored"),
            ReturnContext::new(),
        )
        .await
        .unwrap();

    let job_id = match outcome {
        DispatchOutcome::Queued { job_id, .. } => job_id,
        other => panic!("expected queued restore, got {:?}", other),
    };

    let job = wait_for_terminal(&services.state.tracker, &job_id).await;
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.total, Some(200));
    assert_eq!(job.processed, 200);
    assert_eq!(job.error_count, 0);
    assert_eq!(job.metadata.get("target_folder").map(String::as_str), Some("Restored"));

    let delivered = transport.delivered();
    assert_eq!(delivered.len(), 200);
    assert!(delivered.iter().all(|(folder, _)| folder == "Restored"));
}

#[tokio::test]
async fn test_selection_above_ceiling_is_rejected_without_job() {
    let test_db = setup_test_db().await;
    let db = &test_db.db;
    let account = create_imap_account(db, "Target").await;
    let transport = FakeTransport::new();
    let services = services(db, &transport);

    let ids: Vec<String> = (0..6000).map(|i| format!("email-{}", i)).collect();
    let outcome = services
        .state
        .restore_dispatcher
        .dispatch(BatchRestoreRequest::new(&account.id, ids), ReturnContext::new())
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        DispatchOutcome::TooManyItems {
            requested: 6000,
            limit: 5000
        }
    ));
    assert!(services.state.tracker.list_active().await.is_empty());
    assert_eq!(transport.opens(), 0);
}

#[tokio::test]
async fn test_item_failures_do_not_abort_batch() {
    let test_db = setup_test_db().await;
    let db = &test_db.db;
    let account = create_imap_account(db, "Target").await;
    let mut ids = seed_archive(db, &account, "INBOX", 2).await;
    ids.extend(seed_archive(db, &account, "Junk", 1).await);
    ids.insert(1, "missing-email".to_string());
    let transport = FakeTransport::new();
    transport.reject_deliveries_to("Junk");
    let services = services(db, &transport);

    let outcome = services
        .state
        .restore_dispatcher
        .dispatch(BatchRestoreRequest::new(&account.id, ids), ReturnContext::new())
        .await
        .unwrap();

    let DispatchOutcome::Inline { report, .. } = outcome else {
        panic!("expected inline restore");
    };
    assert_eq!(report.items.len(), 4);
    assert_eq!(report.restored(), 2);
    assert_eq!(report.failed(), 2);
    assert_eq!(report.items[1].email_id, "missing-email");
    assert!(!report.items[1].restored);
    assert!(report.items[3].error.as_deref().unwrap().contains("rejected"));
    assert_eq!(transport.delivered().len(), 2);
}

#[tokio::test]
async fn test_failed_staging_falls_back_to_background() {
    let test_db = setup_test_db().await;
    let db = &test_db.db;
    let account = create_imap_account(db, "Target").await;
    let ids = seed_archive(db, &account, "INBOX", 5).await;
    let transport = FakeTransport::new();
    let services = services(db, &transport);

    let outcome = services
        .state
        .restore_dispatcher
        .dispatch(
            BatchRestoreRequest::new(&account.id, ids),
            ReturnContext::new()
                .with_return_to("/archive")
                .with_handoff(Arc::new(BrokenHandoff)),
        )
        .await
        .unwrap();

    let DispatchOutcome::Queued { job_id, return_to } = outcome else {
        panic!("expected fallback to a background job");
    };
    assert_eq!(return_to.as_deref(), Some("/archive"));

    let job = wait_for_terminal(&services.state.tracker, &job_id).await;
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.processed, 5);
    assert_eq!(transport.delivered().len(), 5);
}

#[tokio::test]
async fn test_unknown_target_and_empty_selection_are_rejected() {
    let test_db = setup_test_db().await;
    let db = &test_db.db;
    let account = create_imap_account(db, "Target").await;
    let transport = FakeTransport::new();
    let services = services(db, &transport);
    let dispatcher = &services.state.restore_dispatcher;

    let err = dispatcher
        .dispatch(
            BatchRestoreRequest::new("nobody", vec!["x".to_string()]),
            ReturnContext::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::NotFound(_)));

    let err = dispatcher
        .dispatch(BatchRestoreRequest::new(&account.id, Vec::new()), ReturnContext::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::ValidationError(_)));
}

#[tokio::test]
async fn test_unreachable_target_fails_background_job() {
    let test_db = setup_test_db().await;
    let db = &test_db.db;
    let account = create_imap_account(db, "Target").await;
    let ids = seed_archive(db, &account, "INBOX", 60).await;
    let transport = FakeTransport::new();
    transport.fail_open();
    let services = services(db, &transport);

    let outcome = services
        .state
        .restore_dispatcher
        .dispatch(BatchRestoreRequest::new(&account.id, ids), ReturnContext::new())
        .await
        .unwrap();
    let DispatchOutcome::Queued { job_id, .. } = outcome else {
        panic!("expected queued restore");
    };

    let job = wait_for_terminal(&services.state.tracker, &job_id).await;
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.processed, 0);
    assert!(job.failure.unwrap().contains("authentication failed"));
}
