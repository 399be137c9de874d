mod helpers;

use helpers::*;
use mailvault::application::services::{JobTracker, SyncEngine, SyncScheduler};
use mailvault::domain::entities::{JobKind, JobState};
use mailvault::domain::ports::ArchiveStore;
use mailvault::infrastructure::persistence::Database;
use mailvault::infrastructure::runtime::TokioTaskSpawner;
use std::sync::Arc;
use std::time::Duration;

fn build_scheduler(
    db: &Database,
    transport: &FakeTransport,
    tracker: &JobTracker,
) -> Arc<SyncScheduler> {
    let settings = test_settings();
    let engine = SyncEngine::new(
        Arc::new(db.clone()),
        Arc::new(db.clone()),
        Arc::new(transport.clone()),
        tracker.clone(),
        Arc::new(TokioTaskSpawner::new()),
        settings.max_concurrent_syncs,
        settings.imap_timeout,
    );
    Arc::new(SyncScheduler::new(engine, Arc::new(db.clone()), &settings))
}

#[tokio::test]
async fn test_tick_dispatches_only_syncable_accounts() {
    let test_db = setup_test_db().await;
    let db = &test_db.db;
    let first = create_imap_account(db, "Alpha").await;
    let second = create_imap_account(db, "Beta").await;
    let exported = create_mbox_account(db, "Exported").await;
    let disabled = create_disabled_account(db, "Dormant").await;

    let transport = FakeTransport::new().with_folder("INBOX", 2);
    let tracker = JobTracker::new();
    let scheduler = build_scheduler(db, &transport, &tracker);

    let dispatched = scheduler.tick().await;
    assert_eq!(dispatched.len(), 2);

    for job_id in &dispatched {
        let job = wait_for_terminal(&tracker, job_id).await;
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.kind, JobKind::Sync);
    }
    assert_eq!(db.count_by_account(&first.id).await.unwrap(), 2);
    assert_eq!(db.count_by_account(&second.id).await.unwrap(), 2);
    assert_eq!(db.count_by_account(&exported.id).await.unwrap(), 0);
    assert_eq!(db.count_by_account(&disabled.id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_tick_skips_account_with_active_sync() {
    let test_db = setup_test_db().await;
    let db = &test_db.db;
    let busy = create_imap_account(db, "Busy").await;
    let idle = create_imap_account(db, "Idle").await;

    let transport = FakeTransport::new().with_folder("INBOX", 1);
    let tracker = JobTracker::new();
    let scheduler = build_scheduler(db, &transport, &tracker);

    let held = tracker
        .try_create_exclusive(JobKind::Sync, &busy.id, &busy.name)
        .await
        .unwrap();

    let dispatched = scheduler.tick().await;
    assert_eq!(dispatched.len(), 1);
    let job = wait_for_terminal(&tracker, &dispatched[0]).await;
    assert_eq!(job.subject_id, idle.id);

    // Still exactly one active sync for the busy account
    let active_for_busy = tracker
        .list_active()
        .await
        .into_iter()
        .filter(|job| job.kind == JobKind::Sync && job.subject_id == busy.id)
        .count();
    assert_eq!(active_for_busy, 1);
    assert_eq!(tracker.get(&held).await.unwrap().state, JobState::Queued);
}

#[tokio::test]
async fn test_shutdown_stops_loop_and_signals_active_syncs() {
    let test_db = setup_test_db().await;
    let db = &test_db.db;
    let account = create_imap_account(db, "Stuck").await;

    let transport = FakeTransport::new();
    let tracker = JobTracker::new();
    let scheduler = build_scheduler(db, &transport, &tracker);

    let held = tracker
        .try_create_exclusive(JobKind::Sync, &account.id, &account.name)
        .await
        .unwrap();
    let token = tracker.cancellation_token(&held).await.unwrap();

    // Stand-in for the worker owning the held job
    let owner = {
        let tracker = tracker.clone();
        let held = held.clone();
        let token = token.clone();
        tokio::spawn(async move {
            token.cancelled().await;
            tracker.update(&held, |job| job.cancel()).await.unwrap();
        })
    };

    let handle = scheduler.clone().start();
    tokio::time::sleep(Duration::from_millis(50)).await;
    scheduler.shutdown();

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("Scheduler did not stop")
        .expect("Scheduler task panicked");
    owner.await.unwrap();

    assert!(scheduler.is_shut_down());
    assert!(token.is_cancelled());
    assert_eq!(tracker.get(&held).await.unwrap().state, JobState::Cancelled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_waits_for_pass_to_reach_checkpoint() {
    let test_db = setup_test_db().await;
    let db = &test_db.db;
    let account = create_imap_account(db, "Slow").await;

    let transport = FakeTransport::new()
        .with_folder("INBOX", 2)
        .with_folder("Sent", 2);
    transport.on_fetch(|folder| {
        if folder == "INBOX" {
            std::thread::sleep(Duration::from_millis(400));
        }
    });
    let tracker = JobTracker::new();
    let scheduler = build_scheduler(db, &transport, &tracker);

    let handle = scheduler.clone().start();
    // Wait until the pass holds a session
    for _ in 0..200 {
        if transport.opens() > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let job = tracker.list_active().await.into_iter().next();
    let job_id = job.expect("Sync pass never started").id;

    scheduler.shutdown();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("Scheduler did not stop")
        .expect("Scheduler task panicked");

    // The pass finished INBOX, saw the signal and stopped before Sent
    let job = tracker.get(&job_id).await.unwrap();
    assert_eq!(job.state, JobState::Cancelled);
    assert_eq!(job.subject_id, account.id);
    assert_eq!(db.count_by_account(&account.id).await.unwrap(), 2);
    assert_eq!(tracker.active_count(JobKind::Sync).await, 0);
}
