use mailvault::infrastructure::persistence::Database;
use tempfile::TempDir;

/// File-backed SQLite database that lives as long as the value
pub struct TestDb {
    pub db: Database,
    _dir: TempDir,
}

pub async fn setup_test_db() -> TestDb {
    // Install drivers for AnyPool (required for tests)
    sqlx::any::install_default_drivers();

    // One file per test so tests can run in parallel
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db_url = format!("sqlite://{}?mode=rwc", dir.path().join("archive.db").display());

    let db = Database::connect(&db_url)
        .await
        .expect("Failed to connect to test database");
    db.run_migrations()
        .await
        .expect("Failed to run migrations");

    TestDb { db, _dir: dir }
}
