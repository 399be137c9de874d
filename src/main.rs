use anyhow::Context;
use mailvault::bootstrap;
use mailvault::config::Config;
use mailvault::infrastructure::http::router::build_router;
use mailvault::infrastructure::observability;
use mailvault::infrastructure::persistence::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    let _guard = observability::init(&config)
        .map_err(|e| anyhow::anyhow!("Failed to initialize observability: {}", e))?;
    tracing::info!("Configuration loaded");

    let db = Database::connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connection established");

    db.run_migrations()
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    let services = bootstrap::build_app_state(db, &config).await;
    let scheduler = services.state.scheduler.clone();
    let scheduler_handle = scheduler.clone().start();

    let app = build_router(services.state);

    let addr = config.server_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    tracing::info!("Shutting down, signalling active sync passes");
    scheduler.shutdown();
    if let Err(e) = scheduler_handle.await {
        tracing::error!("Sync scheduler task failed: {}", e);
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
