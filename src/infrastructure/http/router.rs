use crate::infrastructure::http::controllers::{accounts, imports, jobs, restore};
use crate::infrastructure::http::middleware::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/jobs", get(jobs::list_jobs))
        .route("/api/jobs/:id", get(jobs::get_job))
        .route("/api/jobs/:id/cancel", post(jobs::cancel_job))
        .route("/api/accounts/:id/sync", post(accounts::sync_account))
        .route("/api/accounts/:id/resync", post(accounts::resync_account))
        .route("/api/accounts/:id/folders", get(accounts::list_folders))
        .route(
            "/api/accounts/:id/test-connection",
            post(accounts::test_connection),
        )
        .route("/api/restore", post(restore::restore_emails))
        .route("/api/imports", post(imports::create_import))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES)),
        )
        .with_state(state)
}

async fn health_handler() -> &'static str {
    "OK"
}
