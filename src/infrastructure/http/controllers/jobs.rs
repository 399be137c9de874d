use crate::{
    domain::entities::Job,
    infrastructure::http::middleware::{ApiResult, AppState},
};
use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct CancelJobResponse {
    pub job_id: String,
    pub cancelled: bool,
}

/// GET /api/jobs - Jobs that are queued or running
pub async fn list_jobs(State(state): State<AppState>) -> Json<Vec<Job>> {
    Json(state.tracker.list_active().await)
}

/// GET /api/jobs/:id - Poll one job, including recently finished ones
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<Job>> {
    let job = state.tracker.get(&job_id).await?;
    Ok(Json(job))
}

/// POST /api/jobs/:id/cancel - Ask a job to stop at its next checkpoint
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<CancelJobResponse>> {
    // 404 for unknown ids; finished jobs answer cancelled = false
    state.tracker.get(&job_id).await?;
    let cancelled = state.tracker.cancel(&job_id).await;
    tracing::info!(job_id = %job_id, cancelled, "Job cancellation requested");

    Ok(Json(CancelJobResponse { job_id, cancelled }))
}
