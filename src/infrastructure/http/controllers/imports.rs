use crate::{
    domain::entities::ImportRequest,
    infrastructure::http::{
        controllers::accounts::JobAccepted,
        middleware::{ApiResult, AppState},
    },
};
use axum::{extract::State, http::StatusCode, Json};

/// POST /api/imports - Queue an uploaded mbox file for import
pub async fn create_import(
    State(state): State<AppState>,
    Json(request): Json<ImportRequest>,
) -> ApiResult<(StatusCode, Json<JobAccepted>)> {
    let job_id = state.import_pipeline.submit(request).await?;
    Ok((StatusCode::ACCEPTED, Json(JobAccepted { job_id })))
}
