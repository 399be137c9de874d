use crate::infrastructure::http::middleware::{ApiError, ApiResult, AppState};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct JobAccepted {
    pub job_id: String,
}

#[derive(Debug, Serialize)]
pub struct ResyncResponse {
    pub started: bool,
}

#[derive(Debug, Serialize)]
pub struct ConnectionTestResponse {
    pub ok: bool,
}

/// POST /api/accounts/:id/sync - Queue an incremental sync now
pub async fn sync_account(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> ApiResult<(StatusCode, Json<JobAccepted>)> {
    let job_id = state.sync_engine.sync_now(&account_id).await?;
    Ok((StatusCode::ACCEPTED, Json(JobAccepted { job_id })))
}

/// POST /api/accounts/:id/resync - Reset the watermark and run a full sync
pub async fn resync_account(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Json<ResyncResponse> {
    let started = state.sync_engine.resync(&account_id).await;
    Json(ResyncResponse { started })
}

/// GET /api/accounts/:id/folders - Remote folder names, empty when unreachable
pub async fn list_folders(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Json<Vec<String>> {
    Json(state.sync_engine.list_folders(&account_id).await)
}

/// POST /api/accounts/:id/test-connection
pub async fn test_connection(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> ApiResult<Json<ConnectionTestResponse>> {
    let account = state
        .accounts
        .get_account(&account_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Account {}", account_id)))?;

    if account.mbox_only {
        return Err(ApiError::BadRequest(
            "Account is mbox-only and has no server connection".to_string(),
        ));
    }

    let ok = state.sync_engine.test_connection(&account).await;
    Ok(Json(ConnectionTestResponse { ok }))
}
