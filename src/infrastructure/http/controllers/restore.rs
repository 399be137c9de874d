use crate::{
    application::services::{DispatchOutcome, ReturnContext},
    domain::entities::BatchRestoreRequest,
    infrastructure::http::middleware::{ApiResult, AppState},
};
use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct RestoreBody {
    #[serde(flatten)]
    pub request: BatchRestoreRequest,
    /// Page to come back to once the restore is done or queued
    #[serde(default)]
    pub return_to: Option<String>,
}

/// POST /api/restore - Restore archived emails into a live mailbox
pub async fn restore_emails(
    State(state): State<AppState>,
    Json(body): Json<RestoreBody>,
) -> ApiResult<(StatusCode, Json<DispatchOutcome>)> {
    let mut context = ReturnContext::new();
    if let Some(return_to) = body.return_to {
        context = context
            .with_return_to(return_to)
            .with_handoff(state.selections.clone());
    }

    let outcome = state
        .restore_dispatcher
        .dispatch(body.request, context)
        .await?;

    let status = match &outcome {
        DispatchOutcome::Inline { .. } => StatusCode::OK,
        DispatchOutcome::Queued { .. } => StatusCode::ACCEPTED,
        DispatchOutcome::TooManyItems { .. } => StatusCode::PAYLOAD_TOO_LARGE,
    };
    Ok((status, Json(outcome)))
}
