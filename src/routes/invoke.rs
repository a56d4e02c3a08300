use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::command::CommandPayload;
use crate::services::producer::{AwaitError, QueueSnapshot, SubmitError};

#[derive(Debug, Default, Deserialize)]
pub struct InvokeRequest {
    /// Task identifier; the configured default when omitted.
    pub task: Option<String>,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct InvokeResponse {
    pub command_id: Uuid,
    pub status: String,
    pub detail: String,
}

/// POST /invoke — submit a command and wait for its result.
///
/// Maps the front-end's no-argument trigger onto `submit` plus
/// `await_result` with the configured wait window. A busy queue is 409; a
/// wait that expires is 504, with the command left outstanding.
pub async fn invoke(
    State(state): State<AppState>,
    request: Option<Json<InvokeRequest>>,
) -> Result<Json<InvokeResponse>, (StatusCode, String)> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let payload = CommandPayload {
        task: request
            .task
            .unwrap_or_else(|| state.config.default_task.clone()),
        params: request.params,
    };

    let handle = state.producer.submit(payload).await.map_err(|e| match e {
        SubmitError::Busy { .. } => (StatusCode::CONFLICT, e.to_string()),
        SubmitError::Store(_) => (StatusCode::BAD_GATEWAY, e.to_string()),
    })?;

    match state
        .producer
        .await_result(&handle, state.config.result_wait_timeout())
        .await
    {
        Ok(result) => Ok(Json(InvokeResponse {
            command_id: result.command_id,
            status: result.status.to_string(),
            detail: result.detail,
        })),
        Err(AwaitError::Timeout(command_id)) => Err((
            StatusCode::GATEWAY_TIMEOUT,
            format!("command {command_id} still outstanding; poll /status for a late result"),
        )),
        Err(e @ AwaitError::Store(_)) => Err((StatusCode::BAD_GATEWAY, e.to_string())),
    }
}

/// GET /status — read-only peek at the current slot state.
pub async fn queue_status(
    State(state): State<AppState>,
) -> Result<Json<QueueSnapshot>, (StatusCode, String)> {
    let snapshot = state
        .producer
        .peek()
        .await
        .map_err(|e| (StatusCode::BAD_GATEWAY, e.to_string()))?;
    Ok(Json(snapshot))
}
