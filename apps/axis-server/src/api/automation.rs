use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::responses::ApiError;
use crate::AppState;

pub(crate) const MAX_BODY_BYTES: usize = 8192;

#[derive(Debug, Deserialize)]
pub(crate) struct DispatchRequest {
    #[serde(default)]
    task: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct DispatchAccepted {
    pub status: String,
}

/// Start one automation run. The mode check comes before the body is read.
pub async fn dispatch(
    State(state): State<AppState>,
    body: Result<Json<DispatchRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<DispatchAccepted>), ApiError> {
    if !state.statuses().mode().is_manual() {
        return Err(ApiError::manual_only("automation dispatch"));
    }
    let Json(req) = body.map_err(|_| ApiError::validation("invalid request payload"))?;
    if req.task.trim().is_empty() {
        return Err(ApiError::validation("task is required"));
    }
    state.automation().dispatch(&req.task)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(DispatchAccepted {
            status: "accepted".into(),
        }),
    ))
}
