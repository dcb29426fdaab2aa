use axis_protocol::Mode;
use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::responses::ApiError;
use crate::AppState;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub(crate) struct ModeResponse {
    pub mode: Mode,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ModeQuery {
    set: Option<String>,
}

pub async fn mode_get(State(state): State<AppState>) -> Json<ModeResponse> {
    Json(ModeResponse {
        mode: state.statuses().mode(),
    })
}

pub async fn mode_set(
    State(state): State<AppState>,
    Query(q): Query<ModeQuery>,
) -> Result<Json<ModeResponse>, ApiError> {
    let raw = q.set.unwrap_or_default();
    let mode: Mode = raw
        .trim()
        .parse()
        .map_err(|_| ApiError::validation(format!("invalid mode: {raw:?}")))?;
    state.statuses().set_mode(mode).await;
    Ok(Json(ModeResponse { mode }))
}
