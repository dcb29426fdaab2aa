use axis_protocol::{Direction, Status};
use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::{required_id, IdQuery};
use crate::responses::ApiError;
use crate::AppState;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub(crate) struct StatusResponse {
    pub id: String,
    pub status: Status,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SetStatusQuery {
    id: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CycleQuery {
    id: Option<String>,
    direction: Option<String>,
}

pub async fn status_get(
    State(state): State<AppState>,
    Query(q): Query<IdQuery>,
) -> Result<Json<StatusResponse>, ApiError> {
    let id = required_id(q.id)?;
    require_note(&state, &id)?;
    let status = state.statuses().get(&id).await;
    Ok(Json(StatusResponse { id, status }))
}

pub async fn status_set(
    State(state): State<AppState>,
    Query(q): Query<SetStatusQuery>,
) -> Result<Json<StatusResponse>, ApiError> {
    let id = required_id(q.id)?;
    require_note(&state, &id)?;
    let raw = q.status.unwrap_or_default();
    let status = state.statuses().set(&id, &raw).await?;
    announce(&state, &id, status).await;
    Ok(Json(StatusResponse { id, status }))
}

pub async fn status_cycle(
    State(state): State<AppState>,
    Query(q): Query<CycleQuery>,
) -> Result<Json<StatusResponse>, ApiError> {
    let id = required_id(q.id)?;
    let direction: Direction = q
        .direction
        .as_deref()
        .unwrap_or_default()
        .parse()
        .map_err(|err: axis_protocol::ParseError| ApiError::validation(err.to_string()))?;
    require_note(&state, &id)?;
    let next = state.statuses().cycle(&id, direction);
    state.statuses().set_status(&id, next).await;
    announce(&state, &id, next).await;
    Ok(Json(StatusResponse { id, status: next }))
}

/// Ids the cache knows as documents or sheets have no status lifecycle.
/// Unknown ids pass; the next refresh drops them if the provider does not
/// list them.
fn require_note(state: &AppState, id: &str) -> Result<(), ApiError> {
    match state.cache().kind_of(id) {
        Some(kind) if !kind.carries_status() => Err(ApiError::validation(format!(
            "item {id} is a {kind:?} and carries no status"
        ))),
        _ => Ok(()),
    }
}

/// Status event for items the cache knows a title for, then a fresh snapshot.
async fn announce(state: &AppState, id: &str, status: Status) {
    info!(target: "axis::status", id, status = %status, "status updated");
    if let Some(title) = state.cache().title_of(id) {
        state
            .cache()
            .publish_status(id.to_string(), status, title);
    }
    state.cache().publish_snapshot().await;
}
