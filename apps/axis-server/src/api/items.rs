use axum::{
    extract::{Query, State},
    http::StatusCode,
};
use tracing::info;

use crate::api::{required_id, IdQuery};
use crate::responses::ApiError;
use crate::AppState;

/// Delete one item upstream, then refresh so the status record is
/// reconciled away and every client gets the new list.
pub async fn item_delete(
    State(state): State<AppState>,
    Query(q): Query<IdQuery>,
) -> Result<StatusCode, ApiError> {
    let id = required_id(q.id)?;
    if !state.statuses().mode().is_manual() {
        return Err(ApiError::manual_only("delete"));
    }
    state.provider().delete(&id).await?;
    info!(target: "axis::http", id = %id, "item deleted");

    let _ = state.cache().refresh().await;
    state.cache().publish_snapshot().await;
    Ok(StatusCode::OK)
}
