use axis_protocol::{sanitize_title, RegistryItem, Status, NOTE_SNIPPET};
use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::{required_id, truthy, IdQuery};
use crate::responses::ApiError;
use crate::AppState;

const NO_CONTENT: &str = "No body content.";

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RegistryQuery {
    refresh: Option<String>,
}

/// Decorated registry. `?refresh=1` forces a provider fetch and a snapshot
/// broadcast, but only in MANUAL mode.
pub async fn registry(
    State(state): State<AppState>,
    Query(q): Query<RegistryQuery>,
) -> Json<Vec<RegistryItem>> {
    let cache = state.cache();
    if truthy(q.refresh.as_deref()) && state.statuses().mode().is_manual() {
        debug!(target: "axis::http", "forced registry refresh");
        let _ = cache.refresh().await;
        cache.publish_snapshot().await;
    }
    Json(cache.current().await)
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ContentResponse {
    pub id: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
}

/// Full body of one item. A note seen here for the first time joins the
/// cache and triggers a snapshot broadcast.
pub async fn registry_content(
    State(state): State<AppState>,
    Query(q): Query<IdQuery>,
) -> Result<Json<ContentResponse>, ApiError> {
    let id = required_id(q.id)?;
    let detail = state.provider().get_detail(&id).await?;
    let id = if detail.id.is_empty() { id } else { detail.id };

    let status = if detail.kind.carries_status() {
        let item = RegistryItem {
            id: id.clone(),
            kind: detail.kind,
            title: sanitize_title(&detail.title),
            snippet: NOTE_SNIPPET.to_string(),
            status: None,
        };
        if state.cache().upsert_single(item).await {
            state.cache().publish_snapshot().await;
        }
        Some(state.statuses().get(&id).await)
    } else {
        None
    };

    let content = detail.content.trim();
    let content = if content.is_empty() { NO_CONTENT } else { content };
    Ok(Json(ContentResponse {
        id,
        content: content.to_string(),
        status,
    }))
}
