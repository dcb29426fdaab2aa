use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::AppState;

/// Liveness plus push-channel counters.
pub async fn healthz(State(state): State<AppState>) -> Json<Value> {
    let stats = state.hub().stats();
    Json(json!({
        "ok": true,
        "mode": state.statuses().mode(),
        "subscribers": stats.subscribers,
        "events": {
            "published": stats.published,
            "delivered": stats.delivered,
            "dropped": stats.dropped,
        },
    }))
}
