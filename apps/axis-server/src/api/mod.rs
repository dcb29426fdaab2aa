pub mod automation;
pub mod events;
pub mod items;
pub mod meta;
pub mod mode;
pub mod registry;
pub mod status;

use serde::Deserialize;

use crate::responses::ApiError;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct IdQuery {
    pub id: Option<String>,
}

/// Trimmed, non-empty `id` query parameter.
pub(crate) fn required_id(raw: Option<String>) -> Result<String, ApiError> {
    raw.map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::validation("missing id"))
}

pub(crate) fn truthy(raw: Option<&str>) -> bool {
    matches!(
        raw.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("1" | "true" | "yes" | "on")
    )
}
