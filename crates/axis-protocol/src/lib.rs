use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// RFC7807-style error payload used at service edges.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProblemDetails {
    pub r#type: String,
    pub title: String,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ProblemDetails {
    pub fn new(status: u16, title: impl Into<String>, detail: Option<String>) -> Self {
        Self {
            r#type: "about:blank".into(),
            title: title.into(),
            status,
            detail,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized {what}: {token:?}")]
pub struct ParseError {
    pub what: &'static str,
    pub token: String,
}

impl ParseError {
    fn new(what: &'static str, token: &str) -> Self {
        Self {
            what,
            token: token.to_string(),
        }
    }
}

// -------- Status lifecycle --------

/// Lifecycle of a note item. The declaration order is the cycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Pending,
    Execute,
    Active,
    Blocked,
    Review,
    Complete,
    Error,
}

pub const STATUS_ORDER: [Status; 7] = [
    Status::Pending,
    Status::Execute,
    Status::Active,
    Status::Blocked,
    Status::Review,
    Status::Complete,
    Status::Error,
];

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "Pending",
            Status::Execute => "Execute",
            Status::Active => "Active",
            Status::Blocked => "Blocked",
            Status::Review => "Review",
            Status::Complete => "Complete",
            Status::Error => "Error",
        }
    }

    pub fn index(self) -> usize {
        STATUS_ORDER
            .iter()
            .position(|s| *s == self)
            .unwrap_or_default()
    }

    /// Map any token onto the lifecycle; unknown tokens (including the old
    /// `Keep`/`Delete` workflow values) collapse to `Pending`.
    pub fn normalize(token: &str) -> Status {
        token.parse().unwrap_or(Status::Pending)
    }

    /// Step one position around the closed cycle. A missing status sits at
    /// index 0.
    pub fn cycle(current: Option<Status>, direction: Direction) -> Status {
        let len = STATUS_ORDER.len();
        let idx = current.map(Status::index).unwrap_or(0);
        let next = match direction {
            Direction::Forward => (idx + 1) % len,
            Direction::Back => (idx + len - 1) % len,
        };
        STATUS_ORDER[next]
    }

    /// Same as [`Status::cycle`] but starting from a raw token.
    pub fn cycle_token(token: &str, direction: Direction) -> Status {
        Status::cycle(token.parse().ok(), direction)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        STATUS_ORDER
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseError::new("status", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Back,
}

impl FromStr for Direction {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "forward" | "next" | "" => Ok(Direction::Forward),
            "back" | "backward" | "prev" => Ok(Direction::Back),
            _ => Err(ParseError::new("direction", s)),
        }
    }
}

// -------- Operating mode --------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Mode {
    #[default]
    #[serde(rename = "AUTO")]
    Auto,
    #[serde(rename = "MANUAL")]
    Manual,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Auto => "AUTO",
            Mode::Manual => "MANUAL",
        }
    }

    pub fn is_manual(&self) -> bool {
        matches!(self, Mode::Manual)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AUTO" => Ok(Mode::Auto),
            "MANUAL" => Ok(Mode::Manual),
            _ => Err(ParseError::new("mode", s)),
        }
    }
}

// -------- Registry items --------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    #[serde(alias = "keep")]
    Note,
    #[serde(alias = "doc")]
    Document,
    Sheet,
}

impl ItemKind {
    /// Only notes take part in the status lifecycle.
    pub fn carries_status(&self) -> bool {
        match self {
            ItemKind::Note => true,
            ItemKind::Document | ItemKind::Sheet => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryItem {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    pub title: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
}

pub const NOTE_SNIPPET: &str = "Note";

impl RegistryItem {
    pub fn note(id: impl Into<String>, title: &str) -> Self {
        Self {
            id: id.into(),
            kind: ItemKind::Note,
            title: sanitize_title(title),
            snippet: NOTE_SNIPPET.to_string(),
            status: None,
        }
    }

    pub fn is_note(&self) -> bool {
        self.kind.carries_status()
    }
}

/// Full payload of one item as returned by the provider's detail call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDetail {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
}

pub fn sanitize_title(raw: &str) -> String {
    let t = raw.trim();
    if t.is_empty() {
        "Untitled".to_string()
    } else {
        t.to_string()
    }
}

// -------- Push event payloads --------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickPayload {
    pub seconds_remaining: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChangedPayload {
    pub id: String,
    pub status: Status,
    pub title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutomationState {
    Started,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationPayload {
    pub state: AutomationState,
    pub task: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cycle_forward_then_back_is_identity() {
        for s in STATUS_ORDER {
            let fwd = Status::cycle(Some(s), Direction::Forward);
            assert_eq!(Status::cycle(Some(fwd), Direction::Back), s);
            let back = Status::cycle(Some(s), Direction::Back);
            assert_eq!(Status::cycle(Some(back), Direction::Forward), s);
        }
    }

    #[test]
    fn seven_forward_steps_close_the_cycle() {
        for start in STATUS_ORDER {
            let mut cur = start;
            for _ in 0..7 {
                cur = Status::cycle(Some(cur), Direction::Forward);
            }
            assert_eq!(cur, start);
        }
        assert_eq!(
            Status::cycle(Some(Status::Error), Direction::Forward),
            Status::Pending
        );
        assert_eq!(
            Status::cycle(Some(Status::Pending), Direction::Back),
            Status::Error
        );
    }

    #[test]
    fn unknown_tokens_cycle_from_pending() {
        assert_eq!(Status::cycle_token("", Direction::Forward), Status::Execute);
        assert_eq!(
            Status::cycle_token("unknown-token", Direction::Forward),
            Status::Execute
        );
        assert_eq!(Status::cycle_token("Keep", Direction::Back), Status::Error);
    }

    #[test]
    fn normalize_maps_legacy_tokens_to_pending() {
        assert_eq!(Status::normalize("Keep"), Status::Pending);
        assert_eq!(Status::normalize("Delete"), Status::Pending);
        assert_eq!(Status::normalize("Review"), Status::Review);
        assert!("review".parse::<Status>().is_err());
    }

    #[test]
    fn registry_item_wire_shape() {
        let mut item = RegistryItem::note("n1", "  ");
        assert_eq!(item.title, "Untitled");
        assert_eq!(
            serde_json::to_value(&item).unwrap(),
            json!({"id": "n1", "type": "note", "title": "Untitled", "snippet": "Note"})
        );
        item.status = Some(Status::Blocked);
        assert_eq!(serde_json::to_value(&item).unwrap()["status"], "Blocked");

        let upstream: RegistryItem =
            serde_json::from_value(json!({"id": "d", "type": "doc", "title": "Roadmap"})).unwrap();
        assert_eq!(upstream.kind, ItemKind::Document);
        assert!(!upstream.is_note());
    }

    #[test]
    fn mode_and_direction_parse() {
        assert_eq!("MANUAL".parse::<Mode>().unwrap(), Mode::Manual);
        assert!("manual".parse::<Mode>().is_err());
        assert_eq!(serde_json::to_value(Mode::Auto).unwrap(), json!("AUTO"));
        assert_eq!("back".parse::<Direction>().unwrap(), Direction::Back);
        assert!("sideways".parse::<Direction>().is_err());
    }
}
