//! Reader for the flat JSON state file that predates the SQLite store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use axis_protocol::{Mode, Status};
use serde::Deserialize;

pub const LEGACY_FILE_NAME: &str = "axis.state.json";
pub const BACKUP_SUFFIX: &str = ".bak";

#[derive(Debug, thiserror::Error)]
pub enum LegacyError {
    #[error("read legacy state: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt legacy state: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Default, Deserialize)]
pub struct LegacyState {
    #[serde(default)]
    pub mode: String,
    #[serde(default)]
    pub statuses: Option<BTreeMap<String, String>>,
}

/// Legacy contents mapped onto the current vocabulary.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TranslatedState {
    pub mode: Option<Mode>,
    pub statuses: Vec<(String, Status)>,
}

impl LegacyState {
    pub fn read(path: &Path) -> Result<Self, LegacyError> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Unknown status tokens become `Pending`; an empty or unknown mode is
    /// dropped so the stored default applies.
    pub fn translate(&self) -> TranslatedState {
        let mode = self.mode.trim().parse::<Mode>().ok();
        let statuses = self
            .statuses
            .iter()
            .flatten()
            .map(|(id, token)| (id.clone(), Status::normalize(token)))
            .collect();
        TranslatedState { mode, statuses }
    }
}

pub fn legacy_path(dir: &Path) -> PathBuf {
    dir.join(LEGACY_FILE_NAME)
}

pub fn backup_path(legacy: &Path) -> PathBuf {
    let mut name = legacy.as_os_str().to_owned();
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}
