use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Result};
use axis_kernel::legacy::{self, LegacyState};
use axis_kernel::StateStore;
use axis_protocol::{Mode, Status};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct InitialState {
    pub mode: Mode,
    pub statuses: HashMap<String, Status>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MigrationOutcome {
    NotPresent,
    Migrated { statuses: usize },
    Abandoned,
}

/// Best-effort writer in front of the durable store. Failures are logged and
/// swallowed; the in-memory mutation that triggered a write always stands.
pub(crate) struct PersistenceGateway {
    store: Arc<dyn StateStore>,
    state_dir: PathBuf,
}

impl PersistenceGateway {
    pub fn new(store: Arc<dyn StateStore>, state_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            state_dir: state_dir.into(),
        }
    }

    async fn blocking<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&dyn StateStore) -> Result<R> + Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || f(store.as_ref()))
            .await
            .map_err(|e| anyhow!("join error: {}", e))?
    }

    pub async fn load_initial_state(&self) -> InitialState {
        let start = Instant::now();
        self.migrate_legacy().await;

        let mut state = InitialState::default();
        match self.blocking(|s| s.get_mode()).await {
            Ok(Some(mode)) => state.mode = mode,
            Ok(None) => {}
            Err(err) => error!(target: "axis::persist", %err, "failed to load mode"),
        }
        match self.blocking(|s| s.get_statuses()).await {
            Ok(statuses) => state.statuses = statuses,
            Err(err) => error!(target: "axis::persist", %err, "failed to load statuses"),
        }
        info!(
            target: "axis::persist",
            mode = %state.mode,
            items = state.statuses.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "state restored"
        );
        state
    }

    /// One-shot import of the legacy JSON file. The file is renamed after a
    /// successful import so the next startup skips it; a corrupt file is
    /// left untouched for inspection.
    pub async fn migrate_legacy(&self) -> MigrationOutcome {
        let path = legacy::legacy_path(&self.state_dir);
        if !path.exists() {
            return MigrationOutcome::NotPresent;
        }
        info!(target: "axis::persist", path = %path.display(), "found legacy state file, migrating");

        let read_path = path.clone();
        let parsed = tokio::task::spawn_blocking(move || LegacyState::read(&read_path)).await;
        let legacy_state = match parsed {
            Ok(Ok(state)) => state,
            Ok(Err(err)) => {
                error!(target: "axis::persist", path = %path.display(), %err, "legacy migration abandoned");
                return MigrationOutcome::Abandoned;
            }
            Err(err) => {
                error!(target: "axis::persist", %err, "legacy migration task failed");
                return MigrationOutcome::Abandoned;
            }
        };

        let translated = legacy_state.translate();
        if let Some(mode) = translated.mode {
            self.write_mode(mode).await;
        } else if !legacy_state.mode.trim().is_empty() {
            warn!(target: "axis::persist", mode = %legacy_state.mode, "ignoring unknown legacy mode");
        }
        let count = translated.statuses.len();
        for (id, status) in translated.statuses {
            self.write_status(&id, status).await;
        }

        let backup = legacy::backup_path(&path);
        match tokio::fs::rename(&path, &backup).await {
            Ok(()) => {
                info!(target: "axis::persist", backup = %backup.display(), statuses = count, "legacy state migrated and backed up")
            }
            Err(err) => {
                error!(target: "axis::persist", %err, "failed to back up legacy state file")
            }
        }
        MigrationOutcome::Migrated { statuses: count }
    }

    pub async fn write_mode(&self, mode: Mode) {
        if let Err(err) = self.blocking(move |s| s.set_mode(mode)).await {
            warn!(target: "axis::persist", %err, mode = %mode, "failed to persist mode");
        }
    }

    pub async fn write_status(&self, id: &str, status: Status) {
        let key = id.to_string();
        if let Err(err) = self.blocking(move |s| s.set_status(&key, status)).await {
            warn!(target: "axis::persist", %err, id, "failed to persist status");
        }
    }

    /// Mirror a full in-memory view: mode, every live status, and deletion of
    /// reconciled-away ids.
    pub async fn flush(&self, mode: Mode, statuses: Vec<(String, Status)>, removed: Vec<String>) {
        let result = self
            .blocking(move |s| {
                s.set_mode(mode)?;
                for (id, status) in &statuses {
                    s.set_status(id, *status)?;
                }
                for id in &removed {
                    s.delete_status(id)?;
                }
                Ok(())
            })
            .await;
        if let Err(err) = result {
            warn!(target: "axis::persist", %err, "state flush failed");
        }
    }
}
