use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axis_protocol::{Direction, Mode, RegistryItem, Status};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::persistence::{InitialState, PersistenceGateway};

#[derive(Debug, thiserror::Error)]
pub(crate) enum StatusError {
    #[error("invalid status: {0:?}")]
    InvalidStatus(String),
    #[error("missing item id")]
    MissingId,
}

/// Mode and statuses share one lock; they are read and written together.
struct Table {
    mode: Mode,
    statuses: HashMap<String, Status>,
}

/// Result of matching the status table against a fresh item list.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct Reconciliation {
    /// Notes that received a `Pending` record, as `(id, title)`.
    pub defaulted: Vec<(String, String)>,
    pub removed: Vec<String>,
}

impl Reconciliation {
    pub fn is_empty(&self) -> bool {
        self.defaulted.is_empty() && self.removed.is_empty()
    }
}

pub(crate) struct StatusStore {
    table: RwLock<Table>,
    persistence: Arc<PersistenceGateway>,
}

impl StatusStore {
    pub fn new(initial: InitialState, persistence: Arc<PersistenceGateway>) -> Self {
        Self {
            table: RwLock::new(Table {
                mode: initial.mode,
                statuses: initial.statuses,
            }),
            persistence,
        }
    }

    pub fn persistence(&self) -> &Arc<PersistenceGateway> {
        &self.persistence
    }

    pub fn mode(&self) -> Mode {
        self.table.read().mode
    }

    pub async fn set_mode(&self, mode: Mode) {
        let previous = {
            let mut table = self.table.write();
            std::mem::replace(&mut table.mode, mode)
        };
        if previous != mode {
            info!(target: "axis::status", from = %previous, to = %mode, "mode changed");
        }
        self.persistence.write_mode(mode).await;
    }

    /// Read without creating a record.
    pub fn peek(&self, id: &str) -> Option<Status> {
        self.table.read().statuses.get(id).copied()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.table.read().statuses.len()
    }

    /// Return the record, creating `Pending` on first read. Reports whether
    /// the record was created; a created record is written durably.
    pub async fn ensure(&self, id: &str) -> (Status, bool) {
        let (status, created) = {
            let mut table = self.table.write();
            match table.statuses.get(id) {
                Some(status) => (*status, false),
                None => {
                    table.statuses.insert(id.to_string(), Status::Pending);
                    (Status::Pending, true)
                }
            }
        };
        if created {
            self.persistence.write_status(id, status).await;
        }
        (status, created)
    }

    pub async fn get(&self, id: &str) -> Status {
        self.ensure(id).await.0
    }

    /// Validate a raw status token and store it.
    pub async fn set(&self, id: &str, raw: &str) -> Result<Status, StatusError> {
        if id.trim().is_empty() {
            return Err(StatusError::MissingId);
        }
        let status: Status = raw
            .parse()
            .map_err(|_| StatusError::InvalidStatus(raw.to_string()))?;
        self.set_status(id, status).await;
        Ok(status)
    }

    pub async fn set_status(&self, id: &str, status: Status) {
        self.table
            .write()
            .statuses
            .insert(id.to_string(), status);
        self.persistence.write_status(id, status).await;
    }

    /// Next status around the lifecycle; does not store it.
    pub fn cycle(&self, id: &str, direction: Direction) -> Status {
        Status::cycle(self.peek(id), direction)
    }

    /// Default every live note lacking a record and drop records for ids that
    /// are no longer live notes. The only path that deletes records.
    pub fn reconcile(&self, items: &[RegistryItem]) -> Reconciliation {
        let live: HashSet<&str> = items
            .iter()
            .filter(|item| item.is_note())
            .map(|item| item.id.as_str())
            .collect();
        let mut out = Reconciliation::default();
        {
            let mut table = self.table.write();
            for item in items.iter().filter(|item| item.is_note()) {
                if !table.statuses.contains_key(&item.id) {
                    table.statuses.insert(item.id.clone(), Status::Pending);
                    out.defaulted.push((item.id.clone(), item.title.clone()));
                }
            }
            table.statuses.retain(|id, _| {
                let keep = live.contains(id.as_str());
                if !keep {
                    out.removed.push(id.clone());
                }
                keep
            });
        }
        for id in &out.removed {
            debug!(target: "axis::status", id = %id, "removed stale status");
        }
        out
    }

    /// Attach statuses to note items (`Pending` when missing) without
    /// touching the table.
    pub fn decorate(&self, items: &mut [RegistryItem]) {
        let table = self.table.read();
        for item in items.iter_mut() {
            item.status = if item.is_note() {
                Some(
                    table
                        .statuses
                        .get(&item.id)
                        .copied()
                        .unwrap_or(Status::Pending),
                )
            } else {
                None
            };
        }
    }

    /// Copy of mode and statuses for a durable flush outside the lock.
    pub fn persisted_view(&self) -> (Mode, Vec<(String, Status)>) {
        let table = self.table.read();
        let statuses = table
            .statuses
            .iter()
            .map(|(id, status)| (id.clone(), *status))
            .collect();
        (table.mode, statuses)
    }
}
