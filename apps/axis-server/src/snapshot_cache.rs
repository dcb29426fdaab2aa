use std::sync::Arc;
use std::time::Duration;

use axis_events::{EventKind, Hub};
use axis_protocol::{ItemKind, RegistryItem, StatusChangedPayload};
use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::provider::{Provider, ProviderError};
use crate::singleflight::Singleflight;
use crate::status_store::StatusStore;

pub(crate) const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

const REFRESH_FLIGHT: &str = "registry.refresh";

struct Snapshot {
    items: Vec<RegistryItem>,
    expires_at: Option<Instant>,
}

/// TTL-bounded copy of the provider's item list.
pub(crate) struct SnapshotCache {
    snapshot: RwLock<Snapshot>,
    ttl: Duration,
    provider: Arc<dyn Provider>,
    statuses: Arc<StatusStore>,
    hub: Hub,
    flights: Singleflight,
}

impl SnapshotCache {
    pub fn new(
        provider: Arc<dyn Provider>,
        statuses: Arc<StatusStore>,
        hub: Hub,
        ttl: Duration,
    ) -> Self {
        Self {
            snapshot: RwLock::new(Snapshot {
                items: Vec::new(),
                expires_at: None,
            }),
            ttl,
            provider,
            statuses,
            hub,
            flights: Singleflight::default(),
        }
    }

    /// Copy of the cached items and whether they are inside the TTL.
    pub fn read(&self) -> (Vec<RegistryItem>, bool) {
        let snap = self.snapshot.read();
        let fresh = snap
            .expires_at
            .is_some_and(|expires| Instant::now() < expires);
        (snap.items.clone(), fresh)
    }

    pub fn title_of(&self, id: &str) -> Option<String> {
        self.snapshot
            .read()
            .items
            .iter()
            .find(|item| item.id == id)
            .map(|item| item.title.clone())
    }

    pub fn kind_of(&self, id: &str) -> Option<ItemKind> {
        self.snapshot
            .read()
            .items
            .iter()
            .find(|item| item.id == id)
            .map(|item| item.kind)
    }

    /// Fetch the full list from the provider and swap it in. On failure the
    /// previous snapshot and its expiry stay as they were.
    pub async fn refresh(&self) -> Result<(), ProviderError> {
        let start = std::time::Instant::now();
        let items = match self.provider.list_all().await {
            Ok(items) => items,
            Err(err) => {
                warn!(target: "axis::cache", %err, "provider fetch failed; keeping cached snapshot");
                return Err(err);
            }
        };

        let reconciled = self.statuses.reconcile(&items);
        let count = items.len();
        {
            let mut snap = self.snapshot.write();
            snap.items = items;
            snap.expires_at = Some(Instant::now() + self.ttl);
        }

        if !reconciled.is_empty() {
            let (mode, statuses) = self.statuses.persisted_view();
            self.statuses
                .persistence()
                .flush(mode, statuses, reconciled.removed.clone())
                .await;
            for (id, title) in reconciled.defaulted {
                self.publish_status(id, axis_protocol::Status::Pending, title);
            }
        }

        info!(
            target: "axis::cache",
            count,
            removed = reconciled.removed.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "cache refreshed"
        );
        Ok(())
    }

    /// Refresh, sharing one provider call among concurrent callers.
    pub async fn refresh_coalesced(&self) {
        let guard = self.flights.begin(REFRESH_FLIGHT);
        if guard.is_leader() {
            let _ = self.refresh().await;
        } else {
            guard.wait().await;
        }
    }

    pub fn decorate(&self, mut items: Vec<RegistryItem>) -> Vec<RegistryItem> {
        self.statuses.decorate(&mut items);
        items
    }

    /// Serving path: cached items, refreshed first when stale or empty.
    /// Provider errors fall back to whatever is cached.
    pub async fn current(&self) -> Vec<RegistryItem> {
        let (items, fresh) = self.read();
        if fresh && !items.is_empty() {
            return self.decorate(items);
        }
        self.refresh_coalesced().await;
        self.decorate(self.read().0)
    }

    /// Insert or replace one note fetched directly, bypassing a full refresh.
    /// Returns true when the item was not cached before.
    pub async fn upsert_single(&self, item: RegistryItem) -> bool {
        let created = if item.is_note() {
            let (_, created) = self.statuses.ensure(&item.id).await;
            created
        } else {
            false
        };
        let id = item.id.clone();
        let title = item.title.clone();

        let added = {
            let mut snap = self.snapshot.write();
            let added = match snap.items.iter_mut().find(|cached| cached.id == item.id) {
                Some(cached) => {
                    *cached = item;
                    false
                }
                None => {
                    snap.items.push(item);
                    true
                }
            };
            snap.expires_at = Some(Instant::now() + self.ttl);
            added
        };

        if created {
            self.publish_status(id, axis_protocol::Status::Pending, title);
        }
        added
    }

    /// Broadcast the decorated cached list. A cold cache is filled once
    /// first; a stale one is sent as is.
    pub async fn publish_snapshot(&self) -> usize {
        let (mut items, _) = self.read();
        if items.is_empty() {
            self.refresh_coalesced().await;
            items = self.read().0;
        }
        let items = self.decorate(items);
        self.hub.publish(EventKind::Snapshot, &items)
    }

    pub fn publish_status(&self, id: String, status: axis_protocol::Status, title: String) {
        self.hub.publish(
            EventKind::StatusChanged,
            &StatusChangedPayload { id, status, title },
        );
    }
}
