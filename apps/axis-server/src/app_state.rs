use std::sync::Arc;
use std::time::Duration;

use axis_events::Hub;

use crate::automation::{AutomationGateway, Launcher};
use crate::persistence::PersistenceGateway;
use crate::provider::Provider;
use crate::snapshot_cache::{SnapshotCache, DEFAULT_TTL};
use crate::status_store::StatusStore;

#[derive(Clone)]
pub(crate) struct AppState {
    hub: Hub,
    statuses: Arc<StatusStore>,
    cache: Arc<SnapshotCache>,
    provider: Arc<dyn Provider>,
    automation: Arc<AutomationGateway>,
}

impl AppState {
    pub fn builder(
        hub: Hub,
        persistence: Arc<PersistenceGateway>,
        provider: Arc<dyn Provider>,
        launcher: Arc<dyn Launcher>,
    ) -> AppStateBuilder {
        AppStateBuilder {
            hub,
            persistence,
            provider,
            launcher,
            cache_ttl: DEFAULT_TTL,
        }
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    pub fn statuses(&self) -> &Arc<StatusStore> {
        &self.statuses
    }

    pub fn cache(&self) -> &Arc<SnapshotCache> {
        &self.cache
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    pub fn automation(&self) -> &Arc<AutomationGateway> {
        &self.automation
    }
}

pub(crate) struct AppStateBuilder {
    hub: Hub,
    persistence: Arc<PersistenceGateway>,
    provider: Arc<dyn Provider>,
    launcher: Arc<dyn Launcher>,
    cache_ttl: Duration,
}

impl AppStateBuilder {
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Restore durable state (running the legacy migration if needed) and
    /// wire the components together.
    pub async fn build(self) -> AppState {
        let initial = self.persistence.load_initial_state().await;
        let statuses = Arc::new(StatusStore::new(initial, self.persistence));
        let cache = Arc::new(SnapshotCache::new(
            self.provider.clone(),
            statuses.clone(),
            self.hub.clone(),
            self.cache_ttl,
        ));
        let automation = Arc::new(AutomationGateway::new(self.launcher, self.hub.clone()));
        AppState {
            hub: self.hub,
            statuses,
            cache,
            provider: self.provider,
            automation,
        }
    }
}
