use std::sync::Arc;

use anyhow::Context;
use axis_events::Hub;
use axis_kernel::Kernel;
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::automation::CommandLauncher;
use crate::config::ServerConfig;
use crate::persistence::PersistenceGateway;
use crate::poller::{self, Poller};
use crate::provider::{HttpProvider, Provider, UnconfiguredProvider};
use crate::router;
use crate::tasks::TaskManager;
use crate::AppState;

pub(crate) struct BootstrapOutput {
    pub router: Router,
    pub state: AppState,
    pub background_tasks: TaskManager,
    pub cancel: CancellationToken,
}

fn build_provider(config: &ServerConfig) -> anyhow::Result<Arc<dyn Provider>> {
    match &config.provider_url {
        Some(url) => {
            let provider = HttpProvider::new(url, config.provider_timeout)
                .with_context(|| format!("invalid provider url {url}"))?;
            info!(target: "axis::bootstrap", url = %url, "using http provider");
            Ok(Arc::new(provider))
        }
        None => {
            warn!(target: "axis::bootstrap", "AXIS_PROVIDER_URL not set; registry will stay empty");
            Ok(Arc::new(UnconfiguredProvider))
        }
    }
}

pub(crate) async fn build(config: &ServerConfig) -> anyhow::Result<BootstrapOutput> {
    std::fs::create_dir_all(&config.state_dir).with_context(|| {
        format!("failed to create state dir {}", config.state_dir.display())
    })?;
    let kernel = Kernel::open(&config.state_dir)?;
    info!(target: "axis::bootstrap", db = %kernel.db_path().display(), "state store opened");

    let persistence = Arc::new(PersistenceGateway::new(
        Arc::new(kernel),
        config.state_dir.clone(),
    ));
    let provider = build_provider(config)?;
    let launcher = Arc::new(CommandLauncher::new(config.automation_bin.clone()));
    info!(target: "axis::bootstrap", program = launcher.program(), "automation launcher ready");
    let hub = Hub::new();

    let state = AppState::builder(hub.clone(), persistence, provider, launcher)
        .with_cache_ttl(config.cache_ttl)
        .build()
        .await;

    let cancel = CancellationToken::new();
    let mut background_tasks = TaskManager::new();
    let poller = Arc::new(Poller::new(
        state.statuses().clone(),
        state.cache().clone(),
        hub,
        config.refresh_ticks,
    ));
    background_tasks.push(poller::start(poller, cancel.child_token()));

    let (routes, endpoints) = router::build_router();
    info!(target: "axis::bootstrap", endpoints = endpoints.len(), "routes registered");
    let router = attach_layers(routes.with_state(state.clone()));

    Ok(BootstrapOutput {
        router,
        state,
        background_tasks,
        cancel,
    })
}

pub(crate) fn attach_layers(router: Router) -> Router {
    router
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
