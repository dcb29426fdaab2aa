use std::mem;

use axum::{
    extract::DefaultBodyLimit,
    handler::Handler,
    routing::{get, post, MethodRouter},
    Router,
};

use crate::{api, AppState};

pub(crate) struct RouterBuilder {
    router: Router<AppState>,
    endpoints: Vec<String>,
}

impl RouterBuilder {
    pub fn new() -> Self {
        Self {
            router: Router::new(),
            endpoints: Vec::new(),
        }
    }

    fn route(&mut self, method: &str, path: &'static str, route: MethodRouter<AppState>) {
        self.endpoints.push(format!("{method} {path}"));
        let router = mem::take(&mut self.router);
        self.router = router.route(path, route);
    }

    pub fn route_get<H, T>(&mut self, path: &'static str, handler: H) -> &mut Self
    where
        H: Handler<T, AppState> + Clone + 'static,
        T: 'static,
    {
        self.route("GET", path, get(handler));
        self
    }

    pub fn route_post<H, T>(&mut self, path: &'static str, handler: H) -> &mut Self
    where
        H: Handler<T, AppState> + Clone + 'static,
        T: 'static,
    {
        self.route("POST", path, post(handler));
        self
    }

    /// GET and POST on one path with distinct handlers.
    pub fn route_get_post<HG, TG, HP, TP>(
        &mut self,
        path: &'static str,
        get_handler: HG,
        post_handler: HP,
    ) -> &mut Self
    where
        HG: Handler<TG, AppState> + Clone + 'static,
        TG: 'static,
        HP: Handler<TP, AppState> + Clone + 'static,
        TP: 'static,
    {
        self.endpoints.push(format!("GET {path}"));
        self.route("POST", path, get(get_handler).post(post_handler));
        self
    }

    pub fn build(self) -> (Router<AppState>, Vec<String>) {
        (self.router, self.endpoints)
    }
}

pub(crate) mod paths {
    pub const HEALTHZ: &str = "/healthz";
    pub const REGISTRY: &str = "/api/registry";
    pub const REGISTRY_CONTENT: &str = "/api/registry/content";
    pub const STATUS: &str = "/api/status";
    pub const STATUS_CYCLE: &str = "/api/status/cycle";
    pub const MODE: &str = "/api/mode";
    pub const ITEMS_DELETE: &str = "/api/items/delete";
    pub const AUTOMATION_DISPATCH: &str = "/api/automation/dispatch";
    pub const EVENTS: &str = "/api/events";
}

pub(crate) fn build_router() -> (Router<AppState>, Vec<String>) {
    let mut builder = RouterBuilder::new();
    builder
        .route_get(paths::HEALTHZ, api::meta::healthz)
        .route_get(paths::REGISTRY, api::registry::registry)
        .route_get(paths::REGISTRY_CONTENT, api::registry::registry_content)
        .route_get_post(
            paths::STATUS,
            api::status::status_get,
            api::status::status_set,
        )
        .route_post(paths::STATUS_CYCLE, api::status::status_cycle)
        .route_get_post(paths::MODE, api::mode::mode_get, api::mode::mode_set)
        .route_post(paths::ITEMS_DELETE, api::items::item_delete)
        .route_get(paths::EVENTS, api::events::events_sse);
    builder.route(
        "POST",
        paths::AUTOMATION_DISPATCH,
        post(api::automation::dispatch)
            .layer(DefaultBodyLimit::max(api::automation::MAX_BODY_BYTES)),
    );
    builder.build()
}
