use crate::config::RuntimeConfig;
use crate::context::{Handler, RoutingContext};
use crate::error::RouteError;
use crate::route::Route;
use crate::server::ServerRequest;
use arc_swap::ArcSwap;
use http::Method;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Observer invoked whenever the route collection changes.
pub type ModifiedHandler = Arc<dyn Fn(&Arc<Router>) + Send + Sync>;

/// Immutable router configuration; mutations clone-and-swap atomically so
/// concurrent dispatches never observe a torn route list.
pub(crate) struct RouterState {
    routes: Vec<Arc<Route>>,
    error_handlers: HashMap<u16, Handler>,
    modified_handler: Option<ModifiedHandler>,
}

impl RouterState {
    fn empty() -> Self {
        Self {
            routes: Vec::new(),
            error_handlers: HashMap::new(),
            modified_handler: None,
        }
    }
}

/// An ordered, mutable collection of routes that dispatches requests.
///
/// Requests walk the routes sorted by `(last flag, order, creation index)`;
/// each matching route's handler chain runs to completion before the next
/// candidate is considered. A router can itself be mounted on a route of a
/// parent router, forming nested routing trees.
///
/// Routers are created as `Arc<Router>` and are safe to share: registration
/// and mutation may race with in-flight dispatches on other threads, which
/// keep the snapshot they started with.
pub struct Router {
    state: ArcSwap<RouterState>,
    order_seq: AtomicI32,
    index_seq: AtomicU64,
    reroute_limit: usize,
}

impl Router {
    /// Create an empty router configured from the environment.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_config(RuntimeConfig::from_env())
    }

    /// Create an empty router with explicit runtime configuration.
    #[must_use]
    pub fn with_config(config: RuntimeConfig) -> Arc<Self> {
        Arc::new(Self {
            state: ArcSwap::from_pointee(RouterState::empty()),
            order_seq: AtomicI32::new(0),
            index_seq: AtomicU64::new(0),
            reroute_limit: config.reroute_limit,
        })
    }

    /// Dispatch a request. Returns the per-request context; with synchronous
    /// handlers the outcome is observable on it immediately, otherwise when
    /// the last handler continues or ends the response.
    pub fn handle(self: &Arc<Self>, request: ServerRequest) -> Arc<RoutingContext> {
        debug!(method = %request.method(), uri = %request.uri(), "Router accepting request");
        let ctx = RoutingContext::create(self.clone(), request);
        ctx.next();
        ctx
    }

    /// Register a route with no method or path constraint.
    pub fn route(self: &Arc<Self>) -> Arc<Route> {
        let index = self.index_seq.fetch_add(1, Ordering::Relaxed);
        let order = self.order_seq.fetch_add(1, Ordering::Relaxed);
        let route = Arc::new(Route::new(self, index, order));
        self.add(route.clone());
        route
    }

    /// Register a route for a method and path.
    pub fn route_with(self: &Arc<Self>, method: Method, path: &str) -> Result<Arc<Route>, RouteError> {
        let route = self.route_with_path(path)?;
        route.method(method);
        Ok(route)
    }

    /// Register a route for a path (any method).
    pub fn route_with_path(self: &Arc<Self>, path: &str) -> Result<Arc<Route>, RouteError> {
        let route = self.route();
        match route.path(path) {
            Ok(_) => Ok(route),
            Err(e) => {
                route.remove();
                Err(e)
            }
        }
    }

    /// Register a route whose path is a regular expression.
    pub fn route_with_regex(self: &Arc<Self>, regex: &str) -> Result<Arc<Route>, RouteError> {
        let route = self.route();
        match route.path_regex(regex) {
            Ok(_) => Ok(route),
            Err(e) => {
                route.remove();
                Err(e)
            }
        }
    }

    /// Register a GET route for a path.
    pub fn get(self: &Arc<Self>, path: &str) -> Result<Arc<Route>, RouteError> {
        self.route_with(Method::GET, path)
    }

    /// Register a POST route for a path.
    pub fn post(self: &Arc<Self>, path: &str) -> Result<Arc<Route>, RouteError> {
        self.route_with(Method::POST, path)
    }

    /// Register a PUT route for a path.
    pub fn put(self: &Arc<Self>, path: &str) -> Result<Arc<Route>, RouteError> {
        self.route_with(Method::PUT, path)
    }

    /// Register a DELETE route for a path.
    pub fn delete(self: &Arc<Self>, path: &str) -> Result<Arc<Route>, RouteError> {
        self.route_with(Method::DELETE, path)
    }

    /// Register a PATCH route for a path.
    pub fn patch(self: &Arc<Self>, path: &str) -> Result<Arc<Route>, RouteError> {
        self.route_with(Method::PATCH, path)
    }

    /// Register a HEAD route for a path.
    pub fn head(self: &Arc<Self>, path: &str) -> Result<Arc<Route>, RouteError> {
        self.route_with(Method::HEAD, path)
    }

    /// Register an OPTIONS route for a path.
    pub fn options(self: &Arc<Self>, path: &str) -> Result<Arc<Route>, RouteError> {
        self.route_with(Method::OPTIONS, path)
    }

    /// Mount a sub-router under a path prefix. Requests whose path starts
    /// with the prefix are offered to the sub-router with the prefix
    /// stripped; if it matches nothing, dispatch falls through to the routes
    /// after the mount point.
    pub fn mount_sub_router(
        self: &Arc<Self>,
        prefix: &str,
        sub: Arc<Router>,
    ) -> Result<Arc<Route>, RouteError> {
        if prefix.contains('*') {
            return Err(RouteError::WildcardInMountPoint);
        }
        let route = self.route_with_path(&format!("{prefix}*"))?;
        match route.sub_router(sub) {
            Ok(_) => {
                info!(mount_point = %prefix, "Sub-router mounted");
                Ok(route)
            }
            Err(e) => {
                route.remove();
                Err(e)
            }
        }
    }

    /// Install a handler consulted for a specific terminal status code
    /// (e.g. 404) before the built-in fallback response is written.
    pub fn error_handler<F>(self: &Arc<Self>, status: u16, handler: F) -> &Arc<Self>
    where
        F: Fn(Arc<RoutingContext>) + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(handler);
        self.state.rcu(|state| {
            let mut next = Self::clone_state(state);
            next.error_handlers.insert(status, handler.clone());
            next
        });
        self
    }

    /// Observe route collection changes (add, remove, clear). Handlers
    /// chain: installing a second one runs both.
    pub fn modified_handler(self: &Arc<Self>, handler: ModifiedHandler) -> &Arc<Self> {
        self.state.rcu(|state| {
            let mut next = Self::clone_state(state);
            next.modified_handler = Some(match next.modified_handler.take() {
                None => handler.clone(),
                Some(previous) => {
                    let added = handler.clone();
                    Arc::new(move |router: &Arc<Router>| {
                        (*previous)(router);
                        (*added)(router);
                    })
                }
            });
            next
        });
        self
    }

    /// Remove every route. In-flight dispatches keep their candidate list.
    pub fn clear(self: &Arc<Self>) -> &Arc<Self> {
        self.state.rcu(|state| {
            let mut next = Self::clone_state(state);
            next.routes.clear();
            next
        });
        info!("Router cleared");
        self.notify_modified();
        self
    }

    /// Current routes in registration order.
    #[must_use]
    pub fn routes(&self) -> Vec<Arc<Route>> {
        self.state.load().routes.clone()
    }

    /// Log every registered route, for startup diagnostics.
    pub fn dump_routes(&self) {
        let state = self.state.load();
        info!(routes_count = state.routes.len(), "Routing table");
        for route in &state.routes {
            info!(route = %route.describe(), "Registered route");
        }
    }

    /// The candidate list for one dispatch: non-removed routes sorted by
    /// `(last flag, order, creation index)`. Sorting keys are read once, so
    /// later order mutations only affect later dispatches.
    pub(crate) fn snapshot(&self) -> Vec<Arc<Route>> {
        let state = self.state.load();
        let mut keyed: Vec<(bool, i32, u64, Arc<Route>)> = state
            .routes
            .iter()
            .map(|route| {
                let s = route.state();
                (s.last, s.order, route.index(), route.clone())
            })
            .collect();
        keyed.sort_by(|a, b| (a.0, a.1, a.2).cmp(&(b.0, b.1, b.2)));
        keyed.into_iter().map(|(_, _, _, route)| route).collect()
    }

    pub(crate) fn error_handler_for(&self, status: u16) -> Option<Handler> {
        self.state.load().error_handlers.get(&status).cloned()
    }

    pub(crate) fn reroute_limit(&self) -> usize {
        self.reroute_limit
    }

    fn add(self: &Arc<Self>, route: Arc<Route>) {
        self.state.rcu(|state| {
            let mut next = Self::clone_state(state);
            next.routes.push(route.clone());
            next
        });
        debug!(route = %route.describe(), "Route registered");
        self.notify_modified();
    }

    /// Drop a removed route from the collection.
    pub(crate) fn forget(self: &Arc<Self>, index: u64) {
        self.state.rcu(|state| {
            let mut next = Self::clone_state(state);
            next.routes.retain(|r| r.index() != index);
            next
        });
        self.notify_modified();
    }

    fn clone_state(state: &Arc<RouterState>) -> RouterState {
        RouterState {
            routes: state.routes.clone(),
            error_handlers: state.error_handlers.clone(),
            modified_handler: state.modified_handler.clone(),
        }
    }

    fn notify_modified(self: &Arc<Self>) {
        if let Some(handler) = self.state.load().modified_handler.clone() {
            (*handler)(self);
        }
    }
}
