use crate::context::Handler;
use crate::error::RouteError;
use crate::mime::{select_produced, MediaTypePattern};
use crate::path::{ParamVec, PathPattern};
use crate::router::Router;
use arc_swap::ArcSwap;
use http::Method;
use std::sync::{Arc, Weak};
use tracing::{debug, info};

/// What occupies a slot in a route's handler chain: either user code or a
/// mounted sub-router the dispatch loop descends into.
#[derive(Clone)]
pub(crate) enum RouteHandler {
    User(Handler),
    Mounted(Arc<Router>),
}

/// Everything a dispatch needs to know about a route, frozen in one
/// allocation. Builder mutations clone-and-swap the whole state, so an
/// in-flight request keeps reading the state it picked up and a new request
/// sees the mutation atomically.
#[derive(Clone)]
pub(crate) struct RouteState {
    pub(crate) order: i32,
    pub(crate) last: bool,
    pub(crate) enabled: bool,
    pub(crate) removed: bool,
    pub(crate) methods: Vec<Method>,
    pub(crate) path: PathPattern,
    pub(crate) consumes: Vec<MediaTypePattern>,
    pub(crate) produces: Vec<MediaTypePattern>,
    pub(crate) empty_body_permitted: bool,
    pub(crate) handlers: Vec<RouteHandler>,
    pub(crate) failure_handlers: Vec<Handler>,
}

impl RouteState {
    fn new(order: i32) -> Self {
        Self {
            order,
            last: false,
            enabled: true,
            removed: false,
            methods: Vec::new(),
            path: PathPattern::Any,
            consumes: Vec::new(),
            produces: Vec::new(),
            empty_body_permitted: false,
            handlers: Vec::new(),
            failure_handlers: Vec::new(),
        }
    }

    /// The sub-router occupying this route, if any.
    pub(crate) fn mounted(&self) -> Option<&Arc<Router>> {
        self.handlers.iter().find_map(|h| match h {
            RouteHandler::Mounted(r) => Some(r),
            RouteHandler::User(_) => None,
        })
    }

    fn is_exclusive(&self) -> bool {
        self.mounted().is_some()
    }

    /// Match this route against a request. `Ok` carries the extracted
    /// parameters and (when `produces` applies) the negotiated content type;
    /// `Err` distinguishes a plain miss from a partial match that pins a
    /// more specific status code.
    pub(crate) fn matches(
        &self,
        input: &MatchInput<'_>,
        failing: bool,
    ) -> Result<RouteMatch, MatchFailure> {
        // a route with nothing to run for this mode is invisible
        let usable = if failing {
            !self.failure_handlers.is_empty() || self.mounted().is_some()
        } else {
            !self.handlers.is_empty()
        };
        if !usable || !self.enabled || self.removed {
            return Err(MatchFailure::NotFound);
        }

        let path_match = self.path.matches(input.path).ok_or(MatchFailure::NotFound)?;

        if !self.methods.is_empty() && !self.methods.contains(input.method) {
            // path matched, method did not
            return Err(MatchFailure::MethodNotAllowed);
        }

        if !self.consumes.is_empty() {
            match input.content_type.filter(|ct| !ct.is_empty()) {
                Some(ct) => {
                    if !self.consumes.iter().any(|p| p.matches(ct)) {
                        return Err(MatchFailure::UnsupportedMediaType);
                    }
                }
                None if self.empty_body_permitted => {}
                None if input.has_body => return Err(MatchFailure::BadRequest),
                None => return Err(MatchFailure::NotFound),
            }
        }

        let mut acceptable = None;
        if !self.produces.is_empty() && !input.accept.is_empty() {
            match select_produced(&self.produces, input.accept) {
                Some(selected) => acceptable = Some(selected),
                None => return Err(MatchFailure::NotAcceptable),
            }
        }

        Ok(RouteMatch {
            params: path_match.params,
            consumed: path_match.consumed,
            acceptable,
        })
    }
}

/// Request facts a route match is evaluated against.
pub(crate) struct MatchInput<'a> {
    pub method: &'a Method,
    /// Normalized path with any mount prefix already stripped
    pub path: &'a str,
    pub content_type: Option<&'a str>,
    pub has_body: bool,
    /// Accept entries, quality-sorted most-preferred first
    pub accept: &'a [String],
}

/// Successful match: parameters, consumed prefix, negotiated content type.
pub(crate) struct RouteMatch {
    pub params: ParamVec,
    pub consumed: usize,
    pub acceptable: Option<String>,
}

/// Why a route did not match. Everything except `NotFound` is a partial
/// match and upgrades the status the no-match fallback will answer with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MatchFailure {
    NotFound,
    MethodNotAllowed,
    BadRequest,
    UnsupportedMediaType,
    NotAcceptable,
}

impl MatchFailure {
    /// The status a partial match pins; `None` for a plain miss.
    pub(crate) fn status(self) -> Option<http::StatusCode> {
        match self {
            MatchFailure::NotFound => None,
            MatchFailure::MethodNotAllowed => Some(http::StatusCode::METHOD_NOT_ALLOWED),
            MatchFailure::BadRequest => Some(http::StatusCode::BAD_REQUEST),
            MatchFailure::UnsupportedMediaType => Some(http::StatusCode::UNSUPPORTED_MEDIA_TYPE),
            MatchFailure::NotAcceptable => Some(http::StatusCode::NOT_ACCEPTABLE),
        }
    }
}

/// One registered rule: a method set, a path form, content-type constraints,
/// and ordered handler and failure-handler chains.
///
/// Routes are created through a [`Router`]'s registration methods and
/// configured fluently. Mutations apply copy-on-write: dispatches already
/// holding a candidate list are unaffected, the next request observes the
/// new state.
pub struct Route {
    index: u64,
    router: Weak<Router>,
    state: ArcSwap<RouteState>,
}

impl Route {
    pub(crate) fn new(router: &Arc<Router>, index: u64, order: i32) -> Self {
        Self {
            index,
            router: Arc::downgrade(router),
            state: ArcSwap::from_pointee(RouteState::new(order)),
        }
    }

    /// Creation index; unique per router, used as the ordering tie-break.
    #[must_use]
    pub fn index(&self) -> u64 {
        self.index
    }

    pub(crate) fn state(&self) -> Arc<RouteState> {
        self.state.load_full()
    }

    fn update(&self, f: impl Fn(&mut RouteState)) {
        self.state.rcu(|state| {
            let mut next = (**state).clone();
            f(&mut next);
            next
        });
    }

    /// Add an HTTP method to the route's method set. An empty set matches
    /// any method.
    pub fn method(&self, method: Method) -> &Self {
        self.update(|s| {
            if !s.methods.contains(&method) {
                s.methods.push(method.clone());
            }
        });
        self
    }

    /// Set the route path: literal, `:param` segments, or a trailing `*`
    /// wildcard.
    pub fn path(&self, path: &str) -> Result<&Self, RouteError> {
        let pattern = PathPattern::parse(path)?;
        self.update(|s| s.path = pattern.clone());
        Ok(self)
    }

    /// Set the route path from a regular expression matched against the full
    /// remaining path.
    pub fn path_regex(&self, regex: &str) -> Result<&Self, RouteError> {
        let pattern = PathPattern::from_regex(regex)?;
        self.update(|s| s.path = pattern.clone());
        Ok(self)
    }

    /// Add a Content-Type pattern this route consumes.
    pub fn consumes(&self, content_type: &str) -> &Self {
        let pattern = MediaTypePattern::parse(content_type);
        self.update(|s| s.consumes.push(pattern.clone()));
        self
    }

    /// Add a content-type pattern this route produces.
    pub fn produces(&self, content_type: &str) -> &Self {
        let pattern = MediaTypePattern::parse(content_type);
        self.update(|s| s.produces.push(pattern.clone()));
        self
    }

    /// Accept requests with no Content-Type even when `consumes` is set.
    pub fn empty_body_permitted_with_consumes(&self, permitted: bool) -> &Self {
        self.update(|s| s.empty_body_permitted = permitted);
        self
    }

    /// Override the evaluation order (default: registration sequence).
    /// Affects dispatches started after the call.
    pub fn order(&self, order: i32) -> &Self {
        self.update(|s| s.order = order);
        self
    }

    /// Evaluate this route after every route not marked last, regardless of
    /// numeric order.
    pub fn last(&self) -> &Self {
        self.update(|s| s.last = true);
        self
    }

    /// Re-enable a disabled route. No effect on a removed route. Idempotent.
    pub fn enable(&self) -> &Self {
        self.update(|s| {
            if !s.removed {
                s.enabled = true;
            }
        });
        self
    }

    /// Skip this route during matching while keeping it registered.
    /// Idempotent.
    pub fn disable(&self) -> &Self {
        self.update(|s| s.enabled = false);
        self
    }

    /// Whether the route currently participates in matching.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        let s = self.state.load();
        s.enabled && !s.removed
    }

    /// Permanently exclude this route. `enable()` cannot restore it.
    /// In-flight dispatches that already took their candidate list finish
    /// undisturbed. Idempotent.
    pub fn remove(&self) {
        let already = self.state.load().removed;
        self.update(|s| {
            s.removed = true;
            s.enabled = false;
        });
        if already {
            return;
        }
        info!(route = %self.describe(), "Route removed");
        if let Some(router) = self.router.upgrade() {
            router.forget(self.index);
        }
    }

    /// Whether `remove()` has been called.
    #[must_use]
    pub fn is_removed(&self) -> bool {
        self.state.load().removed
    }

    /// Append a handler to the route's chain. Handlers of one route run in
    /// registration order; each signals completion via the context.
    pub fn handler<F>(&self, handler: F) -> Result<&Self, RouteError>
    where
        F: Fn(Arc<crate::context::RoutingContext>) + Send + Sync + 'static,
    {
        if self.state.load().is_exclusive() {
            return Err(RouteError::ExclusiveRoute);
        }
        let handler: Handler = Arc::new(handler);
        self.update(|s| s.handlers.push(RouteHandler::User(handler.clone())));
        debug!(route = %self.describe(), "Handler appended");
        Ok(self)
    }

    /// Append a failure handler, run while the context is failing.
    pub fn failure_handler<F>(&self, handler: F) -> Result<&Self, RouteError>
    where
        F: Fn(Arc<crate::context::RoutingContext>) + Send + Sync + 'static,
    {
        if self.state.load().is_exclusive() {
            return Err(RouteError::ExclusiveRoute);
        }
        let handler: Handler = Arc::new(handler);
        self.update(|s| s.failure_handlers.push(handler.clone()));
        Ok(self)
    }

    /// Install a sub-router as this route's sole handler. The route's path
    /// must be a literal or prefix; the matched prefix is stripped from the
    /// path the sub-router matches against.
    pub fn sub_router(&self, sub: Arc<Router>) -> Result<&Self, RouteError> {
        let state = self.state.load();
        if !state.path.mountable() {
            return Err(RouteError::InvalidMountRoute);
        }
        if !state.handlers.is_empty() || !state.failure_handlers.is_empty() {
            return Err(RouteError::ExclusiveRoute);
        }
        self.update(|s| s.handlers = vec![RouteHandler::Mounted(sub.clone())]);
        info!(route = %self.describe(), "Sub-router mounted");
        Ok(self)
    }

    /// Human-readable route summary for logs and listings.
    #[must_use]
    pub fn describe(&self) -> String {
        let s = self.state.load();
        let methods = if s.methods.is_empty() {
            "*".to_string()
        } else {
            s.methods
                .iter()
                .map(Method::as_str)
                .collect::<Vec<_>>()
                .join(",")
        };
        format!("{} {}", methods, s.path.describe())
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = self.state.load();
        f.debug_struct("Route")
            .field("index", &self.index)
            .field("order", &s.order)
            .field("last", &s.last)
            .field("enabled", &s.enabled)
            .field("removed", &s.removed)
            .field("path", &s.path.describe())
            .field("handlers", &s.handlers.len())
            .field("failure_handlers", &s.failure_handlers.len())
            .finish()
    }
}
