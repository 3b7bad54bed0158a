use crate::error::HttpError;
use crate::mime::parse_accept;
use crate::path::normalize_path;
use crate::route::{MatchFailure, MatchInput, Route, RouteHandler, RouteState};
use crate::router::Router;
use crate::server::{parse_query_params, ServerRequest, ServerResponse};
use http::{Method, StatusCode};
use parking_lot::{Mutex, MutexGuard};
use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// A handler in a route's chain. Completion is signalled exclusively through
/// the context: `next()`, `fail()`, or ending the response.
pub type Handler = Arc<dyn Fn(Arc<RoutingContext>) + Send + Sync>;

const DEFAULT_404_BODY: &str = "<html><body><h1>Resource not found</h1></body></html>";

/// One level of the routing tree being walked for this request. The root
/// frame is the router the request entered through; descending into a
/// mounted sub-router pushes a frame, exhausting one pops back to the
/// parent's cursor.
struct Frame {
    routes: Vec<Arc<Route>>,
    cursor: usize,
    mount_point: Option<String>,
    /// Normalized request path with this frame's mount prefix stripped
    local_path: String,
}

/// The matched route whose chain is currently executing.
struct Current {
    state: Arc<RouteState>,
    next_handler: usize,
    next_failure: usize,
}

struct DispatchState {
    frames: Vec<Frame>,
    current: Option<Current>,
    /// Most specific status recorded by partial matches; the no-match
    /// fallback answers with this (404 unless upgraded)
    match_status: StatusCode,
    /// Methods of routes that path-matched but method-missed, for `Allow`
    allowed: Vec<Method>,
    reroutes: usize,
    /// A terminal responder has run; further signals are ignored
    done: bool,
}

enum Action {
    Invoke(Handler, bool),
    NoMatch,
    Unhandled,
    Idle,
}

/// Per-request state threaded through the handler chain.
///
/// Created once per inbound request (and reset by [`reroute`]), shared with
/// handlers as `Arc<RoutingContext>`, discarded when the response ends or
/// the connection closes. Never pooled or reused across requests.
///
/// The dispatch loop is a resumable state machine: `next()` and `fail()` may
/// be called synchronously from inside a handler or later from another
/// thread after asynchronous work completes; continuation never grows the
/// call stack.
///
/// [`reroute`]: RoutingContext::reroute
pub struct RoutingContext {
    router: Arc<Router>,
    request: Mutex<ServerRequest>,
    response: Mutex<ServerResponse>,
    dispatch: Mutex<DispatchState>,
    data: Mutex<HashMap<String, Box<dyn Any + Send + Sync>>>,
    path_params: Mutex<HashMap<String, String>>,
    query_params: Mutex<Option<HashMap<String, Vec<String>>>>,
    current_route: Mutex<Option<Arc<Route>>>,
    normalized: Mutex<Option<String>>,
    accept: Mutex<Option<Vec<String>>>,
    acceptable_content_type: Mutex<Option<String>>,
    failure: Mutex<Option<Arc<HttpError>>>,
    /// -1 = not failing; otherwise the failure status code
    status_code: AtomicI32,
    /// Outstanding continuation signals; the thread that raises it from zero
    /// drives the loop until it drains
    pending: AtomicUsize,
    cancelled: AtomicBool,
}

impl RoutingContext {
    pub(crate) fn create(router: Arc<Router>, request: ServerRequest) -> Arc<Self> {
        let normalized = normalize_path(request.path());
        let local_path = normalized.clone().unwrap_or_default();
        let root = Frame {
            routes: router.snapshot(),
            cursor: 0,
            mount_point: None,
            local_path,
        };
        let ctx = Arc::new(Self {
            router,
            request: Mutex::new(request),
            response: Mutex::new(ServerResponse::new()),
            dispatch: Mutex::new(DispatchState {
                frames: vec![root],
                current: None,
                match_status: StatusCode::NOT_FOUND,
                allowed: Vec::new(),
                reroutes: 0,
                done: false,
            }),
            data: Mutex::new(HashMap::new()),
            path_params: Mutex::new(HashMap::new()),
            query_params: Mutex::new(None),
            current_route: Mutex::new(None),
            normalized: Mutex::new(normalized.clone()),
            accept: Mutex::new(None),
            acceptable_content_type: Mutex::new(None),
            failure: Mutex::new(None),
            status_code: AtomicI32::new(-1),
            pending: AtomicUsize::new(0),
            cancelled: AtomicBool::new(false),
        });
        if normalized.is_none() {
            warn!(path = %ctx.path(), "Invalid request path");
            ctx.status_code
                .store(i32::from(StatusCode::BAD_REQUEST.as_u16()), Ordering::SeqCst);
        }
        ctx
    }

    // ---- request side ----------------------------------------------------

    /// Effective HTTP method (reflects reroutes).
    #[must_use]
    pub fn method(&self) -> Method {
        self.request.lock().method().clone()
    }

    /// Request path as received. Under a mounted sub-router this is still
    /// the full path; only matching sees the stripped one.
    #[must_use]
    pub fn path(&self) -> String {
        self.request.lock().path().to_string()
    }

    /// Full request URI including the query string.
    #[must_use]
    pub fn uri(&self) -> String {
        self.request.lock().uri().to_string()
    }

    /// Normalized request path, `None` when the raw path was invalid.
    #[must_use]
    pub fn normalized_path(&self) -> Option<String> {
        self.normalized.lock().clone()
    }

    /// Request header by name, case-insensitive.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<String> {
        self.request.lock().header(name).map(str::to_string)
    }

    /// Request body bytes, when available.
    #[must_use]
    pub fn body(&self) -> Option<Vec<u8>> {
        self.request.lock().body().map(<[u8]>::to_vec)
    }

    /// Request body parsed as JSON.
    #[must_use]
    pub fn body_json(&self) -> Option<serde_json::Value> {
        self.body()
            .and_then(|b| serde_json::from_slice(&b).ok())
    }

    /// Cookies parsed from the request.
    #[must_use]
    pub fn cookies(&self) -> HashMap<String, String> {
        self.request.lock().cookies()
    }

    /// Query parameters, parsed lazily from the request URI.
    #[must_use]
    pub fn query_params(&self) -> HashMap<String, Vec<String>> {
        let mut cached = self.query_params.lock();
        if cached.is_none() {
            let uri = self.uri();
            *cached = Some(parse_query_params(&uri));
        }
        cached.clone().unwrap_or_default()
    }

    /// First value of a query parameter.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.query_params()
            .get(name)
            .and_then(|v| v.first())
            .cloned()
    }

    /// Path parameters bound by matched routes so far. A sub-router rebinds
    /// at each level; a later binding overwrites an earlier one of the same
    /// name.
    #[must_use]
    pub fn path_params(&self) -> HashMap<String, String> {
        self.path_params.lock().clone()
    }

    /// One path parameter by name.
    #[must_use]
    pub fn path_param(&self, name: &str) -> Option<String> {
        self.path_params.lock().get(name).cloned()
    }

    // ---- response side ---------------------------------------------------

    /// The response being built. Release the guard before calling `next()`
    /// or `fail()`: the dispatch loop takes this lock for fallback
    /// responses.
    #[must_use]
    pub fn response(&self) -> MutexGuard<'_, ServerResponse> {
        self.response.lock()
    }

    /// End the response with no further body.
    pub fn end(&self) {
        self.response.lock().end();
    }

    /// Write a final chunk and end the response.
    pub fn end_with(&self, chunk: impl AsRef<[u8]>) {
        self.response.lock().end_with(chunk);
    }

    // ---- inter-handler data ----------------------------------------------

    /// Store a value for handlers later in the chain.
    pub fn put<T: Any + Send + Sync>(&self, key: &str, value: T) -> &Self {
        self.data.lock().insert(key.to_string(), Box::new(value));
        self
    }

    /// Fetch a copy of a stored value.
    #[must_use]
    pub fn get<T: Any + Send + Sync + Clone>(&self, key: &str) -> Option<T> {
        self.data
            .lock()
            .get(key)
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
    }

    /// Remove and return a stored value.
    pub fn remove<T: Any + Send + Sync>(&self, key: &str) -> Option<T> {
        self.data
            .lock()
            .remove(key)
            .and_then(|v| v.downcast::<T>().ok())
            .map(|b| *b)
    }

    // ---- routing state ---------------------------------------------------

    /// The route whose chain is currently executing.
    #[must_use]
    pub fn current_route(&self) -> Option<Arc<Route>> {
        self.current_route.lock().clone()
    }

    /// Mount prefix of the router level currently being walked; `None` at
    /// the root.
    #[must_use]
    pub fn mount_point(&self) -> Option<String> {
        self.dispatch
            .lock()
            .frames
            .last()
            .and_then(|f| f.mount_point.clone())
    }

    /// Content type selected by `produces` negotiation for the matched
    /// route, if any.
    #[must_use]
    pub fn acceptable_content_type(&self) -> Option<String> {
        self.acceptable_content_type.lock().clone()
    }

    /// Whether the context is failing (a failure episode is active).
    #[must_use]
    pub fn failed(&self) -> bool {
        self.status_code.load(Ordering::SeqCst) != -1 || self.failure.lock().is_some()
    }

    /// Failure payload of the active episode, if one was supplied.
    #[must_use]
    pub fn failure(&self) -> Option<Arc<HttpError>> {
        self.failure.lock().clone()
    }

    /// Status code recorded for the active failure episode.
    #[must_use]
    pub fn status_code(&self) -> Option<StatusCode> {
        let code = self.status_code.load(Ordering::SeqCst);
        if code < 0 {
            return None;
        }
        StatusCode::from_u16(code as u16).ok()
    }

    // ---- continuation ----------------------------------------------------

    /// Continue the chain: run the current route's next handler, or move the
    /// cursor to the next matching candidate. Falls through to the default
    /// not-found outcome when candidates are exhausted. Safe to call from
    /// any thread, including from a later execution turn than the handler
    /// invocation.
    pub fn next(self: &Arc<Self>) {
        self.signal();
    }

    /// Fail the request with a status code and switch to the failure chain.
    pub fn fail(self: &Arc<Self>, status: u16) {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        self.fail_with(HttpError::new(status));
    }

    /// Fail the request with a payload. The failure-handler traversal starts
    /// at the currently matched route; failing again while already failing
    /// replaces the payload and restarts that traversal.
    pub fn fail_with(self: &Arc<Self>, err: HttpError) {
        let status = err.status;
        debug!(status = status.as_u16(), "Context failed");
        let terminal = {
            let mut d = self.dispatch.lock();
            *self.failure.lock() = Some(Arc::new(err));
            self.status_code
                .store(i32::from(status.as_u16()), Ordering::SeqCst);
            if let Some(cur) = d.current.as_mut() {
                cur.next_failure = 0;
            }
            d.done
        };
        if terminal {
            // the dispatch already answered; don't re-walk the chain
            self.write_default_failure();
            return;
        }
        self.signal();
    }

    /// Restart matching on the same context with a new path, preserving the
    /// data bag. Bounded; exceeding the limit ends the request with a 500.
    pub fn reroute(self: &Arc<Self>, path: &str) {
        let method = self.method();
        self.reroute_with_method(method, path);
    }

    /// Restart matching with a new method and path.
    pub fn reroute_with_method(self: &Arc<Self>, method: Method, path: &str) {
        let limit = self.router.reroute_limit();
        {
            let mut d = self.dispatch.lock();
            d.reroutes += 1;
            if d.reroutes > limit {
                d.done = true;
                drop(d);
                warn!(limit, "Reroute limit exceeded");
                *self.failure.lock() =
                    Some(Arc::new(HttpError::internal("too many reroutes")));
                self.status_code.store(500, Ordering::SeqCst);
                self.write_default_failure();
                return;
            }
        }
        if !path.starts_with('/') {
            self.fail(400);
            return;
        }
        info!(method = %method, path = %path, "Rerouting request");

        self.request.lock().redirect_to(method, path);
        let normalized = normalize_path(path);
        let local_path = normalized.clone().unwrap_or_default();
        *self.normalized.lock() = normalized.clone();
        self.status_code.store(-1, Ordering::SeqCst);
        *self.failure.lock() = None;
        *self.acceptable_content_type.lock() = None;
        *self.query_params.lock() = None;
        *self.current_route.lock() = None;
        self.response.lock().clear_headers();
        {
            let mut d = self.dispatch.lock();
            d.current = None;
            d.match_status = StatusCode::NOT_FOUND;
            d.allowed.clear();
            d.done = false;
            d.frames = vec![Frame {
                routes: self.router.snapshot(),
                cursor: 0,
                mount_point: None,
                local_path,
            }];
        }
        if normalized.is_none() {
            self.status_code
                .store(i32::from(StatusCode::BAD_REQUEST.as_u16()), Ordering::SeqCst);
        }
        self.signal();
    }

    /// Observe connection loss: no handler is invoked after this, and the
    /// response is marked closed.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.response.lock().close();
        info!("Dispatch cancelled");
    }

    // ---- the drive loop --------------------------------------------------

    fn signal(self: &Arc<Self>) {
        if self.pending.fetch_add(1, Ordering::AcqRel) != 0 {
            // an active drive loop will pick this signal up
            return;
        }
        loop {
            self.advance();
            if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
                break;
            }
        }
    }

    /// One step of the state machine: invoke at most one handler, or produce
    /// a terminal response.
    fn advance(self: &Arc<Self>) {
        if self.cancelled.load(Ordering::SeqCst) {
            debug!("Skipping handler invocation after cancellation");
            return;
        }
        match self.next_action() {
            Action::Invoke(handler, failing) => {
                let ctx = Arc::clone(self);
                if let Err(panic) = catch_unwind(AssertUnwindSafe(move || (*handler)(ctx))) {
                    let message = panic_message(&*panic);
                    error!(panic_message = %message, failing, "Handler panicked");
                    if failing {
                        // failure while handling a failure: give up on the chain
                        self.finish_unhandled();
                    } else {
                        self.fail_with(HttpError::internal(format!(
                            "handler panicked: {message}"
                        )));
                    }
                }
            }
            Action::NoMatch => self.finish_no_match(),
            Action::Unhandled => self.finish_unhandled(),
            Action::Idle => {}
        }
    }

    fn next_action(self: &Arc<Self>) -> Action {
        let failing = self.failed();
        let mut d = self.dispatch.lock();
        if d.done {
            return Action::Idle;
        }

        // finish the matched route's chain before moving the cursor
        if let Some(cur) = d.current.as_mut() {
            if !failing && cur.next_handler < cur.state.handlers.len() {
                let idx = cur.next_handler;
                cur.next_handler += 1;
                if let RouteHandler::User(h) = &cur.state.handlers[idx] {
                    return Action::Invoke(h.clone(), false);
                }
                d.current = None;
            } else if failing && cur.next_failure < cur.state.failure_handlers.len() {
                let idx = cur.next_failure;
                cur.next_failure += 1;
                return Action::Invoke(cur.state.failure_handlers[idx].clone(), true);
            } else {
                d.current = None;
            }
        }

        // request facts for matching, gathered once per scan
        let (method, content_type, has_body) = {
            let req = self.request.lock();
            (
                req.method().clone(),
                req.header("content-type").map(str::to_string),
                req.has_body(),
            )
        };
        let accept = self.accept_entries();

        loop {
            let Some(frame) = d.frames.last() else {
                d.done = true;
                return if failing { Action::Unhandled } else { Action::NoMatch };
            };
            if frame.cursor >= frame.routes.len() {
                if d.frames.len() > 1 {
                    // mount exhausted: fall through past the mount point
                    d.frames.pop();
                    debug!("Sub-router exhausted, returning to parent");
                    continue;
                }
                d.done = true;
                return if failing { Action::Unhandled } else { Action::NoMatch };
            }

            let fi = d.frames.len() - 1;
            let cursor = d.frames[fi].cursor;
            d.frames[fi].cursor += 1;
            let route = d.frames[fi].routes[cursor].clone();
            let local_path = d.frames[fi].local_path.clone();
            let state = route.state();

            let input = MatchInput {
                method: &method,
                path: &local_path,
                content_type: content_type.as_deref(),
                has_body,
                accept: &accept,
            };
            match state.matches(&input, failing) {
                Ok(m) => {
                    // a full match clears any partial-match status
                    d.match_status = StatusCode::NOT_FOUND;
                    {
                        let mut params = self.path_params.lock();
                        for (name, value) in &m.params {
                            params.insert(name.to_string(), value.clone());
                        }
                    }
                    if let Some(selected) = m.acceptable {
                        *self.acceptable_content_type.lock() = Some(selected);
                    }
                    debug!(route = %route.describe(), path = %local_path, failing, "Route matched");

                    if let Some(sub) = state.mounted() {
                        let consumed = m.consumed.min(local_path.len());
                        let matched_prefix = &local_path[..consumed];
                        let mount_point = match &d.frames[fi].mount_point {
                            Some(parent) => format!("{parent}{matched_prefix}"),
                            None => matched_prefix.to_string(),
                        };
                        let rest = &local_path[consumed..];
                        let child_local = if rest.is_empty() {
                            "/".to_string()
                        } else {
                            rest.to_string()
                        };
                        debug!(mount_point = %mount_point, local_path = %child_local, "Descending into sub-router");
                        d.frames.push(Frame {
                            routes: sub.snapshot(),
                            cursor: 0,
                            mount_point: Some(mount_point),
                            local_path: child_local,
                        });
                        d.current = None;
                        continue;
                    }

                    *self.current_route.lock() = Some(route);
                    if failing {
                        d.current = Some(Current {
                            state: state.clone(),
                            next_handler: 0,
                            next_failure: 1,
                        });
                        return Action::Invoke(state.failure_handlers[0].clone(), true);
                    }
                    d.current = Some(Current {
                        state: state.clone(),
                        next_handler: 1,
                        next_failure: 0,
                    });
                    if let RouteHandler::User(h) = &state.handlers[0] {
                        return Action::Invoke(h.clone(), false);
                    }
                    // mounted() covered the sub-router case above
                    d.current = None;
                }
                Err(partial) => {
                    if partial == MatchFailure::MethodNotAllowed {
                        for m in &state.methods {
                            if !d.allowed.contains(m) {
                                d.allowed.push(m.clone());
                            }
                        }
                    }
                    if let Some(status) = partial.status() {
                        d.match_status = status;
                    }
                }
            }
        }
    }

    fn accept_entries(&self) -> Vec<String> {
        let mut cached = self.accept.lock();
        if cached.is_none() {
            let header = self.request.lock().header("accept").map(str::to_string);
            *cached = Some(header.map(|h| parse_accept(&h)).unwrap_or_default());
        }
        cached.clone().unwrap_or_default()
    }

    // ---- terminal outcomes -----------------------------------------------

    /// Candidates exhausted in normal mode: the default not-found outcome.
    fn finish_no_match(self: &Arc<Self>) {
        let (status, allowed) = {
            let d = self.dispatch.lock();
            (d.match_status, d.allowed.clone())
        };
        self.status_code
            .store(i32::from(status.as_u16()), Ordering::SeqCst);
        warn!(
            method = %self.method(),
            path = %self.path(),
            status = status.as_u16(),
            "No route matched"
        );

        if let Some(handler) = self.router.error_handler_for(status.as_u16()) {
            let ctx = Arc::clone(self);
            if catch_unwind(AssertUnwindSafe(move || (*handler)(ctx))).is_err() {
                error!("Error handler panicked");
            }
            return;
        }

        let method = self.method();
        let mut res = self.response.lock();
        if res.ended() || res.closed() {
            return;
        }
        res.set_status(status);
        if status == StatusCode::NOT_FOUND && method != Method::HEAD {
            res.put_header("content-type", "text/html; charset=utf-8");
            res.end_with(DEFAULT_404_BODY);
        } else if status == StatusCode::METHOD_NOT_ALLOWED && !allowed.is_empty() {
            let allow = allowed
                .iter()
                .map(Method::as_str)
                .collect::<Vec<_>>()
                .join(",");
            res.put_header("allow", allow);
            res.end();
        } else {
            res.end();
        }
    }

    /// Candidates exhausted in failing mode (or failure handling itself
    /// failed): the default failure responder.
    fn finish_unhandled(self: &Arc<Self>) {
        self.dispatch.lock().done = true;
        let status = self.failure_status();
        error!(
            method = %self.method(),
            path = %self.path(),
            status = status.as_u16(),
            failure = %self
                .failure()
                .map(|f| f.to_string())
                .unwrap_or_else(|| "none".to_string()),
            "Unhandled failure"
        );
        // TODO: consult the innermost mounted router's error handlers before
        // falling back to the root router's
        if let Some(handler) = self.router.error_handler_for(status.as_u16()) {
            let ctx = Arc::clone(self);
            if catch_unwind(AssertUnwindSafe(move || (*handler)(ctx))).is_err() {
                error!("Error handler panicked");
            }
        }
        self.write_default_failure();
    }

    fn write_default_failure(&self) {
        let status = self.failure_status();
        let mut res = self.response.lock();
        if res.ended() || res.closed() {
            return;
        }
        res.set_status(status);
        res.end_with(status.canonical_reason().unwrap_or("Internal Server Error"));
    }

    fn failure_status(&self) -> StatusCode {
        self.status_code()
            .or_else(|| self.failure().map(|f| f.status))
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl std::fmt::Debug for RoutingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingContext")
            .field("method", &self.method())
            .field("path", &self.path())
            .field("failed", &self.failed())
            .field("cancelled", &self.cancelled.load(Ordering::SeqCst))
            .finish()
    }
}
