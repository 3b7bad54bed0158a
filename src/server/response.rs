use super::request::HeaderVec;
use http::StatusCode;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Hook invoked exactly once when the response ends.
pub type EndHook = Box<dyn FnOnce(&ServerResponse) + Send>;

/// The outbound half of an HTTP exchange.
///
/// Handlers (or the default fallback responders) write status, headers and
/// body here; a host adapter drains it. The router itself only ever asks two
/// questions of a response: has it ended, and is the connection still open.
pub struct ServerResponse {
    status: StatusCode,
    headers: HeaderVec,
    body: Vec<u8>,
    ended: bool,
    closed: bool,
    end_hook: Option<EndHook>,
}

impl Default for ServerResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerResponse {
    /// Fresh 200 response with no headers or body.
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderVec::new(),
            body: Vec::new(),
            ended: false,
            closed: false,
            end_hook: None,
        }
    }

    /// Current status code.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Set the status code. Ignored once the response has ended.
    pub fn set_status(&mut self, status: StatusCode) -> &mut Self {
        if !self.ended {
            self.status = status;
        }
        self
    }

    /// Set or replace a header (case-insensitive name match).
    pub fn put_header(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        if self.ended {
            return self;
        }
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers
            .push((Arc::from(name.to_ascii_lowercase().as_str()), value.into()));
        self
    }

    /// Look up a header by name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All headers set so far.
    #[must_use]
    pub fn headers(&self) -> &HeaderVec {
        &self.headers
    }

    /// Drop all headers. Used by reroute before matching restarts.
    pub(crate) fn clear_headers(&mut self) {
        self.headers.clear();
    }

    /// Append body bytes. A write after `end()` is dropped.
    pub fn write(&mut self, chunk: impl AsRef<[u8]>) -> &mut Self {
        if !self.ended && !self.closed {
            self.body.extend_from_slice(chunk.as_ref());
        }
        self
    }

    /// Body written so far.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body interpreted as UTF-8, for assertions and logs.
    #[must_use]
    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Whether the response has started: a status, header or body byte
    /// differs from the pristine state.
    #[must_use]
    pub fn started(&self) -> bool {
        self.status != StatusCode::OK || !self.headers.is_empty() || !self.body.is_empty()
    }

    /// End the response. Idempotent; fires the end hook on first call.
    pub fn end(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;
        debug!(status = self.status.as_u16(), body_bytes = self.body.len(), "Response ended");
        if let Some(hook) = self.end_hook.take() {
            hook(self);
        }
    }

    /// Write a final chunk and end.
    pub fn end_with(&mut self, chunk: impl AsRef<[u8]>) {
        self.write(chunk);
        self.end();
    }

    /// Serialize a value as the JSON body, set the content type and end.
    pub fn end_json<T: Serialize>(&mut self, value: &T) -> Result<(), serde_json::Error> {
        let body = serde_json::to_vec(value)?;
        self.put_header("content-type", "application/json");
        self.end_with(body);
        Ok(())
    }

    /// Whether `end()` has been called.
    #[must_use]
    pub fn ended(&self) -> bool {
        self.ended
    }

    /// Whether the underlying connection is gone.
    #[must_use]
    pub fn closed(&self) -> bool {
        self.closed
    }

    /// Mark the connection as closed. Late writes become no-ops.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Register the adapter hook fired when the response ends. The hook runs
    /// while the response is borrowed, so it must only read from it.
    pub fn set_end_hook(&mut self, hook: EndHook) {
        self.end_hook = Some(hook);
    }
}

impl std::fmt::Debug for ServerResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body_bytes", &self.body.len())
            .field("ended", &self.ended)
            .field("closed", &self.closed)
            .finish()
    }
}
