use http::Method;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::Arc;

/// Maximum inline headers before heap allocation; most requests carry fewer.
pub const MAX_INLINE_HEADERS: usize = 16;

/// Stack-allocated header storage.
///
/// Header names use `Arc<str>` because the same names repeat across requests
/// (`content-type`, `accept`, ...) and cloning an `Arc` is an atomic
/// increment; values are per-request data and stay owned.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// The inbound half of an HTTP exchange as the router sees it.
///
/// Host server adapters build one of these per request; the router never
/// reads a socket itself. The body is whatever bytes the adapter has already
/// made available; body parsing is a collaborator concern.
#[derive(Debug, Clone)]
pub struct ServerRequest {
    method: Method,
    uri: String,
    path: String,
    headers: HeaderVec,
    body: Option<Vec<u8>>,
}

impl ServerRequest {
    /// Build a request from a method and a request URI (path plus optional
    /// query string).
    #[must_use]
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        let uri = uri.into();
        let path = uri.split('?').next().unwrap_or("/").to_string();
        Self {
            method,
            uri,
            path,
            headers: HeaderVec::new(),
            body: None,
        }
    }

    /// Add a header (builder style). Names are stored lowercase.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers
            .push((Arc::from(name.to_ascii_lowercase().as_str()), value.into()));
        self
    }

    /// Attach body bytes (builder style).
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// HTTP method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Full request URI, including the query string.
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Path portion of the URI, as received (not normalized).
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Query-string portion of the URI, without the `?`.
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.uri.split_once('?').map(|(_, q)| q)
    }

    /// Look up a header by name (case-insensitive per RFC 7230).
    #[inline]
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All headers in arrival order.
    #[must_use]
    pub fn headers(&self) -> &HeaderVec {
        &self.headers
    }

    /// Body bytes, when the adapter has made them available.
    #[must_use]
    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Whether the request carries (or declares) a body.
    #[must_use]
    pub fn has_body(&self) -> bool {
        if self.body.as_ref().is_some_and(|b| !b.is_empty()) {
            return true;
        }
        if let Some(len) = self.header("content-length") {
            if len.trim().parse::<u64>().is_ok_and(|n| n > 0) {
                return true;
            }
        }
        self.header("transfer-encoding").is_some()
    }

    /// Cookies parsed from the `Cookie` header.
    #[must_use]
    pub fn cookies(&self) -> HashMap<String, String> {
        self.header("cookie")
            .map(|c| {
                c.split(';')
                    .filter_map(|pair| {
                        let mut parts = pair.trim().splitn(2, '=');
                        let name = parts.next()?.trim().to_string();
                        let value = parts.next().unwrap_or("").trim().to_string();
                        Some((name, value))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    // reroute support: swap the effective method and target
    pub(crate) fn redirect_to(&mut self, method: Method, uri: &str) {
        self.method = method;
        self.uri = uri.to_string();
        self.path = uri.split('?').next().unwrap_or("/").to_string();
    }
}

/// Parse query-string parameters from a request URI.
///
/// Everything after `?` is form-decoded; repeated names accumulate in
/// arrival order.
#[must_use]
pub fn parse_query_params(uri: &str) -> HashMap<String, Vec<String>> {
    let mut out: HashMap<String, Vec<String>> = HashMap::new();
    if let Some((_, query)) = uri.split_once('?') {
        for (k, v) in url::form_urlencoded::parse(query.as_bytes()) {
            out.entry(k.into_owned()).or_default().push(v.into_owned());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_case_insensitive() {
        let req = ServerRequest::new(Method::GET, "/x").with_header("Content-Type", "text/plain");
        assert_eq!(req.header("content-type"), Some("text/plain"));
        assert_eq!(req.header("CONTENT-TYPE"), Some("text/plain"));
    }

    #[test]
    fn test_path_strips_query() {
        let req = ServerRequest::new(Method::GET, "/p?x=1&y=2");
        assert_eq!(req.path(), "/p");
        assert_eq!(req.query(), Some("x=1&y=2"));
    }

    #[test]
    fn test_parse_query_params() {
        let q = parse_query_params("/p?x=1&y=2&x=3");
        assert_eq!(q.get("x"), Some(&vec!["1".to_string(), "3".to_string()]));
        assert_eq!(q.get("y"), Some(&vec!["2".to_string()]));
    }

    #[test]
    fn test_cookies() {
        let req = ServerRequest::new(Method::GET, "/").with_header("cookie", "a=b; c=d");
        let cookies = req.cookies();
        assert_eq!(cookies.get("a"), Some(&"b".to_string()));
        assert_eq!(cookies.get("c"), Some(&"d".to_string()));
    }

    #[test]
    fn test_has_body() {
        let req = ServerRequest::new(Method::POST, "/").with_body("{}");
        assert!(req.has_body());
        let req = ServerRequest::new(Method::POST, "/").with_header("content-length", "10");
        assert!(req.has_body());
        let req = ServerRequest::new(Method::GET, "/");
        assert!(!req.has_body());
    }
}
