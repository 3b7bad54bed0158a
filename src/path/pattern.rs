//! Compiled path patterns.
//!
//! A route's path form is one of a closed set of variants, decided once at
//! registration time. Matching is pure: `(pattern, normalized path)` in,
//! extracted parameters out. Ordering between routes is not decided here.

use crate::error::RouteError;
use once_cell::sync::Lazy;
use regex::Regex;
use smallvec::SmallVec;
use std::sync::Arc;

/// Maximum number of path parameters held inline before spilling to the heap.
/// Deeply parameterized routes beyond this are rare.
pub const MAX_INLINE_PARAMS: usize = 8;

/// Stack-allocated parameter storage for the match path.
///
/// Parameter names are `Arc<str>` because they come from the route's compiled
/// pattern (known at registration); cloning them per request is an atomic
/// increment instead of a string copy. Values are per-request data and stay
/// owned.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

// `:token` names accepted in parameterized paths
static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":([A-Za-z][A-Za-z0-9_]*)").expect("token regex"));

/// Result of a successful path match.
#[derive(Debug)]
pub(crate) struct PathMatch {
    /// Parameters bound by the pattern, in binding order
    pub params: ParamVec,
    /// Byte length of the request-path prefix this pattern consumed; the
    /// remainder is what a mounted sub-router sees
    pub consumed: usize,
}

/// One compiled path form. At most one per route.
#[derive(Debug, Clone)]
pub(crate) enum PathPattern {
    /// No path constraint; matches every path
    Any,
    /// Literal path, compared trailing-slash-insensitively
    Exact { path: String },
    /// Literal prefix from a `...*` pattern; the rest binds to `*`
    Prefix { prefix: String },
    /// `:name` segments compiled to an anchored regex with `p0..pN` groups
    Parameterized {
        raw: String,
        regex: Regex,
        params: Vec<Arc<str>>,
        wildcard: bool,
    },
    /// User-supplied regular expression, anchored to the full path
    Regex { regex: Regex, named: Vec<Arc<str>> },
}

impl PathPattern {
    /// Compile a plain path: parameterized when it contains `:` tokens,
    /// a prefix when it ends with `*`, exact otherwise.
    pub(crate) fn parse(path: &str) -> Result<Self, RouteError> {
        if path.is_empty() || !path.starts_with('/') {
            return Err(RouteError::InvalidPath(path.to_string()));
        }
        if path.contains(':') {
            return Self::compile_parameterized(path);
        }
        if let Some(prefix) = path.strip_suffix('*') {
            return Ok(PathPattern::Prefix {
                prefix: prefix.to_string(),
            });
        }
        Ok(PathPattern::Exact {
            path: path.to_string(),
        })
    }

    /// Compile a user regex. Named capture groups bind under their own name;
    /// every group also binds positionally as `param0..paramN`.
    pub(crate) fn from_regex(pattern: &str) -> Result<Self, RouteError> {
        // anchor without disturbing user groups
        let regex = Regex::new(&format!("^(?:{pattern})$"))?;
        let named = regex
            .capture_names()
            .flatten()
            .map(Arc::from)
            .collect::<Vec<Arc<str>>>();
        Ok(PathPattern::Regex { regex, named })
    }

    fn compile_parameterized(path: &str) -> Result<Self, RouteError> {
        let (body, wildcard) = match path.strip_suffix('*') {
            Some(p) => (p, true),
            None => (path, false),
        };

        let mut pattern = String::with_capacity(path.len() + 16);
        pattern.push('^');
        let mut params: Vec<Arc<str>> = Vec::new();
        let mut last = 0;
        for m in TOKEN_RE.find_iter(body) {
            // the token is ":<name>"; strip the colon
            let name = &body[m.start() + 1..m.end()];
            if params.iter().any(|p| p.as_ref() == name) {
                return Err(RouteError::DuplicateParam(name.to_string()));
            }
            pattern.push_str(&regex::escape(&body[last..m.start()]));
            pattern.push_str(&format!("(?P<p{}>[^/]+)", params.len()));
            params.push(Arc::from(name));
            last = m.end();
        }
        pattern.push_str(&regex::escape(&body[last..]));
        if wildcard {
            pattern.push_str("(?P<rest>.*)");
        }
        pattern.push('$');

        let regex = Regex::new(&pattern)?;
        Ok(PathPattern::Parameterized {
            raw: path.to_string(),
            regex,
            params,
            wildcard,
        })
    }

    /// True when a sub-router can be mounted on this pattern.
    pub(crate) fn mountable(&self) -> bool {
        matches!(self, PathPattern::Exact { .. } | PathPattern::Prefix { .. })
    }

    /// The raw pattern string, for logs and route listings.
    pub(crate) fn describe(&self) -> String {
        match self {
            PathPattern::Any => "*".to_string(),
            PathPattern::Exact { path } => path.clone(),
            PathPattern::Prefix { prefix } => format!("{prefix}*"),
            PathPattern::Parameterized { raw, .. } => raw.clone(),
            PathPattern::Regex { regex, .. } => regex.as_str().to_string(),
        }
    }

    /// Match a normalized request path against this pattern.
    pub(crate) fn matches(&self, path: &str) -> Option<PathMatch> {
        match self {
            PathPattern::Any => Some(PathMatch {
                params: ParamVec::new(),
                consumed: 0,
            }),
            PathPattern::Exact { path: base } => {
                if trim_trailing(path) == trim_trailing(base) {
                    Some(PathMatch {
                        params: ParamVec::new(),
                        consumed: path.len(),
                    })
                } else {
                    None
                }
            }
            PathPattern::Prefix { prefix } => {
                let consumed = trim_trailing(prefix).len();
                // a "/p/*" route is relaxed about the missing final slash
                if prefix.ends_with('/') && trim_trailing(path) == trim_trailing(prefix) {
                    let mut params = ParamVec::new();
                    params.push((Arc::from("*"), "/".to_string()));
                    return Some(PathMatch { params, consumed });
                }
                if path.starts_with(prefix.as_str()) {
                    let mut params = ParamVec::new();
                    params.push((Arc::from("*"), path[prefix.len()..].to_string()));
                    return Some(PathMatch { params, consumed });
                }
                None
            }
            PathPattern::Parameterized {
                regex,
                params,
                wildcard,
                ..
            } => {
                let caps = regex.captures(path)?;
                let mut bound = ParamVec::new();
                for (i, name) in params.iter().enumerate() {
                    if let Some(value) = caps.name(&format!("p{i}")) {
                        bound.push((name.clone(), value.as_str().to_string()));
                    }
                }
                if *wildcard {
                    if let Some(rest) = caps.name("rest") {
                        bound.push((Arc::from("*"), rest.as_str().to_string()));
                    }
                }
                Some(PathMatch {
                    params: bound,
                    consumed: path.len(),
                })
            }
            PathPattern::Regex { regex, named } => {
                let caps = regex.captures(path)?;
                let mut bound = ParamVec::new();
                for name in named {
                    if let Some(value) = caps.name(name) {
                        bound.push((name.clone(), value.as_str().to_string()));
                    }
                }
                for i in 1..caps.len() {
                    if let Some(value) = caps.get(i) {
                        bound.push((Arc::from(format!("param{}", i - 1).as_str()), value.as_str().to_string()));
                    }
                }
                Some(PathMatch {
                    params: bound,
                    consumed: path.len(),
                })
            }
        }
    }
}

// trailing slashes are not significant when comparing literal paths
fn trim_trailing(p: &str) -> &str {
    if p.len() > 1 && p.ends_with('/') {
        &p[..p.len() - 1]
    } else {
        p
    }
}
