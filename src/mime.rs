//! MIME patterns and Accept-header negotiation.
//!
//! Routes constrain themselves with `consumes` (request Content-Type) and
//! `produces` (response type acceptable to the client). Both are lists of
//! media-type patterns where either side may be a `*` wildcard. The Accept
//! header is parsed and quality-sorted once per request; [`parse_accept`] is
//! also usable on its own.

/// One media-type pattern such as `text/html`, `text/*` or `*/*`.
///
/// Parameters (`;charset=...`) are ignored on both sides of a comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTypePattern {
    raw: String,
    main: String,
    sub: String,
}

impl MediaTypePattern {
    /// Parse a pattern. A bare `*` is shorthand for `*/*`; a missing subtype
    /// wildcards it (`text` behaves as `text/*`).
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let stripped = strip_params(value);
        let (main, sub) = match stripped.split_once('/') {
            Some((m, s)) => (m.trim(), s.trim()),
            None => (stripped, "*"),
        };
        MediaTypePattern {
            raw: stripped.to_string(),
            main: main.to_ascii_lowercase(),
            sub: sub.to_ascii_lowercase(),
        }
    }

    /// The pattern as written (parameters stripped).
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Match a concrete header value (or another pattern) against this one.
    #[must_use]
    pub fn matches(&self, value: &str) -> bool {
        let stripped = strip_params(value);
        let (main, sub) = match stripped.split_once('/') {
            Some((m, s)) => (m.trim(), s.trim()),
            None => (stripped, "*"),
        };
        let main_ok = self.main == "*" || main == "*" || self.main.eq_ignore_ascii_case(main);
        let sub_ok = self.sub == "*" || sub == "*" || self.sub.eq_ignore_ascii_case(sub);
        main_ok && sub_ok
    }
}

fn strip_params(value: &str) -> &str {
    match value.split_once(';') {
        Some((head, _)) => head.trim(),
        None => value.trim(),
    }
}

/// Parse an Accept-style header into media types ordered most-preferred
/// first.
///
/// Entries are split on `,`; each entry's `q` parameter (default `1.0`,
/// unparsable values also `1.0`) decides the order. The sort is stable, so
/// entries with equal quality keep their original relative order. Parameters
/// other than `q` are dropped from the returned values.
#[must_use]
pub fn parse_accept(header: &str) -> Vec<String> {
    let mut entries: Vec<(f32, String)> = header
        .split(',')
        .filter_map(|entry| {
            let mut parts = entry.split(';');
            let media = parts.next()?.trim();
            if media.is_empty() {
                return None;
            }
            let mut quality = 1.0f32;
            for param in parts {
                if let Some((k, v)) = param.split_once('=') {
                    if k.trim() == "q" {
                        quality = v.trim().parse().unwrap_or(1.0);
                    }
                }
            }
            Some((quality, media.to_string()))
        })
        .collect();

    // stable: equal-quality entries keep header order
    entries.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    entries.into_iter().map(|(_, media)| media).collect()
}

/// Pick the content type a route can produce for a client.
///
/// The first `produces` pattern satisfied by any entry of the quality-sorted
/// accept list wins; its raw value becomes the acceptable content type
/// exposed to handlers. `None` means the route cannot satisfy the client.
#[must_use]
pub fn select_produced(produces: &[MediaTypePattern], accept: &[String]) -> Option<String> {
    produces
        .iter()
        .find(|pattern| accept.iter().any(|entry| pattern.matches(entry)))
        .map(|pattern| pattern.raw().to_string())
}
