//! # Runtime Configuration Module
//!
//! Environment-driven tunables for the dispatch engine.
//!
//! ## Environment Variables
//!
//! ### `SHUNT_REROUTE_LIMIT`
//!
//! Maximum number of times one request may be rerouted before the dispatch
//! gives up and answers with a 500. Accepts decimal (`32`) or hexadecimal
//! (`0x20`) values. Default: `32`.
//!
//! Reroutes restart matching on the same context; a handler rerouting to a
//! path that reroutes back again would otherwise loop forever.

use tracing::warn;

const DEFAULT_REROUTE_LIMIT: usize = 32;

/// Runtime configuration, loaded once per router at construction.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    /// Upper bound on reroutes per request
    pub reroute_limit: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            reroute_limit: DEFAULT_REROUTE_LIMIT,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from the environment, falling back to defaults
    /// for unset or unparsable values.
    #[must_use]
    pub fn from_env() -> Self {
        let reroute_limit = parse_env_number("SHUNT_REROUTE_LIMIT").unwrap_or(DEFAULT_REROUTE_LIMIT);
        Self { reroute_limit }
    }
}

fn parse_env_number(var: &str) -> Option<usize> {
    let raw = std::env::var(var).ok()?;
    let parsed = if let Some(hex) = raw.strip_prefix("0x") {
        usize::from_str_radix(hex, 16).ok()
    } else {
        raw.parse().ok()
    };
    if parsed.is_none() {
        warn!(var, value = %raw, "Ignoring unparsable configuration value");
    }
    parsed
}
