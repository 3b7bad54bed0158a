//! # Router Module
//!
//! The [`Router`] holds the ordered route collection and is the entry point
//! for dispatch: [`Router::handle`] takes one parsed request, computes the
//! candidate list and drives the handler chain through a per-request
//! [`crate::context::RoutingContext`].
//!
//! ## Ordering
//!
//! Candidates are evaluated sorted by `(last flag, order, creation index)`.
//! `order` defaults to the registration sequence number and can be
//! overridden; a route marked `last()` runs after every route that is not,
//! regardless of its numeric order.
//!
//! ## Concurrency
//!
//! The route collection is copy-on-write: each dispatch takes an atomic
//! snapshot, so registration, removal and reconfiguration can race freely
//! with in-flight requests. Routes added after a dispatch started are not
//! retroactively inserted into that request's candidate list; per-route
//! state (enabled, handlers) is read lazily as the cursor reaches a route.

mod core;

pub use core::{ModifiedHandler, Router};
