//! # Route Module
//!
//! A [`Route`] is one matching rule plus its handler chains: a set of HTTP
//! methods (empty = any), at most one path form, optional `consumes` /
//! `produces` content-type constraints, ordered normal and failure handlers,
//! and enabled/removed lifecycle state.
//!
//! Configuration is fluent and live: every mutation swaps the route's state
//! atomically, so it is safe to reconfigure routes while other requests are
//! dispatching. A request that already computed its candidate list keeps the
//! states it saw; the next request sees the new configuration.

mod core;

pub use core::Route;
pub(crate) use core::{MatchFailure, MatchInput, RouteHandler, RouteState};
