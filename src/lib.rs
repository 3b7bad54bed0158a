//! # shunt
//!
//! **shunt** is a composable HTTP request router and dispatch engine:
//! ordered routes with handler and failure-handler chains, content
//! negotiation, dynamic route lifecycle (enable/disable/remove), reroutes,
//! and sub-router mounting.
//!
//! ## Overview
//!
//! A [`Router`](router::Router) holds an ordered collection of
//! [`Route`](route::Route)s. For each request it computes the candidate
//! list, the non-removed routes sorted by `(last flag, order, creation
//! index)`, and walks it through a per-request
//! [`RoutingContext`](context::RoutingContext). Every handler of a matched
//! route runs to completion (signalling with `next()`, `fail()` or by
//! ending the response) before the cursor moves on; failures switch the
//! walk to the failure-handler chain; exhaustion falls through to default
//! not-found / failure responders, so every dispatch ends with exactly one
//! status-coded response.
//!
//! The crate is consumed by host HTTP server adapters, not exposed as a
//! protocol: an adapter parses the wire into a
//! [`ServerRequest`](server::ServerRequest), calls
//! [`Router::handle`](router::Router::handle), and drains the
//! [`ServerResponse`](server::ServerResponse) when it ends.
//!
//! ## Architecture
//!
//! - **[`path`]** - request-path normalization and compiled path patterns
//!   (literal, `:param`, trailing `*`, regex)
//! - **[`mime`]** - Accept/Content-Type patterns and quality-sorted
//!   negotiation
//! - **[`route`]** - one matching rule plus its handler chains, mutable
//!   copy-on-write
//! - **[`router`]** - the ordered route collection, registration API and
//!   mounting
//! - **[`context`]** - per-request state and the resumable dispatch loop
//! - **[`server`]** - the request/response boundary towards host adapters
//! - **[`config`]** - environment-driven runtime tunables
//!
//! ## Quick Start
//!
//! ```
//! use http::Method;
//! use shunt::{Router, ServerRequest};
//!
//! let router = Router::new();
//! router
//!     .get("/pets/:id")
//!     .expect("valid path")
//!     .handler(|ctx| {
//!         let id = ctx.path_param("id").unwrap_or_default();
//!         ctx.end_with(format!("pet {id}"));
//!     })
//!     .expect("route accepts handlers");
//!
//! let ctx = router.handle(ServerRequest::new(Method::GET, "/pets/42"));
//! assert_eq!(ctx.response().body_string(), "pet 42");
//! ```
//!
//! ## Concurrency model
//!
//! One request executes on one logical context at a time; there is no
//! parallel handler execution within a request. Handlers may suspend the
//! chain and continue it later from another thread; `next()`/`fail()` are
//! safe from any execution turn and resume the loop without recursion.
//! Router and route configuration is copy-on-write, so mutation is safe
//! while other requests dispatch concurrently; each dispatch keeps the
//! candidate list it started with.

pub mod config;
pub mod context;
pub mod error;
pub mod mime;
pub mod path;
pub mod route;
pub mod router;
pub mod server;

pub use config::RuntimeConfig;
pub use context::{Handler, RoutingContext};
pub use error::{HttpError, RouteError};
pub use mime::{parse_accept, MediaTypePattern};
pub use path::{normalize_path, url_decode, ParamVec};
pub use route::Route;
pub use router::Router;
pub use server::{HeaderVec, ServerRequest, ServerResponse};
