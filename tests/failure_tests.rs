//! Tests for failure handling: explicit `fail`, panics, failure-handler
//! traversal and the default failure responder.
//!
//! # Test Coverage
//!
//! - `fail(status)` runs the nearest failure handler exactly once
//! - Traversal: the failing route's own failure handlers first, then
//!   forward through the remaining candidates
//! - Failing again while failing replaces the payload and restarts the
//!   failure cursor
//! - Panicking handlers behave like `fail` with a 500 payload
//! - Unhandled failures produce the default status-coded response

mod common;

use common::{get, TestTracing, Trace};
use shunt::{HttpError, Router};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn test_fail_runs_same_route_failure_handler_once() {
    let _t = TestTracing::init();
    let router = Router::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let route = router.get("/f").unwrap();
    route.handler(|ctx| ctx.fail(500)).unwrap();
    route
        .failure_handler(move |ctx| {
            seen.fetch_add(1, Ordering::SeqCst);
            assert_eq!(ctx.status_code().map(|s| s.as_u16()), Some(500));
            assert_eq!(ctx.failure().map(|f| f.status_u16()), Some(500));
            let mut res = ctx.response();
            res.set_status(http::StatusCode::INTERNAL_SERVER_ERROR);
            res.end_with("handled");
        })
        .unwrap();

    let ctx = router.handle(get("/f"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(ctx.response().body_string(), "handled");
}

#[test]
fn test_failure_propagates_to_later_candidate() {
    let router = Router::new();
    router
        .get("/f")
        .unwrap()
        .handler(|ctx| ctx.fail(500))
        .unwrap();
    // registered later, matches anything, only handles failures
    router
        .route()
        .failure_handler(|ctx| {
            let mut res = ctx.response();
            res.set_status(http::StatusCode::BAD_GATEWAY);
            res.end_with("caught later");
        })
        .unwrap();

    let ctx = router.handle(get("/f"));
    assert_eq!(ctx.response().status().as_u16(), 502);
    assert_eq!(ctx.response().body_string(), "caught later");
}

#[test]
fn test_unhandled_failure_uses_payload_status() {
    let router = Router::new();
    router
        .get("/f")
        .unwrap()
        .handler(|ctx| ctx.fail(403))
        .unwrap();

    let ctx = router.handle(get("/f"));
    let res = ctx.response();
    assert!(res.ended());
    assert_eq!(res.status().as_u16(), 403);
    assert_eq!(res.body_string(), "Forbidden");
}

#[test]
fn test_unhandled_failure_defaults_to_500() {
    let router = Router::new();
    router
        .get("/f")
        .unwrap()
        .handler(|ctx| {
            ctx.fail_with(HttpError::internal("database exploded"));
        })
        .unwrap();

    let ctx = router.handle(get("/f"));
    assert_eq!(ctx.response().status().as_u16(), 500);
    assert_eq!(ctx.failure().map(|f| f.to_string()).unwrap_or_default(),
        "500 Internal Server Error: database exploded");
}

#[test]
fn test_panicking_handler_fails_with_500() {
    let router = Router::new();
    router
        .get("/boom")
        .unwrap()
        .handler(|_ctx| panic!("kaboom"))
        .unwrap();

    let ctx = router.handle(get("/boom"));
    let res = ctx.response();
    assert!(res.ended());
    assert_eq!(res.status().as_u16(), 500);
}

#[test]
fn test_panicking_handler_payload_reaches_failure_handler() {
    let router = Router::new();
    let route = router.get("/boom").unwrap();
    route.handler(|_ctx| panic!("kaboom")).unwrap();
    route
        .failure_handler(|ctx| {
            let message = ctx.failure().map(|f| f.to_string()).unwrap_or_default();
            assert!(message.contains("kaboom"), "payload was: {message}");
            ctx.end_with("recovered");
        })
        .unwrap();

    let ctx = router.handle(get("/boom"));
    assert_eq!(ctx.response().body_string(), "recovered");
}

#[test]
fn test_second_fail_replaces_payload_and_restarts_cursor() {
    let router = Router::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let route = router.get("/f").unwrap();
    route.handler(|ctx| ctx.fail(500)).unwrap();
    route
        .failure_handler(move |ctx| {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                // replaces the payload and restarts from this route's
                // failure handlers
                ctx.fail(503);
            } else {
                assert_eq!(ctx.status_code().map(|s| s.as_u16()), Some(503));
                ctx.next();
            }
        })
        .unwrap();

    let ctx = router.handle(get("/f"));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(ctx.response().status().as_u16(), 503);
}

#[test]
fn test_failure_handler_next_moves_to_later_failure_handler() {
    let router = Router::new();
    let trace = Trace::new();
    let route = router.get("/f").unwrap();
    route.handler(|ctx| ctx.fail(500)).unwrap();
    let t1 = trace.clone();
    route
        .failure_handler(move |ctx| {
            t1.mark("first");
            ctx.next();
        })
        .unwrap();
    let t2 = trace.clone();
    router
        .route()
        .failure_handler(move |ctx| {
            t2.mark("second");
            ctx.end_with("done");
        })
        .unwrap();

    let ctx = router.handle(get("/f"));
    assert_eq!(trace.events(), vec!["first", "second"]);
    assert_eq!(ctx.response().body_string(), "done");
}

#[test]
fn test_normal_handlers_do_not_resume_after_failure() {
    let router = Router::new();
    let trace = Trace::new();
    let t1 = trace.clone();
    router
        .get("/f")
        .unwrap()
        .handler(move |ctx| {
            t1.mark("fails");
            ctx.fail(500);
        })
        .unwrap();
    let t2 = trace.clone();
    router
        .get("/f")
        .unwrap()
        .handler(move |ctx| {
            t2.mark("unreached");
            ctx.end();
        })
        .unwrap();

    let ctx = router.handle(get("/f"));
    assert_eq!(trace.events(), vec!["fails"]);
    assert_eq!(ctx.response().status().as_u16(), 500);
}

#[test]
fn test_panic_inside_failure_handler_ends_with_default_responder() {
    let router = Router::new();
    let route = router.get("/f").unwrap();
    route.handler(|ctx| ctx.fail(500)).unwrap();
    route.failure_handler(|_ctx| panic!("worse")).unwrap();

    let ctx = router.handle(get("/f"));
    let res = ctx.response();
    assert!(res.ended());
    assert_eq!(res.status().as_u16(), 500);
}

#[test]
fn test_error_handler_consulted_for_unhandled_failure() {
    let router = Router::new();
    router
        .get("/f")
        .unwrap()
        .handler(|ctx| ctx.fail(500))
        .unwrap();
    router.error_handler(500, |ctx| {
        let mut res = ctx.response();
        res.put_header("x-error", "observed");
    });

    let ctx = router.handle(get("/f"));
    let res = ctx.response();
    // the observer ran, and the default responder still ended the response
    assert_eq!(res.header("x-error"), Some("observed"));
    assert!(res.ended());
    assert_eq!(res.status().as_u16(), 500);
}

#[test]
fn test_late_failure_after_response_ended_is_dropped() {
    let router = Router::new();
    router
        .get("/late")
        .unwrap()
        .handler(|ctx| {
            ctx.end_with("sent");
            ctx.fail(500);
        })
        .unwrap();

    let ctx = router.handle(get("/late"));
    let res = ctx.response();
    assert_eq!(res.status().as_u16(), 200);
    assert_eq!(res.body_string(), "sent");
}
