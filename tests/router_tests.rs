//! Tests for route registration, matching and ordering.
//!
//! # Test Coverage
//!
//! - Method and path matching across the registration API
//! - Candidate ordering: registration order, explicit `order()`, `last()`
//! - Path parameters, wildcards and regex routes
//! - Route lifecycle: enable, disable, remove
//! - Partial-match statuses (405 with `Allow`) and per-status error handlers

mod common;

use common::{get, request, TestTracing, Trace};
use http::Method;
use shunt::{Router, RouteError, ServerRequest};

#[test]
fn test_exact_route_matches() {
    let _t = TestTracing::init();
    let router = Router::new();
    router
        .get("/zoo/animals")
        .unwrap()
        .handler(|ctx| ctx.end_with("animals"))
        .unwrap();

    let ctx = router.handle(get("/zoo/animals"));
    assert!(ctx.response().ended());
    assert_eq!(ctx.response().body_string(), "animals");
}

#[test]
fn test_unknown_path_is_404() {
    let router = Router::new();
    router
        .get("/zoo/animals")
        .unwrap()
        .handler(|ctx| ctx.end())
        .unwrap();

    let ctx = router.handle(get("/unknown"));
    let res = ctx.response();
    assert!(res.ended());
    assert_eq!(res.status().as_u16(), 404);
    assert!(res.body_string().contains("Resource not found"));
}

#[test]
fn test_method_mismatch_is_405_with_allow() {
    let router = Router::new();
    router
        .get("/thing")
        .unwrap()
        .handler(|ctx| ctx.end())
        .unwrap();

    let ctx = router.handle(request(Method::POST, "/thing"));
    let res = ctx.response();
    assert_eq!(res.status().as_u16(), 405);
    assert_eq!(res.header("allow"), Some("GET"));
}

#[test]
fn test_empty_method_set_matches_any_method() {
    let router = Router::new();
    router
        .route_with_path("/anything")
        .unwrap()
        .handler(|ctx| ctx.end())
        .unwrap();

    for method in [Method::GET, Method::PUT, Method::DELETE] {
        let ctx = router.handle(request(method, "/anything"));
        assert_eq!(ctx.response().status().as_u16(), 200);
    }
}

#[test]
fn test_path_param_binding() {
    let router = Router::new();
    router
        .get("/foo/bar/:id")
        .unwrap()
        .handler(|ctx| {
            let id = ctx.path_param("id").unwrap_or_default();
            ctx.end_with(id);
        })
        .unwrap();

    let ctx = router.handle(get("/foo/bar/42"));
    assert_eq!(ctx.response().body_string(), "42");

    assert_eq!(router.handle(get("/foo/bar")).response().status().as_u16(), 404);
    assert_eq!(
        router.handle(get("/foo/bar/42/extra")).response().status().as_u16(),
        404
    );
}

#[test]
fn test_path_must_start_with_slash() {
    let router = Router::new();
    assert!(matches!(
        router.get("foo/bar/:id"),
        Err(RouteError::InvalidPath(_))
    ));
}

#[test]
fn test_wildcard_route_binds_rest() {
    let router = Router::new();
    router
        .get("/static/*")
        .unwrap()
        .handler(|ctx| {
            let rest = ctx.path_param("*").unwrap_or_default();
            ctx.end_with(rest);
        })
        .unwrap();

    let ctx = router.handle(get("/static/css/site.css"));
    assert_eq!(ctx.response().body_string(), "css/site.css");
}

#[test]
fn test_regex_route_positional_params() {
    let router = Router::new();
    router
        .route_with_regex(r"/blah/([a-z]+)/(\d+)")
        .unwrap()
        .handler(|ctx| {
            let a = ctx.path_param("param0").unwrap_or_default();
            let b = ctx.path_param("param1").unwrap_or_default();
            ctx.end_with(format!("{a}-{b}"));
        })
        .unwrap();

    let ctx = router.handle(get("/blah/abc/123"));
    assert_eq!(ctx.response().body_string(), "abc-123");
}

#[test]
fn test_request_path_is_normalized_before_matching() {
    let router = Router::new();
    router
        .get("/blah")
        .unwrap()
        .handler(|ctx| ctx.end_with("ok"))
        .unwrap();

    let ctx = router.handle(get("/foo/../../blah"));
    assert_eq!(ctx.response().body_string(), "ok");
}

#[test]
fn test_invalid_path_is_400() {
    let router = Router::new();
    router.get("/x").unwrap().handler(|ctx| ctx.end()).unwrap();

    // broken percent escape never matches and terminates with a 400
    let ctx = router.handle(get("/x%zz"));
    assert_eq!(ctx.response().status().as_u16(), 400);
    assert!(ctx.response().ended());
}

#[test]
fn test_trailing_slash_insensitive() {
    let router = Router::new();
    router.get("/p").unwrap().handler(|ctx| ctx.end()).unwrap();
    assert_eq!(router.handle(get("/p/")).response().status().as_u16(), 200);
}

#[test]
fn test_routes_run_in_registration_order() {
    let router = Router::new();
    let trace = Trace::new();
    let t1 = trace.clone();
    router
        .route_with_path("/x")
        .unwrap()
        .handler(move |ctx| {
            t1.mark("first");
            ctx.next();
        })
        .unwrap();
    let t2 = trace.clone();
    router
        .route_with_path("/x")
        .unwrap()
        .handler(move |ctx| {
            t2.mark("second");
            ctx.end();
        })
        .unwrap();

    router.handle(get("/x"));
    assert_eq!(trace.events(), vec!["first", "second"]);
}

#[test]
fn test_explicit_order_overrides_registration_order() {
    let router = Router::new();
    let trace = Trace::new();
    let t1 = trace.clone();
    let late = router.route_with_path("/x").unwrap();
    late.order(10)
        .handler(move |ctx| {
            t1.mark("order10");
            ctx.end();
        })
        .unwrap();
    let t2 = trace.clone();
    let early = router.route_with_path("/x").unwrap();
    early
        .order(1)
        .handler(move |ctx| {
            t2.mark("order1");
            ctx.next();
        })
        .unwrap();

    router.handle(get("/x"));
    assert_eq!(trace.events(), vec!["order1", "order10"]);
}

#[test]
fn test_last_runs_after_everything_regardless_of_order() {
    let router = Router::new();
    let trace = Trace::new();
    let t1 = trace.clone();
    let catch_all = router.route_with_path("/x").unwrap();
    catch_all
        .order(-1000)
        .last()
        .handler(move |ctx| {
            t1.mark("last");
            ctx.end();
        })
        .unwrap();
    let t2 = trace.clone();
    router
        .route_with_path("/x")
        .unwrap()
        .handler(move |ctx| {
            t2.mark("normal");
            ctx.next();
        })
        .unwrap();

    router.handle(get("/x"));
    assert_eq!(trace.events(), vec!["normal", "last"]);
}

#[test]
fn test_disable_skips_and_enable_restores() {
    let router = Router::new();
    let route = router.get("/toggle").unwrap();
    route.handler(|ctx| ctx.end_with("on")).unwrap();

    assert_eq!(router.handle(get("/toggle")).response().status().as_u16(), 200);

    route.disable();
    assert_eq!(router.handle(get("/toggle")).response().status().as_u16(), 404);

    // idempotent: a second disable changes nothing further
    route.disable();
    assert_eq!(router.handle(get("/toggle")).response().status().as_u16(), 404);

    route.enable();
    assert_eq!(router.handle(get("/toggle")).response().status().as_u16(), 200);
}

#[test]
fn test_remove_is_permanent() {
    let router = Router::new();
    let route = router.get("/gone").unwrap();
    route.handler(|ctx| ctx.end()).unwrap();

    route.remove();
    assert_eq!(router.handle(get("/gone")).response().status().as_u16(), 404);

    route.enable();
    assert!(route.is_removed());
    assert_eq!(router.handle(get("/gone")).response().status().as_u16(), 404);
}

#[test]
fn test_route_added_mid_dispatch_not_retroactive() {
    let router = Router::new();
    let registrar = router.clone();
    router
        .get("/lazy")
        .unwrap()
        .handler(move |ctx| {
            registrar
                .get("/lazy")
                .unwrap()
                .handler(|ctx| ctx.end_with("added"))
                .unwrap();
            ctx.next();
        })
        .unwrap();

    // the route registered mid-flight is not in this request's candidates
    let ctx = router.handle(get("/lazy"));
    assert_eq!(ctx.response().status().as_u16(), 404);

    // but the next request sees it
    let ctx = router.handle(get("/lazy"));
    assert_eq!(ctx.response().body_string(), "added");
}

#[test]
fn test_disable_mid_dispatch_is_seen_lazily() {
    let router = Router::new();
    let second = router.route_with_path("/lazy").unwrap();
    second.handler(|ctx| ctx.end_with("second")).unwrap();

    let victim = second.clone();
    let first = router.route_with_path("/lazy").unwrap();
    first
        .order(-1)
        .handler(move |ctx| {
            victim.disable();
            ctx.next();
        })
        .unwrap();

    // the disabled route's state is read when the cursor reaches it
    let ctx = router.handle(get("/lazy"));
    assert_eq!(ctx.response().status().as_u16(), 404);
}

#[test]
fn test_error_handler_replaces_default_404() {
    let router = Router::new();
    router.error_handler(404, |ctx| {
        ctx.end_with("custom not found");
    });

    let ctx = router.handle(get("/nowhere"));
    assert_eq!(ctx.response().body_string(), "custom not found");
    assert_eq!(ctx.status_code().map(|s| s.as_u16()), Some(404));
}

#[test]
fn test_modified_handler_observes_changes() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    let router = Router::new();
    let changes = Arc::new(AtomicUsize::new(0));
    let seen = changes.clone();
    router.modified_handler(Arc::new(move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    }));

    let route = router.get("/a").unwrap();
    assert_eq!(changes.load(Ordering::SeqCst), 1);
    route.remove();
    assert_eq!(changes.load(Ordering::SeqCst), 2);
    router.clear();
    assert_eq!(changes.load(Ordering::SeqCst), 3);
}

#[test]
fn test_clear_removes_all_routes() {
    let router = Router::new();
    router.get("/a").unwrap().handler(|ctx| ctx.end()).unwrap();
    router.get("/b").unwrap().handler(|ctx| ctx.end()).unwrap();
    assert_eq!(router.routes().len(), 2);

    router.clear();
    assert!(router.routes().is_empty());
    assert_eq!(router.handle(get("/a")).response().status().as_u16(), 404);
}

#[test]
fn test_head_404_has_no_body() {
    let router = Router::new();
    let ctx = router.handle(ServerRequest::new(Method::HEAD, "/none"));
    let res = ctx.response();
    assert_eq!(res.status().as_u16(), 404);
    assert!(res.body().is_empty());
}
