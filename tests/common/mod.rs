//! Shared helpers for the integration suites.
#![allow(dead_code)]

use http::Method;
use shunt::ServerRequest;
use std::sync::{Arc, Mutex};

/// Install a test subscriber so `RUST_LOG` surfaces dispatch tracing.
pub struct TestTracing;

impl TestTracing {
    pub fn init() -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
        TestTracing
    }
}

/// Build a GET request for a URI.
pub fn get(uri: &str) -> ServerRequest {
    ServerRequest::new(Method::GET, uri)
}

/// Build a request with an arbitrary method.
pub fn request(method: Method, uri: &str) -> ServerRequest {
    ServerRequest::new(method, uri)
}

/// Execution-order recorder shared between handlers and assertions.
#[derive(Clone, Default)]
pub struct Trace(Arc<Mutex<Vec<String>>>);

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&self, event: impl Into<String>) {
        self.0.lock().expect("trace lock").push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().expect("trace lock").clone()
    }
}
