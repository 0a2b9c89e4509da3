//! In-memory remote client shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex};

use sisync_core::{Environment, RemoteClient, RemoteResponse, Result, SisyncError};

type Handler = Box<dyn Fn(&Value) -> Result<RemoteResponse> + Send + Sync>;

struct Route {
    method: &'static str,
    path: String,
    handler: Handler,
}

/// One request seen by the fake.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub method: &'static str,
    pub path: String,
    pub body: Value,
}

/// Routes requests by exact method and path. Unrouted requests get a 404.
/// Later routes shadow earlier ones for the same request.
pub struct FakeRemote {
    base_url: String,
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<Call>>,
}

impl FakeRemote {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            base_url: format!("https://{}.test", name),
            routes: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn on<F>(&self, method: &'static str, path: impl Into<String>, handler: F)
    where
        F: Fn(&Value) -> Result<RemoteResponse> + Send + Sync + 'static,
    {
        self.routes.lock().unwrap().push(Route {
            method,
            path: path.into(),
            handler: Box::new(handler),
        });
    }

    /// Always answer with `status` and `body`.
    pub fn respond(&self, method: &'static str, path: impl Into<String>, status: u16, body: Value) {
        self.on(method, path, move |_| Ok(RemoteResponse::new(status, body.clone())));
    }

    /// Simulate a connection failure.
    pub fn unreachable(&self, method: &'static str, path: impl Into<String>) {
        self.on(method, path, |_| {
            Err(SisyncError::Network {
                message: "connection refused".into(),
                cause: None,
            })
        });
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls other than GET.
    pub fn writes(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.method != "GET")
            .collect()
    }

    pub fn calls_to(&self, method: &str, path: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.method == method && c.path == path)
            .collect()
    }

    fn dispatch(&self, method: &'static str, path: &str, body: Value) -> Result<RemoteResponse> {
        self.calls.lock().unwrap().push(Call {
            method,
            path: path.to_string(),
            body: body.clone(),
        });
        let routes = self.routes.lock().unwrap();
        match routes
            .iter()
            .rev()
            .find(|r| r.method == method && r.path == path)
        {
            Some(route) => (route.handler)(&body),
            None => Ok(RemoteResponse::new(404, Value::Null)),
        }
    }
}

#[async_trait]
impl RemoteClient for FakeRemote {
    async fn get(&self, path: &str) -> Result<RemoteResponse> {
        self.dispatch("GET", path, Value::Null)
    }

    async fn post(&self, path: &str, body: &Value) -> Result<RemoteResponse> {
        self.dispatch("POST", path, body.clone())
    }

    async fn put(&self, path: &str, body: &Value) -> Result<RemoteResponse> {
        self.dispatch("PUT", path, body.clone())
    }

    async fn delete(&self, path: &str) -> Result<RemoteResponse> {
        self.dispatch("DELETE", path, Value::Null)
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Source and target environments over two fresh fakes.
pub fn environments() -> (Arc<FakeRemote>, Arc<FakeRemote>, Environment, Environment) {
    let source = FakeRemote::new("source");
    let target = FakeRemote::new("target");
    let source_env = Environment::source(source.clone());
    let target_env = Environment::target(target.clone());
    (source, target, source_env, target_env)
}

pub fn ok(body: Value) -> Result<RemoteResponse> {
    Ok(RemoteResponse::new(200, body))
}
