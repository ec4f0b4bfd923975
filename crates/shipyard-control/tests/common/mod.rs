//! Shared fixtures for integration tests.
//!
//! ```text
//! executor
//!    └── test_env (control plane + `orders` with v1..v3 everywhere)
//!           └── app (router over test_env)
//! ```

#![allow(dead_code, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use rstest::fixture;
use serde_json::{json, Value};
use tower::ServiceExt;

use shipyard_control::api::{self, AppState, REQUESTED_BY_HEADER};
use shipyard_control::config::DashboardConfig;
use shipyard_control::executor::ScriptedExecutor;
use shipyard_control::{ArtifactEvent, ControlPlane, EnvironmentSet};

/// A wired control plane and the executor behind it.
pub struct TestEnv {
    pub plane: Arc<ControlPlane>,
    pub executor: Arc<ScriptedExecutor>,
}

impl TestEnv {
    /// Router over this environment.
    pub fn app(&self) -> Router {
        api::router(AppState {
            plane: Arc::clone(&self.plane),
        })
    }
}

/// An executor that succeeds immediately.
#[fixture]
pub fn executor() -> ScriptedExecutor {
    ScriptedExecutor::new()
}

/// Control plane with `orders` registered in dev, test and prod, each with
/// artifacts v1, v2 and v3.
#[fixture]
pub fn test_env(executor: ScriptedExecutor) -> TestEnv {
    env_with(executor)
}

/// Build a [`TestEnv`] around a specific executor.
pub fn env_with(executor: ScriptedExecutor) -> TestEnv {
    let executor = Arc::new(executor);
    let plane = ControlPlane::new(
        EnvironmentSet::default(),
        Arc::clone(&executor) as _,
        &DashboardConfig::default(),
    );

    plane.register_service("orders", None).unwrap();
    for env in ["dev", "test", "prod"] {
        for version in ["v1", "v2", "v3"] {
            plane.register_artifact(artifact_event("orders", env, version)).unwrap();
        }
    }

    TestEnv {
        plane: Arc::new(plane),
        executor,
    }
}

/// A successful pipeline event.
pub fn artifact_event(service: &str, environment: &str, version: &str) -> ArtifactEvent {
    serde_json::from_value(artifact_json(service, environment, version)).unwrap()
}

/// JSON body of a successful pipeline event.
pub fn artifact_json(service: &str, environment: &str, version: &str) -> Value {
    json!({
        "serviceName": service,
        "environment": environment,
        "version": version,
        "artifactId": format!("registry.example.com/{service}:{version}"),
        "artifactType": "docker",
        "commitSha": "0123abcd",
        "pipeline": "github",
        "action": "deploy",
        "status": "success",
    })
}

/// Send a request and decode the JSON response body.
pub async fn send(
    app: Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    send_as(app, method, uri, body, None).await
}

/// Send a request on behalf of a caller.
pub async fn send_as(
    app: Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
    caller: Option<&str>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(caller) = caller {
        request = request.header(REQUESTED_BY_HEADER, caller);
    }
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}

/// Wait until the executor has received `n` calls.
pub async fn wait_for_calls(executor: &ScriptedExecutor, n: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while executor.calls().len() < n {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
}
