//! HTTP API for the control service.
//!
//! Provides endpoints for:
//! - Service registration and dashboards
//! - Artifact registration and listing
//! - Deploy and rollback
//! - Approval listing and decisions
//! - Health, readiness and metrics

mod approvals;
mod artifacts;
mod services;

use std::convert::Infallible;
use std::fmt::Write as _;
use std::sync::Arc;

use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use crate::plane::ControlPlane;

pub use approvals::{ApprovalQuery, ApprovalResponse};
pub use services::{DeployBody, RegisterServiceBody, RollbackBody};

/// Header carrying the caller identity resolved upstream.
pub const REQUESTED_BY_HEADER: &str = "x-requested-by";

/// Shared application state for the control service.
#[derive(Clone)]
pub struct AppState {
    /// The control plane behind every endpoint.
    pub plane: Arc<ControlPlane>,
}

/// Creates the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics))
        // Services
        .route(
            "/services",
            get(services::list_services).post(services::register_service),
        )
        .route("/services/{name}/dashboard", get(services::dashboard))
        .route("/services/{name}/environments", get(services::environments))
        .route("/services/{name}/artifacts", get(artifacts::list_artifacts))
        .route("/services/{name}/deploy", post(services::deploy))
        .route("/services/{name}/rollback", post(services::rollback))
        // Artifacts
        .route("/artifacts", post(artifacts::register_artifact))
        // Approvals
        .route("/approvals", get(approvals::list_approvals))
        .route("/approvals/{id}/approve", post(approvals::approve))
        .route("/approvals/{id}/reject", post(approvals::reject))
        .route("/approvals/{id}/apply", post(approvals::apply))
        .with_state(state)
}

/// Caller identity taken from the `X-Requested-By` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestedBy(pub String);

impl<S: Send + Sync> FromRequestParts<S> for RequestedBy {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let caller = parts
            .headers
            .get(REQUESTED_BY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or("anonymous");
        Ok(Self(caller.to_owned()))
    }
}

/// Health check endpoint.
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

/// Readiness check endpoint.
async fn readiness_check(State(state): State<AppState>) -> Json<ReadyResponse> {
    let pending = state
        .plane
        .gate()
        .count_by_status()
        .iter()
        .find(|(s, _)| *s == crate::approval::ApprovalStatus::Pending)
        .map_or(0, |(_, n)| *n);

    Json(ReadyResponse {
        ready: true,
        services: state.plane.registry().len(),
        pending_approvals: pending,
    })
}

/// Metrics endpoint.
async fn metrics(State(state): State<AppState>) -> String {
    let mut output = String::new();

    output.push_str("# HELP shipyard_services_total Number of registered services\n");
    output.push_str("# TYPE shipyard_services_total gauge\n");
    let _ = writeln!(
        output,
        "shipyard_services_total {}",
        state.plane.registry().len()
    );

    output.push_str("# HELP shipyard_environments Number of environments by status\n");
    output.push_str("# TYPE shipyard_environments gauge\n");
    for (status, count) in state.plane.state().count_by_status() {
        let _ = writeln!(
            output,
            "shipyard_environments{{status=\"{status}\"}} {count}"
        );
    }

    output.push_str("# HELP shipyard_approvals Number of approval requests by status\n");
    output.push_str("# TYPE shipyard_approvals gauge\n");
    for (status, count) in state.plane.gate().count_by_status() {
        let _ = writeln!(output, "shipyard_approvals{{status=\"{status}\"}} {count}");
    }

    output
}

/// Health response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Readiness response.
#[derive(Serialize)]
struct ReadyResponse {
    ready: bool,
    services: usize,
    pending_approvals: usize,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::config::DashboardConfig;
    use crate::executor::NoopExecutor;
    use crate::types::EnvironmentSet;

    fn make_app_state() -> AppState {
        let plane = ControlPlane::new(
            EnvironmentSet::default(),
            Arc::new(NoopExecutor),
            &DashboardConfig::default(),
        );
        plane.register_service("orders", None).unwrap();
        AppState {
            plane: Arc::new(plane),
        }
    }

    async fn get_body(uri: &str) -> (StatusCode, String) {
        let response = router(make_app_state())
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn health_endpoint() {
        let (status, body) = get_body("/health").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("healthy"));
    }

    #[tokio::test]
    async fn ready_endpoint() {
        let (status, body) = get_body("/ready").await;
        assert_eq!(status, StatusCode::OK);
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["services"], 1);
        assert_eq!(value["pending_approvals"], 0);
    }

    #[tokio::test]
    async fn metrics_endpoint() {
        let (status, body) = get_body("/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("shipyard_services_total 1"));
        assert!(body.contains("shipyard_environments{status=\"not_deployed\"} 3"));
        assert!(body.contains("shipyard_approvals{status=\"pending\"} 0"));
    }

    #[tokio::test]
    async fn requested_by_defaults_to_anonymous() {
        let (mut parts, ()) = Request::builder()
            .uri("/")
            .body(())
            .unwrap()
            .into_parts();
        let RequestedBy(caller) = RequestedBy::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(caller, "anonymous");

        let (mut parts, ()) = Request::builder()
            .uri("/")
            .header(REQUESTED_BY_HEADER, "alice")
            .body(())
            .unwrap()
            .into_parts();
        let RequestedBy(caller) = RequestedBy::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(caller, "alice");
    }
}
