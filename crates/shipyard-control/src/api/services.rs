//! Service, dashboard and deployment endpoints.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tracing::{info, instrument};

use super::{AppState, RequestedBy};
use crate::dashboard::ServiceDashboard;
use crate::error::ControlResult;
use crate::types::{DeploymentOutcome, Service, Target};

/// Body of `POST /services`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterServiceBody {
    /// Unique service name.
    pub service_name: String,
    /// Environments to create; all configured environments if omitted.
    #[serde(default)]
    pub environments: Option<Vec<String>>,
}

/// Body of `POST /services/{name}/deploy`.
#[derive(Debug, Deserialize)]
pub struct DeployBody {
    /// Target environment.
    pub environment: String,
    /// Version to deploy; the newest artifact if omitted.
    #[serde(default)]
    pub version: Option<String>,
}

/// Body of `POST /services/{name}/rollback`.
#[derive(Debug, Deserialize)]
pub struct RollbackBody {
    /// Target environment.
    pub environment: String,
    /// Version to return to.
    pub version: String,
}

/// List registered services.
pub async fn list_services(State(state): State<AppState>) -> Json<Vec<Service>> {
    Json(state.plane.registry().list())
}

/// Register a service.
#[instrument(skip(state, payload))]
pub async fn register_service(
    State(state): State<AppState>,
    payload: Result<Json<RegisterServiceBody>, JsonRejection>,
) -> ControlResult<(StatusCode, Json<Service>)> {
    let Json(body) = payload?;
    let service = state
        .plane
        .register_service(&body.service_name, body.environments)?;
    Ok((StatusCode::CREATED, Json(service)))
}

/// Dashboard snapshot for a service.
#[instrument(skip(state))]
pub async fn dashboard(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ControlResult<Json<ServiceDashboard>> {
    state.plane.dashboard(&name).map(Json)
}

/// Environment names of a service.
pub async fn environments(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ControlResult<Json<Vec<String>>> {
    state.plane.registry().environments(&name).map(Json)
}

/// Deploy a version to one environment of a service.
#[instrument(skip(state, payload))]
pub async fn deploy(
    State(state): State<AppState>,
    Path(name): Path<String>,
    RequestedBy(caller): RequestedBy,
    payload: Result<Json<DeployBody>, JsonRejection>,
) -> ControlResult<(StatusCode, Json<DeploymentOutcome>)> {
    let Json(body) = payload?;
    info!(service = %name, environment = %body.environment, "deploy requested via API");

    let outcome = state
        .plane
        .deploy(Target::new(name, body.environment), body.version, &caller)
        .await?;
    Ok(respond(outcome))
}

/// Roll one environment of a service back to a version.
#[instrument(skip(state, payload))]
pub async fn rollback(
    State(state): State<AppState>,
    Path(name): Path<String>,
    RequestedBy(caller): RequestedBy,
    payload: Result<Json<RollbackBody>, JsonRejection>,
) -> ControlResult<(StatusCode, Json<DeploymentOutcome>)> {
    let Json(body) = payload?;
    info!(
        service = %name,
        environment = %body.environment,
        version = %body.version,
        "rollback requested via API"
    );

    let outcome = state
        .plane
        .rollback(Target::new(name, body.environment), body.version, &caller)
        .await?;
    Ok(respond(outcome))
}

fn respond(outcome: DeploymentOutcome) -> (StatusCode, Json<DeploymentOutcome>) {
    let status = match outcome {
        DeploymentOutcome::Completed { .. } => StatusCode::OK,
        DeploymentOutcome::Pending { .. } => StatusCode::ACCEPTED,
    };
    (status, Json(outcome))
}
