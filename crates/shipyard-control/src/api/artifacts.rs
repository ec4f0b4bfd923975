//! Artifact endpoints.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tracing::instrument;

use super::AppState;
use crate::catalog::ArtifactEvent;
use crate::error::ControlResult;
use crate::types::{Artifact, Target};

/// Query for `GET /services/{name}/artifacts`.
#[derive(Debug, Deserialize)]
pub struct ArtifactQuery {
    /// Environment to list.
    pub environment: String,
}

/// List artifacts of one environment, newest first.
#[instrument(skip(state, query))]
pub async fn list_artifacts(
    State(state): State<AppState>,
    Path(name): Path<String>,
    query: Result<Query<ArtifactQuery>, QueryRejection>,
) -> ControlResult<Json<Vec<Artifact>>> {
    let Query(query) = query?;
    state.plane.registry().get(&name)?;
    state
        .plane
        .catalog()
        .list_versions(&Target::new(name, query.environment))
        .map(Json)
}

/// Register an artifact reported by a pipeline.
#[instrument(skip(state, payload))]
pub async fn register_artifact(
    State(state): State<AppState>,
    payload: Result<Json<ArtifactEvent>, JsonRejection>,
) -> ControlResult<(StatusCode, Json<Artifact>)> {
    let Json(event) = payload?;
    let artifact = state.plane.register_artifact(event)?;
    Ok((StatusCode::CREATED, Json(artifact)))
}
