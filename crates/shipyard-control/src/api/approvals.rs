//! Approval endpoints.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::{AppState, RequestedBy};
use crate::approval::{ApprovalRequest, ApprovalStatus};
use crate::error::ControlResult;
use crate::types::{ApprovalId, Environment};

/// Query for `GET /approvals`.
#[derive(Debug, Default, Deserialize)]
pub struct ApprovalQuery {
    /// Only requests for this environment.
    pub environment: Option<String>,
    /// Only requests in this status.
    pub status: Option<ApprovalStatus>,
}

/// Result of approving (and applying) a request.
#[derive(Debug, Serialize)]
pub struct ApprovalResponse {
    /// The approval after the decision.
    pub approval: ApprovalRequest,
    /// The target environment after the apply.
    pub environment: Environment,
}

/// List approvals: pending oldest first, then decided most recent first.
pub async fn list_approvals(
    State(state): State<AppState>,
    query: Result<Query<ApprovalQuery>, QueryRejection>,
) -> ControlResult<Json<Vec<ApprovalRequest>>> {
    let Query(query) = query?;
    let gate = state.plane.gate();
    let environment = query.environment.as_deref();

    let mut approvals = Vec::new();
    if matches!(query.status, None | Some(ApprovalStatus::Pending)) {
        approvals.extend(gate.list_pending(environment));
    }
    if query.status != Some(ApprovalStatus::Pending) {
        approvals.extend(
            gate.list_history(environment)
                .into_iter()
                .filter(|a| query.status.map_or(true, |s| a.status == s)),
        );
    }
    Ok(Json(approvals))
}

/// Approve a request and apply the deployment.
#[instrument(skip(state))]
pub async fn approve(
    State(state): State<AppState>,
    Path(id): Path<String>,
    RequestedBy(caller): RequestedBy,
) -> ControlResult<Json<ApprovalResponse>> {
    let id = ApprovalId::new(id);
    info!(approval_id = %id, decided_by = %caller, "approval granted via API");
    let (approval, environment) = state.plane.approve(&id).await?;
    Ok(Json(ApprovalResponse {
        approval,
        environment,
    }))
}

/// Reject a request.
#[instrument(skip(state))]
pub async fn reject(
    State(state): State<AppState>,
    Path(id): Path<String>,
    RequestedBy(caller): RequestedBy,
) -> ControlResult<Json<ApprovalRequest>> {
    let id = ApprovalId::new(id);
    info!(approval_id = %id, decided_by = %caller, "approval rejected via API");
    state.plane.reject(&id).map(Json)
}

/// Retry applying an approved request.
#[instrument(skip(state))]
pub async fn apply(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ControlResult<Json<ApprovalResponse>> {
    let (approval, environment) = state.plane.apply(&ApprovalId::new(id)).await?;
    Ok(Json(ApprovalResponse {
        approval,
        environment,
    }))
}
