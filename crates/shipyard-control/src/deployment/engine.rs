//! Core deploy and rollback orchestration.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::approval::{ApprovalGate, ApprovalRequest};
use crate::catalog::ArtifactCatalog;
use crate::environment::EnvironmentState;
use crate::error::{ControlError, ControlResult};
use crate::executor::{DeploymentExecutor, ExecutionRequest};
use crate::types::{
    ApprovalId, DeploymentAction, DeploymentOutcome, DeploymentRequest, Environment,
    EnvironmentSet, EnvironmentStatus, Target,
};

/// Orchestrates deploys and rollbacks.
///
/// Non-production requests run immediately. Production requests become
/// approval requests and run later through
/// [`DeploymentEngine::apply_approved_deployment`]. The target lock is only
/// taken while the executor runs, never while a request waits for a decision.
pub struct DeploymentEngine {
    catalog: Arc<ArtifactCatalog>,
    state: Arc<EnvironmentState>,
    gate: Arc<ApprovalGate>,
    executor: Arc<dyn DeploymentExecutor>,
    environments: Arc<EnvironmentSet>,
}

impl DeploymentEngine {
    /// Create a new deployment engine.
    pub fn new(
        catalog: Arc<ArtifactCatalog>,
        state: Arc<EnvironmentState>,
        gate: Arc<ApprovalGate>,
        executor: Arc<dyn DeploymentExecutor>,
        environments: Arc<EnvironmentSet>,
    ) -> Self {
        Self {
            catalog,
            state,
            gate,
            executor,
            environments,
        }
    }

    /// Deploy `version` to a target.
    pub async fn deploy(
        &self,
        target: Target,
        version: impl Into<String>,
        requested_by: impl Into<String>,
    ) -> ControlResult<DeploymentOutcome> {
        self.submit(DeploymentRequest::deploy(target, version, requested_by))
            .await
    }

    /// Roll a target back to `version`.
    ///
    /// Fails with `InvalidArgument` if `version` is already active.
    pub async fn rollback(
        &self,
        target: Target,
        version: impl Into<String>,
        requested_by: impl Into<String>,
    ) -> ControlResult<DeploymentOutcome> {
        self.submit(DeploymentRequest::rollback(target, version, requested_by))
            .await
    }

    /// Validate a request and either run it or hand it to the approval gate.
    pub async fn submit(&self, request: DeploymentRequest) -> ControlResult<DeploymentOutcome> {
        let target = &request.target;
        self.environments.require(&target.environment)?;
        let current = self.state.get(target)?;

        if !self.catalog.exists(target, &request.version)? {
            return Err(ControlError::not_found(format!(
                "version {} does not exist for {target}",
                request.version
            )));
        }

        // Early rejection only; `execute` repeats the check under the lock.
        if request.action == DeploymentAction::Rollback {
            let active = current.current_version.as_deref();
            ensure_changes_version(target, active, &request.version)?;
        }

        if self.environments.is_production(&target.environment) {
            if current.status == EnvironmentStatus::Deploying {
                return Err(ControlError::conflict(format!(
                    "an operation is already in progress for {target}"
                )));
            }
            let approval = self.gate.submit(&request)?;
            return Ok(DeploymentOutcome::Pending { approval });
        }

        let environment = self.execute(&request).await?;
        Ok(DeploymentOutcome::Completed { environment })
    }

    /// Run an approved production request.
    ///
    /// Each approval is applied at most once. If the target is busy or the
    /// rollback is no longer a change, the claim is released and the apply
    /// may be retried. An executor failure consumes the approval.
    pub async fn apply_approved_deployment(&self, id: &ApprovalId) -> ControlResult<Environment> {
        let approval = self.gate.claim(id)?;

        let result = self.apply_claimed(&approval).await;
        match &result {
            Ok(_) | Err(ControlError::ExecutorFailure(_)) => {
                self.gate.mark_applied(id)?;
            }
            Err(e) => {
                warn!(approval_id = %id, error = %e, "approved deployment not applied");
                self.gate.release(id);
            }
        }
        result
    }

    async fn apply_claimed(&self, approval: &ApprovalRequest) -> ControlResult<Environment> {
        let request = DeploymentRequest {
            target: approval.target(),
            version: approval.target_version.clone(),
            action: approval.action,
            requested_by: approval.requested_by.clone(),
            requested_at: approval.created_at,
        };

        info!(approval_id = %approval.id, "applying approved deployment");
        self.execute(&request).await
    }

    /// Resolve an omitted version to the newest artifact for the target.
    pub fn resolve_version(
        &self,
        target: &Target,
        version: Option<String>,
    ) -> ControlResult<String> {
        match version {
            Some(version) if !version.trim().is_empty() => Ok(version),
            _ => self.catalog.latest(target).map(|a| a.version),
        }
    }

    /// Take the target lock, run the executor and release the lock.
    ///
    /// The executor runs on its own task so that dropping the caller, or a
    /// panic inside the executor, still ends in `commit` or `abort`.
    async fn execute(&self, request: &DeploymentRequest) -> ControlResult<Environment> {
        let config = self.environments.require(&request.target.environment)?;
        let transition = self.state.begin_transition(&request.target)?;

        // The active version may have moved since the request was validated.
        if request.action == DeploymentAction::Rollback {
            if let Err(e) = ensure_changes_version(
                &request.target,
                transition.previous_version(),
                &request.version,
            ) {
                self.state.release(transition)?;
                return Err(e);
            }
        }

        let execution = ExecutionRequest {
            service_name: request.target.service.clone(),
            environment: request.target.environment.clone(),
            branch: config.branch().to_owned(),
            version: request.version.clone(),
            action: request.action,
            requested_by: request.requested_by.clone(),
        };

        info!(
            service = %execution.service_name,
            environment = %execution.environment,
            version = %execution.version,
            action = %execution.action,
            executor = self.executor.name(),
            "starting deployment"
        );

        let state = Arc::clone(&self.state);
        let executor = Arc::clone(&self.executor);
        let task = tokio::spawn(async move {
            let version = execution.version.clone();
            let applied =
                tokio::spawn(async move { executor.apply(&execution).await }).await;

            let failure = match applied {
                Ok(Ok(())) => {
                    return state.commit(transition, EnvironmentStatus::Success, Some(&version));
                }
                Ok(Err(ControlError::ExecutorFailure(msg))) => msg,
                Ok(Err(e)) => e.to_string(),
                Err(join) => format!("executor task failed: {join}"),
            };

            let target = transition.target().clone();
            state.abort(transition)?;
            error!(
                service = %target.service,
                environment = %target.environment,
                version = %version,
                error = %failure,
                "deployment failed"
            );
            Err(ControlError::executor(failure))
        });

        task.await
            .map_err(|e| ControlError::internal(format!("deployment task failed: {e}")))?
    }
}

fn ensure_changes_version(
    target: &Target,
    active: Option<&str>,
    version: &str,
) -> ControlResult<()> {
    if active == Some(version) {
        return Err(ControlError::invalid_argument(format!(
            "{version} is already the active version of {target}"
        )));
    }
    Ok(())
}
