//! Wiring of the control plane components.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::approval::{ApprovalGate, ApprovalRequest, Decision};
use crate::catalog::{ArtifactCatalog, ArtifactEvent};
use crate::config::DashboardConfig;
use crate::dashboard::{DashboardAggregator, DashboardWatcher, ServiceDashboard};
use crate::deployment::DeploymentEngine;
use crate::environment::EnvironmentState;
use crate::error::ControlResult;
use crate::executor::DeploymentExecutor;
use crate::registry::ServiceRegistry;
use crate::types::{
    ApprovalId, Artifact, DeploymentOutcome, Environment, EnvironmentSet, Service, Target,
};

/// All components of one control plane, sharing state.
pub struct ControlPlane {
    environments: Arc<EnvironmentSet>,
    registry: Arc<ServiceRegistry>,
    catalog: Arc<ArtifactCatalog>,
    state: Arc<EnvironmentState>,
    gate: Arc<ApprovalGate>,
    engine: DeploymentEngine,
    dashboard: Arc<DashboardAggregator>,
    refresh_interval: Duration,
}

impl ControlPlane {
    /// Build a control plane around an executor.
    pub fn new(
        environments: EnvironmentSet,
        executor: Arc<dyn DeploymentExecutor>,
        dashboard: &DashboardConfig,
    ) -> Self {
        let environments = Arc::new(environments);
        let registry = Arc::new(ServiceRegistry::new());
        let catalog = Arc::new(ArtifactCatalog::new());
        let state = Arc::new(EnvironmentState::new());
        let gate = Arc::new(ApprovalGate::new());

        let engine = DeploymentEngine::new(
            Arc::clone(&catalog),
            Arc::clone(&state),
            Arc::clone(&gate),
            executor,
            Arc::clone(&environments),
        );
        let aggregator = Arc::new(DashboardAggregator::new(
            Arc::clone(&registry),
            Arc::clone(&state),
            Arc::clone(&catalog),
            dashboard.recent_artifacts,
        ));

        Self {
            environments,
            registry,
            catalog,
            state,
            gate,
            engine,
            dashboard: aggregator,
            refresh_interval: dashboard.refresh_interval(),
        }
    }

    /// Register a service. `None` selects every configured environment.
    pub fn register_service(
        &self,
        name: &str,
        environments: Option<Vec<String>>,
    ) -> ControlResult<Service> {
        let environments = environments.unwrap_or_else(|| self.environments.names());
        self.registry
            .register(name, environments, &self.environments, |service| {
                for env in &service.environments {
                    let target = Target::new(&service.service_name, env);
                    self.state.initialize(&target);
                    self.catalog.initialize(&target);
                }
            })
    }

    /// Register an artifact reported by a pipeline.
    pub fn register_artifact(&self, event: ArtifactEvent) -> ControlResult<Artifact> {
        self.catalog.register(event)
    }

    /// Deploy a version; `None` deploys the newest artifact.
    pub async fn deploy(
        &self,
        target: Target,
        version: Option<String>,
        requested_by: &str,
    ) -> ControlResult<DeploymentOutcome> {
        self.registry.get(&target.service)?;
        let version = self.engine.resolve_version(&target, version)?;
        self.engine.deploy(target, version, requested_by).await
    }

    /// Roll back to a version.
    pub async fn rollback(
        &self,
        target: Target,
        version: String,
        requested_by: &str,
    ) -> ControlResult<DeploymentOutcome> {
        self.registry.get(&target.service)?;
        self.engine.rollback(target, version, requested_by).await
    }

    /// Approve a request and apply it.
    ///
    /// The decision is recorded even if the apply then fails; the returned
    /// error carries the apply failure.
    pub async fn approve(&self, id: &ApprovalId) -> ControlResult<(ApprovalRequest, Environment)> {
        let approved = self.gate.decide(id, Decision::Approve)?;
        info!(approval_id = %id, "approval granted, applying");
        let environment = self.engine.apply_approved_deployment(id).await?;
        let approval = self.gate.get(id).unwrap_or(approved);
        Ok((approval, environment))
    }

    /// Reject a request. The target is untouched.
    pub fn reject(&self, id: &ApprovalId) -> ControlResult<ApprovalRequest> {
        self.gate.decide(id, Decision::Reject)
    }

    /// Retry the apply step of an approved request.
    pub async fn apply(&self, id: &ApprovalId) -> ControlResult<(ApprovalRequest, Environment)> {
        let environment = self.engine.apply_approved_deployment(id).await?;
        Ok((self.gate.get(id)?, environment))
    }

    /// Snapshot a service dashboard.
    pub fn dashboard(&self, service: &str) -> ControlResult<ServiceDashboard> {
        self.dashboard.snapshot(service)
    }

    /// Start a refresh task for a service at the configured interval.
    #[must_use]
    pub fn watch(&self, service: &str) -> DashboardWatcher {
        DashboardWatcher::spawn(Arc::clone(&self.dashboard), service, self.refresh_interval)
    }

    /// Configured environments.
    #[must_use]
    pub fn environments(&self) -> &EnvironmentSet {
        &self.environments
    }

    /// Service registry.
    #[must_use]
    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// Artifact catalog.
    #[must_use]
    pub fn catalog(&self) -> &ArtifactCatalog {
        &self.catalog
    }

    /// Environment state.
    #[must_use]
    pub fn state(&self) -> &EnvironmentState {
        &self.state
    }

    /// Approval gate.
    #[must_use]
    pub fn gate(&self) -> &ApprovalGate {
        &self.gate
    }

    /// Deployment engine.
    #[must_use]
    pub const fn engine(&self) -> &DeploymentEngine {
        &self.engine
    }
}
