//! Read-only dashboard views.
//!
//! A dashboard is composed fresh on every call from the registry, the
//! environment state and the artifact catalog. Nothing is cached between
//! calls, so a snapshot never shows a stale transition.

mod watcher;

pub use watcher::{DashboardFrame, DashboardWatcher};

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::catalog::ArtifactCatalog;
use crate::environment::EnvironmentState;
use crate::error::ControlResult;
use crate::registry::ServiceRegistry;
use crate::types::{Artifact, Environment, Target};

/// Everything an observer needs to render one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDashboard {
    /// Service name.
    pub service_name: String,
    /// Environment state keyed by environment name.
    pub environments: BTreeMap<String, Environment>,
    /// Newest artifacts keyed by environment name.
    pub recent_artifacts: BTreeMap<String, Vec<Artifact>>,
    /// When the snapshot was taken.
    pub generated_at: DateTime<Utc>,
}

/// Composes dashboards from the live components.
#[derive(Debug, Clone)]
pub struct DashboardAggregator {
    registry: Arc<ServiceRegistry>,
    state: Arc<EnvironmentState>,
    catalog: Arc<ArtifactCatalog>,
    recent_limit: usize,
}

impl DashboardAggregator {
    /// Create an aggregator showing `recent_limit` artifacts per environment.
    #[must_use]
    pub const fn new(
        registry: Arc<ServiceRegistry>,
        state: Arc<EnvironmentState>,
        catalog: Arc<ArtifactCatalog>,
        recent_limit: usize,
    ) -> Self {
        Self {
            registry,
            state,
            catalog,
            recent_limit,
        }
    }

    /// Snapshot a service. Fails with `NotFound` if the service is unknown.
    pub fn snapshot(&self, service: &str) -> ControlResult<ServiceDashboard> {
        let registered = self.registry.get(service)?;

        let mut environments = BTreeMap::new();
        let mut recent_artifacts = BTreeMap::new();
        for name in registered.environments {
            let target = Target::new(service, &name);
            environments.insert(name.clone(), self.state.get(&target)?);
            recent_artifacts.insert(name, self.catalog.recent(&target, self.recent_limit)?);
        }

        Ok(ServiceDashboard {
            service_name: registered.service_name,
            environments,
            recent_artifacts,
            generated_at: Utc::now(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::catalog::ArtifactEvent;
    use crate::error::ControlError;
    use crate::types::{ArtifactType, DeploymentAction, EnvironmentSet, EnvironmentStatus};

    fn aggregator(
        limit: usize,
    ) -> (DashboardAggregator, Arc<EnvironmentState>, Arc<ArtifactCatalog>) {
        let registry = Arc::new(ServiceRegistry::new());
        let state = Arc::new(EnvironmentState::new());
        let catalog = Arc::new(ArtifactCatalog::new());
        registry
            .register(
                "orders",
                vec!["dev".to_owned(), "prod".to_owned()],
                &EnvironmentSet::default(),
                |service| {
                    for env in &service.environments {
                        let target = Target::new(&service.service_name, env);
                        state.initialize(&target);
                        catalog.initialize(&target);
                    }
                },
            )
            .unwrap();
        let aggregator =
            DashboardAggregator::new(registry, Arc::clone(&state), Arc::clone(&catalog), limit);
        (aggregator, state, catalog)
    }

    fn event(version: &str) -> ArtifactEvent {
        ArtifactEvent {
            service_name: "orders".to_owned(),
            environment: "dev".to_owned(),
            version: version.to_owned(),
            artifact_id: format!("img-{version}"),
            artifact_type: ArtifactType::Docker,
            commit_sha: None,
            pipeline: None,
            action: DeploymentAction::Deploy,
            status: "success".to_owned(),
        }
    }

    #[test]
    fn new_service_shows_not_deployed() {
        let (aggregator, _, _) = aggregator(10);
        let dashboard = aggregator.snapshot("orders").unwrap();
        assert_eq!(dashboard.environments.len(), 2);
        assert!(dashboard
            .environments
            .values()
            .all(|e| e.status == EnvironmentStatus::NotDeployed));
        assert!(dashboard.recent_artifacts["prod"].is_empty());
    }

    #[test]
    fn reflects_latest_state_and_limits_artifacts() {
        let (aggregator, state, catalog) = aggregator(2);
        for v in ["v1", "v2", "v3"] {
            catalog.register(event(v)).unwrap();
        }
        let dev = Target::new("orders", "dev");
        let t = state.begin_transition(&dev).unwrap();
        assert_eq!(
            aggregator.snapshot("orders").unwrap().environments["dev"].status,
            EnvironmentStatus::Deploying
        );
        state.commit(t, EnvironmentStatus::Success, Some("v3")).unwrap();

        let dashboard = aggregator.snapshot("orders").unwrap();
        assert_eq!(
            dashboard.environments["dev"].current_version.as_deref(),
            Some("v3")
        );
        assert_eq!(dashboard.recent_artifacts["dev"].len(), 2);
    }

    #[test]
    fn unknown_service_is_not_found() {
        let (aggregator, _, _) = aggregator(10);
        assert!(matches!(
            aggregator.snapshot("ghost"),
            Err(ControlError::NotFound(_))
        ));
    }

    #[test]
    fn serialises_camel_case() {
        let (aggregator, _, _) = aggregator(10);
        let value = serde_json::to_value(aggregator.snapshot("orders").unwrap()).unwrap();
        assert_eq!(value["serviceName"], "orders");
        assert_eq!(value["environments"]["dev"]["status"], "not_deployed");
        assert!(value["recentArtifacts"]["dev"].as_array().unwrap().is_empty());
    }
}
