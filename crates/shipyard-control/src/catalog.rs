//! Artifact catalog.
//!
//! Tracks the build products available to each (service, environment) pair.
//! Artifacts are append-only: once registered they are never changed or
//! removed. Listings are ordered newest first by `created_at`, with ties
//! broken by version descending so that results are deterministic.

use std::cmp::Ordering;

use chrono::Utc;
use dashmap::DashMap;
use serde::Deserialize;
use tracing::info;

use crate::error::{ControlError, ControlResult};
use crate::types::{Artifact, ArtifactType, DeploymentAction, Target};

/// A pipeline notification that a build product is available.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactEvent {
    /// Owning service.
    pub service_name: String,
    /// Target environment.
    pub environment: String,
    /// Artifact version.
    pub version: String,
    /// Pipeline-assigned artifact identifier.
    pub artifact_id: String,
    /// Kind of build product.
    pub artifact_type: ArtifactType,
    /// Source commit.
    #[serde(default)]
    pub commit_sha: Option<String>,
    /// Producing pipeline.
    #[serde(default)]
    pub pipeline: Option<String>,
    /// Pipeline action.
    #[serde(default = "default_action")]
    pub action: DeploymentAction,
    /// Pipeline outcome. Only `success` is accepted.
    pub status: String,
}

const fn default_action() -> DeploymentAction {
    DeploymentAction::Deploy
}

/// Newest first; equal timestamps fall back to version descending.
fn newest_first(a: &Artifact, b: &Artifact) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| b.version.cmp(&a.version))
}

/// Catalog of artifacts per target.
#[derive(Debug, Default)]
pub struct ArtifactCatalog {
    // Each bucket is kept sorted with `newest_first`.
    artifacts: DashMap<Target, Vec<Artifact>>,
}

impl ArtifactCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a target known to the catalog. Existing artifacts are kept.
    pub fn initialize(&self, target: &Target) {
        self.artifacts.entry(target.clone()).or_default();
    }

    /// Register an artifact reported by a pipeline.
    pub fn register(&self, event: ArtifactEvent) -> ControlResult<Artifact> {
        if event.status != "success" {
            return Err(ControlError::invalid_argument(
                "only successful pipelines are accepted",
            ));
        }

        for (field, value) in [
            ("serviceName", &event.service_name),
            ("environment", &event.environment),
            ("version", &event.version),
            ("artifactId", &event.artifact_id),
        ] {
            if value.trim().is_empty() {
                return Err(ControlError::invalid_argument(format!("{field} is required")));
            }
        }

        let artifact = Artifact {
            service_name: event.service_name,
            environment: event.environment,
            version: event.version,
            artifact_id: event.artifact_id,
            artifact_type: event.artifact_type,
            commit_sha: event.commit_sha,
            pipeline: event.pipeline,
            action: event.action,
            created_at: Utc::now(),
        };

        self.insert(artifact)
    }

    /// Insert a fully-formed artifact.
    ///
    /// Fails with `NotFound` for an unknown target and `Conflict` if the
    /// version is already registered.
    pub fn insert(&self, artifact: Artifact) -> ControlResult<Artifact> {
        let target = artifact.target();
        let mut bucket = self
            .artifacts
            .get_mut(&target)
            .ok_or_else(|| unknown_target(&target))?;

        if bucket.iter().any(|a| a.version == artifact.version) {
            return Err(ControlError::conflict(format!(
                "artifact {} already registered for {target}",
                artifact.version
            )));
        }

        let position = bucket.partition_point(|a| newest_first(a, &artifact) == Ordering::Less);
        bucket.insert(position, artifact.clone());

        info!(
            service = %target.service,
            environment = %target.environment,
            version = %artifact.version,
            artifact_id = %artifact.artifact_id,
            "artifact registered"
        );

        Ok(artifact)
    }

    /// All artifacts for a target, newest first.
    pub fn list_versions(&self, target: &Target) -> ControlResult<Vec<Artifact>> {
        self.artifacts
            .get(target)
            .map(|bucket| bucket.clone())
            .ok_or_else(|| unknown_target(target))
    }

    /// The `limit` newest artifacts for a target.
    pub fn recent(&self, target: &Target, limit: usize) -> ControlResult<Vec<Artifact>> {
        self.artifacts
            .get(target)
            .map(|bucket| bucket.iter().take(limit).cloned().collect())
            .ok_or_else(|| unknown_target(target))
    }

    /// Whether `version` exists for the target.
    pub fn exists(&self, target: &Target, version: &str) -> ControlResult<bool> {
        self.artifacts
            .get(target)
            .map(|bucket| bucket.iter().any(|a| a.version == version))
            .ok_or_else(|| unknown_target(target))
    }

    /// The newest artifact for a target.
    pub fn latest(&self, target: &Target) -> ControlResult<Artifact> {
        let bucket = self
            .artifacts
            .get(target)
            .ok_or_else(|| unknown_target(target))?;

        bucket
            .first()
            .cloned()
            .ok_or_else(|| ControlError::not_found(format!("no artifacts found for {target}")))
    }
}

fn unknown_target(target: &Target) -> ControlError {
    ControlError::not_found(format!("unknown service/environment {target}"))
}
