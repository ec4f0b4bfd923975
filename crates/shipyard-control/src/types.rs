//! Core types for shipyard-control.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::EnvironmentConfig;
use crate::error::{ControlError, ControlResult};

/// Maximum length of a service name.
pub const SERVICE_NAME_MAX: usize = 150;

/// Maximum length of an environment name.
pub const ENVIRONMENT_NAME_MAX: usize = 50;

/// Check that a name is non-empty, bounded and uses `[A-Za-z0-9._-]`.
pub fn validate_name(what: &str, value: &str, max: usize) -> ControlResult<()> {
    if value.is_empty() {
        return Err(ControlError::invalid_argument(format!("{what} is required")));
    }
    if value.len() > max {
        return Err(ControlError::invalid_argument(format!(
            "{what} must be at most {max} characters"
        )));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(ControlError::invalid_argument(format!(
            "{what} {value:?} contains invalid characters"
        )));
    }
    Ok(())
}

/// A (service, environment) pair. Each target has its own operation lock.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Target {
    /// Service name.
    pub service: String,
    /// Environment name.
    pub environment: String,
}

impl Target {
    /// Create a new target.
    #[must_use]
    pub fn new(service: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            environment: environment.into(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service, self.environment)
    }
}

/// Unique identifier for an approval request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApprovalId(String);

impl ApprovalId {
    /// Create an approval ID from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a new unique approval ID using ULID.
    #[must_use]
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string().to_lowercase())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApprovalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ApprovalId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The configured deployment targets.
#[derive(Debug, Clone)]
pub struct EnvironmentSet {
    environments: Vec<EnvironmentConfig>,
}

impl EnvironmentSet {
    /// Create a set from configured environments.
    #[must_use]
    pub const fn new(environments: Vec<EnvironmentConfig>) -> Self {
        Self { environments }
    }

    /// Look up an environment by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&EnvironmentConfig> {
        self.environments.iter().find(|e| e.name == name)
    }

    /// Look up an environment, failing with `NotFound` if it is not configured.
    pub fn require(&self, name: &str) -> ControlResult<&EnvironmentConfig> {
        self.get(name)
            .ok_or_else(|| ControlError::not_found(format!("environment {name} is not configured")))
    }

    /// Whether deployments to `name` must pass the approval gate.
    #[must_use]
    pub fn is_production(&self, name: &str) -> bool {
        self.get(name).is_some_and(|e| e.production)
    }

    /// Environment names in configuration order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.environments.iter().map(|e| e.name.clone()).collect()
    }
}

impl Default for EnvironmentSet {
    fn default() -> Self {
        crate::config::ControlConfig::default().environment_set()
    }
}

/// Deployment status of a single environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentStatus {
    /// Nothing has ever been deployed.
    NotDeployed,
    /// An operation holds the target's lock.
    Deploying,
    /// The last operation succeeded.
    Success,
    /// The last operation failed.
    Failed,
}

impl EnvironmentStatus {
    /// All statuses, for reporting.
    pub const ALL: [Self; 4] = [
        Self::NotDeployed,
        Self::Deploying,
        Self::Success,
        Self::Failed,
    ];

    /// Get the status name as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotDeployed => "not_deployed",
            Self::Deploying => "deploying",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for EnvironmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EnvironmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_deployed" => Ok(Self::NotDeployed),
            "deploying" => Ok(Self::Deploying),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("unknown environment status: {s}")),
        }
    }
}

/// Snapshot of one environment of one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    /// Owning service.
    pub service_name: String,
    /// Environment name.
    pub environment_name: String,
    /// Active version; `None` if never deployed.
    pub current_version: Option<String>,
    /// Current status.
    pub status: EnvironmentStatus,
    /// When the active version was deployed.
    pub last_deployed_at: Option<DateTime<Utc>>,
    /// When the status last changed.
    pub updated_at: DateTime<Utc>,
}

impl Environment {
    /// A never-deployed environment.
    #[must_use]
    pub fn not_deployed(target: &Target) -> Self {
        Self {
            service_name: target.service.clone(),
            environment_name: target.environment.clone(),
            current_version: None,
            status: EnvironmentStatus::NotDeployed,
            last_deployed_at: None,
            updated_at: Utc::now(),
        }
    }

    /// The target this environment belongs to.
    #[must_use]
    pub fn target(&self) -> Target {
        Target::new(&self.service_name, &self.environment_name)
    }
}

/// A registered service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    /// Unique service name.
    pub service_name: String,
    /// Environments owned by the service, in registration order.
    pub environments: Vec<String>,
    /// When the service was registered.
    pub created_at: DateTime<Utc>,
}

/// Kind of build product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    /// Container image reference.
    Docker,
    /// Machine image.
    Ami,
}

/// Whether an operation moves forward or back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentAction {
    /// Deploy a version.
    Deploy,
    /// Return to a previously deployed version.
    Rollback,
}

impl DeploymentAction {
    /// Get the action name as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Deploy => "deploy",
            Self::Rollback => "rollback",
        }
    }
}

impl fmt::Display for DeploymentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An immutable, versioned build product scoped to a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    /// Owning service.
    pub service_name: String,
    /// Environment the artifact was built for.
    pub environment: String,
    /// Opaque version string (image tag, AMI id).
    pub version: String,
    /// Pipeline-assigned artifact identifier.
    pub artifact_id: String,
    /// Kind of build product.
    pub artifact_type: ArtifactType,
    /// Source commit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
    /// Pipeline that produced the artifact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<String>,
    /// Pipeline action that produced the artifact.
    pub action: DeploymentAction,
    /// When the artifact was registered.
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    /// The target this artifact belongs to.
    #[must_use]
    pub fn target(&self) -> Target {
        Target::new(&self.service_name, &self.environment)
    }
}

/// A deploy or rollback request. Lives only as long as the operation unless
/// it becomes an approval request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRequest {
    /// Target service and environment.
    pub target: Target,
    /// Version to make active.
    pub version: String,
    /// Forward deploy or rollback.
    pub action: DeploymentAction,
    /// Caller identity, resolved upstream.
    pub requested_by: String,
    /// When the request was made.
    pub requested_at: DateTime<Utc>,
}

impl DeploymentRequest {
    /// Create a deploy request.
    #[must_use]
    pub fn deploy(
        target: Target,
        version: impl Into<String>,
        requested_by: impl Into<String>,
    ) -> Self {
        Self::new(target, version, DeploymentAction::Deploy, requested_by)
    }

    /// Create a rollback request.
    #[must_use]
    pub fn rollback(
        target: Target,
        version: impl Into<String>,
        requested_by: impl Into<String>,
    ) -> Self {
        Self::new(target, version, DeploymentAction::Rollback, requested_by)
    }

    fn new(
        target: Target,
        version: impl Into<String>,
        action: DeploymentAction,
        requested_by: impl Into<String>,
    ) -> Self {
        Self {
            target,
            version: version.into(),
            action,
            requested_by: requested_by.into(),
            requested_at: Utc::now(),
        }
    }
}

/// Result of a deploy or rollback call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeploymentOutcome {
    /// The transition was applied.
    Completed {
        /// Environment after the commit.
        environment: Environment,
    },
    /// The request is waiting for a human decision.
    Pending {
        /// The approval request that gates it.
        approval: crate::approval::ApprovalRequest,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn name_validation() {
        validate_name("service", "orders-api_v2.1", SERVICE_NAME_MAX).unwrap();
        assert!(validate_name("service", "", SERVICE_NAME_MAX).is_err());
        assert!(validate_name("service", "orders/prod", SERVICE_NAME_MAX).is_err());
        assert!(validate_name("service", "has space", SERVICE_NAME_MAX).is_err());
        assert!(validate_name("environment", &"x".repeat(51), ENVIRONMENT_NAME_MAX).is_err());
    }

    #[test]
    fn status_roundtrip() {
        for status in EnvironmentStatus::ALL {
            assert_eq!(status.as_str().parse::<EnvironmentStatus>().unwrap(), status);
        }
        assert!("active".parse::<EnvironmentStatus>().is_err());
    }

    #[test]
    fn environment_serialises_camel_case() {
        let env = Environment::not_deployed(&Target::new("orders", "dev"));
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["serviceName"], "orders");
        assert_eq!(value["status"], "not_deployed");
        assert!(value["currentVersion"].is_null());
    }

    #[test]
    fn target_display() {
        assert_eq!(Target::new("orders", "prod").to_string(), "orders/prod");
    }

    #[test]
    fn approval_ids_are_unique() {
        assert_ne!(ApprovalId::generate(), ApprovalId::generate());
    }
}
