//! Configuration for shipyard-control.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{ControlError, ControlResult};
use crate::types::{validate_name, EnvironmentSet, ENVIRONMENT_NAME_MAX};

/// Top-level configuration for the control service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Deployment targets every service may use.
    #[serde(default = "default_environments")]
    pub environments: Vec<EnvironmentConfig>,

    /// Deployment executor configuration.
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Dashboard configuration.
    #[serde(default)]
    pub dashboard: DashboardConfig,

    /// Services registered at startup.
    #[serde(default)]
    pub services: Vec<ServiceSeed>,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            environments: default_environments(),
            executor: ExecutorConfig::default(),
            dashboard: DashboardConfig::default(),
            services: Vec::new(),
        }
    }
}

impl ControlConfig {
    /// Load configuration from the default sources.
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. `shipyard.toml` in the current directory (if present)
    /// 3. Environment variables with `SHIPYARD_` prefix
    pub fn load() -> ControlResult<Self> {
        Self::from_file("shipyard.toml")
    }

    /// Load configuration from a specific TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> ControlResult<Self> {
        Self::extract(
            Figment::from(Serialized::defaults(Self::default()))
                .merge(Toml::file(path.as_ref()))
                .merge(Env::prefixed("SHIPYARD_").split("__")),
        )
    }

    /// Parse configuration from a TOML string on top of the defaults.
    pub fn from_toml(toml: &str) -> ControlResult<Self> {
        Self::extract(
            Figment::from(Serialized::defaults(Self::default())).merge(Toml::string(toml)),
        )
    }

    fn extract(figment: Figment) -> ControlResult<Self> {
        let config: Self = figment
            .extract()
            .map_err(|e| ControlError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> ControlResult<()> {
        if self.environments.is_empty() {
            return Err(ControlError::Config(
                "at least one environment must be configured".to_owned(),
            ));
        }

        let mut seen = HashSet::new();
        for env in &self.environments {
            validate_name("environment", &env.name, ENVIRONMENT_NAME_MAX)
                .map_err(|e| ControlError::Config(e.to_string()))?;
            if !seen.insert(env.name.as_str()) {
                return Err(ControlError::Config(format!(
                    "environment {} is configured twice",
                    env.name
                )));
            }
        }

        if self.executor.kind == ExecutorKind::Webhook && self.executor.url.is_none() {
            return Err(ControlError::Config(
                "executor.url is required for the webhook executor".to_owned(),
            ));
        }

        if self.dashboard.refresh_interval_secs == 0 {
            return Err(ControlError::Config(
                "dashboard.refresh_interval_secs must be positive".to_owned(),
            ));
        }

        Ok(())
    }

    /// Build the environment set from the configured environments.
    #[must_use]
    pub fn environment_set(&self) -> EnvironmentSet {
        EnvironmentSet::new(self.environments.clone())
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8080)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

/// A configured deployment target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Environment name (e.g. "dev").
    pub name: String,

    /// Whether deployments to this environment require approval.
    #[serde(default)]
    pub production: bool,

    /// CI branch the executor deploys from. Defaults to the environment name.
    #[serde(default)]
    pub branch: Option<String>,
}

impl EnvironmentConfig {
    /// Create a non-production environment.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            production: false,
            branch: None,
        }
    }

    /// Mark the environment as production-classified.
    #[must_use]
    pub const fn production(mut self) -> Self {
        self.production = true;
        self
    }

    /// Set the CI branch.
    #[must_use]
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// The branch the executor should target.
    #[must_use]
    pub fn branch(&self) -> &str {
        self.branch.as_deref().unwrap_or(&self.name)
    }
}

fn default_environments() -> Vec<EnvironmentConfig> {
    vec![
        EnvironmentConfig::new("dev"),
        EnvironmentConfig::new("test"),
        EnvironmentConfig::new("prod")
            .production()
            .with_branch("master"),
    ]
}

/// Deployment executor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Which executor to use.
    #[serde(default)]
    pub kind: ExecutorKind,

    /// CI webhook URL (webhook executor only).
    #[serde(default)]
    pub url: Option<String>,

    /// Bearer token sent with webhook requests.
    #[serde(default)]
    pub token: Option<String>,

    /// Webhook request timeout in seconds.
    #[serde(default = "default_executor_timeout_secs")]
    pub timeout_secs: u64,
}

const fn default_executor_timeout_secs() -> u64 {
    30
}

impl ExecutorConfig {
    /// Webhook request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            kind: ExecutorKind::default(),
            url: None,
            token: None,
            timeout_secs: default_executor_timeout_secs(),
        }
    }
}

/// Type of deployment executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorKind {
    /// Log the trigger and report success.
    #[default]
    Noop,

    /// POST the trigger to a CI webhook.
    Webhook,
}

/// Dashboard configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// How often long-lived observers refresh (seconds).
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    /// Number of recent artifacts shown per environment.
    #[serde(default = "default_recent_artifacts")]
    pub recent_artifacts: usize,
}

const fn default_refresh_interval_secs() -> u64 {
    5
}

const fn default_recent_artifacts() -> usize {
    10
}

impl DashboardConfig {
    /// Refresh interval for dashboard watchers.
    #[must_use]
    pub const fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval_secs(),
            recent_artifacts: default_recent_artifacts(),
        }
    }
}

/// A service registered when the control service starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSeed {
    /// Service name.
    pub name: String,

    /// Environments for the service. Empty means all configured environments.
    #[serde(default)]
    pub environments: Vec<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ControlConfig::default();
        config.validate().unwrap();
        assert_eq!(config.server.listen_addr.port(), 8080);
        assert_eq!(config.executor.kind, ExecutorKind::Noop);
        assert_eq!(config.dashboard.recent_artifacts, 10);

        let set = config.environment_set();
        assert!(set.is_production("prod"));
        assert!(!set.is_production("dev"));
        assert_eq!(set.get("prod").unwrap().branch(), "master");
        assert_eq!(set.get("test").unwrap().branch(), "test");
    }

    #[test]
    fn config_from_toml() {
        let toml = r#"
            [server]
            listen_addr = "127.0.0.1:9000"

            [[environments]]
            name = "staging"

            [[environments]]
            name = "live"
            production = true
            branch = "main"

            [executor]
            kind = "webhook"
            url = "http://ci.internal/hooks/deploy"
            timeout_secs = 5

            [[services]]
            name = "orders"
        "#;

        let config = ControlConfig::from_toml(toml).unwrap();
        assert_eq!(config.server.listen_addr.port(), 9000);
        assert_eq!(config.environments.len(), 2);
        assert!(config.environment_set().is_production("live"));
        assert_eq!(config.executor.kind, ExecutorKind::Webhook);
        assert_eq!(config.executor.timeout(), Duration::from_secs(5));
        assert_eq!(config.services[0].name, "orders");
        assert!(config.services[0].environments.is_empty());
    }

    #[test]
    fn webhook_requires_url() {
        let toml = r#"
            [executor]
            kind = "webhook"
        "#;

        let err = ControlConfig::from_toml(toml).unwrap_err();
        assert!(err.to_string().contains("executor.url"));
    }

    #[test]
    fn duplicate_environments_rejected() {
        let mut config = ControlConfig::default();
        config.environments.push(EnvironmentConfig::new("dev"));
        assert!(matches!(config.validate(), Err(ControlError::Config(_))));
    }

    #[test]
    fn empty_environment_set_rejected() {
        let mut config = ControlConfig::default();
        config.environments.clear();
        assert!(matches!(config.validate(), Err(ControlError::Config(_))));
    }
}
