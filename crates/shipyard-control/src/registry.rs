//! Registry of known services.

use std::collections::HashSet;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::info;

use crate::error::{ControlError, ControlResult};
use crate::types::{validate_name, EnvironmentSet, Service, SERVICE_NAME_MAX};

/// Registered services, keyed by name. Services are never removed.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: DashMap<String, Service>,
}

impl ServiceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service with a subset of the configured environments.
    ///
    /// `on_create` runs exactly once, while the name is reserved, so the
    /// service is never visible before its targets are initialized.
    pub fn register(
        &self,
        name: &str,
        environments: Vec<String>,
        configured: &EnvironmentSet,
        on_create: impl FnOnce(&Service),
    ) -> ControlResult<Service> {
        validate_name("serviceName", name, SERVICE_NAME_MAX)?;

        if environments.is_empty() {
            return Err(ControlError::invalid_argument(
                "a service needs at least one environment",
            ));
        }

        let mut seen = HashSet::new();
        for env in &environments {
            if configured.get(env).is_none() {
                return Err(ControlError::invalid_argument(format!(
                    "environment {env} is not configured"
                )));
            }
            if !seen.insert(env.as_str()) {
                return Err(ControlError::invalid_argument(format!(
                    "environment {env} listed twice"
                )));
            }
        }

        match self.services.entry(name.to_owned()) {
            Entry::Occupied(_) => Err(ControlError::conflict(format!(
                "service {name} already exists"
            ))),
            Entry::Vacant(slot) => {
                let service = Service {
                    service_name: name.to_owned(),
                    environments,
                    created_at: Utc::now(),
                };
                on_create(&service);
                slot.insert(service.clone());

                info!(service = %name, environments = ?service.environments, "service registered");
                Ok(service)
            }
        }
    }

    /// Look up a service.
    pub fn get(&self, name: &str) -> ControlResult<Service> {
        self.services
            .get(name)
            .map(|s| s.clone())
            .ok_or_else(|| ControlError::not_found(format!("service {name} not found")))
    }

    /// All services, sorted by name.
    #[must_use]
    pub fn list(&self) -> Vec<Service> {
        let mut services: Vec<_> = self.services.iter().map(|s| s.value().clone()).collect();
        services.sort_by(|a, b| a.service_name.cmp(&b.service_name));
        services
    }

    /// Environment names of a service, in registration order.
    pub fn environments(&self, name: &str) -> ControlResult<Vec<String>> {
        self.get(name).map(|s| s.environments)
    }

    /// Number of registered services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Whether no services are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::Cell;

    use super::*;

    fn envs(names: &[&str]) -> Vec<String> {
        names.iter().map(|&n| n.to_owned()).collect()
    }

    #[test]
    fn register_and_list() {
        let registry = ServiceRegistry::new();
        let set = EnvironmentSet::default();
        registry
            .register("payments", envs(&["dev", "prod"]), &set, |_| {})
            .unwrap();
        registry
            .register("orders", envs(&["dev"]), &set, |_| {})
            .unwrap();

        let names: Vec<_> = registry
            .list()
            .into_iter()
            .map(|s| s.service_name)
            .collect();
        assert_eq!(names, ["orders", "payments"]);
        assert_eq!(registry.environments("payments").unwrap(), ["dev", "prod"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn duplicate_name_conflicts_and_skips_callback() {
        let registry = ServiceRegistry::new();
        let set = EnvironmentSet::default();
        let calls = Cell::new(0);
        registry
            .register("orders", envs(&["dev"]), &set, |_| calls.set(calls.get() + 1))
            .unwrap();
        let err = registry
            .register("orders", envs(&["dev"]), &set, |_| calls.set(calls.get() + 1))
            .unwrap_err();
        assert!(matches!(err, ControlError::Conflict(_)));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn invalid_input_is_rejected() {
        let registry = ServiceRegistry::new();
        let set = EnvironmentSet::default();
        for (name, environments) in [
            ("", envs(&["dev"])),
            ("bad name", envs(&["dev"])),
            ("orders", envs(&[])),
            ("orders", envs(&["staging"])),
            ("orders", envs(&["dev", "dev"])),
        ] {
            let err = registry
                .register(name, environments, &set, |_| {})
                .unwrap_err();
            assert!(matches!(err, ControlError::InvalidArgument(_)), "{name}: {err}");
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn unknown_service_is_not_found() {
        let registry = ServiceRegistry::new();
        assert!(matches!(
            registry.get("ghost"),
            Err(ControlError::NotFound(_))
        ));
        assert!(matches!(
            registry.environments("ghost"),
            Err(ControlError::NotFound(_))
        ));
    }
}
