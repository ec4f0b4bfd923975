//! Per-target deployment state.
//!
//! `status == deploying` is the operation lock for a target: it is taken by
//! [`EnvironmentState::begin_transition`] and released by `commit`, `abort`
//! or `release`.
//! Taking the lock is a compare-and-set under the target's map entry, so two
//! callers can never both observe the target as free. Targets never contend
//! with each other.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::error::{ControlError, ControlResult};
use crate::types::{Environment, EnvironmentStatus, Target};

/// Proof that the caller holds a target's operation lock.
///
/// Consumed by [`EnvironmentState::commit`], [`EnvironmentState::abort`] or
/// [`EnvironmentState::release`].
#[derive(Debug)]
#[must_use = "a transition must be committed, aborted or released"]
pub struct Transition {
    target: Target,
    previous_version: Option<String>,
    previous_status: EnvironmentStatus,
    previous_updated_at: DateTime<Utc>,
}

impl Transition {
    /// The locked target.
    #[must_use]
    pub const fn target(&self) -> &Target {
        &self.target
    }

    /// The active version when the lock was taken. Stable until the lock is
    /// released.
    #[must_use]
    pub fn previous_version(&self) -> Option<&str> {
        self.previous_version.as_deref()
    }
}

/// Current status and version of every known target.
#[derive(Debug, Default)]
pub struct EnvironmentState {
    targets: DashMap<Target, Environment>,
}

impl EnvironmentState {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a target known at `not_deployed`. Existing state is kept.
    pub fn initialize(&self, target: &Target) -> Environment {
        self.targets
            .entry(target.clone())
            .or_insert_with(|| Environment::not_deployed(target))
            .clone()
    }

    /// Snapshot of a target.
    pub fn get(&self, target: &Target) -> ControlResult<Environment> {
        self.targets
            .get(target)
            .map(|env| env.clone())
            .ok_or_else(|| unknown_target(target))
    }

    /// Take the operation lock for a target.
    ///
    /// Fails with `Conflict` if an operation is already in flight.
    pub fn begin_transition(&self, target: &Target) -> ControlResult<Transition> {
        let mut env = self
            .targets
            .get_mut(target)
            .ok_or_else(|| unknown_target(target))?;

        if env.status == EnvironmentStatus::Deploying {
            return Err(ControlError::conflict(format!(
                "an operation is already in progress for {target}"
            )));
        }

        let transition = Transition {
            target: target.clone(),
            previous_version: env.current_version.clone(),
            previous_status: env.status,
            previous_updated_at: env.updated_at,
        };
        env.status = EnvironmentStatus::Deploying;
        env.updated_at = Utc::now();
        debug!(service = %target.service, environment = %target.environment, "lock acquired");

        Ok(transition)
    }

    /// Release the lock with a final status.
    ///
    /// `Success` requires a version, which becomes the active version.
    /// `Failed` leaves the active version unchanged.
    pub fn commit(
        &self,
        transition: Transition,
        status: EnvironmentStatus,
        version: Option<&str>,
    ) -> ControlResult<Environment> {
        let version = match (status, version) {
            (EnvironmentStatus::Success, Some(v)) => Some(v.to_owned()),
            (EnvironmentStatus::Success, None) => {
                // A rejected commit still releases the lock.
                self.abort(transition)?;
                return Err(ControlError::internal("successful commit without a version"));
            }
            (EnvironmentStatus::Failed, _) => None,
            (other, _) => {
                self.abort(transition)?;
                return Err(ControlError::internal(format!(
                    "cannot commit with status {other}"
                )));
            }
        };

        let target = transition.target;
        let mut env = self
            .targets
            .get_mut(&target)
            .ok_or_else(|| unknown_target(&target))?;

        let now = Utc::now();
        env.status = status;
        env.updated_at = now;
        if let Some(version) = version {
            env.current_version = Some(version);
            env.last_deployed_at = Some(now);
        }

        info!(
            service = %target.service,
            environment = %target.environment,
            status = %env.status,
            version = env.current_version.as_deref().unwrap_or("-"),
            "transition committed"
        );
        Ok(env.clone())
    }

    /// Release the lock after a failure. The active version is unchanged.
    pub fn abort(&self, transition: Transition) -> ControlResult<Environment> {
        let target = transition.target;
        let mut env = self
            .targets
            .get_mut(&target)
            .ok_or_else(|| unknown_target(&target))?;

        env.status = EnvironmentStatus::Failed;
        env.updated_at = Utc::now();

        warn!(
            service = %target.service,
            environment = %target.environment,
            version = env.current_version.as_deref().unwrap_or("-"),
            "transition aborted"
        );
        Ok(env.clone())
    }

    /// Release the lock without an attempt. The target returns to the status
    /// it had before [`EnvironmentState::begin_transition`].
    pub fn release(&self, transition: Transition) -> ControlResult<Environment> {
        let target = transition.target;
        let mut env = self
            .targets
            .get_mut(&target)
            .ok_or_else(|| unknown_target(&target))?;

        env.status = transition.previous_status;
        env.updated_at = transition.previous_updated_at;

        debug!(service = %target.service, environment = %target.environment, "lock released");
        Ok(env.clone())
    }

    /// Number of targets in each status.
    #[must_use]
    pub fn count_by_status(&self) -> [(EnvironmentStatus, usize); 4] {
        let mut counts = EnvironmentStatus::ALL.map(|s| (s, 0));
        for env in &self.targets {
            if let Some((_, n)) = counts.iter_mut().find(|(s, _)| *s == env.status) {
                *n += 1;
            }
        }
        counts
    }
}

fn unknown_target(target: &Target) -> ControlError {
    ControlError::not_found(format!("unknown service/environment {target}"))
}
