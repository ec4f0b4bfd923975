//! Deployment executors.
//!
//! An executor performs the side effect of a deployment: it is the thing that
//! actually ships a version to an environment. The engine treats it as a black
//! box that either succeeds or fails.

mod webhook;

pub use webhook::WebhookExecutor;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{Notify, Semaphore};
use tracing::info;

use crate::config::{ExecutorConfig, ExecutorKind};
use crate::error::{ControlError, ControlResult};
use crate::types::DeploymentAction;

/// What the executor is asked to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    /// Service to deploy.
    pub service_name: String,
    /// Environment to deploy to.
    pub environment: String,
    /// CI branch for the environment.
    pub branch: String,
    /// Version to make active.
    pub version: String,
    /// Deploy or rollback.
    pub action: DeploymentAction,
    /// Who asked for the deployment.
    pub requested_by: String,
}

/// Trait for deployment executor implementations.
#[async_trait]
pub trait DeploymentExecutor: Send + Sync {
    /// Apply a deployment. Any error marks the attempt as failed.
    async fn apply(&self, request: &ExecutionRequest) -> ControlResult<()>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Create an executor from configuration.
pub fn create_executor(config: &ExecutorConfig) -> ControlResult<Arc<dyn DeploymentExecutor>> {
    match config.kind {
        ExecutorKind::Webhook => Ok(Arc::new(WebhookExecutor::new(config)?)),
        ExecutorKind::Noop => Ok(Arc::new(NoopExecutor)),
    }
}

/// Executor that only logs the trigger. Used for local runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopExecutor;

#[async_trait]
impl DeploymentExecutor for NoopExecutor {
    async fn apply(&self, request: &ExecutionRequest) -> ControlResult<()> {
        info!(
            service = %request.service_name,
            environment = %request.environment,
            branch = %request.branch,
            version = %request.version,
            action = %request.action,
            "noop executor: deployment triggered"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

/// Scripted executor for testing.
///
/// Records every request. Can be switched to fail, and can be gated so that
/// each `apply` blocks until [`ScriptedExecutor::release`] hands out a permit.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    failing: AtomicBool,
    gate: Option<Semaphore>,
    started: Notify,
    calls: Mutex<Vec<ExecutionRequest>>,
}

impl ScriptedExecutor {
    /// An executor that succeeds immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An executor that fails every request.
    #[must_use]
    pub fn failing() -> Self {
        let executor = Self::default();
        executor.set_failing(true);
        executor
    }

    /// An executor whose calls block until released.
    #[must_use]
    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    /// Let `n` blocked calls finish.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Switch failure mode.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Requests received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<ExecutionRequest> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Wait until some call has started.
    pub async fn wait_started(&self) {
        self.started.notified().await;
    }
}

#[async_trait]
impl DeploymentExecutor for ScriptedExecutor {
    async fn apply(&self, request: &ExecutionRequest) -> ControlResult<()> {
        self.calls
            .lock()
            .map_err(|_| ControlError::internal("lock poisoned"))?
            .push(request.clone());
        self.started.notify_one();

        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|_| ControlError::internal("executor gate closed"))?;
            permit.forget();
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(ControlError::executor(format!(
                "scripted failure deploying {} to {}",
                request.version, request.environment
            )));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
