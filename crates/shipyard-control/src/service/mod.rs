//! Service lifecycle management.
//!
//! Provides the main service runner with signal handling and graceful shutdown.

use std::sync::Arc;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::api;
use crate::config::ControlConfig;
use crate::error::{ControlError, ControlResult};
use crate::executor::create_executor;
use crate::plane::ControlPlane;

/// The control service.
///
/// Builds the control plane from configuration, registers the configured
/// services and serves the HTTP API until shutdown.
pub struct ControlService {
    config: ControlConfig,
    cancel: CancellationToken,
}

impl ControlService {
    /// Create a new control service with the given configuration.
    #[must_use]
    pub fn new(config: ControlConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Build the control plane and register the configured services.
    pub fn build_plane(&self) -> ControlResult<Arc<ControlPlane>> {
        let executor = create_executor(&self.config.executor)?;
        info!(executor = executor.name(), "deployment executor configured");

        let plane = ControlPlane::new(
            self.config.environment_set(),
            executor,
            &self.config.dashboard,
        );

        for seed in &self.config.services {
            let environments = (!seed.environments.is_empty()).then(|| seed.environments.clone());
            plane.register_service(&seed.name, environments)?;
        }
        info!(services = self.config.services.len(), "control plane initialised");

        Ok(Arc::new(plane))
    }

    /// Run the control service until a shutdown signal arrives.
    pub async fn run(&self) -> ControlResult<()> {
        let plane = self.build_plane()?;
        let app = api::router(api::AppState { plane });

        let listener = tokio::net::TcpListener::bind(self.config.server.listen_addr)
            .await
            .map_err(|e| ControlError::Config(format!("failed to bind TCP: {e}")))?;

        info!(
            listen_addr = %self.config.server.listen_addr,
            "control service listening"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(self.cancel.clone()))
            .await
            .map_err(|e| ControlError::internal(format!("server error: {e}")))?;

        info!("control service shutdown complete");
        Ok(())
    }

    /// Request graceful shutdown.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            info!("received SIGTERM, initiating shutdown");
        }
        () = cancel.cancelled() => {
            info!("shutdown requested");
        }
    }
}
