//! Shipyard control plane.
//!
//! Deployment orchestration for services spread over several environments.
//! The crate tracks artifact versions, serialises deploys and rollbacks per
//! target, and gates every production change behind a human approval.
//!
//! # Components
//!
//! - [`ArtifactCatalog`]: versions available per (service, environment)
//! - [`EnvironmentState`]: current version and status per target; the
//!   `deploying` status doubles as the target's operation lock
//! - [`ApprovalGate`]: pending, approved and rejected production requests
//! - [`DeploymentEngine`]: validates requests, consults the gate and drives
//!   the [`DeploymentExecutor`]
//! - [`DashboardAggregator`]: read-only per-service view
//!
//! # Approval lifecycle
//!
//! ```text
//! Pending ──▶ Approved ──▶ (applied once)
//!    │
//!    ▼
//! Rejected
//! ```
//!
//! Deciding is only possible on `Approval<Pending>`; decided requests cannot
//! be decided again.

#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]

pub mod api;
pub mod approval;
pub mod catalog;
pub mod config;
pub mod dashboard;
pub mod deployment;
pub mod environment;
pub mod error;
pub mod executor;
pub mod plane;
pub mod registry;
pub mod service;
pub mod types;

pub use approval::{ApprovalGate, ApprovalRequest, ApprovalStatus, Decision};
pub use catalog::{ArtifactCatalog, ArtifactEvent};
pub use config::ControlConfig;
pub use dashboard::{DashboardAggregator, DashboardFrame, DashboardWatcher, ServiceDashboard};
pub use deployment::DeploymentEngine;
pub use environment::{EnvironmentState, Transition};
pub use error::{ControlError, ControlResult};
pub use executor::{DeploymentExecutor, ExecutionRequest, NoopExecutor, WebhookExecutor};
pub use plane::ControlPlane;
pub use registry::ServiceRegistry;
pub use service::ControlService;
pub use types::{
    ApprovalId, Artifact, DeploymentAction, DeploymentOutcome, DeploymentRequest, Environment,
    EnvironmentSet, EnvironmentStatus, Service, Target,
};
