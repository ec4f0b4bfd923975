//! Deployment orchestration.
//!
//! The engine validates deploy and rollback requests, routes production
//! requests through the approval gate and drives the executor under the
//! target's operation lock.

mod engine;

pub use engine::DeploymentEngine;
