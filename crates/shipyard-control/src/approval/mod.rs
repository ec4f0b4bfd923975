//! Approval gate for production-bound deployments.
//!
//! Every deploy or rollback to a production-classified environment becomes an
//! [`ApprovalRequest`]. At most one request may be pending per target. The
//! lifecycle itself lives in [`state`]; this module owns storage and the
//! pending-uniqueness index.

pub mod state;

use std::fmt;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ControlError, ControlResult};
use crate::types::{ApprovalId, DeploymentAction, DeploymentRequest, Target};

pub use state::{AnyApproval, Approval, ApprovalState};

/// Lifecycle status of an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    /// Waiting for a decision.
    Pending,
    /// Approved (terminal).
    Approved,
    /// Rejected (terminal).
    Rejected,
}

impl ApprovalStatus {
    /// Get the status name as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A human decision on an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Let the deployment proceed.
    Approve,
    /// Drop the deployment.
    Reject,
}

/// A production deploy or rollback waiting on, or past, a human decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    /// Unique ID.
    pub id: ApprovalId,
    /// Target service.
    pub service_name: String,
    /// Target environment (always production-classified).
    pub environment: String,
    /// Version the deployment will activate.
    pub target_version: String,
    /// Deploy or rollback.
    pub action: DeploymentAction,
    /// Lifecycle status.
    pub status: ApprovalStatus,
    /// Who asked for the deployment.
    pub requested_by: String,
    /// When the request was created.
    pub created_at: DateTime<Utc>,
    /// When the request was approved or rejected.
    #[serde(default)]
    pub decided_at: Option<DateTime<Utc>>,
    /// When the approved deployment was applied.
    #[serde(default)]
    pub applied_at: Option<DateTime<Utc>>,
}

impl ApprovalRequest {
    /// Build a pending record for a deployment request.
    #[must_use]
    pub fn from_request(id: ApprovalId, request: &DeploymentRequest) -> Self {
        Self {
            id,
            service_name: request.target.service.clone(),
            environment: request.target.environment.clone(),
            target_version: request.version.clone(),
            action: request.action,
            status: ApprovalStatus::Pending,
            requested_by: request.requested_by.clone(),
            created_at: request.requested_at,
            decided_at: None,
            applied_at: None,
        }
    }

    /// The target this request gates.
    #[must_use]
    pub fn target(&self) -> Target {
        Target::new(&self.service_name, &self.environment)
    }
}

/// Stores approval requests and enforces one pending request per target.
///
/// Lock order is `pending` before `requests`. `decide` releases its
/// `requests` guard before touching `pending`.
#[derive(Debug, Default)]
pub struct ApprovalGate {
    requests: DashMap<ApprovalId, ApprovalRequest>,
    pending: DashMap<Target, ApprovalId>,
    claimed: DashSet<ApprovalId>,
}

impl ApprovalGate {
    /// Create an empty gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pending approval for a deployment request.
    ///
    /// Fails with `Conflict` if the target already has a pending request.
    pub fn submit(&self, request: &DeploymentRequest) -> ControlResult<ApprovalRequest> {
        match self.pending.entry(request.target.clone()) {
            Entry::Occupied(existing) => Err(ControlError::conflict(format!(
                "{} already has pending approval {}",
                request.target,
                existing.get()
            ))),
            Entry::Vacant(slot) => {
                let approval = Approval::<state::Pending>::create(ApprovalRequest::from_request(
                    ApprovalId::generate(),
                    request,
                ));
                let record = approval.into_record();
                self.requests.insert(record.id.clone(), record.clone());
                slot.insert(record.id.clone());

                info!(
                    approval_id = %record.id,
                    service = %record.service_name,
                    environment = %record.environment,
                    version = %record.target_version,
                    action = %record.action,
                    requested_by = %record.requested_by,
                    "approval requested"
                );
                Ok(record)
            }
        }
    }

    /// Approve or reject a pending request.
    ///
    /// Fails with `NotFound` for an unknown ID and `InvalidState` if the
    /// request was already decided. Deciding twice is always an error.
    pub fn decide(&self, id: &ApprovalId, decision: Decision) -> ControlResult<ApprovalRequest> {
        let decided = {
            let mut entry = self
                .requests
                .get_mut(id)
                .ok_or_else(|| ControlError::not_found(format!("approval {id} not found")))?;

            let pending = AnyApproval::from_record(entry.clone()).try_into_pending()?;
            let record = match decision {
                Decision::Approve => pending.approve().into_record(),
                Decision::Reject => pending.reject().into_record(),
            };
            *entry = record.clone();
            record
        };

        self.pending
            .remove_if(&decided.target(), |_, pending_id| pending_id == id);

        info!(
            approval_id = %id,
            service = %decided.service_name,
            environment = %decided.environment,
            status = %decided.status,
            "approval decided"
        );
        Ok(decided)
    }

    /// Look up a request by ID.
    pub fn get(&self, id: &ApprovalId) -> ControlResult<ApprovalRequest> {
        self.requests
            .get(id)
            .map(|r| r.clone())
            .ok_or_else(|| ControlError::not_found(format!("approval {id} not found")))
    }

    /// Pending requests, oldest first. `environment` narrows the listing.
    #[must_use]
    pub fn list_pending(&self, environment: Option<&str>) -> Vec<ApprovalRequest> {
        let mut pending = self.collect(environment, |r| r.status == ApprovalStatus::Pending);
        pending.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        pending
    }

    /// Decided requests, most recent decision first.
    #[must_use]
    pub fn list_history(&self, environment: Option<&str>) -> Vec<ApprovalRequest> {
        let mut history = self.collect(environment, |r| r.status != ApprovalStatus::Pending);
        history.sort_by(|a, b| {
            b.decided_at
                .cmp(&a.decided_at)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| b.id.cmp(&a.id))
        });
        history
    }

    fn collect(
        &self,
        environment: Option<&str>,
        keep: impl Fn(&ApprovalRequest) -> bool,
    ) -> Vec<ApprovalRequest> {
        self.requests
            .iter()
            .filter(|r| environment.map_or(true, |env| r.environment == env))
            .filter(|r| keep(r))
            .map(|r| r.clone())
            .collect()
    }

    /// Reserve an approved request for application.
    ///
    /// Each request can be claimed once. Fails with `NotFound` for an unknown
    /// ID and `InvalidState` if it is not approved, already applied, or
    /// claimed by another caller.
    pub fn claim(&self, id: &ApprovalId) -> ControlResult<ApprovalRequest> {
        let record = self.get(id)?;

        if !self.claimed.insert(id.clone()) {
            return Err(ControlError::invalid_state(format!(
                "approval {id} is already being applied"
            )));
        }

        let checked = AnyApproval::from_record(record)
            .try_into_approved()
            .map(Approval::into_record)
            .and_then(|record| match record.applied_at {
                Some(_) => Err(ControlError::invalid_state(format!(
                    "approval {id} was already applied"
                ))),
                None => Ok(record),
            });

        if checked.is_err() {
            self.claimed.remove(id);
        }
        checked
    }

    /// Give up a claim so the apply can be retried.
    pub fn release(&self, id: &ApprovalId) {
        self.claimed.remove(id);
    }

    /// Record that a claimed request has been applied. The claim is kept.
    pub fn mark_applied(&self, id: &ApprovalId) -> ControlResult<ApprovalRequest> {
        let mut entry = self
            .requests
            .get_mut(id)
            .ok_or_else(|| ControlError::not_found(format!("approval {id} not found")))?;
        entry.applied_at = Some(Utc::now());
        Ok(entry.clone())
    }

    /// Number of requests in each status.
    #[must_use]
    pub fn count_by_status(&self) -> [(ApprovalStatus, usize); 3] {
        let mut counts = [
            (ApprovalStatus::Pending, 0),
            (ApprovalStatus::Approved, 0),
            (ApprovalStatus::Rejected, 0),
        ];
        for request in &self.requests {
            if let Some((_, n)) = counts.iter_mut().find(|(s, _)| *s == request.status) {
                *n += 1;
            }
        }
        counts
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn prod_deploy(service: &str, version: &str) -> DeploymentRequest {
        DeploymentRequest::deploy(Target::new(service, "prod"), version, "alice")
    }

    #[test]
    fn submit_creates_pending_request() {
        let gate = ApprovalGate::new();
        let request = gate.submit(&prod_deploy("orders", "v3")).unwrap();
        assert_eq!(request.status, ApprovalStatus::Pending);
        assert_eq!(request.target_version, "v3");
        assert_eq!(request.requested_by, "alice");
        assert_eq!(gate.list_pending(Some("prod")), [request]);
    }

    #[test]
    fn second_pending_request_conflicts() {
        let gate = ApprovalGate::new();
        gate.submit(&prod_deploy("orders", "v3")).unwrap();
        let err = gate.submit(&prod_deploy("orders", "v4")).unwrap_err();
        assert!(matches!(err, ControlError::Conflict(_)));

        // Other targets are independent.
        gate.submit(&prod_deploy("billing", "v1")).unwrap();
        assert_eq!(gate.list_pending(None).len(), 2);
    }

    #[test]
    fn decide_frees_the_target() {
        let gate = ApprovalGate::new();
        let first = gate.submit(&prod_deploy("orders", "v3")).unwrap();
        let rejected = gate.decide(&first.id, Decision::Reject).unwrap();
        assert_eq!(rejected.status, ApprovalStatus::Rejected);
        assert!(rejected.decided_at.is_some());

        assert!(gate.list_pending(None).is_empty());
        gate.submit(&prod_deploy("orders", "v4")).unwrap();
    }

    #[test]
    fn decide_twice_is_invalid_state() {
        let gate = ApprovalGate::new();
        let request = gate.submit(&prod_deploy("orders", "v3")).unwrap();
        gate.decide(&request.id, Decision::Approve).unwrap();

        for decision in [Decision::Approve, Decision::Reject] {
            assert!(matches!(
                gate.decide(&request.id, decision),
                Err(ControlError::InvalidState(_))
            ));
        }
        assert_eq!(gate.get(&request.id).unwrap().status, ApprovalStatus::Approved);
    }

    #[test]
    fn decide_unknown_is_not_found() {
        let gate = ApprovalGate::new();
        assert!(matches!(
            gate.decide(&ApprovalId::new("missing"), Decision::Approve),
            Err(ControlError::NotFound(_))
        ));
    }

    #[test]
    fn listings_are_ordered_and_filtered() {
        let gate = ApprovalGate::new();
        let a = gate.submit(&prod_deploy("a", "v1")).unwrap();
        let b = gate.submit(&prod_deploy("b", "v1")).unwrap();
        let c = gate.submit(&prod_deploy("c", "v1")).unwrap();
        gate.submit(&DeploymentRequest::deploy(Target::new("d", "live"), "v1", "bob"))
            .unwrap();

        gate.decide(&a.id, Decision::Approve).unwrap();
        gate.decide(&c.id, Decision::Reject).unwrap();

        let pending: Vec<_> = gate.list_pending(Some("prod")).into_iter().map(|r| r.id).collect();
        assert_eq!(pending, [b.id]);
        assert_eq!(gate.list_pending(None).len(), 2);

        let history: Vec<_> = gate.list_history(Some("prod")).into_iter().map(|r| r.id).collect();
        assert_eq!(history, [c.id, a.id]);
        assert!(gate.list_history(Some("live")).is_empty());
    }

    #[test]
    fn claim_requires_approval_and_is_single_use() {
        let gate = ApprovalGate::new();
        let request = gate.submit(&prod_deploy("orders", "v3")).unwrap();

        assert!(matches!(
            gate.claim(&request.id),
            Err(ControlError::InvalidState(_))
        ));

        gate.decide(&request.id, Decision::Approve).unwrap();
        gate.claim(&request.id).unwrap();
        assert!(matches!(
            gate.claim(&request.id),
            Err(ControlError::InvalidState(_))
        ));

        gate.release(&request.id);
        gate.claim(&request.id).unwrap();
        let applied = gate.mark_applied(&request.id).unwrap();
        assert!(applied.applied_at.is_some());

        gate.release(&request.id);
        let err = gate.claim(&request.id).unwrap_err();
        assert!(err.to_string().contains("already applied"));
    }

    #[test]
    fn rejected_cannot_be_claimed() {
        let gate = ApprovalGate::new();
        let request = gate.submit(&prod_deploy("orders", "v3")).unwrap();
        gate.decide(&request.id, Decision::Reject).unwrap();
        assert!(matches!(
            gate.claim(&request.id),
            Err(ControlError::InvalidState(_))
        ));
        // A failed claim does not linger.
        assert!(gate.claimed.is_empty());
    }

    #[test]
    fn concurrent_submits_admit_exactly_one() {
        let gate = Arc::new(ApprovalGate::new());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let gate = Arc::clone(&gate);
                std::thread::spawn(move || gate.submit(&prod_deploy("orders", &format!("v{i}"))))
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(ControlError::is_retryable));
    }

    #[test]
    fn counts_by_status() {
        let gate = ApprovalGate::new();
        let a = gate.submit(&prod_deploy("a", "v1")).unwrap();
        gate.submit(&prod_deploy("b", "v1")).unwrap();
        gate.decide(&a.id, Decision::Approve).unwrap();
        assert_eq!(
            gate.count_by_status(),
            [
                (ApprovalStatus::Pending, 1),
                (ApprovalStatus::Approved, 1),
                (ApprovalStatus::Rejected, 0),
            ]
        );
    }
}
