//! Typestate encoding of the approval lifecycle.
//!
//! An approval starts `Pending` and moves exactly once to `Approved` or
//! `Rejected`. Only `Approval<Pending>` has `approve`/`reject`, so deciding a
//! decided request cannot be written. Stored records are loaded back through
//! [`AnyApproval`], which turns the compile-time guarantee into a runtime
//! `InvalidState` error at the storage boundary.

use std::marker::PhantomData;

use chrono::Utc;

use super::{ApprovalRequest, ApprovalStatus};
use crate::error::{ControlError, ControlResult};
use crate::types::ApprovalId;

/// Marker trait for approval states.
pub trait ApprovalState: private::Sealed + Send + Sync {
    /// The stored status for this state.
    fn status() -> ApprovalStatus;
}

mod private {
    pub trait Sealed {}
}

/// Waiting for a decision.
#[derive(Debug, Clone, Copy)]
pub struct Pending;

/// Approved; the deployment may be applied.
#[derive(Debug, Clone, Copy)]
pub struct Approved;

/// Rejected; the target is untouched.
#[derive(Debug, Clone, Copy)]
pub struct Rejected;

impl private::Sealed for Pending {}
impl private::Sealed for Approved {}
impl private::Sealed for Rejected {}

impl ApprovalState for Pending {
    fn status() -> ApprovalStatus {
        ApprovalStatus::Pending
    }
}

impl ApprovalState for Approved {
    fn status() -> ApprovalStatus {
        ApprovalStatus::Approved
    }
}

impl ApprovalState for Rejected {
    fn status() -> ApprovalStatus {
        ApprovalStatus::Rejected
    }
}

/// An approval request in a specific state.
#[derive(Debug)]
pub struct Approval<S: ApprovalState> {
    record: ApprovalRequest,
    _state: PhantomData<S>,
}

impl<S: ApprovalState> Approval<S> {
    /// The approval ID.
    #[must_use]
    pub const fn id(&self) -> &ApprovalId {
        &self.record.id
    }

    /// Consume into the stored record.
    #[must_use]
    pub fn into_record(self) -> ApprovalRequest {
        self.record
    }

    fn decide<T: ApprovalState>(mut self) -> Approval<T> {
        self.record.status = T::status();
        self.record.decided_at = Some(Utc::now());
        Approval {
            record: self.record,
            _state: PhantomData,
        }
    }
}

impl Approval<Pending> {
    /// Create a pending approval. The record's status and decision fields are reset.
    #[must_use]
    pub fn create(mut record: ApprovalRequest) -> Self {
        record.status = ApprovalStatus::Pending;
        record.decided_at = None;
        record.applied_at = None;
        Self {
            record,
            _state: PhantomData,
        }
    }

    /// Record an approval.
    #[must_use]
    pub fn approve(self) -> Approval<Approved> {
        self.decide()
    }

    /// Record a rejection.
    #[must_use]
    pub fn reject(self) -> Approval<Rejected> {
        self.decide()
    }
}

/// An approval loaded from storage, state known only at runtime.
#[derive(Debug)]
pub enum AnyApproval {
    /// Awaiting a decision.
    Pending(Approval<Pending>),
    /// Approved.
    Approved(Approval<Approved>),
    /// Rejected.
    Rejected(Approval<Rejected>),
}

impl AnyApproval {
    /// Wrap a stored record according to its status.
    #[must_use]
    pub const fn from_record(record: ApprovalRequest) -> Self {
        match record.status {
            ApprovalStatus::Pending => Self::Pending(Approval {
                record,
                _state: PhantomData,
            }),
            ApprovalStatus::Approved => Self::Approved(Approval {
                record,
                _state: PhantomData,
            }),
            ApprovalStatus::Rejected => Self::Rejected(Approval {
                record,
                _state: PhantomData,
            }),
        }
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> ApprovalStatus {
        match self {
            Self::Pending(_) => ApprovalStatus::Pending,
            Self::Approved(_) => ApprovalStatus::Approved,
            Self::Rejected(_) => ApprovalStatus::Rejected,
        }
    }

    /// Extract a pending approval, or fail with `InvalidState`.
    pub fn try_into_pending(self) -> ControlResult<Approval<Pending>> {
        match self {
            Self::Pending(a) => Ok(a),
            other => Err(already_decided(&other)),
        }
    }

    /// Extract an approved approval, or fail with `InvalidState`.
    pub fn try_into_approved(self) -> ControlResult<Approval<Approved>> {
        match self {
            Self::Approved(a) => Ok(a),
            other => {
                let record = other.into_record();
                Err(ControlError::invalid_state(format!(
                    "approval {} is {}, not approved",
                    record.id, record.status
                )))
            }
        }
    }

    /// Consume into the stored record.
    #[must_use]
    pub fn into_record(self) -> ApprovalRequest {
        match self {
            Self::Pending(a) => a.into_record(),
            Self::Approved(a) => a.into_record(),
            Self::Rejected(a) => a.into_record(),
        }
    }
}

fn already_decided(approval: &AnyApproval) -> ControlError {
    let (id, status) = match approval {
        AnyApproval::Pending(a) => (a.id(), ApprovalStatus::Pending),
        AnyApproval::Approved(a) => (a.id(), ApprovalStatus::Approved),
        AnyApproval::Rejected(a) => (a.id(), ApprovalStatus::Rejected),
    };
    ControlError::invalid_state(format!("approval {id} is already {status}"))
}
