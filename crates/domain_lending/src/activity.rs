//! Loan audit trail
//!
//! Every lifecycle transition produces exactly one [`LoanActivity`]. Records
//! are immutable and stored in the same unit of work as the change they
//! describe.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use core_kernel::{ActivityId, ActorId, LoanId};

use crate::error::LendingError;

/// What happened to the loan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    Applied,
    Approved,
    Rejected,
    Disbursed,
    Activated,
    PaymentRecorded,
    PaymentVerified,
    Completed,
    Defaulted,
    WrittenOff,
    Removed,
}

impl ActivityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityAction::Applied => "applied",
            ActivityAction::Approved => "approved",
            ActivityAction::Rejected => "rejected",
            ActivityAction::Disbursed => "disbursed",
            ActivityAction::Activated => "activated",
            ActivityAction::PaymentRecorded => "payment_recorded",
            ActivityAction::PaymentVerified => "payment_verified",
            ActivityAction::Completed => "completed",
            ActivityAction::Defaulted => "defaulted",
            ActivityAction::WrittenOff => "written_off",
            ActivityAction::Removed => "removed",
        }
    }
}

impl fmt::Display for ActivityAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityAction {
    type Err = LendingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let action = match s {
            "applied" => ActivityAction::Applied,
            "approved" => ActivityAction::Approved,
            "rejected" => ActivityAction::Rejected,
            "disbursed" => ActivityAction::Disbursed,
            "activated" => ActivityAction::Activated,
            "payment_recorded" => ActivityAction::PaymentRecorded,
            "payment_verified" => ActivityAction::PaymentVerified,
            "completed" => ActivityAction::Completed,
            "defaulted" => ActivityAction::Defaulted,
            "written_off" => ActivityAction::WrittenOff,
            "removed" => ActivityAction::Removed,
            other => return Err(LendingError::validation(format!("unknown activity action '{}'", other))),
        };
        Ok(action)
    }
}

/// Immutable audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanActivity {
    pub id: ActivityId,
    pub loan_id: LoanId,
    pub actor: ActorId,
    pub action: ActivityAction,
    pub description: String,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl LoanActivity {
    pub fn new(
        loan_id: LoanId,
        actor: ActorId,
        action: ActivityAction,
        description: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ActivityId::new_v7(),
            loan_id,
            actor,
            action,
            description: description.into(),
            metadata: None,
            created_at,
        }
    }

    /// Attaches structured metadata
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
