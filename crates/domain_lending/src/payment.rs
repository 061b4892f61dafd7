//! Repayments received from borrowers
//!
//! Payments are immutable once recorded. The only follow-up write is the
//! one-way verification flag set by a supervisor after reconciling cash.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

use core_kernel::{ActorId, LoanId, Money, PaymentId, ScheduleId};
use domain_ledger::ReferenceNumber;

use crate::error::LendingError;

/// How the money was received
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    MobileMoney,
    BankTransfer,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::MobileMoney => "mobile_money",
            PaymentMethod::BankTransfer => "bank_transfer",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = LendingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(PaymentMethod::Cash),
            "mobile_money" => Ok(PaymentMethod::MobileMoney),
            "bank_transfer" => Ok(PaymentMethod::BankTransfer),
            other => Err(LendingError::validation(format!("unknown payment method '{}'", other))),
        }
    }
}

/// Repayment capture request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PaymentRequest {
    pub loan_id: LoanId,
    pub amount: Decimal,
    pub payment_date: NaiveDate,
    pub method: PaymentMethod,
    /// Installment the payment is applied to, if any
    pub schedule_id: Option<ScheduleId>,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

/// A validated payment waiting for its receipt number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPayment {
    pub id: PaymentId,
    pub loan_id: LoanId,
    pub schedule_id: Option<ScheduleId>,
    pub amount: Money,
    pub payment_date: NaiveDate,
    pub method: PaymentMethod,
    pub notes: Option<String>,
    pub recorded_by: ActorId,
    pub created_at: DateTime<Utc>,
}

impl NewPayment {
    /// Validates a capture request
    ///
    /// # Errors
    ///
    /// Returns a validation error if the amount is not strictly positive
    pub fn from_request(
        request: PaymentRequest,
        recorded_by: ActorId,
        now: DateTime<Utc>,
    ) -> Result<Self, LendingError> {
        request.validate()?;
        let amount = Money::positive(request.amount)?;

        Ok(Self {
            id: PaymentId::new_v7(),
            loan_id: request.loan_id,
            schedule_id: request.schedule_id,
            amount,
            payment_date: request.payment_date,
            method: request.method,
            notes: request
                .notes
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            recorded_by,
            created_at: now,
        })
    }
}

/// A recorded payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    /// Unique receipt, `RCP-YYYYMMDD-NNNN`
    pub receipt_number: ReferenceNumber,
    pub loan_id: LoanId,
    pub schedule_id: Option<ScheduleId>,
    pub amount: Money,
    pub payment_date: NaiveDate,
    pub method: PaymentMethod,
    pub is_verified: bool,
    pub verified_by: Option<ActorId>,
    pub verified_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub recorded_by: ActorId,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    /// Materializes a numbered, unverified payment
    pub fn from_new(new: NewPayment, receipt_number: ReferenceNumber) -> Self {
        Self {
            id: new.id,
            receipt_number,
            loan_id: new.loan_id,
            schedule_id: new.schedule_id,
            amount: new.amount,
            payment_date: new.payment_date,
            method: new.method,
            is_verified: false,
            verified_by: None,
            verified_at: None,
            notes: new.notes,
            recorded_by: new.recorded_by,
            created_at: new.created_at,
        }
    }

    /// Sets the verification flag
    ///
    /// # Errors
    ///
    /// Returns `ConcurrencyConflict` if the payment is already verified, the
    /// same error the stores raise when a concurrent verifier got there first
    pub fn verify(&mut self, actor: ActorId, now: DateTime<Utc>) -> Result<(), LendingError> {
        if self.is_verified {
            return Err(LendingError::ConcurrencyConflict(format!(
                "payment {} was already verified",
                self.receipt_number
            )));
        }
        self.is_verified = true;
        self.verified_by = Some(actor);
        self.verified_at = Some(now);
        Ok(())
    }
}
