//! Loan Aggregate Root
//!
//! The loan is the consistency boundary for origination and repayment. It
//! owns its repayment schedules and is the aggregation root for the payments
//! and ledger entries that reference it.
//!
//! # Lifecycle
//!
//! ```text
//! Pending -> Approved -> Disbursed -> Active -> Completed
//!        \-> Rejected            \        \-> Defaulted
//!                                 \-------\-> WrittenOff
//! ```
//!
//! # Invariants
//!
//! - `total_amount = principal_amount + interest_amount`, fixed at application
//! - Transitions only follow the edges above
//! - Every transition yields exactly one [`LoanActivity`]
//! - A soft-removed loan accepts no further transition

use chrono::{DateTime, Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::str::FromStr;
use validator::Validate;

use core_kernel::{ActorId, BorrowerId, LoanId, MarketId, Money, Rate};
use domain_ledger::ReferenceNumber;

use crate::activity::{ActivityAction, LoanActivity};
use crate::borrower::Borrower;
use crate::error::LendingError;
use crate::frequency::RepaymentFrequency;

/// Largest principal the `NUMERIC(15, 2)` amount columns can hold
pub const MAX_PRINCIPAL: Decimal = dec!(9999999999999.99);

/// Highest flat interest rate accepted, in percent
pub const MAX_INTEREST_RATE: Decimal = dec!(1000);

/// Loan lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Pending,
    Approved,
    Rejected,
    Disbursed,
    Active,
    Completed,
    Defaulted,
    WrittenOff,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Pending => "pending",
            LoanStatus::Approved => "approved",
            LoanStatus::Rejected => "rejected",
            LoanStatus::Disbursed => "disbursed",
            LoanStatus::Active => "active",
            LoanStatus::Completed => "completed",
            LoanStatus::Defaulted => "defaulted",
            LoanStatus::WrittenOff => "written_off",
        }
    }

    /// Disbursed or active: money is out and repayments are expected
    pub fn is_open(&self) -> bool {
        matches!(self, LoanStatus::Disbursed | LoanStatus::Active)
    }

    /// No transition leaves this state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LoanStatus::Rejected | LoanStatus::Completed | LoanStatus::Defaulted | LoanStatus::WrittenOff
        )
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoanStatus {
    type Err = LendingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(LoanStatus::Pending),
            "approved" => Ok(LoanStatus::Approved),
            "rejected" => Ok(LoanStatus::Rejected),
            "disbursed" => Ok(LoanStatus::Disbursed),
            "active" => Ok(LoanStatus::Active),
            "completed" => Ok(LoanStatus::Completed),
            "defaulted" => Ok(LoanStatus::Defaulted),
            "written_off" => Ok(LoanStatus::WrittenOff),
            other => Err(LendingError::validation(format!("unknown loan status '{}'", other))),
        }
    }
}

/// Loan application request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LoanApplication {
    pub borrower_id: BorrowerId,
    pub principal: Decimal,
    /// Flat interest rate in percent of principal, e.g. `10` for 10%
    pub interest_rate: Decimal,
    #[validate(range(min = 1, max = 3650))]
    pub duration_days: u32,
    pub frequency: RepaymentFrequency,
    #[validate(length(max = 500))]
    pub purpose: Option<String>,
}

/// A validated application that has not yet been numbered
///
/// The store turns it into a [`Loan`] once it has allocated the loan number
/// inside the insert's critical section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLoan {
    pub id: LoanId,
    pub borrower_id: BorrowerId,
    pub market_id: MarketId,
    pub principal_amount: Money,
    pub interest_rate: Rate,
    pub interest_amount: Money,
    pub total_amount: Money,
    pub duration_days: u32,
    pub frequency: RepaymentFrequency,
    pub purpose: Option<String>,
    pub applied_by: ActorId,
    /// Business date the application was taken; dates the loan number
    pub applied_on: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl NewLoan {
    /// Validates an application and fixes its pricing
    ///
    /// Interest is flat: `principal × rate / 100`, rounded to cents once and
    /// never recomputed.
    ///
    /// # Errors
    ///
    /// - Principal not strictly positive, or above [`MAX_PRINCIPAL`]
    /// - Interest rate outside 0..=[`MAX_INTEREST_RATE`] percent
    /// - Duration outside 1..=3650 days
    /// - Total too small to split into the installment plan
    /// - Borrower inactive or not the one named in the application
    pub fn from_application(
        application: LoanApplication,
        borrower: &Borrower,
        applied_by: ActorId,
        applied_on: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Self, LendingError> {
        application.validate()?;

        if application.borrower_id != borrower.id {
            return Err(LendingError::validation("application does not match borrower"));
        }
        if !borrower.is_active {
            return Err(LendingError::validation(format!(
                "borrower {} is inactive",
                borrower.id
            )));
        }

        let principal_amount = Money::positive(application.principal)?;
        if principal_amount.amount() > MAX_PRINCIPAL {
            return Err(LendingError::validation(format!(
                "principal must not exceed {}",
                MAX_PRINCIPAL
            )));
        }
        if application.interest_rate.is_sign_negative() && !application.interest_rate.is_zero() {
            return Err(LendingError::validation("interest rate must not be negative"));
        }
        if application.interest_rate > MAX_INTEREST_RATE {
            return Err(LendingError::validation(format!(
                "interest rate must not exceed {}%",
                MAX_INTEREST_RATE
            )));
        }
        let interest_rate = Rate::from_percentage(application.interest_rate);
        let interest_amount = interest_rate.apply(&principal_amount)?;
        let total_amount = principal_amount.checked_add(interest_amount)?;
        if total_amount.amount() > MAX_PRINCIPAL {
            return Err(LendingError::validation(format!(
                "total repayable must not exceed {}",
                MAX_PRINCIPAL
            )));
        }

        // Must split into the installment plan generated at disbursement
        let installments = application.frequency.installment_count(application.duration_days);
        total_amount.split_with_final_remainder(installments)?;

        Ok(Self {
            id: LoanId::new_v7(),
            borrower_id: borrower.id,
            market_id: borrower.market_id,
            principal_amount,
            interest_rate,
            interest_amount,
            total_amount,
            duration_days: application.duration_days,
            frequency: application.frequency,
            purpose: application
                .purpose
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty()),
            applied_by,
            applied_on,
            created_at: now,
        })
    }

    /// The `applied` audit record for this application
    pub fn activity(&self) -> LoanActivity {
        LoanActivity::new(
            self.id,
            self.applied_by,
            ActivityAction::Applied,
            format!(
                "Applied for {} over {} days, repaid {}",
                self.principal_amount, self.duration_days, self.frequency
            ),
            self.created_at,
        )
        .with_metadata(json!({
            "principal": self.principal_amount,
            "interest_rate": self.interest_rate.as_percentage(),
            "total_amount": self.total_amount,
        }))
    }
}

/// The loan aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    /// Human reference, `LN-YYYYMMDD-NNNN`
    pub loan_number: ReferenceNumber,
    pub borrower_id: BorrowerId,
    pub market_id: MarketId,
    pub principal_amount: Money,
    pub interest_rate: Rate,
    pub interest_amount: Money,
    pub total_amount: Money,
    pub duration_days: u32,
    pub frequency: RepaymentFrequency,
    pub purpose: Option<String>,
    pub status: LoanStatus,
    pub applied_by: ActorId,
    pub approved_by: Option<ActorId>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<ActorId>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub disbursement_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub disbursed_by: Option<ActorId>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Set when the loan is defaulted or written off
    pub closed_at: Option<DateTime<Utc>>,
    pub closure_reason: Option<String>,
    pub removed_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency counter, bumped by the store on every write
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loan {
    /// Materializes a numbered, pending loan
    pub fn from_new(new: NewLoan, loan_number: ReferenceNumber) -> Self {
        Self {
            id: new.id,
            loan_number,
            borrower_id: new.borrower_id,
            market_id: new.market_id,
            principal_amount: new.principal_amount,
            interest_rate: new.interest_rate,
            interest_amount: new.interest_amount,
            total_amount: new.total_amount,
            duration_days: new.duration_days,
            frequency: new.frequency,
            purpose: new.purpose,
            status: LoanStatus::Pending,
            applied_by: new.applied_by,
            approved_by: None,
            approved_at: None,
            rejected_by: None,
            rejected_at: None,
            rejection_reason: None,
            disbursement_date: None,
            due_date: None,
            disbursed_by: None,
            completed_at: None,
            closed_at: None,
            closure_reason: None,
            removed_at: None,
            version: 1,
            created_at: new.created_at,
            updated_at: new.created_at,
        }
    }

    pub fn is_removed(&self) -> bool {
        self.removed_at.is_some()
    }

    /// Fails unless payments can be recorded against this loan
    pub fn ensure_accepts_payments(&self) -> Result<(), LendingError> {
        if self.is_removed() || !self.status.is_open() {
            return Err(LendingError::validation(format!(
                "loan {} is {} and does not accept payments",
                self.loan_number,
                self.status_label()
            )));
        }
        Ok(())
    }

    /// Approves a pending application
    pub fn approve(&mut self, actor: ActorId, now: DateTime<Utc>) -> Result<LoanActivity, LendingError> {
        self.require(&[LoanStatus::Pending], LoanStatus::Approved)?;

        self.status = LoanStatus::Approved;
        self.approved_by = Some(actor);
        self.approved_at = Some(now);
        self.updated_at = now;

        Ok(LoanActivity::new(
            self.id,
            actor,
            ActivityAction::Approved,
            format!("Loan {} approved", self.loan_number),
            now,
        ))
    }

    /// Rejects a pending application
    ///
    /// # Errors
    ///
    /// Returns a validation error if `reason` is blank
    pub fn reject(
        &mut self,
        actor: ActorId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<LoanActivity, LendingError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(LendingError::validation("rejection reason is required"));
        }
        self.require(&[LoanStatus::Pending], LoanStatus::Rejected)?;

        self.status = LoanStatus::Rejected;
        self.rejected_by = Some(actor);
        self.rejected_at = Some(now);
        self.rejection_reason = Some(reason.to_string());
        self.updated_at = now;

        Ok(LoanActivity::new(
            self.id,
            actor,
            ActivityAction::Rejected,
            format!("Loan {} rejected: {}", self.loan_number, reason),
            now,
        ))
    }

    /// Releases an approved loan on `date`
    ///
    /// Sets `due_date = date + duration_days`. Schedule generation and the
    /// disbursement ledger entry are the caller's job and must be committed
    /// together with this change.
    pub fn disburse(
        &mut self,
        date: NaiveDate,
        actor: ActorId,
        now: DateTime<Utc>,
    ) -> Result<LoanActivity, LendingError> {
        self.require(&[LoanStatus::Approved], LoanStatus::Disbursed)?;

        let due_date = date
            .checked_add_days(Days::new(u64::from(self.duration_days)))
            .ok_or_else(|| LendingError::validation("due date is out of range"))?;

        self.status = LoanStatus::Disbursed;
        self.disbursement_date = Some(date);
        self.due_date = Some(due_date);
        self.disbursed_by = Some(actor);
        self.updated_at = now;

        Ok(LoanActivity::new(
            self.id,
            actor,
            ActivityAction::Disbursed,
            format!("Disbursed {} on {}, due {}", self.principal_amount, date, due_date),
            now,
        )
        .with_metadata(json!({
            "disbursement_date": date,
            "due_date": due_date,
        })))
    }

    /// Moves a disbursed loan to active when its first repayment arrives
    pub fn activate(&mut self, actor: ActorId, now: DateTime<Utc>) -> Result<LoanActivity, LendingError> {
        self.require(&[LoanStatus::Disbursed], LoanStatus::Active)?;

        self.status = LoanStatus::Active;
        self.updated_at = now;

        Ok(LoanActivity::new(
            self.id,
            actor,
            ActivityAction::Activated,
            format!("Loan {} active after first repayment", self.loan_number),
            now,
        ))
    }

    /// Closes a fully repaid loan
    pub fn complete(&mut self, actor: ActorId, now: DateTime<Utc>) -> Result<LoanActivity, LendingError> {
        self.require(&[LoanStatus::Active], LoanStatus::Completed)?;

        self.status = LoanStatus::Completed;
        self.completed_at = Some(now);
        self.updated_at = now;

        Ok(LoanActivity::new(
            self.id,
            actor,
            ActivityAction::Completed,
            format!("Loan {} fully repaid", self.loan_number),
            now,
        ))
    }

    /// Marks an active loan as defaulted
    pub fn mark_defaulted(
        &mut self,
        actor: ActorId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<LoanActivity, LendingError> {
        let reason = require_reason(reason)?;
        self.require(&[LoanStatus::Active], LoanStatus::Defaulted)?;

        self.status = LoanStatus::Defaulted;
        self.close(reason.clone(), now);

        Ok(LoanActivity::new(
            self.id,
            actor,
            ActivityAction::Defaulted,
            format!("Loan {} defaulted: {}", self.loan_number, reason),
            now,
        ))
    }

    /// Writes off a disbursed or active loan
    pub fn write_off(
        &mut self,
        actor: ActorId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<LoanActivity, LendingError> {
        let reason = require_reason(reason)?;
        self.require(&[LoanStatus::Disbursed, LoanStatus::Active], LoanStatus::WrittenOff)?;

        self.status = LoanStatus::WrittenOff;
        self.close(reason.clone(), now);

        Ok(LoanActivity::new(
            self.id,
            actor,
            ActivityAction::WrittenOff,
            format!("Loan {} written off: {}", self.loan_number, reason),
            now,
        ))
    }

    /// Hides a pending or rejected loan from every report
    ///
    /// The row is kept; only `removed_at` is set.
    pub fn soft_remove(&mut self, actor: ActorId, now: DateTime<Utc>) -> Result<LoanActivity, LendingError> {
        if self.is_removed() || !matches!(self.status, LoanStatus::Pending | LoanStatus::Rejected) {
            return Err(LendingError::invalid_transition(self.status_label(), "removed"));
        }

        self.removed_at = Some(now);
        self.updated_at = now;

        Ok(LoanActivity::new(
            self.id,
            actor,
            ActivityAction::Removed,
            format!("Loan {} removed", self.loan_number),
            now,
        ))
    }

    fn require(&self, allowed: &[LoanStatus], to: LoanStatus) -> Result<(), LendingError> {
        if self.is_removed() || !allowed.contains(&self.status) {
            return Err(LendingError::invalid_transition(self.status_label(), to));
        }
        Ok(())
    }

    fn close(&mut self, reason: String, now: DateTime<Utc>) {
        self.closed_at = Some(now);
        self.closure_reason = Some(reason);
        self.updated_at = now;
    }

    fn status_label(&self) -> String {
        if self.is_removed() {
            format!("{} (removed)", self.status)
        } else {
            self.status.to_string()
        }
    }
}

fn require_reason(reason: &str) -> Result<String, LendingError> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(LendingError::validation("a reason is required"));
    }
    Ok(reason.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain_ledger::ReferencePrefix;
    use rust_decimal_macros::dec;

    fn borrower() -> Borrower {
        Borrower {
            id: BorrowerId::new(),
            market_id: MarketId::new(),
            full_name: "Wanjiru Kamau".to_string(),
            phone: "0712345678".to_string(),
            national_id: None,
            is_active: true,
            registered_by: ActorId::new(),
            registered_at: Utc::now(),
        }
    }

    fn application(borrower: &Borrower) -> LoanApplication {
        LoanApplication {
            borrower_id: borrower.id,
            principal: dec!(10000),
            interest_rate: dec!(10),
            duration_days: 10,
            frequency: RepaymentFrequency::Daily,
            purpose: Some("Stock".to_string()),
        }
    }

    fn pending_loan() -> Loan {
        let borrower = borrower();
        let today = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let new = NewLoan::from_application(application(&borrower), &borrower, ActorId::new(), today, Utc::now())
            .unwrap();
        Loan::from_new(new, ReferenceNumber::new(ReferencePrefix::Loan, today, 1))
    }

    #[test]
    fn test_flat_interest_fixed_at_application() {
        let loan = pending_loan();
        assert_eq!(loan.interest_amount.amount(), dec!(1000));
        assert_eq!(loan.total_amount.amount(), dec!(11000));
        assert_eq!(loan.status, LoanStatus::Pending);
        assert_eq!(loan.loan_number.to_string(), "LN-20240115-0001");
    }

    #[test]
    fn test_interest_rounds_to_cents() {
        let borrower = borrower();
        let mut app = application(&borrower);
        app.principal = dec!(333.33);
        app.interest_rate = dec!(7.5);
        let new = NewLoan::from_application(app, &borrower, ActorId::new(), Utc::now().date_naive(), Utc::now())
            .unwrap();
        assert_eq!(new.interest_amount.amount(), dec!(25.00));
        assert_eq!(new.total_amount, new.principal_amount + new.interest_amount);
    }

    #[test]
    fn test_application_rejects_zero_principal_and_duration() {
        let borrower = borrower();
        let mut app = application(&borrower);
        app.principal = dec!(0);
        assert!(NewLoan::from_application(app, &borrower, ActorId::new(), Utc::now().date_naive(), Utc::now()).is_err());

        let mut app = application(&borrower);
        app.duration_days = 0;
        assert!(matches!(
            NewLoan::from_application(app, &borrower, ActorId::new(), Utc::now().date_naive(), Utc::now()),
            Err(LendingError::Validation(_))
        ));
    }

    #[test]
    fn test_oversized_application_is_rejected_without_panicking() {
        let borrower = borrower();
        let mut app = application(&borrower);
        app.principal = dec!(70000000000000000000000000000);
        app.interest_rate = dec!(500);
        assert!(matches!(
            NewLoan::from_application(app, &borrower, ActorId::new(), Utc::now().date_naive(), Utc::now()),
            Err(LendingError::Validation(_))
        ));

        let mut app = application(&borrower);
        app.principal = MAX_PRINCIPAL + dec!(0.01);
        assert!(matches!(
            NewLoan::from_application(app, &borrower, ActorId::new(), Utc::now().date_naive(), Utc::now()),
            Err(LendingError::Validation(_))
        ));
    }

    #[test]
    fn test_interest_rate_is_bounded() {
        let borrower = borrower();
        let mut app = application(&borrower);
        app.interest_rate = dec!(1000.01);
        assert!(matches!(
            NewLoan::from_application(app, &borrower, ActorId::new(), Utc::now().date_naive(), Utc::now()),
            Err(LendingError::Validation(_))
        ));

        let mut app = application(&borrower);
        app.interest_rate = MAX_INTEREST_RATE;
        let new = NewLoan::from_application(app, &borrower, ActorId::new(), Utc::now().date_naive(), Utc::now())
            .unwrap();
        assert_eq!(new.total_amount.amount(), dec!(110000));
    }

    #[test]
    fn test_total_at_column_limit_is_accepted() {
        let borrower = borrower();
        let mut app = application(&borrower);
        app.principal = MAX_PRINCIPAL;
        app.interest_rate = dec!(0);
        let new = NewLoan::from_application(app, &borrower, ActorId::new(), Utc::now().date_naive(), Utc::now())
            .unwrap();
        assert_eq!(new.total_amount.amount(), MAX_PRINCIPAL);

        let mut app = application(&borrower);
        app.principal = MAX_PRINCIPAL;
        app.interest_rate = dec!(1);
        assert!(NewLoan::from_application(app, &borrower, ActorId::new(), Utc::now().date_naive(), Utc::now()).is_err());
    }

    #[test]
    fn test_total_too_small_for_plan_is_rejected() {
        let borrower = borrower();
        let mut app = application(&borrower);
        app.principal = dec!(1.00);
        app.interest_rate = dec!(0);
        app.duration_days = 150;
        assert!(matches!(
            NewLoan::from_application(app, &borrower, ActorId::new(), Utc::now().date_naive(), Utc::now()),
            Err(LendingError::Validation(_))
        ));

        let mut app = application(&borrower);
        app.principal = dec!(1.50);
        app.interest_rate = dec!(0);
        app.duration_days = 150;
        assert!(NewLoan::from_application(app, &borrower, ActorId::new(), Utc::now().date_naive(), Utc::now()).is_ok());
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut loan = pending_loan();
        let actor = ActorId::new();
        let now = Utc::now();
        let day = NaiveDate::from_ymd_opt(2024, 1, 16).unwrap();

        assert_eq!(loan.approve(actor, now).unwrap().action, ActivityAction::Approved);
        assert_eq!(loan.approved_by, Some(actor));

        let activity = loan.disburse(day, actor, now).unwrap();
        assert_eq!(activity.action, ActivityAction::Disbursed);
        assert_eq!(loan.due_date, NaiveDate::from_ymd_opt(2024, 1, 26));

        loan.activate(actor, now).unwrap();
        assert_eq!(loan.complete(actor, now).unwrap().action, ActivityAction::Completed);
        assert!(loan.completed_at.is_some());
        assert!(loan.status.is_terminal());
    }

    #[test]
    fn test_cannot_approve_twice() {
        let mut loan = pending_loan();
        loan.approve(ActorId::new(), Utc::now()).unwrap();
        let result = loan.approve(ActorId::new(), Utc::now());
        assert!(matches!(result, Err(LendingError::InvalidStateTransition { .. })));
    }

    #[test]
    fn test_reject_requires_reason() {
        let mut loan = pending_loan();
        assert!(matches!(
            loan.reject(ActorId::new(), "  ", Utc::now()),
            Err(LendingError::Validation(_))
        ));
        loan.reject(ActorId::new(), "Insufficient trading history", Utc::now()).unwrap();
        assert_eq!(loan.status, LoanStatus::Rejected);
    }

    #[test]
    fn test_disburse_requires_approval() {
        let mut loan = pending_loan();
        let result = loan.disburse(Utc::now().date_naive(), ActorId::new(), Utc::now());
        assert!(matches!(result, Err(LendingError::InvalidStateTransition { .. })));
    }

    #[test]
    fn test_default_only_from_active() {
        let mut loan = pending_loan();
        let actor = ActorId::new();
        loan.approve(actor, Utc::now()).unwrap();
        loan.disburse(Utc::now().date_naive(), actor, Utc::now()).unwrap();
        assert!(loan.mark_defaulted(actor, "absconded", Utc::now()).is_err());

        loan.write_off(actor, "market fire", Utc::now()).unwrap();
        assert_eq!(loan.status, LoanStatus::WrittenOff);
        assert_eq!(loan.closure_reason.as_deref(), Some("market fire"));
    }

    #[test]
    fn test_removed_loan_rejects_transitions() {
        let mut loan = pending_loan();
        let actor = ActorId::new();
        loan.soft_remove(actor, Utc::now()).unwrap();
        assert!(loan.is_removed());
        assert!(loan.approve(actor, Utc::now()).is_err());
        assert!(loan.soft_remove(actor, Utc::now()).is_err());
    }

    #[test]
    fn test_cannot_remove_disbursed_loan() {
        let mut loan = pending_loan();
        let actor = ActorId::new();
        loan.approve(actor, Utc::now()).unwrap();
        loan.disburse(Utc::now().date_naive(), actor, Utc::now()).unwrap();
        assert!(loan.soft_remove(actor, Utc::now()).is_err());
        assert!(loan.ensure_accepts_payments().is_ok());
    }
}
