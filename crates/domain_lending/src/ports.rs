//! Lending Domain Ports
//!
//! [`LendingStore`] is everything the lending and reporting services need
//! from persistence. Each `commit_*` method is one unit of work: the adapter
//! either applies every effect or none of them.
//!
//! # Concurrency
//!
//! Commits that touch a loan carry the loan as the caller read it. The
//! adapter compares `loan.version` with the stored version and fails with
//! `PortError::Conflict` if they differ; on success it stores the loan with
//! `version + 1` and returns it. Reference numbers (loan numbers, receipts,
//! cash references) are allocated inside the same unit of work.
//!
//! # Adapters
//!
//! - `InMemoryLendingStore` (this crate): tests and local tooling
//! - `PostgresLendingStore` (`infra_db`): production

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use core_kernel::{
    BorrowerId, DomainPort, HealthCheckable, LoanId, MarketId, MarketScope, PaymentId, PortError,
    ScheduleId,
};
use domain_ledger::{CashLedgerEntry, NewLedgerEntry};

use crate::activity::LoanActivity;
use crate::borrower::{Borrower, Market};
use crate::loan::{Loan, NewLoan};
use crate::payment::{NewPayment, Payment};
use crate::schedule::{RepaymentSchedule, ScheduleStatus};

/// Everything written when a payment is captured
#[derive(Debug, Clone)]
pub struct PaymentCommit {
    /// Loan as read by the caller, with any lifecycle change applied
    pub loan: Loan,
    pub payment: NewPayment,
    /// Positive `payment` ledger entry; its `payment_id` equals `payment.id`
    pub ledger_entry: NewLedgerEntry,
    /// New cached status for the installment the payment is linked to
    pub schedule_status: Option<(ScheduleId, ScheduleStatus)>,
    /// `payment_recorded`, plus `activated`/`completed` when the status moved
    pub activities: Vec<LoanActivity>,
}

/// Result of a payment commit
#[derive(Debug, Clone)]
pub struct PaymentReceipt {
    pub loan: Loan,
    pub payment: Payment,
    pub ledger_entry: CashLedgerEntry,
}

/// Everything written when a loan is disbursed
#[derive(Debug, Clone)]
pub struct DisbursementCommit {
    pub loan: Loan,
    pub schedules: Vec<RepaymentSchedule>,
    /// Negative `disbursement` ledger entry for the principal
    pub ledger_entry: NewLedgerEntry,
    pub activity: LoanActivity,
}

/// Source rows for the reporting calculations
///
/// Soft-removed loans, and anything hanging off them, are excluded by the
/// adapter. Rows are restricted to the requested market scope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub scope: MarketScope,
    pub loans: Vec<Loan>,
    pub schedules: Vec<RepaymentSchedule>,
    pub payments: Vec<Payment>,
    pub ledger: Vec<CashLedgerEntry>,
}

/// The persistence port for the lending domain
#[async_trait]
pub trait LendingStore: DomainPort + HealthCheckable {
    // ========================================================================
    // Reads
    // ========================================================================

    async fn get_market(&self, id: MarketId) -> Result<Market, PortError>;

    async fn get_borrower(&self, id: BorrowerId) -> Result<Borrower, PortError>;

    /// Retrieves a loan, including soft-removed ones
    async fn get_loan(&self, id: LoanId) -> Result<Loan, PortError>;

    async fn get_payment(&self, id: PaymentId) -> Result<Payment, PortError>;

    /// Installments ordered by installment number
    async fn schedules_for_loan(&self, loan_id: LoanId) -> Result<Vec<RepaymentSchedule>, PortError>;

    async fn payments_for_loan(&self, loan_id: LoanId) -> Result<Vec<Payment>, PortError>;

    /// Audit trail in the order it was written
    async fn activities_for_loan(&self, loan_id: LoanId) -> Result<Vec<LoanActivity>, PortError>;

    /// Disbursed and active loans that are not soft-removed
    async fn open_loans(&self, scope: MarketScope) -> Result<Vec<Loan>, PortError>;

    /// Loads every row the reporting calculations need
    async fn portfolio_snapshot(&self, scope: MarketScope) -> Result<PortfolioSnapshot, PortError>;

    // ========================================================================
    // Writes
    // ========================================================================

    /// Inserts a market; fails with `Validation` on a duplicate code
    async fn insert_market(&self, market: Market) -> Result<Market, PortError>;

    /// Inserts a borrower; fails with `Validation` if the phone number is
    /// already registered in the market
    async fn insert_borrower(&self, borrower: Borrower) -> Result<Borrower, PortError>;

    /// Numbers and inserts a new application with its `applied` activity
    async fn commit_application(&self, loan: NewLoan, activity: LoanActivity) -> Result<Loan, PortError>;

    /// Persists a lifecycle change that touches only the loan row
    async fn commit_transition(&self, loan: Loan, activity: LoanActivity) -> Result<Loan, PortError>;

    /// Persists disbursement, the installment plan and the ledger entry
    ///
    /// Fails with `Validation` if the loan already has schedules.
    async fn commit_disbursement(&self, commit: DisbursementCommit) -> Result<Loan, PortError>;

    /// Persists a payment with all of its effects
    async fn commit_payment(&self, commit: PaymentCommit) -> Result<PaymentReceipt, PortError>;

    /// Sets the verification flag on a payment
    async fn commit_payment_verification(
        &self,
        payment: Payment,
        activity: LoanActivity,
    ) -> Result<Payment, PortError>;

    /// Rewrites cached installment statuses of one loan
    ///
    /// `loan` is the loan as read before the statuses were derived. The write
    /// fails with `Conflict` if its version has moved on, since a payment may
    /// have settled one of the installments in between. The version itself is
    /// left unchanged.
    async fn update_schedule_statuses(
        &self,
        loan: Loan,
        schedules: Vec<RepaymentSchedule>,
    ) -> Result<(), PortError>;

    /// Appends a ledger entry not tied to a loan event
    async fn append_ledger_entry(&self, entry: NewLedgerEntry) -> Result<CashLedgerEntry, PortError>;
}
