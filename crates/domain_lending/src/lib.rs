//! Lending Domain
//!
//! This crate implements loan origination and repayment for the back-office:
//!
//! - **Parties**: markets and the borrowers registered in them
//! - **Aggregate**: [`Loan`] with its lifecycle and audit trail
//! - **Schedule Generator**: splits the total payable into installments at
//!   disbursement
//! - **Obligation Resolver**: derives paid, outstanding and overdue figures
//!   from payments
//! - **Port**: [`LendingStore`], with an in-memory adapter in [`adapters`]
//! - **Service**: [`LendingService`], the atomic write paths
//!
//! No balance is stored anywhere. A loan's position is always recomputed
//! from its installments and the payments linked to them.
//!
//! # Loan Lifecycle
//!
//! ```text
//! Pending -> Approved -> Disbursed -> Active -> Completed
//!        \-> Rejected            \        \-> Defaulted
//!                                 \-------\-> WrittenOff
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! let service = LendingService::new(store, clock);
//! let loan = service.apply_loan(application, officer).await?;
//! service.approve_loan(loan.id, supervisor).await?;
//! service.disburse_loan(loan.id, today, officer).await?;
//! let receipt = service.record_payment(request, officer).await?;
//! ```

pub mod activity;
pub mod adapters;
pub mod borrower;
pub mod error;
pub mod frequency;
pub mod loan;
pub mod obligation;
pub mod payment;
pub mod ports;
pub mod schedule;
pub mod services;

pub use activity::{ActivityAction, LoanActivity};
pub use adapters::InMemoryLendingStore;
pub use borrower::{Borrower, BorrowerRegistration, Market};
pub use error::LendingError;
pub use frequency::RepaymentFrequency;
pub use loan::{Loan, LoanApplication, LoanStatus, NewLoan};
pub use obligation::ObligationResolver;
pub use payment::{NewPayment, Payment, PaymentMethod, PaymentRequest};
pub use ports::{DisbursementCommit, LendingStore, PaymentCommit, PaymentReceipt, PortfolioSnapshot};
pub use schedule::{generate_schedule, RepaymentSchedule, ScheduleStatus};
pub use services::LendingService;
