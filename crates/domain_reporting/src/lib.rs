//! Reporting Domain
//!
//! Read-only figures for the back-office dashboard:
//!
//! - **Cash position**: net of the cash ledger up to a date
//! - **Recovery**: verified repayments received on a day, by frequency
//! - **Active loans**: open loans with money still to collect
//! - **Due today**: installments falling due and their collection rate
//! - **Exposure**: expected, received, outstanding and overdue money
//! - **Loan balance** and the combined **dashboard**
//!
//! The calculations in [`metrics`], [`balance`] and [`dashboard`] are pure
//! functions of source rows. [`ReportingService`] loads those rows from a
//! `LendingStore` on every call.

pub mod balance;
pub mod dashboard;
pub mod error;
pub mod metrics;
pub mod services;

pub use balance::{loan_balance, LoanBalance, NextInstallment};
pub use dashboard::DashboardSummary;
pub use error::ReportingError;
pub use metrics::{
    ActiveLoanCensus, CashPosition, DueInstallment, DueTodayReport, FrequencyBreakdown,
    PortfolioExposure, RecoveryReport,
};
pub use services::ReportingService;
