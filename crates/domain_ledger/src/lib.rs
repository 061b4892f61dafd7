//! Cash Ledger Domain
//!
//! This crate implements the append-only cash ledger of the lending
//! back-office. Every movement of money in or out of the business is one
//! signed entry:
//!
//! - **Capital injection**: owner funds added (+)
//! - **Expense**: operating costs paid out (-)
//! - **Disbursement**: loan principal released to a borrower (-)
//! - **Payment**: repayment received from a borrower (+)
//!
//! There is no stored balance. Cash-in-hand at any date is the sum of all
//! entries dated on or before it.
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_ledger::{CashLedger, NewLedgerEntry};
//!
//! let mut ledger = CashLedger::new();
//! ledger.append(NewLedgerEntry::capital_injection(amount, date, "Opening float", actor)?, now);
//! let cash = ledger.cash_in_hand(date, &MarketScope::All);
//! ```

pub mod entry;
pub mod ledger;
pub mod reference;
pub mod error;

pub use entry::{CashLedgerEntry, NewLedgerEntry, TransactionType};
pub use ledger::{CashLedger, cash_in_hand};
pub use reference::{ReferenceNumber, ReferencePrefix, ReferenceSequencer};
pub use error::LedgerError;
