//! Ledger domain errors

use core_kernel::MoneyError;
use thiserror::Error;

/// Errors that can occur in the ledger domain
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Amount failed validation
    #[error("Invalid amount: {0}")]
    InvalidAmount(#[from] MoneyError),

    /// Description is required on every entry
    #[error("Ledger entry description must not be blank")]
    MissingDescription,

    /// Transaction type code is not recognized
    #[error("Unknown transaction type: {0}")]
    UnknownTransactionType(String),

    /// Reference number could not be parsed
    #[error("Invalid reference number: {0}")]
    InvalidReference(String),
}
