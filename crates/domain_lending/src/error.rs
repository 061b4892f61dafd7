//! Lending domain errors
//!
//! Every fallible lending operation returns [`LendingError`]. Adapter failures
//! arrive as [`PortError`] and are folded into the same taxonomy so callers can
//! tell a retryable conflict from a permanent rejection.

use thiserror::Error;

use core_kernel::{MoneyError, PortError};
use domain_ledger::LedgerError;

/// Errors that can occur in the lending domain
#[derive(Debug, Error)]
pub enum LendingError {
    /// Malformed or missing input, rejected before any state change
    #[error("Validation error: {0}")]
    Validation(String),

    /// A referenced record does not exist
    #[error("{entity} not found: {id}")]
    NotFound {
        entity: String,
        id: String,
    },

    /// The loan is not in a state that allows the requested transition
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        from: String,
        to: String,
    },

    /// Another writer changed the loan first; the caller should retry
    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    /// Storage failed; the whole unit of work was rolled back
    #[error("Persistence failure: {0}")]
    Persistence(#[source] PortError),
}

impl LendingError {
    /// Creates a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        LendingError::Validation(message.into())
    }

    /// Creates a not found error
    pub fn not_found(entity: impl Into<String>, id: impl std::fmt::Display) -> Self {
        LendingError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Creates an invalid state transition error
    pub fn invalid_transition(from: impl std::fmt::Display, to: impl std::fmt::Display) -> Self {
        LendingError::InvalidStateTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Returns true if repeating the call may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            LendingError::ConcurrencyConflict(_) => true,
            LendingError::Persistence(source) => source.is_transient(),
            _ => false,
        }
    }
}

impl From<PortError> for LendingError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound { entity_type, id } => LendingError::NotFound {
                entity: entity_type,
                id,
            },
            PortError::Validation { message, field } => match field {
                Some(field) => LendingError::Validation(format!("{}: {}", field, message)),
                None => LendingError::Validation(message),
            },
            PortError::Conflict { message } => LendingError::ConcurrencyConflict(message),
            other => LendingError::Persistence(other),
        }
    }
}

impl From<MoneyError> for LendingError {
    fn from(err: MoneyError) -> Self {
        LendingError::Validation(err.to_string())
    }
}

impl From<LedgerError> for LendingError {
    fn from(err: LedgerError) -> Self {
        LendingError::Validation(err.to_string())
    }
}

impl From<validator::ValidationErrors> for LendingError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<String> = errors
            .field_errors()
            .iter()
            .map(|(field, errs)| {
                let codes: Vec<String> = errs.iter().map(|e| e.code.to_string()).collect();
                format!("{} ({})", field, codes.join(", "))
            })
            .collect();
        fields.sort();
        LendingError::Validation(format!("invalid fields: {}", fields.join("; ")))
    }
}
