//! Reporting errors
//!
//! The calculations themselves cannot fail; only loading their inputs can.

use thiserror::Error;

use core_kernel::PortError;

/// Errors that can occur while producing a report
#[derive(Debug, Error)]
pub enum ReportingError {
    /// The loan asked about does not exist
    #[error("{entity} not found: {id}")]
    NotFound {
        entity: String,
        id: String,
    },

    /// The store could not supply the source rows
    #[error("Storage error: {0}")]
    Storage(#[source] PortError),
}

impl From<PortError> for ReportingError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound { entity_type, id } => ReportingError::NotFound {
                entity: entity_type,
                id,
            },
            other => ReportingError::Storage(other),
        }
    }
}
