//! Storage Error Types
//!
//! Errors raised by the bundled in-memory backend. They travel through the
//! `NodeStore` seam as `anyhow::Error` and can be recovered with
//! `downcast_ref::<StoreError>()`.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A record with the same key already exists
    #[error("Duplicate {kind} record: {key}")]
    DuplicateRecord { kind: &'static str, key: String },

    /// The record to update does not exist
    #[error("{kind} record not found: {key}")]
    RecordNotFound { kind: &'static str, key: String },

    /// Failure injected for testing
    #[error("Injected failure on {operation}")]
    InjectedFailure { operation: String },
}

impl StoreError {
    pub fn duplicate(kind: &'static str, key: impl Into<String>) -> Self {
        Self::DuplicateRecord {
            kind,
            key: key.into(),
        }
    }

    pub fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        Self::RecordNotFound {
            kind,
            key: key.into(),
        }
    }

    pub fn injected(operation: impl Into<String>) -> Self {
        Self::InjectedFailure {
            operation: operation.into(),
        }
    }
}
