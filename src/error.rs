//! Wallet Error Types
//!
//! One error enum shared by every component. Variants map 1:1 onto the error
//! codes returned to the API layer.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::core_types::{NetworkId, Xid};
use crate::ledger::TxStatus;

/// Wallet error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WalletError {
    // === Input Errors ===
    #[error("Missing data: {0}")]
    MissingData(String),

    #[error("Invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("Arguments conflict: {0}")]
    ArgumentConflict(String),

    // === Resource Errors ===
    #[error("{0}")]
    NotFound(String),

    /// Disabled or blocked resource. The message may be operator-authored and
    /// is passed through verbatim.
    #[error("{0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    // === Amount Errors ===
    #[error("{0}")]
    AmountOutOfRange(String),

    #[error("Fee {fee} is out of range [{min}, {max}]")]
    FeeOutOfRange {
        fee: Decimal,
        min: Decimal,
        max: Decimal,
    },

    // === State Errors ===
    #[error("No unassigned deposit address left for network {0}")]
    PoolExhausted(NetworkId),

    #[error("Transaction {xid} is no longer in status {expected}")]
    StaleTransition { xid: Xid, expected: TxStatus },

    /// Saga or ledger invariant violated. Always logged by the caller.
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    // === System Errors ===
    #[error("Database error: {0}")]
    Database(String),

    /// Opaque failure reported by an upstream collaborator.
    #[error("Upstream failure: {0}")]
    Unknown(String),
}

impl WalletError {
    /// Shorthand for a field validation error
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        WalletError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            WalletError::MissingData(_) => "MISSING_DATA",
            WalletError::Validation { .. } => "VALIDATION_ERROR",
            WalletError::ArgumentConflict(_) => "ARGUMENTS_CONFLICT",
            WalletError::NotFound(_) => "NOT_FOUND",
            WalletError::Forbidden(_) => "FORBIDDEN",
            WalletError::Conflict(_) => "CONFLICT",
            WalletError::AmountOutOfRange(_) => "AMOUNT_OUT_OF_RANGE",
            WalletError::FeeOutOfRange { .. } => "FEE_OUT_OF_RANGE",
            WalletError::PoolExhausted(_) => "ASSIGN_ADDR_FAILED",
            WalletError::StaleTransition { .. } => "STALE_TRANSITION",
            WalletError::DataIntegrity(_) => "DATA_INTEGRITY",
            WalletError::Database(_) => "DATABASE_ERROR",
            WalletError::Unknown(_) => "UNKNOWN",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            WalletError::MissingData(_)
            | WalletError::Validation { .. }
            | WalletError::ArgumentConflict(_) => 400,
            WalletError::Forbidden(_) => 403,
            WalletError::NotFound(_) => 404,
            WalletError::Conflict(_) | WalletError::StaleTransition { .. } => 409,
            WalletError::AmountOutOfRange(_) | WalletError::FeeOutOfRange { .. } => 416,
            WalletError::DataIntegrity(_) | WalletError::Database(_) => 500,
            WalletError::Unknown(_) => 502,
            WalletError::PoolExhausted(_) => 503,
        }
    }
}

impl From<sqlx::Error> for WalletError {
    fn from(e: sqlx::Error) -> Self {
        WalletError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for WalletError {
    fn from(e: serde_json::Error) -> Self {
        WalletError::DataIntegrity(format!("Corrupt persisted payload: {}", e))
    }
}
