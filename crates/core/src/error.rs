//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Domain-level error for ledger operations.
///
/// Every variant is recoverable at the caller's boundary: a rejected request,
/// never a process failure. Infrastructure concerns (storage, publication)
/// live elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A non-positive or malformed amount, rejected before any persistence.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// A withdrawal request exceeds the seller's current available balance.
    /// No partial withdrawal is ever made.
    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: u64, available: u64 },

    /// An attempt to move a record out of a terminal state, e.g. resolving an
    /// already-resolved withdrawal or confirming voided revenue.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// Revenue for this order was confirmed previously; re-confirmation must
    /// not double-count.
    #[error("revenue already confirmed for this order")]
    AlreadyConfirmed,

    /// A referenced seller/order/request does not exist.
    #[error("not found")]
    NotFound,

    /// A conflict occurred (e.g. stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl LedgerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_amount(msg: impl Into<String>) -> Self {
        Self::InvalidAmount(msg.into())
    }

    pub fn insufficient_balance(requested: u64, available: u64) -> Self {
        Self::InsufficientBalance {
            requested,
            available,
        }
    }

    pub fn transition(msg: impl Into<String>) -> Self {
        Self::InvalidTransition(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}
