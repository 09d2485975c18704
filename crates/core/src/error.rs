//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every failure here is a deterministic, rejected operation: it is detected
/// before or during the transaction and aborts the whole transaction with no
/// partial writes. Retry policy belongs to the caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A referenced container/shelf/slot does not exist.
    #[error("not found")]
    NotFound,

    /// The operation is not allowed from the record's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A slot or shelf would exceed its capacity.
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// A consumption/move amount exceeds the weight actually available.
    #[error("insufficient weight: {0}")]
    InsufficientWeight(String),

    /// The operation spans two different logistics centers.
    #[error("cross-center mismatch: {0}")]
    CrossCenterMismatch(String),

    /// A required argument is malformed or missing.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A conflict occurred (stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn capacity_exceeded(msg: impl Into<String>) -> Self {
        Self::CapacityExceeded(msg.into())
    }

    pub fn insufficient_weight(msg: impl Into<String>) -> Self {
        Self::InsufficientWeight(msg.into())
    }

    pub fn cross_center(msg: impl Into<String>) -> Self {
        Self::CrossCenterMismatch(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}
