//! Error model shared by every aggregate's command handlers.

use thiserror::Error;

/// Result alias for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

/// Deterministic business-rule failure.
///
/// Everything here is a rejection an aggregate can decide from its own state
/// and the command alone: replaying the same command against the same history
/// fails the same way. Storage and transport failures are not `DomainError`s;
/// they live in the infra layer's error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed or out-of-range input, e.g. an empty product name or a
    /// non-positive line quantity.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A state rule would be broken, e.g. adding a line to a confirmed
    /// rental order or debiting stock below zero.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier string did not parse as a stream id.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The target aggregate has no history, e.g. a command addressed to a
    /// customer that was never registered.
    #[error("not found")]
    NotFound,

    /// The operation clashes with existing state, e.g. retiring a product
    /// that still has open incidents.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The acting principal may not perform this operation.
    #[error("unauthorized")]
    Unauthorized,
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}
