//! The module contains the errors the engine can throw.
//!
//! Programming errors ([`OrderRequired`], [`Arity`], [`InvalidFilter`])
//! indicate a misuse of the storage layer and are not recoverable by
//! retrying. Storage integrity violations are translated once, at the
//! command boundary, into [`Conflict`]; everything else propagates
//! unmodified.
//!
//! [`OrderRequired`]: EngineError::OrderRequired
//! [`Arity`]: EngineError::Arity
//! [`InvalidFilter`]: EngineError::InvalidFilter
//! [`Conflict`]: EngineError::Conflict
use sea_orm::DbErr;
use thiserror::Error;

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("\"{0}\" not found!")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("cursor pagination requires an explicit ordering")]
    OrderRequired,
    #[error("expected {expected} primary-key value(s), got {got}")]
    Arity { expected: usize, got: usize },
    #[error("timed out waiting for lock \"{0}\"")]
    LockTimeout(String),
    #[error("Hierarchy violation: {0}")]
    Cycle(String),
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),
    #[error("Invalid name: {0}")]
    InvalidName(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),
    #[error("Currency mismatch: {0}")]
    CurrencyMismatch(String),
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::NotFound(a), Self::NotFound(b)) => a == b,
            (Self::Conflict(a), Self::Conflict(b)) => a == b,
            (Self::OrderRequired, Self::OrderRequired) => true,
            (
                Self::Arity {
                    expected: a,
                    got: g,
                },
                Self::Arity {
                    expected: oa,
                    got: og,
                },
            ) => a == oa && g == og,
            (Self::LockTimeout(a), Self::LockTimeout(b)) => a == b,
            (Self::Cycle(a), Self::Cycle(b)) => a == b,
            (Self::InvalidCursor(a), Self::InvalidCursor(b)) => a == b,
            (Self::InvalidFilter(a), Self::InvalidFilter(b)) => a == b,
            (Self::InvalidName(a), Self::InvalidName(b)) => a == b,
            (Self::InvalidAmount(a), Self::InvalidAmount(b)) => a == b,
            (Self::InsufficientFunds(a), Self::InsufficientFunds(b)) => a == b,
            (Self::CurrencyMismatch(a), Self::CurrencyMismatch(b)) => a == b,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
