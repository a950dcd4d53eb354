//! Error types for core operations

use std::time::Duration;

use procwright_catalog::CatalogError;
use session_ledger::LedgerError;
use thiserror::Error;

/// Errors that can stop a refactoring session.
///
/// Validation failures are not errors; they drive the retry loop through
/// the session outcome instead. Transport and timeout failures are retried
/// with backoff before they become terminal.
#[derive(Error, Debug)]
pub enum RefactorError {
    /// Catalog connection failure; fatal for the whole resolution
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Audit write failure; the session must not proceed past it
    #[error("Audit write failed: {0}")]
    Audit(#[from] LedgerError),

    /// The generation service could not be reached or answered with an error
    #[error("Generation transport failure: {0}")]
    Transport(String),

    /// The generation service did not answer within the configured timeout
    #[error("Generation request timed out after {0:?}")]
    Timeout(Duration),

    /// The linter process could not be invoked or produced unreadable output
    #[error("Linter invocation failed: {0}")]
    Linter(String),

    /// The service reply carried no usable candidate body
    #[error("Generation response contained no candidate body")]
    EmptyCandidate,

    /// Payload serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RefactorError {
    /// Whether the error is retried with backoff inside an exchange.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RefactorError::Transport(_) | RefactorError::Timeout(_))
    }
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, RefactorError>;
