//! Error types for the session ledger

use thiserror::Error;

/// Errors that can occur in the audit persistence layer.
///
/// Every variant is fatal to the session that hit it: the orchestrator must
/// not proceed past a turn whose audit record failed to persist.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Filesystem error while writing or reading a session log
    #[error("Ledger I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record serialization error
    #[error("Record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Session log does not exist
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Session was already finalized; no further appends allowed
    #[error("Session already finished: {0}")]
    SessionFinished(String),

    /// A stored record could not be parsed back
    #[error("Corrupt record in session {session_id} at line {line}: {detail}")]
    CorruptRecord {
        session_id: String,
        line: usize,
        detail: String,
    },
}

/// Result type for ledger operations
pub type LedgerResult<T> = std::result::Result<T, LedgerError>;
