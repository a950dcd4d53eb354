//! Audit record types and the session log trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::LedgerResult;

/// Unique identifier for an audit session (one tool invocation).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a new random SessionId
    pub fn new() -> Self {
        SessionId(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single self-describing audit record.
///
/// `payload_digest` is the SHA-256 of the serialized payload so reviewers
/// can verify records out of band. `terminal` marks the final record of a
/// session; nothing may be appended after it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Monotonic sequence number within the session, assigned on append.
    pub seq: u64,
    /// Record kind (e.g. "session_started", "turn_completed").
    pub kind: String,
    /// Record payload.
    pub payload: serde_json::Value,
    /// SHA-256 hex digest of the serialized payload.
    pub payload_digest: String,
    /// Whether this record finalizes the session.
    pub terminal: bool,
    /// When the record was produced.
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    /// Build a non-terminal record; `seq` is assigned by the ledger.
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        let digest = payload_digest(&payload);
        AuditRecord {
            seq: 0,
            kind: kind.into(),
            payload,
            payload_digest: digest,
            terminal: false,
            timestamp: Utc::now(),
        }
    }

    /// Build a terminal record.
    pub fn terminal(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        let mut record = Self::new(kind, payload);
        record.terminal = true;
        record
    }

    /// Recompute the payload digest and compare against the stored one.
    pub fn verify(&self) -> bool {
        payload_digest(&self.payload) == self.payload_digest
    }
}

/// SHA-256 hex digest of a JSON payload's canonical serialization.
pub fn payload_digest(payload: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    let bytes = serde_json::to_vec(payload).unwrap_or_default();
    hasher.update(&bytes);
    hex::encode(hasher.finalize())
}

/// Append-only session audit log.
///
/// Guarantees:
/// - Records are ordered by monotonic `seq` within a session.
/// - A successful `append` is durable and visible to every later read.
/// - A session accepts no appends after its terminal record.
#[async_trait]
pub trait SessionLog: Send + Sync {
    /// Open a session for appending. Re-opening an existing session recovers
    /// its sequence position and finished state from the stored records.
    async fn open_session(&self, session_id: &SessionId) -> LedgerResult<()>;

    /// Append a record, returning its assigned sequence number.
    async fn append(&self, session_id: &SessionId, record: AuditRecord) -> LedgerResult<u64>;

    /// Append a terminal record and seal the session.
    async fn finish(&self, session_id: &SessionId, record: AuditRecord) -> LedgerResult<u64>;

    /// Read all records for a session in append order.
    async fn read_session(&self, session_id: &SessionId) -> LedgerResult<Vec<AuditRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_digest_verifies() {
        let record = AuditRecord::new("turn_completed", json!({"turn_index": 0}));
        assert!(record.verify());
        assert!(!record.terminal);
    }

    #[test]
    fn test_tampered_payload_fails_verification() {
        let mut record = AuditRecord::new("turn_completed", json!({"turn_index": 0}));
        record.payload = json!({"turn_index": 1});
        assert!(!record.verify());
    }

    #[test]
    fn test_terminal_record() {
        let record = AuditRecord::terminal("session_finished", json!({"outcome": "accepted"}));
        assert!(record.terminal);
    }

    #[test]
    fn test_session_ids_are_unique() {
        let a = SessionId::new();
        let b = SessionId::new();
        assert_ne!(a, b);
    }
}
