//! In-memory fakes for the session log (testing only)
//!
//! `MemorySessionLog` satisfies the `SessionLog` contract without touching
//! the filesystem. `FailingSessionLog` fails every append so orchestrator
//! tests can exercise the audit-write-failure path.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::audit::{AuditRecord, SessionId, SessionLog};
use crate::error::{LedgerError, LedgerResult};

#[derive(Debug, Default)]
struct MemorySession {
    records: Vec<AuditRecord>,
    finished: bool,
}

/// In-memory session log backed by a `HashMap<session_id, Vec<AuditRecord>>`.
#[derive(Debug, Default)]
pub struct MemorySessionLog {
    sessions: Mutex<HashMap<String, MemorySession>>,
}

impl MemorySessionLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(
        &self,
        session_id: &SessionId,
        mut record: AuditRecord,
        terminal: bool,
    ) -> LedgerResult<u64> {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions
            .get_mut(&session_id.0)
            .ok_or_else(|| LedgerError::SessionNotFound(session_id.to_string()))?;
        if session.finished {
            return Err(LedgerError::SessionFinished(session_id.to_string()));
        }
        let seq = session.records.len() as u64;
        record.seq = seq;
        record.terminal = terminal;
        session.records.push(record);
        session.finished = terminal;
        Ok(seq)
    }
}

#[async_trait]
impl SessionLog for MemorySessionLog {
    async fn open_session(&self, session_id: &SessionId) -> LedgerResult<()> {
        let mut sessions = self.sessions.lock().unwrap();
        sessions.entry(session_id.0.clone()).or_default();
        Ok(())
    }

    async fn append(&self, session_id: &SessionId, record: AuditRecord) -> LedgerResult<u64> {
        self.push(session_id, record, false)
    }

    async fn finish(&self, session_id: &SessionId, record: AuditRecord) -> LedgerResult<u64> {
        self.push(session_id, record, true)
    }

    async fn read_session(&self, session_id: &SessionId) -> LedgerResult<Vec<AuditRecord>> {
        let sessions = self.sessions.lock().unwrap();
        sessions
            .get(&session_id.0)
            .map(|s| s.records.clone())
            .ok_or_else(|| LedgerError::SessionNotFound(session_id.to_string()))
    }
}

/// Session log that accepts opens but fails every append.
#[derive(Debug, Default)]
pub struct FailingSessionLog;

impl FailingSessionLog {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SessionLog for FailingSessionLog {
    async fn open_session(&self, _session_id: &SessionId) -> LedgerResult<()> {
        Ok(())
    }

    async fn append(&self, _session_id: &SessionId, _record: AuditRecord) -> LedgerResult<u64> {
        Err(LedgerError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "simulated audit write failure",
        )))
    }

    async fn finish(&self, _session_id: &SessionId, _record: AuditRecord) -> LedgerResult<u64> {
        Err(LedgerError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "simulated audit write failure",
        )))
    }

    async fn read_session(&self, _session_id: &SessionId) -> LedgerResult<Vec<AuditRecord>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_append_assigns_monotonic_seq() {
        let log = MemorySessionLog::new();
        let id = SessionId::new();
        log.open_session(&id).await.expect("open");

        let s0 = log
            .append(&id, AuditRecord::new("a", json!({})))
            .await
            .expect("append");
        let s1 = log
            .append(&id, AuditRecord::new("b", json!({})))
            .await
            .expect("append");
        assert_eq!((s0, s1), (0, 1));
    }

    #[tokio::test]
    async fn test_finish_seals_session() {
        let log = MemorySessionLog::new();
        let id = SessionId::new();
        log.open_session(&id).await.expect("open");
        log.finish(&id, AuditRecord::new("done", json!({})))
            .await
            .expect("finish");

        let err = log
            .append(&id, AuditRecord::new("late", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::SessionFinished(_)));
    }

    #[tokio::test]
    async fn test_unknown_session_rejected() {
        let log = MemorySessionLog::new();
        let id = SessionId::new();
        let err = log
            .append(&id, AuditRecord::new("a", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::SessionNotFound(_)));
    }
}
