//! Durable JSONL session log.
//!
//! One append-only file per session at `<dir>/<session_id>.jsonl`, each line
//! one serialized [`AuditRecord`]. Appends flush and fsync before returning,
//! so a successful append survives a process crash and the file is readable
//! as a strict prefix of the session at any point in time.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use crate::audit::{AuditRecord, SessionId, SessionLog};
use crate::error::{LedgerError, LedgerResult};

#[derive(Debug, Clone, Copy)]
struct SessionState {
    next_seq: u64,
    finished: bool,
}

/// JSONL-backed session log rooted at a directory.
pub struct JsonlSessionLog {
    dir: PathBuf,
    sessions: Mutex<HashMap<String, SessionState>>,
}

impl JsonlSessionLog {
    /// Create a log rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> LedgerResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(JsonlSessionLog {
            dir,
            sessions: Mutex::new(HashMap::new()),
        })
    }

    /// Path of a session's log file.
    pub fn session_path(&self, session_id: &SessionId) -> PathBuf {
        self.dir.join(format!("{}.jsonl", session_id))
    }

    fn read_records(path: &Path, session_id: &SessionId) -> LedgerResult<Vec<AuditRecord>> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut records = Vec::new();

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: AuditRecord =
                serde_json::from_str(&line).map_err(|e| LedgerError::CorruptRecord {
                    session_id: session_id.to_string(),
                    line: line_no + 1,
                    detail: e.to_string(),
                })?;
            records.push(record);
        }

        Ok(records)
    }

    fn recover_state(path: &Path, session_id: &SessionId) -> LedgerResult<SessionState> {
        let records = Self::read_records(path, session_id)?;
        Ok(SessionState {
            next_seq: records.len() as u64,
            finished: records.last().map(|r| r.terminal).unwrap_or(false),
        })
    }

    fn append_record(&self, session_id: &SessionId, record: &AuditRecord) -> LedgerResult<()> {
        let path = self.session_path(session_id);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;

        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        file.write_all(line.as_bytes())?;
        file.flush()?;
        // Durability contract: the record must survive a crash once append
        // returns.
        file.sync_all()?;
        Ok(())
    }

    /// Assign the next seq and persist the record under one lock. The
    /// in-memory state only advances after the write succeeds, so a failed
    /// append leaves seq assignment and the file in agreement.
    fn persist(
        &self,
        session_id: &SessionId,
        mut record: AuditRecord,
        terminal: bool,
    ) -> LedgerResult<u64> {
        let mut sessions = self.sessions.lock().unwrap();
        let state = sessions
            .get_mut(&session_id.0)
            .ok_or_else(|| LedgerError::SessionNotFound(session_id.to_string()))?;
        if state.finished {
            return Err(LedgerError::SessionFinished(session_id.to_string()));
        }
        let seq = state.next_seq;
        record.seq = seq;
        record.terminal = terminal;
        self.append_record(session_id, &record)?;
        state.next_seq += 1;
        if terminal {
            state.finished = true;
        }
        debug!(session_id = %session_id, seq, kind = %record.kind, "Appended audit record");
        Ok(seq)
    }
}

#[async_trait]
impl SessionLog for JsonlSessionLog {
    async fn open_session(&self, session_id: &SessionId) -> LedgerResult<()> {
        let path = self.session_path(session_id);
        let state = if path.exists() {
            Self::recover_state(&path, session_id)?
        } else {
            SessionState {
                next_seq: 0,
                finished: false,
            }
        };

        debug!(
            session_id = %session_id,
            next_seq = state.next_seq,
            finished = state.finished,
            "Opened session log"
        );

        let mut sessions = self.sessions.lock().unwrap();
        sessions.insert(session_id.0.clone(), state);
        Ok(())
    }

    async fn append(&self, session_id: &SessionId, record: AuditRecord) -> LedgerResult<u64> {
        self.persist(session_id, record, false)
    }

    async fn finish(&self, session_id: &SessionId, record: AuditRecord) -> LedgerResult<u64> {
        self.persist(session_id, record, true)
    }

    async fn read_session(&self, session_id: &SessionId) -> LedgerResult<Vec<AuditRecord>> {
        let path = self.session_path(session_id);
        if !path.exists() {
            return Err(LedgerError::SessionNotFound(session_id.to_string()));
        }
        Self::read_records(&path, session_id)
    }
}
