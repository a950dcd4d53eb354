//! Session recorder: bridges domain milestones to `SessionLog` persistence.

use std::sync::Arc;

use serde_json::json;
use session_ledger::{AuditRecord, LedgerResult, SessionId, SessionLog};

use crate::resolver::ResolutionResult;
use crate::session::{ExchangeTurn, SessionOutcome};

/// Adapter that records session milestones into a [`SessionLog`].
///
/// Usage:
/// 1. [`SessionRecorder::start`] opens the session and records the start.
/// 2. [`SessionRecorder::record_resolution`] /
///    [`SessionRecorder::record_turn`] append milestones as they complete.
/// 3. [`SessionRecorder::finish`] seals the session with its terminal
///    outcome.
///
/// Every method is durable on return; the orchestrator never proceeds past
/// a failed append.
pub struct SessionRecorder {
    log: Arc<dyn SessionLog>,
    session_id: SessionId,
}

impl SessionRecorder {
    /// Open the session log and record the session start.
    pub async fn start(
        log: Arc<dyn SessionLog>,
        session_id: SessionId,
        root: &procwright_catalog::ObjectReference,
    ) -> LedgerResult<Self> {
        log.open_session(&session_id).await?;
        let record = AuditRecord::new(
            "session_started",
            json!({
                "root": root.qualified(),
                "kind": root.kind.as_str(),
            }),
        );
        log.append(&session_id, record).await?;
        crate::obs::emit_session_started(&session_id.to_string(), &root.qualified());
        Ok(Self { log, session_id })
    }

    /// Record the outcome of the resolution pass.
    pub async fn record_resolution(&self, resolution: &ResolutionResult) -> LedgerResult<u64> {
        let record = AuditRecord::new(
            "resolution_completed",
            json!({
                "root": resolution.root.qualified(),
                "resolved": resolution.definitions.len(),
                "truncated": resolution.truncated,
                "missing": resolution
                    .missing
                    .iter()
                    .map(|r| r.qualified())
                    .collect::<Vec<_>>(),
            }),
        );
        crate::obs::emit_resolution_completed(
            &self.session_id.to_string(),
            resolution.definitions.len(),
            resolution.missing.len(),
            resolution.truncated,
        );
        self.log.append(&self.session_id, record).await
    }

    /// Record one completed exchange turn, request and response included.
    pub async fn record_turn(&self, turn: &ExchangeTurn) -> LedgerResult<u64> {
        let record = AuditRecord::new(
            "turn_completed",
            json!({
                "turn_index": turn.turn_index,
                "request": serde_json::to_value(&turn.request)?,
                "response": serde_json::to_value(&turn.response)?,
                "validation": serde_json::to_value(&turn.validation)?,
                "completed_at": turn.timestamp,
            }),
        );
        crate::obs::emit_turn_completed(
            &self.session_id.to_string(),
            turn.turn_index,
            turn.validation.passed,
            turn.validation.violations.len(),
        );
        self.log.append(&self.session_id, record).await
    }

    /// Seal the session with its terminal outcome.
    pub async fn finish(self, outcome: SessionOutcome, turns: usize) -> LedgerResult<u64> {
        let record = AuditRecord::terminal(
            "session_finished",
            json!({
                "outcome": outcome.as_str(),
                "turns": turns,
            }),
        );
        crate::obs::emit_session_finished(&self.session_id.to_string(), outcome.as_str(), turns);
        self.log.finish(&self.session_id, record).await
    }

    /// The session being recorded.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }
}
