//! Session domain model: turns, validation results, outcomes.

use chrono::{DateTime, Utc};
use procwright_catalog::ObjectReference;
use serde::{Deserialize, Serialize};
use session_ledger::SessionId;

use crate::prompt::RefactorRequest;
use crate::service::GenerationResponse;

/// Terminal outcome of a session. Set exactly once.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    /// A candidate passed validation.
    Accepted,
    /// Every exchange in the budget failed validation.
    ExhaustedRetries,
    /// Transport retries exhausted or cancellation observed.
    Aborted,
    /// Required dependency context could not be resolved; no exchanges made.
    MissingDependencies,
}

impl SessionOutcome {
    /// Stable snake_case label, used in audit payloads and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionOutcome::Accepted => "accepted",
            SessionOutcome::ExhaustedRetries => "exhausted_retries",
            SessionOutcome::Aborted => "aborted",
            SessionOutcome::MissingDependencies => "missing_dependencies",
        }
    }
}

impl std::fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single lint violation, positioned in the candidate source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Violation {
    /// Rule code (e.g. "LT01").
    pub rule: String,
    /// Human-readable description.
    pub message: String,
    /// 1-based source line.
    pub line: u32,
    /// 1-based source column.
    pub column: u32,
}

/// Outcome of one static validation pass.
///
/// `passed` always reflects the untruncated check; capping the surfaced
/// violation list never flips it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationResult {
    /// Whether the candidate passed with zero violations.
    pub passed: bool,
    /// Violations ordered by source position.
    pub violations: Vec<Violation>,
}

impl ValidationResult {
    /// A clean pass.
    pub fn clean() -> Self {
        ValidationResult {
            passed: true,
            violations: Vec::new(),
        }
    }

    /// A result from a raw violation list; sorts by source position and
    /// derives `passed` from emptiness.
    pub fn from_violations(mut violations: Vec<Violation>) -> Self {
        violations.sort_by_key(|v| (v.line, v.column));
        ValidationResult {
            passed: violations.is_empty(),
            violations,
        }
    }

    /// Cap the surfaced violation list at `max`, keeping the true `passed`
    /// flag.
    pub fn truncated(mut self, max: usize) -> Self {
        self.violations.truncate(max);
        self
    }
}

/// One request/response round with the generation service.
/// Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeTurn {
    /// Zero-based index of this turn within the session.
    pub turn_index: u32,
    /// The request sent to the generation service.
    pub request: RefactorRequest,
    /// The service's reply.
    pub response: GenerationResponse,
    /// Validation of the candidate body.
    pub validation: ValidationResult,
    /// When the turn completed.
    pub timestamp: DateTime<Utc>,
}

/// A complete negotiation: the unit of audit durability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique id for this invocation.
    pub session_id: SessionId,
    /// The procedure under refactor.
    pub root: ObjectReference,
    /// All completed turns, in order.
    pub turns: Vec<ExchangeTurn>,
    /// Terminal outcome.
    pub outcome: SessionOutcome,
}

impl Session {
    /// The accepted candidate body, if the session accepted one.
    pub fn accepted_body(&self) -> Option<&str> {
        if self.outcome != SessionOutcome::Accepted {
            return None;
        }
        self.turns
            .last()
            .map(|turn| turn.response.refactored_sql.as_str())
    }
}
