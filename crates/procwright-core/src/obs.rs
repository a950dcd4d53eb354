//! Structured observability hooks for session lifecycle events.
//!
//! Provides a session-scoped tracing span, emitter functions for the key
//! lifecycle events, and [`init_tracing`] for one-time subscriber setup in
//! the binary.
//!
//! Events are emitted at `info!` level. Set `PROCWRIGHT_LOG` to override
//! the filter; pass `json = true` to `init_tracing` for JSON output.

use tracing::{info, Level, Span};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Span covering one session's control flow. Attach with
/// `tracing::Instrument` so it follows the session future across awaits.
pub fn session_span(session_id: &str) -> Span {
    tracing::info_span!("procwright.session", session_id = %session_id)
}

/// Configure the global tracing subscriber. Call once at program start.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_env("PROCWRIGHT_LOG")
        .unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false))
            .try_init()
            .ok();
    }
}

/// Emit event: session started for a root procedure.
pub fn emit_session_started(session_id: &str, root: &str) {
    info!(event = "session.started", session_id = %session_id, root = %root);
}

/// Emit event: dependency resolution completed.
pub fn emit_resolution_completed(
    session_id: &str,
    resolved: usize,
    missing: usize,
    truncated: bool,
) {
    info!(
        event = "session.resolution_completed",
        session_id = %session_id,
        resolved = resolved,
        missing = missing,
        truncated = truncated,
    );
}

/// Emit event: one exchange turn completed with its validation verdict.
pub fn emit_turn_completed(session_id: &str, turn_index: u32, passed: bool, violations: usize) {
    info!(
        event = "session.turn_completed",
        session_id = %session_id,
        turn_index = turn_index,
        passed = passed,
        violations = violations,
    );
}

/// Emit event: a transport attempt failed and will be retried after backoff.
pub fn emit_transport_retry(session_id: &str, attempt: u32, delay_ms: u64, error: &dyn std::fmt::Display) {
    tracing::warn!(
        event = "session.transport_retry",
        session_id = %session_id,
        attempt = attempt,
        delay_ms = delay_ms,
        error = %error,
    );
}

/// Emit event: session reached a terminal outcome.
pub fn emit_session_finished(session_id: &str, outcome: &str, turns: usize) {
    info!(
        event = "session.finished",
        session_id = %session_id,
        outcome = %outcome,
        turns = turns,
    );
}
