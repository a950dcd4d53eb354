//! Exchange orchestration: the bounded negotiation loop.
//!
//! The negotiation is an explicit finite state machine. [`transition`] is a
//! pure function over (state, event); all I/O (catalog, generation service,
//! linter, audit appends) lives in the [`Orchestrator`] driver, so the
//! transition logic is testable without a network or a linter.
//!
//! Sequencing invariant: turn n+1 never begins composing until turn n's
//! audit record has been durably flushed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use procwright_catalog::{CatalogAccessor, ObjectReference};
use session_ledger::{SessionId, SessionLog};
use thiserror::Error;
use tracing::{debug, Instrument};

use crate::audit::SessionRecorder;
use crate::error::RefactorError;
use crate::prompt::{self, RefactorRequest};
use crate::resolver::DependencyResolver;
use crate::service::{GenerationResponse, GenerationService};
use crate::session::{ExchangeTurn, Session, SessionOutcome, Violation};
use crate::validator::{SqlDialect, SqlValidator};

/// States of the exchange loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    /// Resolving dependency context for the root.
    Resolving,
    /// Composing and sending the request for `turn_index`.
    Requesting { turn_index: u32 },
    /// Validating the candidate from `turn_index`.
    Validating { turn_index: u32 },
    /// Preparing feedback from the failed `turn_index`.
    Retrying { turn_index: u32 },
    /// Terminal: a candidate passed validation.
    Accepted,
    /// Terminal: every exchange in the budget failed validation.
    ExhaustedRetries,
    /// Terminal: transport retries exhausted or cancellation observed.
    Aborted,
    /// Terminal: required context could not be resolved.
    MissingDependencies,
}

impl ExchangeState {
    /// Whether the state is terminal.
    pub fn is_terminal(&self) -> bool {
        self.outcome().is_some()
    }

    /// The session outcome a terminal state corresponds to.
    pub fn outcome(&self) -> Option<SessionOutcome> {
        match self {
            ExchangeState::Accepted => Some(SessionOutcome::Accepted),
            ExchangeState::ExhaustedRetries => Some(SessionOutcome::ExhaustedRetries),
            ExchangeState::Aborted => Some(SessionOutcome::Aborted),
            ExchangeState::MissingDependencies => Some(SessionOutcome::MissingDependencies),
            _ => None,
        }
    }
}

/// Events fed to the state machine by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeEvent {
    /// Resolution finished; `blocked` when missing context forbids exchanges.
    ContextResolved { blocked: bool },
    /// Cancellation observed at a turn boundary.
    Cancelled,
    /// The generation service replied with a candidate.
    RequestSucceeded,
    /// Transport retries for one request are exhausted.
    TransportExhausted,
    /// The candidate passed validation.
    ValidationPassed,
    /// The candidate failed validation; `budget_remaining` if another
    /// exchange fits the budget.
    ValidationFailed { budget_remaining: bool },
    /// Feedback from the failed turn was attached for the next request.
    FeedbackPrepared,
}

/// Pure transition function. Terminal states absorb every event; an event
/// that does not apply to the current state leaves it unchanged.
pub fn transition(state: ExchangeState, event: ExchangeEvent) -> ExchangeState {
    use ExchangeEvent as E;
    use ExchangeState as S;

    match (state, event) {
        (S::Resolving, E::ContextResolved { blocked: true }) => S::MissingDependencies,
        (S::Resolving, E::ContextResolved { blocked: false }) => S::Requesting { turn_index: 0 },
        (S::Requesting { turn_index }, E::RequestSucceeded) => S::Validating { turn_index },
        (S::Requesting { .. }, E::TransportExhausted) => S::Aborted,
        (S::Validating { .. }, E::ValidationPassed) => S::Accepted,
        (
            S::Validating { turn_index },
            E::ValidationFailed {
                budget_remaining: true,
            },
        ) => S::Retrying { turn_index },
        (
            S::Validating { .. },
            E::ValidationFailed {
                budget_remaining: false,
            },
        ) => S::ExhaustedRetries,
        (S::Retrying { turn_index }, E::FeedbackPrepared) => S::Requesting {
            turn_index: turn_index + 1,
        },
        (state, E::Cancelled) if !state.is_terminal() => S::Aborted,
        (state, _) => state,
    }
}

/// Cooperative cancellation flag, observed at turn boundaries only.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; takes effect at the next turn boundary.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Maximum request/validate rounds per session (≥ 1).
    pub max_exchanges: u32,
    /// Dependency resolution depth; 0 resolves only the root.
    pub max_depth: u32,
    /// Transport retries per exchange before the session aborts.
    pub transport_retries: u32,
    /// Base backoff delay; doubles per retry.
    pub backoff_base_ms: u64,
    /// Cap on violations surfaced (and fed back) per turn.
    pub max_lint_failures: usize,
    /// Proceed with partial context instead of ending in
    /// MissingDependencies. The root must still resolve.
    pub allow_missing_dependencies: bool,
    /// Lint dialect, fixed per run.
    pub dialect: SqlDialect,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            max_exchanges: 3,
            max_depth: 1,
            transport_retries: 3,
            backoff_base_ms: 500,
            max_lint_failures: 25,
            allow_missing_dependencies: false,
            dialect: SqlDialect::TSql,
        }
    }
}

/// A session stopped by a fatal error before reaching a terminal outcome.
///
/// Carries every completed turn so the caller retains the full record of
/// what happened before the failure.
#[derive(Error, Debug)]
#[error("session {session_id} failed: {error}")]
pub struct SessionFailure {
    /// The failed session.
    pub session_id: SessionId,
    /// What stopped it.
    #[source]
    pub error: RefactorError,
    /// Turns completed (and audited) before the failure.
    pub turns: Vec<ExchangeTurn>,
}

/// Drives one session through the exchange state machine.
pub struct Orchestrator {
    resolver: DependencyResolver,
    service: Arc<dyn GenerationService>,
    validator: Arc<dyn SqlValidator>,
    log: Arc<dyn SessionLog>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        catalog: Arc<dyn CatalogAccessor>,
        service: Arc<dyn GenerationService>,
        validator: Arc<dyn SqlValidator>,
        log: Arc<dyn SessionLog>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            resolver: DependencyResolver::new(catalog),
            service,
            validator,
            log,
            config,
        }
    }

    /// Run one complete negotiation for `root`.
    ///
    /// Returns the finalized [`Session`] for every terminal outcome,
    /// success or not; `Err` means a fatal condition (catalog connection,
    /// audit write, linter invocation) stopped the session before a
    /// terminal outcome could be recorded.
    pub async fn run(
        &self,
        root: ObjectReference,
        user_notes: Option<String>,
        cancel: CancelFlag,
    ) -> Result<Session, SessionFailure> {
        let session_id = SessionId::new();
        let span = crate::obs::session_span(&session_id.to_string());
        self.run_session(session_id, root, user_notes, cancel)
            .instrument(span)
            .await
    }

    async fn run_session(
        &self,
        session_id: SessionId,
        root: ObjectReference,
        user_notes: Option<String>,
        cancel: CancelFlag,
    ) -> Result<Session, SessionFailure> {
        let mut turns: Vec<ExchangeTurn> = Vec::new();

        let recorder = SessionRecorder::start(self.log.clone(), session_id.clone(), &root)
            .await
            .map_err(|e| failure(&session_id, RefactorError::Audit(e), Vec::new()))?;

        let resolution = self
            .resolver
            .resolve(&root, self.config.max_depth)
            .await
            .map_err(|e| failure(&session_id, RefactorError::Catalog(e), Vec::new()))?;
        recorder
            .record_resolution(&resolution)
            .await
            .map_err(|e| failure(&session_id, RefactorError::Audit(e), Vec::new()))?;

        // Missing context blocks unless the run tolerates it; a missing
        // root always blocks since there is nothing to refactor.
        let blocked = resolution.root_missing()
            || (!resolution.missing.is_empty() && !self.config.allow_missing_dependencies);
        let mut state = transition(
            ExchangeState::Resolving,
            ExchangeEvent::ContextResolved { blocked },
        );

        let root_sql = resolution
            .root_definition()
            .map(|d| d.source_text.clone())
            .unwrap_or_default();
        let mut feedback: Vec<Violation> = Vec::new();

        while let ExchangeState::Requesting { turn_index } = state {
            // Turn boundary: the only place cancellation is observed.
            if cancel.is_cancelled() {
                state = transition(state, ExchangeEvent::Cancelled);
                break;
            }

            let request =
                prompt::build_request(&resolution, &root_sql, user_notes.as_deref(), &feedback);

            let response = match self.send_with_backoff(&session_id, &request).await {
                Ok(response) => response,
                Err(error) => {
                    debug!(turn_index, %error, "Transport retries exhausted");
                    state = transition(state, ExchangeEvent::TransportExhausted);
                    break;
                }
            };
            state = transition(state, ExchangeEvent::RequestSucceeded);

            let validation = self
                .validator
                .validate(&response.refactored_sql, self.config.dialect)
                .await
                .map_err(|e| failure(&session_id, e, turns.clone()))?
                .truncated(self.config.max_lint_failures);
            let passed = validation.passed;

            let turn = ExchangeTurn {
                turn_index,
                request,
                response,
                validation,
                timestamp: chrono::Utc::now(),
            };

            // The turn must be durable before anything else happens.
            if let Err(e) = recorder.record_turn(&turn).await {
                turns.push(turn);
                return Err(failure(&session_id, RefactorError::Audit(e), turns));
            }
            turns.push(turn);

            let budget_remaining = turn_index + 1 < self.config.max_exchanges;
            state = transition(
                state,
                if passed {
                    ExchangeEvent::ValidationPassed
                } else {
                    ExchangeEvent::ValidationFailed { budget_remaining }
                },
            );

            if let ExchangeState::Retrying { .. } = state {
                // Feedback is exactly the failed turn's surfaced violations,
                // never an accumulation across turns.
                feedback = turns
                    .last()
                    .map(|t| t.validation.violations.clone())
                    .unwrap_or_default();
                state = transition(state, ExchangeEvent::FeedbackPrepared);
            }
        }

        let outcome = state.outcome().unwrap_or(SessionOutcome::Aborted);
        recorder
            .finish(outcome, turns.len())
            .await
            .map_err(|e| failure(&session_id, RefactorError::Audit(e), turns.clone()))?;

        Ok(Session {
            session_id,
            root,
            turns,
            outcome,
        })
    }

    /// Send one request, retrying transport and service failures with
    /// exponential backoff up to the configured cap.
    async fn send_with_backoff(
        &self,
        session_id: &SessionId,
        request: &RefactorRequest,
    ) -> Result<GenerationResponse, RefactorError> {
        let mut attempt = 0u32;
        loop {
            match self.service.propose(request).await {
                Ok(response) => return Ok(response),
                Err(error) => {
                    if !error.is_retryable() || attempt >= self.config.transport_retries {
                        return Err(error);
                    }
                    let delay_ms = backoff_delay_ms(self.config.backoff_base_ms, attempt);
                    crate::obs::emit_transport_retry(
                        &session_id.to_string(),
                        attempt + 1,
                        delay_ms,
                        &error,
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Exponential backoff delay. The exponent is clamped so an arbitrarily
/// large configured retry count cannot overflow the shift; the
/// multiplication saturates rather than wrapping.
fn backoff_delay_ms(base_ms: u64, attempt: u32) -> u64 {
    base_ms.saturating_mul(1u64 << attempt.min(16))
}

fn failure(
    session_id: &SessionId,
    error: RefactorError,
    turns: Vec<ExchangeTurn>,
) -> SessionFailure {
    SessionFailure {
        session_id: session_id.clone(),
        error,
        turns,
    }
}
