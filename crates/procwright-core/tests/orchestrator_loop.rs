//! End-to-end tests of the exchange loop against in-memory fakes.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use procwright_catalog::fakes::MemoryCatalog;
use procwright_core::{
    CancelFlag, GenerationResponse, GenerationService, Orchestrator, OrchestratorConfig,
    RefactorError, RefactorRequest, SessionOutcome, SqlDialect, SqlValidator, ValidationResult,
    Violation,
};
use session_ledger::fakes::{FailingSessionLog, MemorySessionLog};
use session_ledger::{SessionLog, LedgerError};

/// Generation service that replays a script of canned results and records
/// every request it receives.
struct ScriptedService {
    script: Mutex<VecDeque<Result<GenerationResponse, RefactorError>>>,
    requests: Mutex<Vec<RefactorRequest>>,
}

impl ScriptedService {
    fn new(script: Vec<Result<GenerationResponse, RefactorError>>) -> Self {
        ScriptedService {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn always_ok(n: usize) -> Self {
        Self::new((0..n).map(|i| Ok(candidate(i))).collect())
    }

    fn requests(&self) -> Vec<RefactorRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationService for ScriptedService {
    async fn propose(&self, request: &RefactorRequest) -> Result<GenerationResponse, RefactorError> {
        self.requests.lock().unwrap().push(request.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(RefactorError::Transport("script exhausted".into())))
    }
}

/// Validator that replays a script of canned results.
struct ScriptedValidator {
    script: Mutex<VecDeque<ValidationResult>>,
}

impl ScriptedValidator {
    fn new(script: Vec<ValidationResult>) -> Self {
        ScriptedValidator {
            script: Mutex::new(script.into()),
        }
    }

    fn always_clean() -> Self {
        Self::new(vec![ValidationResult::clean(); 8])
    }
}

#[async_trait]
impl SqlValidator for ScriptedValidator {
    async fn validate(
        &self,
        _candidate_body: &str,
        _dialect: SqlDialect,
    ) -> Result<ValidationResult, RefactorError> {
        Ok(self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(ValidationResult::clean))
    }
}

fn candidate(i: usize) -> GenerationResponse {
    GenerationResponse {
        refactored_sql: format!("SELECT {} FROM dbo.Orders;", i),
        rationale: None,
    }
}

fn violation(rule: &str, line: u32) -> Violation {
    Violation {
        rule: rule.to_string(),
        message: format!("{} violated", rule),
        line,
        column: 1,
    }
}

fn catalog_with_root() -> (Arc<MemoryCatalog>, procwright_catalog::ObjectReference) {
    let catalog = Arc::new(MemoryCatalog::new());
    let root = catalog.insert_procedure("GetOrders", "SELECT * FROM dbo.Orders");
    catalog.insert_table("Orders", "id int NOT NULL");
    (catalog, root)
}

fn quick_config() -> OrchestratorConfig {
    OrchestratorConfig {
        backoff_base_ms: 1,
        ..OrchestratorConfig::default()
    }
}

fn orchestrator(
    catalog: Arc<MemoryCatalog>,
    service: Arc<ScriptedService>,
    validator: Arc<ScriptedValidator>,
    log: Arc<dyn SessionLog>,
    config: OrchestratorConfig,
) -> Orchestrator {
    Orchestrator::new(catalog, service, validator, log, config)
}

#[tokio::test]
async fn test_first_candidate_accepted() {
    let (catalog, root) = catalog_with_root();
    let service = Arc::new(ScriptedService::always_ok(1));
    let log = Arc::new(MemorySessionLog::new());
    let orch = orchestrator(
        catalog,
        service.clone(),
        Arc::new(ScriptedValidator::always_clean()),
        log.clone(),
        quick_config(),
    );

    let session = orch
        .run(root, None, CancelFlag::new())
        .await
        .expect("session");

    assert_eq!(session.outcome, SessionOutcome::Accepted);
    assert_eq!(session.turns.len(), 1);
    assert_eq!(session.accepted_body(), Some("SELECT 0 FROM dbo.Orders;"));
    assert!(session.turns[0].request.prior_feedback.is_empty());

    // Dependency context carries the table but never the root itself.
    let context = &session.turns[0].request.context;
    assert_eq!(context.objects.len(), 1);
    assert_eq!(context.objects[0].name, "dbo.Orders");

    let records = log.read_session(&session.session_id).await.expect("read");
    let kinds: Vec<&str> = records.iter().map(|r| r.kind.as_str()).collect();
    assert_eq!(
        kinds,
        vec![
            "session_started",
            "resolution_completed",
            "turn_completed",
            "session_finished",
        ]
    );
    assert!(records.last().unwrap().terminal);
    for record in &records {
        assert!(record.verify());
    }
}

#[tokio::test]
async fn test_budget_exhaustion_after_max_exchanges() {
    let (catalog, root) = catalog_with_root();
    let service = Arc::new(ScriptedService::always_ok(3));
    let validator = Arc::new(ScriptedValidator::new(vec![
        ValidationResult::from_violations(vec![violation("LT01", 3)]),
        ValidationResult::from_violations(vec![violation("AM04", 7)]),
        ValidationResult::from_violations(vec![violation("LT01", 3), violation("AM04", 7)]),
    ]));
    let log = Arc::new(MemorySessionLog::new());
    let orch = orchestrator(catalog, service.clone(), validator, log.clone(), quick_config());

    let session = orch
        .run(root, None, CancelFlag::new())
        .await
        .expect("session");

    assert_eq!(session.outcome, SessionOutcome::ExhaustedRetries);
    assert_eq!(session.turns.len(), 3);
    assert!(session.accepted_body().is_none());

    // Feedback carries exactly the previous turn's violations, never an
    // accumulation across turns.
    let requests = service.requests();
    assert_eq!(requests.len(), 3);
    assert!(requests[0].prior_feedback.is_empty());
    assert_eq!(requests[1].prior_feedback, vec![violation("LT01", 3)]);
    assert_eq!(requests[2].prior_feedback, vec![violation("AM04", 7)]);

    let records = log.read_session(&session.session_id).await.expect("read");
    assert_eq!(records.iter().filter(|r| r.kind == "turn_completed").count(), 3);
    assert_eq!(records.last().unwrap().kind, "session_finished");
}

#[tokio::test]
async fn test_missing_dependency_blocks_session() {
    let catalog = Arc::new(MemoryCatalog::new());
    let root = catalog.insert_procedure(
        "ArchiveOrders",
        "INSERT INTO dbo.Orders_Archive SELECT * FROM dbo.Orders",
    );
    catalog.insert_table("Orders", "id int NOT NULL");
    // Listed in the catalog, but its definition cannot be fetched.
    catalog.insert_undefined(procwright_catalog::ObjectReference::new(
        "dbo",
        "Orders_Archive",
        procwright_catalog::ObjectKind::Table,
    ));

    let service = Arc::new(ScriptedService::always_ok(1));
    let log = Arc::new(MemorySessionLog::new());
    let orch = orchestrator(
        catalog,
        service.clone(),
        Arc::new(ScriptedValidator::always_clean()),
        log.clone(),
        quick_config(),
    );

    let session = orch
        .run(root, None, CancelFlag::new())
        .await
        .expect("session");

    assert_eq!(session.outcome, SessionOutcome::MissingDependencies);
    assert!(session.turns.is_empty());
    // No request was ever sent.
    assert!(service.requests().is_empty());

    let records = log.read_session(&session.session_id).await.expect("read");
    assert_eq!(records.last().unwrap().kind, "session_finished");
    assert!(records.last().unwrap().terminal);
}

#[tokio::test]
async fn test_allow_missing_proceeds_with_partial_context() {
    let catalog = Arc::new(MemoryCatalog::new());
    let root = catalog.insert_procedure(
        "ArchiveOrders",
        "INSERT INTO dbo.Orders_Archive SELECT * FROM dbo.Orders",
    );
    catalog.insert_table("Orders", "id int NOT NULL");
    catalog.insert_undefined(procwright_catalog::ObjectReference::new(
        "dbo",
        "Orders_Archive",
        procwright_catalog::ObjectKind::Table,
    ));

    let service = Arc::new(ScriptedService::always_ok(1));
    let orch = orchestrator(
        catalog,
        service.clone(),
        Arc::new(ScriptedValidator::always_clean()),
        Arc::new(MemorySessionLog::new()),
        OrchestratorConfig {
            allow_missing_dependencies: true,
            ..quick_config()
        },
    );

    let session = orch
        .run(root, None, CancelFlag::new())
        .await
        .expect("session");

    assert_eq!(session.outcome, SessionOutcome::Accepted);
    // The unresolvable object is named in the context rather than dropped.
    assert_eq!(
        service.requests()[0].context.missing,
        vec!["dbo.Orders_Archive".to_string()]
    );
}

#[tokio::test]
async fn test_transport_exhaustion_aborts() {
    let (catalog, root) = catalog_with_root();
    let service = Arc::new(ScriptedService::new(vec![
        Err(RefactorError::Transport("connection refused".into())),
        Err(RefactorError::Transport("connection refused".into())),
    ]));
    let log = Arc::new(MemorySessionLog::new());
    let orch = orchestrator(
        catalog,
        service.clone(),
        Arc::new(ScriptedValidator::always_clean()),
        log.clone(),
        OrchestratorConfig {
            transport_retries: 1,
            ..quick_config()
        },
    );

    let session = orch
        .run(root, None, CancelFlag::new())
        .await
        .expect("session");

    assert_eq!(session.outcome, SessionOutcome::Aborted);
    assert!(session.turns.is_empty());
    // Initial attempt plus one retry.
    assert_eq!(service.requests().len(), 2);

    let records = log.read_session(&session.session_id).await.expect("read");
    assert_eq!(records.last().unwrap().kind, "session_finished");
}

#[tokio::test]
async fn test_timeout_retried_without_consuming_exchange() {
    let (catalog, root) = catalog_with_root();
    let service = Arc::new(ScriptedService::new(vec![
        Err(RefactorError::Timeout(std::time::Duration::from_secs(1))),
        Ok(candidate(0)),
    ]));
    let log = Arc::new(MemorySessionLog::new());
    let orch = orchestrator(
        catalog,
        service.clone(),
        Arc::new(ScriptedValidator::always_clean()),
        log.clone(),
        quick_config(),
    );

    let session = orch
        .run(root, None, CancelFlag::new())
        .await
        .expect("session");

    // A timed-out request is retried inside the same exchange, so the
    // session accepts on what is still its first turn.
    assert_eq!(session.outcome, SessionOutcome::Accepted);
    assert_eq!(session.turns.len(), 1);
    assert_eq!(service.requests().len(), 2);
    // Both attempts carried the same prompt: no feedback was synthesized
    // from the transport-level failure.
    assert!(service.requests()[1].prior_feedback.is_empty());
}

#[tokio::test]
async fn test_cancellation_observed_at_turn_boundary() {
    let (catalog, root) = catalog_with_root();
    let service = Arc::new(ScriptedService::always_ok(1));
    let cancel = CancelFlag::new();
    cancel.cancel();
    let orch = orchestrator(
        catalog,
        service.clone(),
        Arc::new(ScriptedValidator::always_clean()),
        Arc::new(MemorySessionLog::new()),
        quick_config(),
    );

    let session = orch.run(root, None, cancel).await.expect("session");

    assert_eq!(session.outcome, SessionOutcome::Aborted);
    assert!(session.turns.is_empty());
    assert!(service.requests().is_empty());
}

#[tokio::test]
async fn test_lint_cap_truncates_surfaced_violations() {
    let (catalog, root) = catalog_with_root();
    let service = Arc::new(ScriptedService::always_ok(2));
    let validator = Arc::new(ScriptedValidator::new(vec![
        ValidationResult::from_violations(
            (1..=5).map(|line| violation("LT01", line)).collect(),
        ),
        ValidationResult::clean(),
    ]));
    let orch = orchestrator(
        catalog,
        service.clone(),
        validator,
        Arc::new(MemorySessionLog::new()),
        OrchestratorConfig {
            max_lint_failures: 2,
            ..quick_config()
        },
    );

    let session = orch
        .run(root, None, CancelFlag::new())
        .await
        .expect("session");

    assert_eq!(session.outcome, SessionOutcome::Accepted);
    let first = &session.turns[0].validation;
    assert!(!first.passed);
    assert_eq!(first.violations.len(), 2);
    // Feedback is the surfaced (capped) list, not the full one.
    assert_eq!(service.requests()[1].prior_feedback.len(), 2);
}

#[tokio::test]
async fn test_audit_write_failure_is_fatal() {
    let (catalog, root) = catalog_with_root();
    let orch = orchestrator(
        catalog,
        Arc::new(ScriptedService::always_ok(1)),
        Arc::new(ScriptedValidator::always_clean()),
        Arc::new(FailingSessionLog::new()),
        quick_config(),
    );

    let failure = orch
        .run(root, None, CancelFlag::new())
        .await
        .expect_err("audit failure must stop the session");

    assert!(failure.turns.is_empty());
    assert!(matches!(
        failure.error,
        RefactorError::Audit(LedgerError::Io(_))
    ));
}

#[tokio::test]
async fn test_user_notes_forwarded_verbatim() {
    let (catalog, root) = catalog_with_root();
    let service = Arc::new(ScriptedService::always_ok(1));
    let orch = orchestrator(
        catalog,
        service.clone(),
        Arc::new(ScriptedValidator::always_clean()),
        Arc::new(MemorySessionLog::new()),
        quick_config(),
    );

    orch.run(root, Some("keep the cursor loop".to_string()), CancelFlag::new())
        .await
        .expect("session");

    assert_eq!(
        service.requests()[0].user_notes.as_deref(),
        Some("keep the cursor loop")
    );
}
