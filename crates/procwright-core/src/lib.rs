//! Procwright Core
//!
//! The dependency-resolution and exchange-orchestration loop:
//! - `resolver`: cycle-safe, depth-bounded dependency closure over the
//!   schema catalog
//! - `extract`: pattern-based reference extraction against known catalog
//!   object names
//! - `prompt`: request composition for the generation service
//! - `service`: generation service boundary + HTTP client
//! - `validator`: static lint boundary + external sqlfluff wrapper
//! - `orchestrator`: the bounded multi-turn negotiation as an explicit
//!   state machine with a pure transition function
//! - `audit`: adapter recording session milestones into the ledger
//!
//! One session is one strictly sequential control flow; every turn is
//! flushed to the audit log before the next one starts.

pub mod audit;
pub mod error;
pub mod extract;
pub mod obs;
pub mod orchestrator;
pub mod prompt;
pub mod resolver;
pub mod service;
pub mod session;
pub mod validator;

pub use audit::SessionRecorder;
pub use error::{RefactorError, Result};
pub use extract::ReferenceExtractor;
pub use obs::init_tracing;
pub use orchestrator::{
    CancelFlag, ExchangeEvent, ExchangeState, Orchestrator, OrchestratorConfig, SessionFailure,
};
pub use prompt::{DependencyContext, RefactorRequest, INSTRUCTION};
pub use resolver::{DependencyResolver, ResolutionResult};
pub use service::{GenerationConfig, GenerationResponse, GenerationService, HttpGenerationService};
pub use session::{ExchangeTurn, Session, SessionOutcome, ValidationResult, Violation};
pub use validator::{SqlDialect, SqlFluffValidator, SqlValidator};

/// Procwright core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
