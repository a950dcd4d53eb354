//! Request composition for the generation service.

use serde::{Deserialize, Serialize};

use crate::resolver::ResolutionResult;
use crate::session::Violation;

/// Standing instruction sent with every request.
pub const INSTRUCTION: &str = "Please format, refactor, and optimize the stored procedure below \
     using the provided metadata. Ensure the output is clean, logically structured, and avoids \
     redundant or outdated constructs.";

/// One dependency definition in the request context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContextObject {
    /// Object kind label.
    pub kind: String,
    /// Qualified name as written in the catalog.
    pub name: String,
    /// Definition text.
    pub definition: String,
}

/// Resolved dependency context attached to a request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DependencyContext {
    /// Definitions in traversal order, root excluded.
    pub objects: Vec<ContextObject>,
    /// True when the depth limit cut the closure short.
    pub truncated: bool,
    /// Qualified names of objects referenced but not found. Empty unless
    /// the run tolerates missing dependencies; named here so the service
    /// does not guess at them silently.
    pub missing: Vec<String>,
}

/// One request to the generation service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefactorRequest {
    /// Standing instruction.
    pub instruction: String,
    /// Qualified name of the procedure under refactor.
    pub proc_name: String,
    /// Current procedure body.
    pub sql: String,
    /// Resolved dependency context.
    pub context: DependencyContext,
    /// Operator-supplied free-text notes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_notes: Option<String>,
    /// Violations from the immediately preceding failed turn, and only that
    /// turn. Empty on the first exchange.
    pub prior_feedback: Vec<Violation>,
}

/// Compose a request from a resolution pass.
///
/// `feedback` must be exactly the prior turn's surfaced violations; the
/// caller never accumulates across turns.
pub fn build_request(
    resolution: &ResolutionResult,
    root_sql: &str,
    user_notes: Option<&str>,
    feedback: &[Violation],
) -> RefactorRequest {
    let objects = resolution
        .definitions
        .iter()
        .filter(|definition| definition.reference != resolution.root)
        .map(|definition| ContextObject {
            kind: definition.reference.kind.as_str().to_string(),
            name: definition.reference.qualified(),
            definition: definition.source_text.clone(),
        })
        .collect();

    RefactorRequest {
        instruction: INSTRUCTION.to_string(),
        proc_name: resolution.root.qualified(),
        sql: root_sql.to_string(),
        context: DependencyContext {
            objects,
            truncated: resolution.truncated,
            missing: resolution.missing.iter().map(|r| r.qualified()).collect(),
        },
        user_notes: user_notes.map(str::to_string),
        prior_feedback: feedback.to_vec(),
    }
}
