//! Generation service boundary and HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RefactorError;
use crate::prompt::RefactorRequest;

/// Reply from the generation service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenerationResponse {
    /// Candidate rewritten procedure body.
    pub refactored_sql: String,
    /// Free-text rationale from the service, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

/// Transport configuration for the generation service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// HTTPS endpoint accepting the request JSON.
    pub endpoint: String,
    /// Bearer token.
    pub api_key: String,
    /// Per-request timeout in seconds. A timeout is handled exactly like a
    /// transport failure.
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        GenerationConfig {
            endpoint: "https://api.example.com/v1/refactor".to_string(),
            api_key: String::new(),
            timeout_secs: 120,
        }
    }
}

/// External text-generation collaborator.
///
/// The orchestrator never issues two concurrent requests for one session;
/// implementations only need to be safe for concurrent use across sessions.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Ask the service for a rewritten procedure body.
    async fn propose(&self, request: &RefactorRequest) -> Result<GenerationResponse, RefactorError>;
}

/// JSON-over-HTTPS client for the generation service.
pub struct HttpGenerationService {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    timeout: Duration,
}

impl HttpGenerationService {
    /// Build a client from transport configuration.
    pub fn new(config: GenerationConfig) -> Result<Self, RefactorError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .user_agent(concat!("procwright/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| RefactorError::Transport(e.to_string()))?;

        Ok(HttpGenerationService {
            client,
            endpoint: config.endpoint,
            api_key: config.api_key,
            timeout,
        })
    }
}

#[async_trait]
impl GenerationService for HttpGenerationService {
    async fn propose(&self, request: &RefactorRequest) -> Result<GenerationResponse, RefactorError> {
        debug!(proc_name = %request.proc_name, "Sending generation request");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RefactorError::Timeout(self.timeout)
                } else {
                    RefactorError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RefactorError::Transport(format!(
                "service returned {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let reply: GenerationResponse = response
            .json()
            .await
            .map_err(|e| RefactorError::Transport(format!("unreadable response body: {}", e)))?;

        if reply.refactored_sql.trim().is_empty() {
            return Err(RefactorError::EmptyCandidate);
        }

        Ok(reply)
    }
}
