//! Static validation boundary and external linter wrapper.
//!
//! The validator is purely a check; it never mutates the candidate. The
//! live implementation shells out to `sqlfluff lint --format json` against
//! a temp file, with a timeout, and normalizes the output into ordered
//! [`Violation`]s.

use std::io::Write;
use std::process::Stdio;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use crate::error::RefactorError;
use crate::session::{ValidationResult, Violation};

/// SQL dialect the linter checks against. Fixed per run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SqlDialect {
    TSql,
    AnsiSql,
    Postgres,
}

impl SqlDialect {
    /// Dialect name as the linter expects it.
    pub fn as_str(&self) -> &'static str {
        match self {
            SqlDialect::TSql => "tsql",
            SqlDialect::AnsiSql => "ansi",
            SqlDialect::Postgres => "postgres",
        }
    }
}

impl FromStr for SqlDialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tsql" => Ok(SqlDialect::TSql),
            "ansi" | "ansi_sql" => Ok(SqlDialect::AnsiSql),
            "postgres" | "postgresql" => Ok(SqlDialect::Postgres),
            other => Err(format!("unknown SQL dialect '{}'", other)),
        }
    }
}

impl std::fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Static syntax/style checker.
#[async_trait]
pub trait SqlValidator: Send + Sync {
    /// Check a candidate body. Violations come back ordered by source
    /// position; the `passed` flag reflects the full check regardless of
    /// any later truncation.
    async fn validate(
        &self,
        candidate_body: &str,
        dialect: SqlDialect,
    ) -> Result<ValidationResult, RefactorError>;
}

/// Wrapper around the sqlfluff command-line linter.
pub struct SqlFluffValidator {
    /// Path to the sqlfluff binary.
    binary_path: String,
    /// Timeout for one lint invocation.
    timeout: Duration,
}

/// sqlfluff JSON output: one entry per linted file.
#[derive(Debug, Deserialize)]
struct FluffFile {
    violations: Vec<FluffViolation>,
}

#[derive(Debug, Deserialize)]
struct FluffViolation {
    code: String,
    description: String,
    #[serde(alias = "start_line_no")]
    line_no: u32,
    #[serde(alias = "start_line_pos")]
    line_pos: u32,
}

impl SqlFluffValidator {
    /// Create a validator invoking `binary_path`.
    pub fn new(binary_path: impl Into<String>, timeout_secs: u64) -> Self {
        SqlFluffValidator {
            binary_path: binary_path.into(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Default: use "sqlfluff" from PATH.
    pub fn default_path() -> Self {
        Self::new("sqlfluff", 120)
    }

    fn parse_output(stdout: &str) -> Result<ValidationResult, RefactorError> {
        let files: Vec<FluffFile> = serde_json::from_str(stdout)
            .map_err(|e| RefactorError::Linter(format!("unreadable linter output: {}", e)))?;

        let violations = files
            .into_iter()
            .flat_map(|file| file.violations)
            .map(|v| Violation {
                rule: v.code,
                message: v.description,
                line: v.line_no,
                column: v.line_pos,
            })
            .collect();

        Ok(ValidationResult::from_violations(violations))
    }
}

#[async_trait]
impl SqlValidator for SqlFluffValidator {
    async fn validate(
        &self,
        candidate_body: &str,
        dialect: SqlDialect,
    ) -> Result<ValidationResult, RefactorError> {
        let mut scratch = tempfile::Builder::new()
            .suffix(".sql")
            .tempfile()
            .map_err(|e| RefactorError::Linter(format!("temp file: {}", e)))?;
        scratch
            .write_all(candidate_body.as_bytes())
            .and_then(|_| scratch.flush())
            .map_err(|e| RefactorError::Linter(format!("temp file: {}", e)))?;

        let child = Command::new(&self.binary_path)
            .arg("lint")
            .arg(scratch.path())
            .arg("--format")
            .arg("json")
            .arg("--dialect")
            .arg(dialect.as_str())
            .arg("--nocolor")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // A timed-out child must not outlive the dropped future.
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RefactorError::Linter(format!("spawn {}: {}", self.binary_path, e)))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                RefactorError::Linter(format!("linter timed out after {:?}", self.timeout))
            })?
            .map_err(|e| RefactorError::Linter(e.to_string()))?;

        // sqlfluff exits 0 when clean and 1 when violations were found;
        // anything else is an invocation failure.
        let exit_code = output.status.code().unwrap_or(-1);
        if exit_code != 0 && exit_code != 1 {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RefactorError::Linter(format!(
                "linter exited with {}: {}",
                exit_code,
                stderr.chars().take(200).collect::<String>()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let result = Self::parse_output(&stdout)?;
        debug!(
            dialect = %dialect,
            passed = result.passed,
            violations = result.violations.len(),
            "Linted candidate"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_parse() {
        assert_eq!(SqlDialect::from_str("tsql").unwrap(), SqlDialect::TSql);
        assert_eq!(SqlDialect::from_str("TSQL").unwrap(), SqlDialect::TSql);
        assert_eq!(
            SqlDialect::from_str("postgresql").unwrap(),
            SqlDialect::Postgres
        );
        assert!(SqlDialect::from_str("oracle").is_err());
    }

    #[test]
    fn test_parse_clean_output() {
        let result = SqlFluffValidator::parse_output("[]").expect("parse");
        assert!(result.passed);
    }

    #[test]
    fn test_parse_violations_ordered() {
        let stdout = r#"[{
            "filepath": "candidate.sql",
            "violations": [
                {"code": "LT02", "description": "indent", "line_no": 4, "line_pos": 1},
                {"code": "LT01", "description": "whitespace", "line_no": 1, "line_pos": 7}
            ]
        }]"#;
        let result = SqlFluffValidator::parse_output(stdout).expect("parse");
        assert!(!result.passed);
        assert_eq!(result.violations[0].rule, "LT01");
        assert_eq!(result.violations[1].rule, "LT02");
    }

    #[test]
    fn test_garbage_output_is_linter_error() {
        let err = SqlFluffValidator::parse_output("Traceback (most recent call last)").unwrap_err();
        assert!(matches!(err, RefactorError::Linter(_)));
    }
}
