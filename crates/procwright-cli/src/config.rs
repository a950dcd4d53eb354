//! TOML configuration for the `procwright` binary.
//!
//! Every section is optional; omitted fields fall back to defaults so a
//! minimal config only needs `[database]` credentials and a `[generation]`
//! endpoint. Command-line flags override file values.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use procwright_catalog::CatalogConfig;
use procwright_core::GenerationConfig;
use serde::{Deserialize, Serialize};

/// Linter section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LintConfig {
    /// Path to the sqlfluff binary.
    pub binary_path: String,
    /// Lint dialect name (`tsql`, `ansi`, `postgres`).
    pub dialect: String,
    /// Cap on violations surfaced per turn.
    pub max_failures: usize,
    /// Timeout for one lint invocation in seconds.
    pub timeout_secs: u64,
}

impl Default for LintConfig {
    fn default() -> Self {
        LintConfig {
            binary_path: "sqlfluff".to_string(),
            dialect: "tsql".to_string(),
            max_failures: 25,
            timeout_secs: 120,
        }
    }
}

/// Session defaults, overridable per invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionDefaults {
    /// Exchange budget per session.
    pub max_exchanges: u32,
    /// Dependency resolution depth.
    pub depth: u32,
    /// Transport retries per exchange.
    pub transport_retries: u32,
    /// Base backoff delay in milliseconds.
    pub backoff_base_ms: u64,
    /// Directory holding the append-only session logs.
    pub audit_dir: PathBuf,
    /// Directory accepted rewrites are written to.
    pub output_dir: PathBuf,
    /// Proceed when referenced objects cannot be resolved.
    pub allow_missing: bool,
}

impl Default for SessionDefaults {
    fn default() -> Self {
        SessionDefaults {
            max_exchanges: 3,
            depth: 1,
            transport_retries: 3,
            backoff_base_ms: 500,
            audit_dir: PathBuf::from(".procwright/sessions"),
            output_dir: PathBuf::from(".procwright/out"),
            allow_missing: false,
        }
    }
}

/// Root configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: CatalogConfig,
    pub generation: GenerationConfig,
    pub lint: LintConfig,
    pub defaults: SessionDefaults,
}

impl Config {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Invalid config in {:?}", path))
    }

    /// Load `path` if given, else `procwright.toml` when present, else
    /// defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let fallback = Path::new("procwright.toml");
                if fallback.exists() {
                    Self::load(fallback)
                } else {
                    Ok(Config::default())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_parses_with_defaults() {
        let config: Config = toml::from_str(
            r#"
            [database]
            host = "db.internal"
            port = 5432
            database = "legacy"
            user = "reader"
            password = "s3cret"
            ssl_mode = "require"
            max_connections = 2
            query_timeout_secs = 10

            [generation]
            endpoint = "https://llm.internal/v1/refactor"
            api_key = "key"
            timeout_secs = 60
            "#,
        )
        .expect("parse");

        assert_eq!(config.database.host, "db.internal");
        assert_eq!(config.generation.timeout_secs, 60);
        // Unspecified sections fall back to defaults.
        assert_eq!(config.lint.dialect, "tsql");
        assert_eq!(config.defaults.max_exchanges, 3);
        assert!(!config.defaults.allow_missing);
    }

    #[test]
    fn test_lint_section_overrides() {
        let config: Config = toml::from_str(
            r#"
            [lint]
            binary_path = "/opt/sqlfluff/bin/sqlfluff"
            dialect = "ansi"
            max_failures = 5
            timeout_secs = 30
            "#,
        )
        .expect("parse");

        assert_eq!(config.lint.binary_path, "/opt/sqlfluff/bin/sqlfluff");
        assert_eq!(config.lint.dialect, "ansi");
        assert_eq!(config.lint.max_failures, 5);
    }

    #[test]
    fn test_load_missing_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = Config::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to read config file"));
    }

    #[test]
    fn test_defaults_round_trip() {
        let rendered = toml::to_string(&Config::default()).expect("render");
        let parsed: Config = toml::from_str(&rendered).expect("parse");
        assert_eq!(parsed.defaults.depth, 1);
        assert_eq!(parsed.database.port, 5432);
    }
}
