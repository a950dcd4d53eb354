//! Procwright - AI-assisted stored procedure refactoring CLI
//!
//! The `procwright` command drives refactoring sessions against a schema
//! catalog and a text-generation service.
//!
//! ## Commands
//!
//! - `refactor`: Run a full negotiation session for one procedure
//! - `resolve`: Show the dependency closure for a procedure
//! - `log`: Show the audit trail of a recorded session

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use procwright_catalog::{CatalogAccessor, ObjectKind, ObjectReference, PgCatalog};
use procwright_core::{
    CancelFlag, DependencyResolver, HttpGenerationService, Orchestrator, OrchestratorConfig,
    Session, SessionOutcome, SqlDialect, SqlFluffValidator,
};
use session_ledger::{JsonlSessionLog, SessionId, SessionLog};
use tracing::{info, Level};

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "procwright")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Dependency-aware stored procedure refactoring", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Path to the configuration file (default: procwright.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a refactoring session for one stored procedure
    Refactor {
        /// Procedure name
        #[arg(short, long)]
        proc: String,

        /// Schema the procedure lives in
        #[arg(short, long, default_value = "dbo")]
        schema: String,

        /// Dependency resolution depth (0 = root only)
        #[arg(short, long)]
        depth: Option<u32>,

        /// Exchange budget for this session
        #[arg(short, long)]
        max_exchanges: Option<u32>,

        /// Free-text notes forwarded verbatim to the generation service
        #[arg(short, long)]
        notes: Option<String>,

        /// Proceed even when referenced objects cannot be resolved
        #[arg(long)]
        allow_missing: bool,

        /// Run the session but do not write the accepted rewrite to disk
        #[arg(long)]
        dry_run: bool,

        /// Directory for session audit logs (overrides config)
        #[arg(long)]
        audit_dir: Option<PathBuf>,

        /// Directory for accepted rewrites (overrides config)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Resolve and print the dependency closure for a procedure
    Resolve {
        /// Procedure name
        #[arg(short, long)]
        proc: String,

        /// Schema the procedure lives in
        #[arg(short, long, default_value = "dbo")]
        schema: String,

        /// Dependency resolution depth (0 = root only)
        #[arg(short, long)]
        depth: Option<u32>,

        /// Print definitions, not just names
        #[arg(long)]
        definitions: bool,
    },

    /// Show the audit trail of a recorded session
    Log {
        /// Session ID to display
        session: String,

        /// Directory holding session audit logs (overrides config)
        #[arg(long)]
        audit_dir: Option<PathBuf>,

        /// Print full record payloads as JSON
        #[arg(long)]
        payloads: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    procwright_core::init_tracing(cli.json, level);

    let config = Config::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Refactor {
            proc,
            schema,
            depth,
            max_exchanges,
            notes,
            allow_missing,
            dry_run,
            audit_dir,
            output_dir,
        } => {
            cmd_refactor(
                &config,
                RefactorArgs {
                    root: ObjectReference::new(schema, proc, ObjectKind::Procedure),
                    depth,
                    max_exchanges,
                    notes,
                    allow_missing,
                    dry_run,
                    audit_dir,
                    output_dir,
                },
            )
            .await
        }
        Commands::Resolve {
            proc,
            schema,
            depth,
            definitions,
        } => {
            let root = ObjectReference::new(schema, proc, ObjectKind::Procedure);
            cmd_resolve(&config, &root, depth, definitions).await
        }
        Commands::Log {
            session,
            audit_dir,
            payloads,
        } => cmd_log(&config, &session, audit_dir.as_deref(), payloads).await,
    }
}

struct RefactorArgs {
    root: ObjectReference,
    depth: Option<u32>,
    max_exchanges: Option<u32>,
    notes: Option<String>,
    allow_missing: bool,
    dry_run: bool,
    audit_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
}

/// Run a full negotiation session and, on acceptance, write the rewrite.
async fn cmd_refactor(config: &Config, args: RefactorArgs) -> Result<()> {
    let dialect = SqlDialect::from_str(&config.lint.dialect)
        .map_err(|e| anyhow::anyhow!("config [lint].dialect: {}", e))?;

    let orchestrator_config = OrchestratorConfig {
        max_exchanges: args.max_exchanges.unwrap_or(config.defaults.max_exchanges),
        max_depth: args.depth.unwrap_or(config.defaults.depth),
        transport_retries: config.defaults.transport_retries,
        backoff_base_ms: config.defaults.backoff_base_ms,
        max_lint_failures: config.lint.max_failures,
        allow_missing_dependencies: args.allow_missing || config.defaults.allow_missing,
        dialect,
    };

    let catalog = PgCatalog::connect(&config.database)
        .await
        .context("Failed to connect to schema catalog")?;
    let service = HttpGenerationService::new(config.generation.clone())
        .map_err(|e| anyhow::anyhow!("Failed to build generation client: {}", e))?;
    let validator = SqlFluffValidator::new(&config.lint.binary_path, config.lint.timeout_secs);

    let audit_dir = args
        .audit_dir
        .unwrap_or_else(|| config.defaults.audit_dir.clone());
    let log = JsonlSessionLog::new(&audit_dir)
        .with_context(|| format!("Failed to open audit directory {:?}", audit_dir))?;

    let orchestrator = Orchestrator::new(
        Arc::new(catalog),
        Arc::new(service),
        Arc::new(validator),
        Arc::new(log),
        orchestrator_config,
    );

    let cancel = CancelFlag::new();
    let ctrl_c_flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Cancellation requested; stopping at the next turn boundary");
            ctrl_c_flag.cancel();
        }
    });

    let session = orchestrator
        .run(args.root.clone(), args.notes, cancel)
        .await
        .map_err(|failure| {
            anyhow::anyhow!(
                "session {} failed after {} turn(s): {}",
                failure.session_id,
                failure.turns.len(),
                failure.error
            )
        })?;

    print_session_summary(&session);

    if session.outcome == SessionOutcome::Accepted && !args.dry_run {
        let body = session
            .accepted_body()
            .context("accepted session has no candidate body")?;
        let output_dir = args
            .output_dir
            .unwrap_or_else(|| config.defaults.output_dir.clone());
        std::fs::create_dir_all(&output_dir)
            .with_context(|| format!("Failed to create output directory {:?}", output_dir))?;
        let path = output_dir.join(format!("{}.sql", args.root.qualified()));
        std::fs::write(&path, body)
            .with_context(|| format!("Failed to write rewrite to {:?}", path))?;
        println!("Rewrite written to {:?}", path);
    } else if session.outcome == SessionOutcome::Accepted {
        println!("(dry run: rewrite not written)");
    }

    if session.outcome == SessionOutcome::Accepted {
        Ok(())
    } else {
        anyhow::bail!("session ended without an accepted rewrite")
    }
}

fn print_session_summary(session: &Session) {
    println!("Session:  {}", session.session_id);
    println!("Root:     {}", session.root.qualified());
    println!("Outcome:  {}", session.outcome.as_str());
    println!("Turns:    {}", session.turns.len());

    for turn in &session.turns {
        let status = if turn.validation.passed {
            "passed"
        } else {
            "failed"
        };
        println!(
            "  [{}] validation {} ({} violation(s))",
            turn.turn_index,
            status,
            turn.validation.violations.len()
        );
        for violation in &turn.validation.violations {
            println!(
                "      {}:{} {} {}",
                violation.line, violation.column, violation.rule, violation.message
            );
        }
    }
}

/// Resolve the dependency closure and print it without starting a session.
async fn cmd_resolve(
    config: &Config,
    root: &ObjectReference,
    depth: Option<u32>,
    definitions: bool,
) -> Result<()> {
    let catalog = PgCatalog::connect(&config.database)
        .await
        .context("Failed to connect to schema catalog")?;
    let resolver = DependencyResolver::new(Arc::new(catalog) as Arc<dyn CatalogAccessor>);

    let resolution = resolver
        .resolve(root, depth.unwrap_or(config.defaults.depth))
        .await
        .context("Dependency resolution failed")?;

    println!("Root: {}", resolution.root.qualified());
    println!(
        "Resolved {} object(s){}",
        resolution.definitions.len(),
        if resolution.truncated {
            " (depth limit reached)"
        } else {
            ""
        }
    );

    for (source, deps) in resolution.edges() {
        for dep in deps {
            println!("  {} -> {}", source.qualified(), dep.qualified());
        }
    }

    if !resolution.missing.is_empty() {
        println!("\nUnresolvable:");
        for reference in &resolution.missing {
            println!("  ? {}", reference.qualified());
        }
    }

    if definitions {
        for definition in &resolution.definitions {
            println!("\n-- {} --", definition.reference.qualified());
            println!("{}", definition.source_text);
        }
    }

    Ok(())
}

/// Print the audit trail of a recorded session.
async fn cmd_log(
    config: &Config,
    session: &str,
    audit_dir: Option<&std::path::Path>,
    payloads: bool,
) -> Result<()> {
    let dir = audit_dir.unwrap_or(&config.defaults.audit_dir);
    let log = JsonlSessionLog::new(dir)
        .with_context(|| format!("Failed to open audit directory {:?}", dir))?;

    let session_id = SessionId(session.to_string());
    let records = log
        .read_session(&session_id)
        .await
        .with_context(|| format!("Session not found: {}", session))?;

    if records.is_empty() {
        println!("No records for session {}", session);
        return Ok(());
    }

    for record in &records {
        let integrity = if record.verify() { "ok" } else { "CORRUPT" };
        let terminal = if record.terminal { " [terminal]" } else { "" };
        println!(
            "[{:>3}] {} {} digest={}{}",
            record.seq,
            record.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            record.kind,
            integrity,
            terminal
        );
        if payloads {
            println!("{}", serde_json::to_string_pretty(&record.payload)?);
        }
    }

    Ok(())
}
