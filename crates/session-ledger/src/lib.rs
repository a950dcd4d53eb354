//! Session audit ledger for Procwright
//!
//! Defines the append-only audit abstraction:
//! - `AuditRecord`: self-describing record (seq, kind, JSON payload,
//!   payload digest, timestamp, terminal flag)
//! - `SessionLog`: async trait with open/append/finish/read operations
//! - `JsonlSessionLog`: durable one-file-per-session JSONL backend
//! - `fakes::MemorySessionLog`: in-memory fake for tests
//!
//! Guarantees: once `append` returns the record is durably recorded and
//! present in every subsequent read of that session, in append order. No
//! record is ever mutated or deleted. Sessions are logically independent;
//! no cross-session ordering is promised.

pub mod audit;
pub mod error;
pub mod fakes;
pub mod jsonl;

pub use audit::{AuditRecord, SessionId, SessionLog};
pub use error::{LedgerError, LedgerResult};
pub use jsonl::JsonlSessionLog;

/// Session ledger crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
