//! Procwright schema catalog access
//!
//! Defines the shared vocabulary for database objects and the read-only
//! catalog boundary:
//! - `ObjectReference` / `ObjectKind`: identity of a catalog object
//! - `ObjectDefinition`: fetched source text plus provenance
//! - `CatalogAccessor`: async lookup trait over a live connection
//! - `PgCatalog`: sqlx/Postgres implementation over `information_schema`
//! - `fakes::MemoryCatalog`: in-memory fake for tests
//!
//! Absent objects are a soft condition (`Ok(None)`); only connection-level
//! failures surface as `CatalogError::Unavailable`.

pub mod accessor;
pub mod error;
pub mod fakes;
pub mod postgres;
pub mod types;

pub use accessor::{CatalogAccessor, CatalogConfig};
pub use error::{CatalogError, CatalogResult};
pub use postgres::PgCatalog;
pub use types::{ObjectDefinition, ObjectKind, ObjectReference};

/// Procwright catalog crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
