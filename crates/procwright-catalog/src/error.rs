//! Error types for catalog access

use thiserror::Error;

/// Errors that can occur while reading the schema catalog.
///
/// `Unavailable` means the connection itself is broken and the whole
/// resolution pass must stop. An object that simply does not exist is not an
/// error; accessors return `Ok(None)` for it.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// The catalog connection could not be established or was lost
    #[error("Catalog unavailable: {0}")]
    Unavailable(String),

    /// A query against the catalog failed
    #[error("Catalog query failed: {0}")]
    Query(String),

    /// A fetched definition could not be interpreted
    #[error("Malformed catalog row for {reference}: {detail}")]
    MalformedRow { reference: String, detail: String },
}

/// Result type for catalog operations
pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

impl From<sqlx::Error> for CatalogError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Configuration(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => CatalogError::Unavailable(err.to_string()),
            other => CatalogError::Query(other.to_string()),
        }
    }
}
