//! Live catalog accessor over a Postgres connection pool.
//!
//! Reads object definitions from `information_schema`, which keeps the
//! queries portable across the ANSI-ish dialects we target. Tables and
//! types have no stored source text, so their definitions are rendered as a
//! deterministic column/base-type listing.

use crate::accessor::{CatalogAccessor, CatalogConfig};
use crate::error::{CatalogError, CatalogResult};
use crate::types::{ObjectDefinition, ObjectKind, ObjectReference};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Schemas that never hold user objects.
const SYSTEM_SCHEMAS: &[&str] = &["pg_catalog", "information_schema"];

/// Catalog accessor backed by a shared `PgPool`.
#[derive(Clone)]
pub struct PgCatalog {
    pool: Arc<PgPool>,
    query_timeout: Duration,
}

impl PgCatalog {
    /// Connect to the catalog described by `config`.
    pub async fn connect(config: &CatalogConfig) -> CatalogResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.query_timeout_secs))
            .connect(&config.connection_url())
            .await
            .map_err(|e| CatalogError::Unavailable(e.to_string()))?;

        debug!(
            host = %config.host,
            database = %config.database,
            "Connected to schema catalog"
        );

        Ok(PgCatalog {
            pool: Arc::new(pool),
            query_timeout: Duration::from_secs(config.query_timeout_secs),
        })
    }

    /// Wrap an existing pool (shared with other sessions).
    pub fn from_pool(pool: Arc<PgPool>, query_timeout: Duration) -> Self {
        PgCatalog {
            pool,
            query_timeout,
        }
    }

    async fn with_timeout<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, sqlx::Error>>,
    ) -> CatalogResult<T> {
        match tokio::time::timeout(self.query_timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(CatalogError::Unavailable(format!(
                "catalog query timed out after {:?}",
                self.query_timeout
            ))),
        }
    }

    /// Stored source text for a routine (procedure or function).
    async fn fetch_routine(
        &self,
        reference: &ObjectReference,
        routine_type: &str,
    ) -> CatalogResult<Option<String>> {
        let row = self
            .with_timeout(
                sqlx::query(
                    r#"
                    SELECT routine_definition
                    FROM information_schema.routines
                    WHERE routine_type = $1
                      AND lower(routine_schema) = $2
                      AND lower(routine_name) = $3
                    "#,
                )
                .bind(routine_type)
                .bind(reference.schema.to_lowercase())
                .bind(reference.name.to_lowercase())
                .fetch_optional(self.pool.as_ref()),
            )
            .await?;

        match row {
            None => Ok(None),
            Some(row) => {
                let definition: Option<String> = row
                    .try_get("routine_definition")
                    .map_err(|e| CatalogError::MalformedRow {
                        reference: reference.qualified(),
                        detail: e.to_string(),
                    })?;
                // A routine whose body is hidden from this login is treated
                // as absent; the resolver records it in `missing`.
                Ok(definition)
            }
        }
    }

    /// View definition text.
    async fn fetch_view(&self, reference: &ObjectReference) -> CatalogResult<Option<String>> {
        let row = self
            .with_timeout(
                sqlx::query(
                    r#"
                    SELECT view_definition
                    FROM information_schema.views
                    WHERE lower(table_schema) = $1
                      AND lower(table_name) = $2
                    "#,
                )
                .bind(reference.schema.to_lowercase())
                .bind(reference.name.to_lowercase())
                .fetch_optional(self.pool.as_ref()),
            )
            .await?;

        match row {
            None => Ok(None),
            Some(row) => {
                let definition: Option<String> =
                    row.try_get("view_definition")
                        .map_err(|e| CatalogError::MalformedRow {
                            reference: reference.qualified(),
                            detail: e.to_string(),
                        })?;
                Ok(definition)
            }
        }
    }

    /// Rendered column listing for a table.
    async fn fetch_table(&self, reference: &ObjectReference) -> CatalogResult<Option<String>> {
        let rows = self
            .with_timeout(
                sqlx::query(
                    r#"
                    SELECT column_name, data_type, character_maximum_length, is_nullable
                    FROM information_schema.columns
                    WHERE lower(table_schema) = $1
                      AND lower(table_name) = $2
                    ORDER BY ordinal_position
                    "#,
                )
                .bind(reference.schema.to_lowercase())
                .bind(reference.name.to_lowercase())
                .fetch_all(self.pool.as_ref()),
            )
            .await?;

        if rows.is_empty() {
            return Ok(None);
        }

        let mut text = format!("TABLE {} (\n", reference.qualified());
        for row in &rows {
            let name: String = row.try_get("column_name").unwrap_or_default();
            let data_type: String = row.try_get("data_type").unwrap_or_default();
            let max_len: Option<i32> = row.try_get("character_maximum_length").ok().flatten();
            let nullable: String = row.try_get("is_nullable").unwrap_or_default();

            let rendered_type = match max_len {
                Some(len) => format!("{}({})", data_type, len),
                None => data_type,
            };
            let null_clause = if nullable.eq_ignore_ascii_case("no") {
                "NOT NULL"
            } else {
                "NULL"
            };
            text.push_str(&format!("    {} {} {},\n", name, rendered_type, null_clause));
        }
        text.push(')');

        Ok(Some(text))
    }

    /// Base-type description for a user-defined domain type.
    async fn fetch_type(&self, reference: &ObjectReference) -> CatalogResult<Option<String>> {
        let row = self
            .with_timeout(
                sqlx::query(
                    r#"
                    SELECT data_type, character_maximum_length
                    FROM information_schema.domains
                    WHERE lower(domain_schema) = $1
                      AND lower(domain_name) = $2
                    "#,
                )
                .bind(reference.schema.to_lowercase())
                .bind(reference.name.to_lowercase())
                .fetch_optional(self.pool.as_ref()),
            )
            .await?;

        match row {
            None => Ok(None),
            Some(row) => {
                let base: String = row.try_get("data_type").unwrap_or_default();
                let max_len: Option<i32> = row.try_get("character_maximum_length").ok().flatten();
                let rendered = match max_len {
                    Some(len) => format!("TYPE {} AS {}({})", reference.qualified(), base, len),
                    None => format!("TYPE {} AS {}", reference.qualified(), base),
                };
                Ok(Some(rendered))
            }
        }
    }
}

#[async_trait]
impl CatalogAccessor for PgCatalog {
    async fn fetch_definition(
        &self,
        reference: &ObjectReference,
    ) -> CatalogResult<Option<ObjectDefinition>> {
        let source = match reference.kind {
            ObjectKind::Procedure => self.fetch_routine(reference, "PROCEDURE").await?,
            ObjectKind::Function => self.fetch_routine(reference, "FUNCTION").await?,
            ObjectKind::View => self.fetch_view(reference).await?,
            ObjectKind::Table => self.fetch_table(reference).await?,
            ObjectKind::Type => self.fetch_type(reference).await?,
        };

        debug!(object = %reference, found = source.is_some(), "Fetched definition");
        Ok(source.map(|text| ObjectDefinition::new(reference.clone(), text)))
    }

    async fn list_objects(&self) -> CatalogResult<Vec<ObjectReference>> {
        let rows = self
            .with_timeout(
                sqlx::query(
                    r#"
                    SELECT table_schema AS object_schema, table_name AS object_name,
                           'table' AS object_kind
                    FROM information_schema.tables
                    WHERE table_type = 'BASE TABLE'
                      AND table_schema <> ALL($1)
                    UNION ALL
                    SELECT table_schema, table_name, 'view'
                    FROM information_schema.views
                    WHERE table_schema <> ALL($1)
                    UNION ALL
                    SELECT routine_schema, routine_name,
                           CASE routine_type WHEN 'PROCEDURE' THEN 'procedure'
                                             ELSE 'function' END
                    FROM information_schema.routines
                    WHERE routine_schema <> ALL($1)
                    UNION ALL
                    SELECT domain_schema, domain_name, 'type'
                    FROM information_schema.domains
                    WHERE domain_schema <> ALL($1)
                    ORDER BY 1, 2
                    "#,
                )
                .bind(SYSTEM_SCHEMAS)
                .fetch_all(self.pool.as_ref()),
            )
            .await?;

        let mut objects = Vec::with_capacity(rows.len());
        for row in rows {
            let schema: String = row.try_get("object_schema").unwrap_or_default();
            let name: String = row.try_get("object_name").unwrap_or_default();
            let kind_str: String = row.try_get("object_kind").unwrap_or_default();
            let kind = match kind_str.as_str() {
                "table" => ObjectKind::Table,
                "view" => ObjectKind::View,
                "procedure" => ObjectKind::Procedure,
                "function" => ObjectKind::Function,
                "type" => ObjectKind::Type,
                other => {
                    return Err(CatalogError::MalformedRow {
                        reference: format!("{}.{}", schema, name),
                        detail: format!("unknown object kind '{}'", other),
                    })
                }
            };
            objects.push(ObjectReference::new(schema, name, kind));
        }

        debug!(count = objects.len(), "Listed catalog objects");
        Ok(objects)
    }
}
