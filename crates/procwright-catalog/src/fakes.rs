//! In-memory fake catalog (testing only)
//!
//! `MemoryCatalog` satisfies the `CatalogAccessor` contract without a live
//! database. It counts fetches so tests can assert each object is expanded
//! at most once per resolution pass, can list an object whose definition is
//! not fetchable (how `missing` entries arise in practice), and can be
//! flipped to unavailable to exercise the fatal path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::accessor::CatalogAccessor;
use crate::error::{CatalogError, CatalogResult};
use crate::types::{ObjectDefinition, ObjectKind, ObjectReference};

/// In-memory catalog. A `None` definition means the object is listed but
/// its body cannot be fetched (hidden or dropped between list and fetch).
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    objects: Mutex<HashMap<ObjectReference, Option<String>>>,
    fetches: AtomicUsize,
    unavailable: AtomicBool,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an object with its definition text.
    pub fn insert(&self, reference: ObjectReference, source_text: impl Into<String>) {
        let mut objects = self.objects.lock().unwrap();
        objects.insert(reference, Some(source_text.into()));
    }

    /// Register an object that is listed but has no fetchable definition.
    pub fn insert_undefined(&self, reference: ObjectReference) {
        let mut objects = self.objects.lock().unwrap();
        objects.insert(reference, None);
    }

    /// Shorthand for registering a `dbo` procedure.
    pub fn insert_procedure(&self, name: &str, body: &str) -> ObjectReference {
        let reference = ObjectReference::new("dbo", name, ObjectKind::Procedure);
        self.insert(reference.clone(), body);
        reference
    }

    /// Shorthand for registering a `dbo` table.
    pub fn insert_table(&self, name: &str, columns: &str) -> ObjectReference {
        let reference = ObjectReference::new("dbo", name, ObjectKind::Table);
        self.insert(reference.clone(), columns);
        reference
    }

    /// Number of `fetch_definition` calls made so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Simulate a lost connection; all subsequent calls fail.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> CatalogResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(CatalogError::Unavailable(
                "memory catalog marked unavailable".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CatalogAccessor for MemoryCatalog {
    async fn fetch_definition(
        &self,
        reference: &ObjectReference,
    ) -> CatalogResult<Option<ObjectDefinition>> {
        self.check_available()?;
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let objects = self.objects.lock().unwrap();
        Ok(objects
            .get(reference)
            .and_then(|text| text.clone())
            .map(|text| ObjectDefinition::new(reference.clone(), text)))
    }

    async fn list_objects(&self) -> CatalogResult<Vec<ObjectReference>> {
        self.check_available()?;

        let objects = self.objects.lock().unwrap();
        let mut refs: Vec<ObjectReference> = objects.keys().cloned().collect();
        refs.sort_by(|a, b| a.identity().cmp(&b.identity()));
        Ok(refs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_known_object() {
        let catalog = MemoryCatalog::new();
        let reference = catalog.insert_procedure("GetOrders", "SELECT 1");

        let definition = catalog
            .fetch_definition(&reference)
            .await
            .expect("fetch failed")
            .expect("definition missing");
        assert_eq!(definition.source_text, "SELECT 1");
        assert_eq!(catalog.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_fetch_absent_object_is_none() {
        let catalog = MemoryCatalog::new();
        let reference = ObjectReference::new("dbo", "Nope", ObjectKind::Table);

        let definition = catalog.fetch_definition(&reference).await.expect("fetch failed");
        assert!(definition.is_none());
    }

    #[tokio::test]
    async fn test_listed_but_undefined_object() {
        let catalog = MemoryCatalog::new();
        let reference = ObjectReference::new("dbo", "Hidden", ObjectKind::Procedure);
        catalog.insert_undefined(reference.clone());

        let listed = catalog.list_objects().await.expect("list failed");
        assert!(listed.contains(&reference));
        let definition = catalog.fetch_definition(&reference).await.expect("fetch failed");
        assert!(definition.is_none());
    }

    #[tokio::test]
    async fn test_unavailable_is_fatal() {
        let catalog = MemoryCatalog::new();
        let reference = catalog.insert_procedure("GetOrders", "SELECT 1");
        catalog.set_unavailable(true);

        let err = catalog.fetch_definition(&reference).await.unwrap_err();
        assert!(matches!(err, CatalogError::Unavailable(_)));
        assert!(catalog.list_objects().await.is_err());
    }

    #[tokio::test]
    async fn test_list_is_deterministic() {
        let catalog = MemoryCatalog::new();
        catalog.insert_table("Zeta", "TABLE dbo.Zeta ()");
        catalog.insert_table("Alpha", "TABLE dbo.Alpha ()");

        let objects = catalog.list_objects().await.expect("list failed");
        assert_eq!(objects[0].name, "Alpha");
        assert_eq!(objects[1].name, "Zeta");
    }
}
