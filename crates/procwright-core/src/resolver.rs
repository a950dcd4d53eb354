//! Dependency resolution: bounded, cycle-safe closure over the catalog.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use procwright_catalog::{CatalogAccessor, CatalogResult, ObjectDefinition, ObjectReference};
use tracing::debug;

use crate::extract::ReferenceExtractor;

/// Outcome of one resolution pass.
#[derive(Debug, Clone)]
pub struct ResolutionResult {
    /// The object resolution started from.
    pub root: ObjectReference,
    /// Fetched definitions in breadth-first traversal order; the root is
    /// always first when it was found.
    pub definitions: Vec<ObjectDefinition>,
    /// Direct references extracted from each resolved object.
    pub dependencies: HashMap<ObjectReference, Vec<ObjectReference>>,
    /// True if the depth limit cut the traversal before full closure.
    pub truncated: bool,
    /// Objects referenced but not fetchable from the catalog, in discovery
    /// order.
    pub missing: Vec<ObjectReference>,
}

impl ResolutionResult {
    /// The root's own definition, if it was found.
    pub fn root_definition(&self) -> Option<&ObjectDefinition> {
        self.definitions.first().filter(|d| d.reference == self.root)
    }

    /// Whether the root itself could not be fetched.
    pub fn root_missing(&self) -> bool {
        self.missing.contains(&self.root)
    }

    /// Dependency edges in traversal order of the source objects.
    pub fn edges(&self) -> Vec<(&ObjectReference, &[ObjectReference])> {
        self.definitions
            .iter()
            .filter_map(|definition| {
                self.dependencies
                    .get(&definition.reference)
                    .map(|deps| (&definition.reference, deps.as_slice()))
            })
            .collect()
    }
}

/// Breadth-first dependency resolver.
///
/// The underlying reference relation may contain cycles (mutually
/// referencing procedures); termination is guaranteed by a per-pass
/// visited-set checked before enqueue, so each object is fetched and
/// expanded at most once per pass.
pub struct DependencyResolver {
    catalog: Arc<dyn CatalogAccessor>,
}

impl DependencyResolver {
    pub fn new(catalog: Arc<dyn CatalogAccessor>) -> Self {
        Self { catalog }
    }

    /// Resolve the dependency closure of `root` down to `max_depth` levels.
    /// `max_depth = 0` resolves only the root, no expansion.
    ///
    /// An absent object is a soft `missing` entry; only a catalog connection
    /// failure aborts the pass.
    pub async fn resolve(
        &self,
        root: &ObjectReference,
        max_depth: u32,
    ) -> CatalogResult<ResolutionResult> {
        let known = self.catalog.list_objects().await?;
        let extractor = ReferenceExtractor::new(&known);

        let mut definitions = Vec::new();
        let mut dependencies: HashMap<ObjectReference, Vec<ObjectReference>> = HashMap::new();
        let mut missing = Vec::new();
        let mut truncated = false;

        let mut visited: HashSet<ObjectReference> = HashSet::new();
        let mut queue: VecDeque<(ObjectReference, u32)> = VecDeque::new();
        visited.insert(root.clone());
        queue.push_back((root.clone(), 0));

        while let Some((reference, depth)) = queue.pop_front() {
            let Some(definition) = self.catalog.fetch_definition(&reference).await? else {
                missing.push(reference);
                continue;
            };

            let referenced = extractor.extract(&definition.source_text, &reference);
            debug!(
                object = %reference,
                depth,
                references = referenced.len(),
                "Resolved object"
            );

            for dependency in &referenced {
                if visited.contains(dependency) {
                    continue;
                }
                if depth + 1 > max_depth {
                    truncated = true;
                    continue;
                }
                visited.insert(dependency.clone());
                queue.push_back((dependency.clone(), depth + 1));
            }

            dependencies.insert(definition.reference.clone(), referenced);
            definitions.push(definition);
        }

        Ok(ResolutionResult {
            root: root.clone(),
            definitions,
            dependencies,
            truncated,
            missing,
        })
    }
}
