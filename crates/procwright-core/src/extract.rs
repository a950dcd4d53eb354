//! Pattern-based reference extraction.
//!
//! Finds catalog object names mentioned in a definition body by matching
//! identifiers against the known-name table from the catalog, not by
//! parsing SQL. Recognizes bare (`Orders`), qualified (`dbo.Orders`), and
//! T-SQL bracketed (`[dbo].[Orders]`) forms, case-insensitively.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use procwright_catalog::ObjectReference;
use regex::Regex;

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // Optional [bracketed] identifier, optionally schema-qualified.
        Regex::new(r"\[?([A-Za-z_][A-Za-z0-9_]*)\]?(?:\s*\.\s*\[?([A-Za-z_][A-Za-z0-9_]*)\]?)?")
            .expect("identifier pattern is valid")
    })
}

/// Matches identifiers in definition text against known catalog objects.
pub struct ReferenceExtractor {
    /// lowercased `schema.name` -> objects with that qualified name.
    qualified: HashMap<String, Vec<ObjectReference>>,
    /// lowercased bare name -> objects with that name in any schema.
    bare: HashMap<String, Vec<ObjectReference>>,
}

impl ReferenceExtractor {
    /// Build the known-name table from a catalog listing.
    pub fn new(known_objects: &[ObjectReference]) -> Self {
        let mut qualified: HashMap<String, Vec<ObjectReference>> = HashMap::new();
        let mut bare: HashMap<String, Vec<ObjectReference>> = HashMap::new();

        for object in known_objects {
            qualified
                .entry(object.identity())
                .or_default()
                .push(object.clone());
            bare.entry(object.name.to_lowercase())
                .or_default()
                .push(object.clone());
        }

        // Deterministic candidate order when a bare name is ambiguous.
        for candidates in qualified.values_mut().chain(bare.values_mut()) {
            candidates.sort_by(|a, b| {
                a.identity()
                    .cmp(&b.identity())
                    .then(a.kind.as_str().cmp(b.kind.as_str()))
            });
        }

        Self { qualified, bare }
    }

    /// Extract referenced objects from `text`, in first-occurrence order,
    /// deduplicated, excluding `this` (an object's mention of its own name).
    pub fn extract(&self, text: &str, this: &ObjectReference) -> Vec<ObjectReference> {
        let mut seen: HashSet<ObjectReference> = HashSet::new();
        let mut references = Vec::new();

        for capture in identifier_pattern().captures_iter(text) {
            let first = capture.get(1).map(|m| m.as_str()).unwrap_or_default();
            let matched: Vec<&ObjectReference> = match capture.get(2) {
                Some(second) => {
                    let key = format!("{}.{}", first.to_lowercase(), second.as_str().to_lowercase());
                    self.qualified.get(&key).map(|v| v.iter().collect()).unwrap_or_default()
                }
                None => self
                    .bare
                    .get(&first.to_lowercase())
                    .map(|v| v.iter().collect())
                    .unwrap_or_default(),
            };

            for object in matched {
                if object == this {
                    continue;
                }
                if seen.insert(object.clone()) {
                    references.push(object.clone());
                }
            }
        }

        references
    }
}
