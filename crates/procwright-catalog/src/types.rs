//! Object identity and definition types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// Kind of a catalog object.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Table,
    View,
    Function,
    Type,
    Procedure,
}

impl ObjectKind {
    /// Stable lowercase label, used in audit payloads and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Table => "table",
            ObjectKind::View => "view",
            ObjectKind::Function => "function",
            ObjectKind::Type => "type",
            ObjectKind::Procedure => "procedure",
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reference to a catalog object.
///
/// Identity is `(kind, lowercased schema.name)`. SQL identifiers are
/// case-insensitive in the dialects we target, so `dbo.GetOrders` and
/// `DBO.getorders` are the same object. Equality and hashing honor that.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectReference {
    /// Schema the object lives in (e.g. `dbo`).
    pub schema: String,
    /// Unqualified object name.
    pub name: String,
    /// Object kind.
    pub kind: ObjectKind,
}

impl ObjectReference {
    /// Create a reference.
    pub fn new(schema: impl Into<String>, name: impl Into<String>, kind: ObjectKind) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            kind,
        }
    }

    /// Qualified name as written (`schema.name`).
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    /// Lowercased qualified name; the identity key.
    pub fn identity(&self) -> String {
        format!("{}.{}", self.schema.to_lowercase(), self.name.to_lowercase())
    }
}

impl PartialEq for ObjectReference {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.identity() == other.identity()
    }
}

impl Eq for ObjectReference {}

impl Hash for ObjectReference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.identity().hash(state);
    }
}

impl std::fmt::Display for ObjectReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, self.qualified())
    }
}

/// A fetched object definition.
///
/// `source_text` is the module body for procedures, functions, and views; a
/// rendered column listing for tables and table types; and a base-type
/// description for scalar types. Owned by the resolver's per-pass cache and
/// never persisted beyond the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectDefinition {
    /// The object this definition belongs to.
    pub reference: ObjectReference,
    /// Definition text as fetched from the catalog.
    pub source_text: String,
    /// When the definition was fetched.
    pub fetched_at: DateTime<Utc>,
}

impl ObjectDefinition {
    /// Create a definition stamped with the current time.
    pub fn new(reference: ObjectReference, source_text: impl Into<String>) -> Self {
        Self {
            reference,
            source_text: source_text.into(),
            fetched_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_identity_is_case_insensitive() {
        let a = ObjectReference::new("dbo", "GetOrders", ObjectKind::Procedure);
        let b = ObjectReference::new("DBO", "getorders", ObjectKind::Procedure);
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_identity_distinguishes_kind() {
        let proc = ObjectReference::new("dbo", "Orders", ObjectKind::Procedure);
        let table = ObjectReference::new("dbo", "Orders", ObjectKind::Table);
        assert_ne!(proc, table);
    }

    #[test]
    fn test_qualified_preserves_case() {
        let r = ObjectReference::new("dbo", "GetOrders", ObjectKind::Procedure);
        assert_eq!(r.qualified(), "dbo.GetOrders");
        assert_eq!(r.identity(), "dbo.getorders");
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(ObjectKind::Table.as_str(), "table");
        assert_eq!(ObjectKind::Procedure.as_str(), "procedure");
    }
}
