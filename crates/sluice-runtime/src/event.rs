//! Events, declared read-sets, and the immutable state snapshot handed to
//! state gates.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use sluice_store_core::Value;

/// Reserved event kind emitted by the runner when a gate fails.
pub const ERROR_EVENT: &str = "error";

/// Reserved kind observers use to denote events no gate claimed. The runner
/// never emits it; unclaimed events keep their own kind and land in pending.
pub const UNCLAIMED_EVENT: &str = "unclaimed";

//─────────────────────────────
//  Event
//─────────────────────────────

/// An immutable record flowing through the runner: a kind string routing it
/// to a gate, and an opaque payload only that gate interprets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Kind string matched against registered gate names.
    pub kind: String,
    /// Opaque payload; the runner never inspects its shape.
    pub data: Value,
}

impl Event {
    /// Create a new event.
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }
}

//─────────────────────────────
//  Read sets
//─────────────────────────────

/// A single ref-name specifier within a [`ReadSet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadSpec {
    /// Resolve exactly this name.
    Exact(String),
    /// Expand to every bound name starting with this prefix.
    Prefix(String),
}

/// The refs a state gate declares it will consult for an event.
///
/// The runner materializes the declared entries into a [`StateSnapshot`]
/// before calling the gate, so the gate's transform stays a pure function
/// over its declared inputs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadSet {
    specs: Vec<ReadSpec>,
}

impl ReadSet {
    /// Create an empty read set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an exact ref name to resolve.
    pub fn exact(mut self, name: impl Into<String>) -> Self {
        self.specs.push(ReadSpec::Exact(name.into()));
        self
    }

    /// Declare a prefix to expand and resolve.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.specs.push(ReadSpec::Prefix(prefix.into()));
        self
    }

    /// The declared specifiers in insertion order.
    pub fn specs(&self) -> &[ReadSpec] {
        &self.specs
    }

    /// Whether nothing was declared.
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

//─────────────────────────────
//  State snapshot
//─────────────────────────────

/// Immutable view of the declared refs, materialized before a state gate's
/// transform and never re-read mid-transform.
///
/// An exact name that is not bound appears with a missing value rather than
/// failing, so gates can probe for state that may not exist yet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateSnapshot {
    entries: BTreeMap<String, Option<Value>>,
}

impl StateSnapshot {
    /// The value resolved for `name`, or `None` when the name was absent
    /// (or not part of the declared read set).
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name).and_then(Option::as_ref)
    }

    /// Whether `name` was materialized at all, bound or not.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Iterate the materialized names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of materialized names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, Option<Value>)> for StateSnapshot {
    fn from_iter<I: IntoIterator<Item = (String, Option<Value>)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_read_set_builder_chains_in_order() {
        let reads = ReadSet::new()
            .exact("db/meta")
            .prefix("db/tables/")
            .exact("counter");
        assert_eq!(
            reads.specs(),
            &[
                ReadSpec::Exact("db/meta".into()),
                ReadSpec::Prefix("db/tables/".into()),
                ReadSpec::Exact("counter".into()),
            ]
        );
    }

    #[test]
    fn test_snapshot_missing_vs_unbound() {
        let snapshot: StateSnapshot = [
            ("bound".to_owned(), Some(json!(1))),
            ("declared_but_absent".to_owned(), None),
        ]
        .into_iter()
        .collect();

        assert_eq!(snapshot.get("bound"), Some(&json!(1)));
        assert_eq!(snapshot.get("declared_but_absent"), None);
        assert!(snapshot.contains("declared_but_absent"));
        assert!(!snapshot.contains("never_declared"));
        assert_eq!(snapshot.len(), 2);
    }
}
