//! Storage layer for SCMS
//!
//! This module provides the storage abstraction that the query engine, the
//! editor and the bulk transfer code talk to. Records are schemaless field
//! maps addressed by hierarchical [`Key`]s; backends only need put/get by key,
//! ancestor-scoped queries with ordering, offset and limit, and atomic id
//! generation for incomplete keys.

pub mod factory;
pub mod file_store;
pub mod mem_store;
pub mod property_bag;

pub use factory::{create_store, SharedStore};
pub use file_store::FileStore;
pub use mem_store::MemStore;
pub use property_bag::PropertyBag;

use crate::core::Result;
use crate::types::{Fields, Key};

/// Trait for entity store implementations
pub trait EntityStore: Send + Sync {
    /// Store `fields` under `key`.
    ///
    /// An incomplete key receives a fresh numeric id; the resolved key is
    /// returned. Every ancestor of `key` must be complete.
    fn put(&self, key: Key, fields: Fields) -> Result<Key>;

    /// Load the record stored under a complete key (`NotFound` if absent)
    fn get(&self, key: &Key) -> Result<Fields>;

    /// Run an ancestor-scoped query.
    ///
    /// With an ancestor the result holds the ancestor itself (when it is of
    /// the queried kind) and every descendant of that kind, not just direct
    /// children. Callers that want one level must filter by exact parent.
    fn query(&self, query: &Query) -> Result<Vec<(Key, Fields)>>;

    /// Number of records of `kind`, whatever their parent
    fn count(&self, kind: &str) -> Result<usize>;

    /// Remove one record. Removing an absent record succeeds.
    fn delete(&self, key: &Key) -> Result<()>;

    /// Run `work` as one unit of persistence. Backends that write through to
    /// disk may defer their writes until `work` returns. Nothing is rolled
    /// back when `work` fails.
    fn batch(&self, work: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        work()
    }
}

/// Query over one kind
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    /// Kind to scan
    pub kind: String,
    /// Field to order by; a leading `-` sorts descending
    pub order: Option<String>,
    /// Restrict to this key and its descendants
    pub ancestor: Option<Key>,
    /// Results to skip after ordering
    pub offset: usize,
    /// Maximum number of results (None = unlimited)
    pub limit: Option<usize>,
}

impl Query {
    /// Query every record of `kind` in key order
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }

    /// Order by a field; empty input keeps key order
    pub fn order(mut self, order: &str) -> Self {
        self.order = (!order.is_empty()).then(|| order.to_string());
        self
    }

    /// Restrict to an ancestor scope
    pub fn ancestor(mut self, ancestor: Option<Key>) -> Self {
        self.ancestor = ancestor;
        self
    }

    /// Skip the first `offset` results
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Cap the result size; 0 means unlimited
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = (limit != 0).then_some(limit);
        self
    }
}
