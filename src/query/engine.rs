//! Listing, lookup, pagination and tree materialization over an entity store

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::core::config::LimitsConfig;
use crate::core::error::{Error, Result};
use crate::query::{Cursor, Paging, Record};
use crate::storage::{EntityStore, Query};
use crate::types::Key;

/// Guards applied by one engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryLimits {
    /// Deepest tree level `get_tree` will materialize
    pub max_tree_depth: usize,
    /// Store calls one engine may issue
    pub max_store_calls: usize,
}

impl Default for QueryLimits {
    fn default() -> Self {
        let limits = LimitsConfig::default();
        Self::from(&limits)
    }
}

impl From<&LimitsConfig> for QueryLimits {
    fn from(limits: &LimitsConfig) -> Self {
        Self {
            max_tree_depth: limits.max_tree_depth,
            max_store_calls: limits.max_store_calls,
        }
    }
}

/// Query engine bound to one store.
///
/// Clones share the round-trip counter, so one engine per request gives a
/// per-request budget.
#[derive(Clone)]
pub struct QueryEngine {
    store: Arc<dyn EntityStore>,
    limits: QueryLimits,
    round_trips: Arc<AtomicUsize>,
}

impl QueryEngine {
    /// Create an engine with a fresh round-trip counter
    pub fn new(store: Arc<dyn EntityStore>, limits: QueryLimits) -> Self {
        Self {
            store,
            limits,
            round_trips: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Underlying store
    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    /// Same store and limits with a new round-trip counter
    pub fn with_fresh_budget(&self) -> Self {
        Self::new(self.store.clone(), self.limits)
    }

    /// Store calls issued so far
    pub fn round_trips(&self) -> usize {
        self.round_trips.load(Ordering::SeqCst)
    }

    fn call<T>(&self, op: impl FnOnce(&dyn EntityStore) -> Result<T>) -> Result<T> {
        let calls = self.round_trips.fetch_add(1, Ordering::SeqCst) + 1;
        if calls > self.limits.max_store_calls {
            return Err(Error::RoundTripBudgetExceeded {
                budget: self.limits.max_store_calls,
            });
        }
        op(self.store.as_ref())
    }

    /// Records of `kind` whose parent is exactly `parent`.
    ///
    /// `order` is a field name (`-Name` descending) or "" for key order;
    /// `limit` 0 means unlimited. Offset and limit apply to the ancestor scan,
    /// before deeper descendants are filtered out.
    pub fn get(
        &self,
        kind: &str,
        order: &str,
        parent: Option<&Key>,
        offset: usize,
        limit: usize,
    ) -> Result<Cursor> {
        debug!(
            "get: kind {:?}; order {:?}; parent {:?}; offset {}; limit {}",
            kind,
            order,
            parent.map(Key::encode),
            offset,
            limit
        );
        let query = Query::new(kind)
            .order(order)
            .ancestor(parent.cloned())
            .offset(offset)
            .limit(limit);
        let rows = self.call(|store| store.query(&query))?;
        Ok(rows
            .into_iter()
            .filter(|(key, _)| key.parent() == parent)
            .map(|(key, data)| Record::new(key, data))
            .collect())
    }

    /// Record stored under `key`; the zero record when absent
    pub fn get_by_key(&self, key: &Key) -> Result<Record> {
        match self.call(|store| store.get(key)) {
            Ok(data) => Ok(Record::new(key.clone(), data)),
            Err(e) if e.is_not_found() => Ok(Record::default()),
            Err(e) => Err(e),
        }
    }

    /// Build a key from its parts and look it up
    pub fn get_by_key_fields(
        &self,
        kind: &str,
        string_id: &str,
        int_id: i64,
        parent: Option<Key>,
    ) -> Result<Record> {
        self.get_by_key(&Key::new(kind, string_id, int_id, parent))
    }

    /// Pagination links over every record of `kind`.
    ///
    /// Produces `count / limit + 1` pages, so an exact multiple ends with an
    /// empty page.
    pub fn get_pages(&self, kind: &str, limit: usize) -> Result<Vec<Paging>> {
        if limit == 0 {
            return Err(Error::invalid_argument("limit must be not zero"));
        }
        let count = self.call(|store| store.count(kind))?;
        debug!("get_pages: count for {:?} = {}", kind, count);
        Ok((0..count / limit + 1)
            .map(|i| Paging {
                number: i + 1,
                query: page_query(i * limit, limit),
            })
            .collect())
    }

    /// Query string of the previous page, or "" on the first page
    pub fn prev_page(&self, offset: usize, limit: usize) -> Result<String> {
        if offset == 0 {
            return Ok(String::new());
        }
        if limit == 0 {
            return Err(Error::invalid_argument("limit must be not zero"));
        }
        Ok(page_query(offset.saturating_sub(limit), limit))
    }

    /// Query string of the next page, or "" when it would start past the end
    pub fn next_page(&self, kind: &str, offset: usize, limit: usize) -> Result<String> {
        if limit == 0 {
            return Err(Error::invalid_argument("limit must be not zero"));
        }
        let count = self.call(|store| store.count(kind))?;
        match offset.checked_add(limit) {
            Some(next) if next <= count => Ok(page_query(next, limit)),
            _ => Ok(String::new()),
        }
    }

    /// Every record of `kind` as a forest: top-level records with their
    /// descendants nested under `children`.
    ///
    /// Costs one query for the roots plus one per materialized record.
    pub fn get_tree(&self, kind: &str) -> Result<Cursor> {
        self.tree_level(kind, None, 1)
    }

    fn tree_level(&self, kind: &str, parent: Option<&Key>, depth: usize) -> Result<Cursor> {
        let mut level = self.get(kind, "", parent, 0, 0)?;
        if !level.is_empty() && depth > self.limits.max_tree_depth {
            return Err(Error::TreeTooDeep {
                kind: kind.to_string(),
                max_depth: self.limits.max_tree_depth,
            });
        }
        for record in level.iter_mut() {
            record.children = self.tree_level(kind, record.key.as_ref(), depth + 1)?;
        }
        Ok(level)
    }
}

fn page_query(offset: usize, limit: usize) -> String {
    format!("offset={offset}&limit={limit}")
}
