//! In-memory entity store using DashMap
//!
//! Records live in a concurrent map keyed by their full [`Key`]. Queries scan
//! the map, which is fine for the site sizes this store targets.

use dashmap::DashMap;
use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::debug;

use crate::core::error::{Error, Result, StorageError};
use crate::storage::{EntityStore, Query};
use crate::types::{Fields, Key};

/// In-memory store implementation
pub struct MemStore {
    /// Map of key to record body
    records: DashMap<Key, Fields>,

    /// Next id handed out to an incomplete key
    next_id: AtomicI64,
}

impl MemStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }

    /// Number of records across all kinds
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Copy of every record plus the id counter, for persistence
    pub(crate) fn snapshot(&self) -> (i64, Vec<(Key, Fields)>) {
        let mut records: Vec<(Key, Fields)> = self
            .records
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        records.sort_by(|a, b| a.0.cmp(&b.0));
        (self.next_id.load(Ordering::SeqCst), records)
    }

    /// Replace the contents with a snapshot
    pub(crate) fn restore(&self, next_id: i64, records: Vec<(Key, Fields)>) {
        self.records.clear();
        let mut max_id = 0;
        for (key, fields) in records {
            max_id = max_id.max(key.int_id());
            self.records.insert(key, fields);
        }
        self.next_id.store(next_id.max(max_id + 1), Ordering::SeqCst);
    }

    fn check_ancestors(key: &Key) -> Result<()> {
        let mut current = key.parent();
        while let Some(parent) = current {
            if !parent.is_complete() {
                return Err(StorageError::IncompleteKey(key.to_string()).into());
            }
            current = parent.parent();
        }
        Ok(())
    }

    fn in_scope(key: &Key, ancestor: Option<&Key>) -> bool {
        match ancestor {
            None => true,
            Some(ancestor) => key == ancestor || key.has_ancestor(ancestor),
        }
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStore for MemStore {
    fn put(&self, key: Key, fields: Fields) -> Result<Key> {
        Self::check_ancestors(&key)?;
        let key = if key.is_complete() {
            key
        } else {
            key.with_id(self.next_id.fetch_add(1, Ordering::SeqCst))
        };
        debug!("MemStore::put {} ({} fields)", key, fields.len());
        self.records.insert(key.clone(), fields);
        Ok(key)
    }

    fn get(&self, key: &Key) -> Result<Fields> {
        if !key.is_complete() {
            return Err(StorageError::IncompleteKey(key.to_string()).into());
        }
        self.records
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::not_found(key.to_string()))
    }

    fn query(&self, query: &Query) -> Result<Vec<(Key, Fields)>> {
        let mut rows: Vec<(Key, Fields)> = self
            .records
            .iter()
            .filter(|entry| {
                entry.key().kind() == query.kind
                    && Self::in_scope(entry.key(), query.ancestor.as_ref())
            })
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        match query.order.as_deref() {
            Some(order) => {
                let (field, descending) = match order.strip_prefix('-') {
                    Some(field) => (field, true),
                    None => (order, false),
                };
                // records without the field are not in the field's index
                rows.retain(|(_, fields)| fields.contains_key(field));
                rows.sort_by(|a, b| {
                    let ordering = match (a.1.get(field), b.1.get(field)) {
                        (Some(x), Some(y)) => x.order_cmp(y),
                        _ => CmpOrdering::Equal,
                    };
                    let ordering = if descending { ordering.reverse() } else { ordering };
                    ordering.then_with(|| a.0.cmp(&b.0))
                });
            }
            None => rows.sort_by(|a, b| a.0.cmp(&b.0)),
        }

        let rows = rows
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .collect::<Vec<_>>();
        debug!("MemStore::query {:?} -> {} rows", query.kind, rows.len());
        Ok(rows)
    }

    fn count(&self, kind: &str) -> Result<usize> {
        Ok(self
            .records
            .iter()
            .filter(|entry| entry.key().kind() == kind)
            .count())
    }

    fn delete(&self, key: &Key) -> Result<()> {
        self.records.remove(key);
        Ok(())
    }
}
