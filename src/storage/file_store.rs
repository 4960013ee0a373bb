//! File-backed entity store
//!
//! Keeps the working set in a [`MemStore`] and writes a JSON snapshot to
//! `<data_dir>/store.json` after every mutation, or once at the end of a
//! [`EntityStore::batch`]. The snapshot is written to a temporary file first
//! and renamed into place.
//!
//! Memory is updated before the snapshot is written. When a write fails the
//! caller gets the error while memory keeps the change; the store stays dirty
//! and the next mutation writes the snapshot again.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{debug, info, warn};

use crate::core::error::{Result, StorageError};
use crate::storage::{EntityStore, MemStore, Query};
use crate::types::{Fields, Key};

const SNAPSHOT_FILE: &str = "store.json";

#[derive(Serialize, Deserialize)]
struct Snapshot {
    next_id: i64,
    records: Vec<SnapshotRecord>,
}

#[derive(Serialize, Deserialize)]
struct SnapshotRecord {
    key: Key,
    fields: Fields,
}

/// Store persisted as a JSON snapshot on disk
pub struct FileStore {
    memory: MemStore,
    path: PathBuf,
    /// Serializes snapshot writes
    write_lock: Mutex<()>,
    /// Open batches; writes are deferred while non-zero
    batch_depth: AtomicUsize,
    /// Memory holds changes the snapshot does not
    dirty: AtomicBool,
}

impl FileStore {
    /// Open (or create) the store under `data_dir`
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir).map_err(|e| {
            StorageError::Persistence(format!("cannot create {}: {}", data_dir.display(), e))
        })?;
        let path = data_dir.join(SNAPSHOT_FILE);
        let memory = MemStore::new();

        if path.exists() {
            let raw = fs::read(&path).map_err(|e| {
                StorageError::Persistence(format!("cannot read {}: {}", path.display(), e))
            })?;
            let snapshot: Snapshot = serde_json::from_slice(&raw).map_err(|e| {
                StorageError::Corruption(format!("{}: {}", path.display(), e))
            })?;
            let records = snapshot
                .records
                .into_iter()
                .map(|record| (record.key, record.fields))
                .collect::<Vec<_>>();
            info!("Loaded {} records from {}", records.len(), path.display());
            memory.restore(snapshot.next_id, records);
        }

        Ok(Self {
            memory,
            path,
            write_lock: Mutex::new(()),
            batch_depth: AtomicUsize::new(0),
            dirty: AtomicBool::new(false),
        })
    }

    /// Location of the snapshot file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether memory holds changes not yet written to disk
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    fn mutated(&self) -> Result<()> {
        self.dirty.store(true, Ordering::SeqCst);
        if self.batch_depth.load(Ordering::SeqCst) > 0 {
            return Ok(());
        }
        self.persist()
    }

    fn persist(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        // cleared first so a mutation racing this write marks it again
        self.dirty.store(false, Ordering::SeqCst);
        let (next_id, records) = self.memory.snapshot();
        let snapshot = Snapshot {
            next_id,
            records: records
                .into_iter()
                .map(|(key, fields)| SnapshotRecord { key, fields })
                .collect(),
        };
        let raw = serde_json::to_vec(&snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        if let Err(e) = fs::write(&tmp, raw).and_then(|_| fs::rename(&tmp, &self.path)) {
            self.dirty.store(true, Ordering::SeqCst);
            warn!("Snapshot write failed, memory is ahead of {}", self.path.display());
            return Err(StorageError::Persistence(format!(
                "cannot write {}: {}",
                self.path.display(),
                e
            ))
            .into());
        }
        debug!("Snapshot written: {} records", snapshot.records.len());
        Ok(())
    }
}

impl EntityStore for FileStore {
    fn put(&self, key: Key, fields: Fields) -> Result<Key> {
        let key = self.memory.put(key, fields)?;
        self.mutated()?;
        Ok(key)
    }

    fn get(&self, key: &Key) -> Result<Fields> {
        self.memory.get(key)
    }

    fn query(&self, query: &Query) -> Result<Vec<(Key, Fields)>> {
        self.memory.query(query)
    }

    fn count(&self, kind: &str) -> Result<usize> {
        self.memory.count(kind)
    }

    fn delete(&self, key: &Key) -> Result<()> {
        self.memory.delete(key)?;
        self.mutated()
    }

    fn batch(&self, work: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        self.batch_depth.fetch_add(1, Ordering::SeqCst);
        let outcome = work();
        let outermost = self.batch_depth.fetch_sub(1, Ordering::SeqCst) == 1;
        let persisted = if outermost && self.is_dirty() {
            self.persist()
        } else {
            Ok(())
        };
        outcome.and(persisted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Error;
    use crate::types::TypedValue;

    #[test]
    fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let key = {
            let store = FileStore::open(dir.path()).unwrap();
            let mut fields = Fields::new();
            fields.insert("Data".to_string(), TypedValue::Blob(b"hello".to_vec()));
            fields.insert("When".to_string(), TypedValue::Integer(3));
            store.put(Key::incomplete("Item", None), fields).unwrap()
        };

        let store = FileStore::open(dir.path()).unwrap();
        let fields = store.get(&key).unwrap();
        assert_eq!(fields["Data"], TypedValue::Blob(b"hello".to_vec()));

        let next = store.put(Key::incomplete("Item", None), Fields::new()).unwrap();
        assert_ne!(next, key);
    }

    #[test]
    fn test_delete_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let key = store.put(Key::named("Item", "a"), Fields::new()).unwrap();
        store.delete(&key).unwrap();
        drop(store);

        let store = FileStore::open(dir.path()).unwrap();
        assert!(store.get(&key).unwrap_err().is_not_found());
    }

    #[test]
    fn test_batch_writes_snapshot_once_at_end() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let mut keys = Vec::new();
        store
            .batch(&mut || {
                for name in ["a", "b", "c"] {
                    keys.push(store.put(Key::named("Item", name), Fields::new())?);
                }
                store.batch(&mut || store.delete(&Key::named("Item", "c")))?;
                assert!(store.is_dirty());
                assert!(!store.path().exists());
                Ok(())
            })
            .unwrap();
        assert!(!store.is_dirty());

        let reopened = FileStore::open(dir.path()).unwrap();
        assert!(reopened.get(&keys[0]).is_ok());
        assert!(reopened.get(&keys[1]).is_ok());
        assert!(reopened.get(&keys[2]).unwrap_err().is_not_found());
    }

    #[test]
    fn test_failed_batch_still_persists_applied_changes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let err = store
            .batch(&mut || {
                store.put(Key::named("Item", "kept"), Fields::new())?;
                Err(Error::internal("stop"))
            })
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));

        let reopened = FileStore::open(dir.path()).unwrap();
        assert!(reopened.get(&Key::named("Item", "kept")).is_ok());
    }

    #[test]
    fn test_corrupt_snapshot_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(SNAPSHOT_FILE), b"{not json").unwrap();
        let err = FileStore::open(dir.path()).err().unwrap();
        assert!(matches!(err, Error::Storage(StorageError::Corruption(_))));
    }
}
