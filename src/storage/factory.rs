//! Storage factory for creating the configured backend

use std::sync::Arc;
use tracing::info;

use crate::core::config::{StorageConfig, StorageType};
use crate::core::error::Result;
use crate::storage::{EntityStore, FileStore, MemStore};

/// Shared handle to the configured store
pub type SharedStore = Arc<dyn EntityStore>;

/// Create a store based on configuration
pub fn create_store(config: &StorageConfig) -> Result<SharedStore> {
    match config.storage_type {
        StorageType::Memory => Ok(Arc::new(MemStore::new())),
        StorageType::File => {
            let store = FileStore::open(&config.data_dir)?;
            info!("File store opened at {}", store.path().display());
            Ok(Arc::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Fields, Key};

    #[test]
    fn test_create_memory_store() {
        let store = create_store(&StorageConfig::default()).unwrap();
        assert_eq!(store.count("Anything").unwrap(), 0);
    }

    #[test]
    fn test_create_file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            storage_type: StorageType::File,
            data_dir: dir.path().to_path_buf(),
        };
        let key = {
            let store = create_store(&config).unwrap();
            store.put(Key::named("Note", "a"), Fields::new()).unwrap()
        };
        let reopened = create_store(&config).unwrap();
        assert!(reopened.get(&key).is_ok());
    }
}
