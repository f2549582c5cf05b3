//! Schema metadata persistence
//!
//! Records, across restarts: the definition hash last applied per index, the
//! "initialized" flag per index type, and the fingerprint of the
//! system-of-record (vendor + schema version). Preserved when unrelated
//! indices are recreated.

use crate::error::{AppError, Result};
use crate::schema::IndexType;
use async_trait::async_trait;
use dashmap::DashMap;
use std::path::Path;
use std::sync::Arc;

/// Storage for schema lifecycle metadata
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Definition hash persisted for an index, if any
    async fn hash(&self, index: &str) -> Result<Option<String>>;

    /// Persist the definition hash for an index
    async fn set_hash(&self, index: &str, hash: &str) -> Result<()>;

    /// Drop the persisted hash for an index
    async fn clear_hash(&self, index: &str) -> Result<()>;

    /// Whether a type has completed its startup rebuild
    async fn initialized(&self, index_type: &IndexType) -> Result<bool>;

    async fn set_initialized(&self, index_type: &IndexType, initialized: bool) -> Result<()>;

    /// Fingerprint of the system-of-record (vendor + schema version)
    async fn db_vendor(&self) -> Result<Option<String>>;

    async fn set_db_vendor(&self, fingerprint: &str) -> Result<()>;
}

/// In-memory metadata store (for tests and embedded setups)
#[derive(Default)]
pub struct InMemoryMetadataStore {
    hashes: DashMap<String, String>,
    initialized: DashMap<String, bool>,
    db_vendor: parking_lot::Mutex<Option<String>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn hash(&self, index: &str) -> Result<Option<String>> {
        Ok(self.hashes.get(index).map(|e| e.clone()))
    }

    async fn set_hash(&self, index: &str, hash: &str) -> Result<()> {
        self.hashes.insert(index.to_string(), hash.to_string());
        Ok(())
    }

    async fn clear_hash(&self, index: &str) -> Result<()> {
        self.hashes.remove(index);
        Ok(())
    }

    async fn initialized(&self, index_type: &IndexType) -> Result<bool> {
        Ok(self
            .initialized
            .get(&index_type.key())
            .map(|e| *e)
            .unwrap_or(false))
    }

    async fn set_initialized(&self, index_type: &IndexType, initialized: bool) -> Result<()> {
        self.initialized.insert(index_type.key(), initialized);
        Ok(())
    }

    async fn db_vendor(&self) -> Result<Option<String>> {
        Ok(self.db_vendor.lock().clone())
    }

    async fn set_db_vendor(&self, fingerprint: &str) -> Result<()> {
        *self.db_vendor.lock() = Some(fingerprint.to_string());
        Ok(())
    }
}

const DB_VENDOR_KEY: &str = "__db_vendor__";

/// Persistent metadata store backed by sled
#[derive(Clone)]
pub struct SledMetadataStore {
    _db: Arc<sled::Db>,
    hashes_tree: sled::Tree,
    initialized_tree: sled::Tree,
}

impl SledMetadataStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(&path)
            .map_err(|e| AppError::Database(format!("Failed to open metadata database: {}", e)))?;
        let hashes_tree = db
            .open_tree("schema_hashes")
            .map_err(|e| AppError::Database(format!("Failed to open hashes tree: {}", e)))?;
        let initialized_tree = db
            .open_tree("initialized_types")
            .map_err(|e| AppError::Database(format!("Failed to open initialized tree: {}", e)))?;

        tracing::info!("Initialized sled metadata store at {:?}", path.as_ref());

        Ok(Self {
            _db: Arc::new(db),
            hashes_tree,
            initialized_tree,
        })
    }

    fn read_string(tree: &sled::Tree, key: &str) -> Result<Option<String>> {
        let value = tree
            .get(key.as_bytes())
            .map_err(|e| AppError::Database(format!("Failed to read metadata: {}", e)))?;
        match value {
            Some(bytes) => {
                let s = String::from_utf8(bytes.to_vec())
                    .map_err(|e| AppError::Serialization(e.to_string()))?;
                Ok(Some(s))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl MetadataStore for SledMetadataStore {
    async fn hash(&self, index: &str) -> Result<Option<String>> {
        Self::read_string(&self.hashes_tree, index)
    }

    async fn set_hash(&self, index: &str, hash: &str) -> Result<()> {
        self.hashes_tree
            .insert(index.as_bytes(), hash.as_bytes())
            .map_err(|e| AppError::Database(format!("Failed to persist hash: {}", e)))?;
        Ok(())
    }

    async fn clear_hash(&self, index: &str) -> Result<()> {
        self.hashes_tree
            .remove(index.as_bytes())
            .map_err(|e| AppError::Database(format!("Failed to clear hash: {}", e)))?;
        Ok(())
    }

    async fn initialized(&self, index_type: &IndexType) -> Result<bool> {
        let value = self
            .initialized_tree
            .get(index_type.key().as_bytes())
            .map_err(|e| AppError::Database(format!("Failed to read initialized flag: {}", e)))?;
        Ok(value.map(|v| v.as_ref() == b"1").unwrap_or(false))
    }

    async fn set_initialized(&self, index_type: &IndexType, initialized: bool) -> Result<()> {
        let value: &[u8] = if initialized { b"1" } else { b"0" };
        self.initialized_tree
            .insert(index_type.key().as_bytes(), value)
            .map_err(|e| AppError::Database(format!("Failed to persist initialized flag: {}", e)))?;
        Ok(())
    }

    async fn db_vendor(&self) -> Result<Option<String>> {
        Self::read_string(&self.hashes_tree, DB_VENDOR_KEY)
    }

    async fn set_db_vendor(&self, fingerprint: &str) -> Result<()> {
        self.hashes_tree
            .insert(DB_VENDOR_KEY.as_bytes(), fingerprint.as_bytes())
            .map_err(|e| AppError::Database(format!("Failed to persist db fingerprint: {}", e)))?;
        Ok(())
    }
}
