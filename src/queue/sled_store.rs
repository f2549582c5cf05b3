use crate::error::{AppError, Result};
use crate::queue::{QueueStore, RecoveryQueueItem};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sled::Db;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Persistent recovery queue using a sled tree
#[derive(Clone)]
pub struct SledQueueStore {
    db: Arc<Db>,
    rows_tree: sled::Tree,
}

impl SledQueueStore {
    /// Create a new sled-backed queue at the specified path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(&path)
            .map_err(|e| AppError::Database(format!("Failed to open queue database: {}", e)))?;
        let rows_tree = db
            .open_tree("recovery_queue")
            .map_err(|e| AppError::Database(format!("Failed to open queue tree: {}", e)))?;

        tracing::info!("Initialized sled queue store at {:?}", path.as_ref());

        Ok(Self {
            db: Arc::new(db),
            rows_tree,
        })
    }

    fn serialize_item(item: &RecoveryQueueItem) -> Result<Vec<u8>> {
        bincode::serialize(item)
            .map_err(|e| AppError::Serialization(format!("Failed to serialize queue row: {}", e)))
    }

    fn deserialize_item(bytes: &[u8]) -> Result<RecoveryQueueItem> {
        bincode::deserialize(bytes)
            .map_err(|e| AppError::Serialization(format!("Failed to deserialize queue row: {}", e)))
    }

    /// Flush pending writes to disk
    pub async fn flush(&self) -> Result<()> {
        self.db
            .flush_async()
            .await
            .map_err(|e| AppError::Database(format!("Failed to flush queue database: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl QueueStore for SledQueueStore {
    async fn insert(&self, items: &[RecoveryQueueItem]) -> Result<()> {
        for item in items {
            let value = Self::serialize_item(item)?;
            self.rows_tree
                .insert(item.uuid.as_bytes(), value)
                .map_err(|e| AppError::Database(format!("Failed to enqueue row: {}", e)))?;
        }
        tracing::debug!(count = items.len(), "Recovery rows enqueued");
        Ok(())
    }

    async fn select_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<RecoveryQueueItem>> {
        let mut selected = Vec::new();
        for entry in self.rows_tree.iter() {
            let (_, value) =
                entry.map_err(|e| AppError::Database(format!("Failed to scan queue: {}", e)))?;
            let item = Self::deserialize_item(&value)?;
            if item.created_at < cutoff {
                selected.push(item);
            }
        }
        selected.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(selected)
    }

    async fn delete_by_uuids(&self, uuids: &[Uuid]) -> Result<()> {
        for uuid in uuids {
            self.rows_tree
                .remove(uuid.as_bytes())
                .map_err(|e| AppError::Database(format!("Failed to delete queue row: {}", e)))?;
        }
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.rows_tree.len() as u64)
    }
}
