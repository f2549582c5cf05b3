use crate::error::Result;
use crate::queue::{QueueStore, RecoveryQueueItem};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

/// In-memory recovery queue (for tests and embedded setups)
#[derive(Clone, Default)]
pub struct InMemoryQueueStore {
    rows: Arc<DashMap<Uuid, RecoveryQueueItem>>,
}

impl InMemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn insert(&self, items: &[RecoveryQueueItem]) -> Result<()> {
        for item in items {
            self.rows.insert(item.uuid, item.clone());
        }
        tracing::debug!(count = items.len(), "Recovery rows enqueued");
        Ok(())
    }

    async fn select_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<RecoveryQueueItem>> {
        let mut selected: Vec<RecoveryQueueItem> = self
            .rows
            .iter()
            .filter(|entry| entry.value().created_at < cutoff)
            .map(|entry| entry.value().clone())
            .collect();
        selected.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(selected)
    }

    async fn delete_by_uuids(&self, uuids: &[Uuid]) -> Result<()> {
        for uuid in uuids {
            self.rows.remove(uuid);
        }
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.rows.len() as u64)
    }
}
