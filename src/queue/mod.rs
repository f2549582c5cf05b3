//! Durable recovery queue
//!
//! Every domain mutation that requires reindexing appends one row per
//! affected document per index type, in the same transaction as the mutation
//! itself. Rows are deleted only by whichever indexer successfully processes
//! them; the queue is the single hand-off point between producers and the
//! recovery loop.

mod memory;
mod sled_store;

pub use memory::InMemoryQueueStore;
pub use sled_store::SledQueueStore;

use crate::error::Result;
use crate::schema::IndexType;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One pending unit of reindex work.
///
/// The same `(index_type_key, document_id)` pair may appear in multiple rows
/// (repeated edits); they form one logical unit of work and must all be
/// removed together once the document is successfully reindexed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecoveryQueueItem {
    pub uuid: Uuid,
    pub index_type_key: String,
    pub document_id: String,
    pub created_at: DateTime<Utc>,
}

impl RecoveryQueueItem {
    pub fn new(index_type: &IndexType, document_id: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            index_type_key: index_type.key(),
            document_id: document_id.into(),
            created_at: Utc::now(),
        }
    }

    /// Same item with an explicit timestamp, for backdating in tests and
    /// for callers that carry the transaction time
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

/// Every row uuid among `items` carrying the given document id.
///
/// Indexers use this to coalesce duplicate enqueues: one successful write
/// removes all matching rows, never only the first.
pub fn uuids_for_document(items: &[RecoveryQueueItem], document_id: &str) -> Vec<Uuid> {
    items
        .iter()
        .filter(|item| item.document_id == document_id)
        .map(|item| item.uuid)
        .collect()
}

/// Storage contract for the recovery queue
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Append rows; called inside the domain-mutation transaction
    async fn insert(&self, items: &[RecoveryQueueItem]) -> Result<()>;

    /// Rows strictly older than the cutoff, oldest first
    async fn select_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<RecoveryQueueItem>>;

    /// Remove rows by uuid; called only on confirmed indexing success
    async fn delete_by_uuids(&self, uuids: &[Uuid]) -> Result<()>;

    /// Total number of pending rows
    async fn count(&self) -> Result<u64>;
}
