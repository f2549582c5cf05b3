//! The resilient-indexer contract
//!
//! A resilient indexer is a per-domain component that can reindex documents
//! on demand and can safely be replayed from the recovery queue. Expected
//! partial failure is a value ([`IndexingResult`]), never an error; an `Err`
//! from [`ResilientIndexer::index`] means something unexpected broke and the
//! whole batch stays queued.

use crate::error::Result;
use crate::queue::{QueueStore, RecoveryQueueItem};
use crate::schema::IndexType;
use async_trait::async_trait;
use std::collections::HashSet;
use std::ops::AddAssign;

/// Success/request counters for one indexing attempt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexingResult {
    pub success_count: u64,
    pub request_count: u64,
}

impl IndexingResult {
    pub fn new(success_count: u64, request_count: u64) -> Self {
        Self {
            success_count,
            request_count,
        }
    }

    /// Share of failed requests; 1.0 when nothing was attempted.
    ///
    /// Computed from the failure count directly so that an exactly-30% run
    /// compares equal to a 0.3 threshold instead of landing a rounding step
    /// above it.
    pub fn failure_ratio(&self) -> f64 {
        if self.request_count == 0 {
            1.0
        } else {
            self.failure_count() as f64 / self.request_count as f64
        }
    }

    pub fn failure_count(&self) -> u64 {
        self.request_count - self.success_count
    }

    pub fn is_success(&self) -> bool {
        self.success_count == self.request_count
    }
}

impl AddAssign for IndexingResult {
    fn add_assign(&mut self, other: Self) {
        self.success_count += other.success_count;
        self.request_count += other.request_count;
    }
}

/// Contract implemented by each domain indexer
#[async_trait]
pub trait ResilientIndexer: Send + Sync {
    /// Which partitions of the recovery queue this indexer claims
    fn index_types(&self) -> HashSet<IndexType>;

    /// Attempt to reindex exactly the given items.
    ///
    /// On success for a document, the indexer deletes every queue row
    /// carrying that document id (duplicate enqueues are one unit of work)
    /// and counts one success. Items are never assumed idempotent-delivered:
    /// the same document id may appear several times within `items`.
    async fn index(
        &self,
        queue: &dyn QueueStore,
        items: &[RecoveryQueueItem],
    ) -> Result<IndexingResult>;

    /// Full rebuild, invoked once per type the schema lifecycle marked as
    /// fresh/uninitialized
    async fn index_on_startup(&self, uninitialized_types: &HashSet<IndexType>) -> Result<()>;
}
