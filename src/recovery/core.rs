//! The recovery reconciliation pass
//!
//! One `recover()` call drains every eligible queue row through the indexers
//! registered for each index type, with a per-type failure-ratio circuit
//! breaker bounding the damage a systematically failing backend or a single
//! poisoned document can do within one run.

use crate::error::Result;
use crate::queue::{QueueStore, RecoveryQueueItem};
use crate::recovery::config::RecoveryConfig;
use crate::recovery::indexer::{IndexingResult, ResilientIndexer};
use crate::schema::{IndexType, MetadataStore};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{error, info};

/// Abort further batches for a type once this share of its documents failed
/// within the current run. Tunable constant, deliberately not configuration.
const FAILURE_RATIO_THRESHOLD: f64 = 0.3;

/// Totals of one recovery run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryStats {
    pub processed: u64,
    pub failed: u64,
}

/// Drains the recovery queue through registered indexers.
///
/// The registry is built once at construction and never mutated afterwards.
pub struct RecoveryIndexer {
    queue: Arc<dyn QueueStore>,
    indexers: HashMap<IndexType, Arc<dyn ResilientIndexer>>,
    config: RecoveryConfig,
}

impl RecoveryIndexer {
    pub fn new(
        queue: Arc<dyn QueueStore>,
        indexers: Vec<Arc<dyn ResilientIndexer>>,
        config: RecoveryConfig,
    ) -> Self {
        let mut registry: HashMap<IndexType, Arc<dyn ResilientIndexer>> = HashMap::new();
        for indexer in indexers {
            for index_type in indexer.index_types() {
                registry.insert(index_type, indexer.clone());
            }
        }
        Self {
            queue,
            indexers: registry,
            config,
        }
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    /// Invoke the startup rebuild on every indexer that claims one of the
    /// uninitialized types, and record each completed type so the next
    /// startup does not rebuild it again.
    pub async fn index_uninitialized_types(
        &self,
        uninitialized_types: &HashSet<IndexType>,
        metadata: &dyn MetadataStore,
    ) -> Result<()> {
        if uninitialized_types.is_empty() {
            return Ok(());
        }
        let mut seen: Vec<Arc<dyn ResilientIndexer>> = Vec::new();
        for index_type in uninitialized_types {
            if let Some(indexer) = self.indexers.get(index_type) {
                if !seen.iter().any(|s| Arc::ptr_eq(s, indexer)) {
                    seen.push(indexer.clone());
                    let claimed: HashSet<IndexType> = indexer
                        .index_types()
                        .intersection(uninitialized_types)
                        .cloned()
                        .collect();
                    info!(types = ?claimed.iter().map(|t| t.key()).collect::<Vec<_>>(),
                        "Startup indexing of uninitialized types");
                    indexer.index_on_startup(&claimed).await?;
                    for claimed_type in &claimed {
                        metadata.set_initialized(claimed_type, true).await?;
                    }
                }
            } else {
                error!(index_type = %index_type.key(), "No indexer registered for uninitialized type");
            }
        }
        Ok(())
    }

    /// One reconciliation pass over the queue.
    pub async fn recover(&self) -> Result<RecoveryStats> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.config.min_age)
                .unwrap_or_else(|_| chrono::Duration::zero());
        let eligible = self.queue.select_older_than(cutoff).await?;
        if eligible.is_empty() {
            return Ok(RecoveryStats::default());
        }

        info!(count = eligible.len(), "Recovering from queue");

        let mut by_type: HashMap<String, Vec<RecoveryQueueItem>> = HashMap::new();
        for item in eligible {
            by_type.entry(item.index_type_key.clone()).or_default().push(item);
        }

        let mut stats = RecoveryStats::default();
        for (type_key, items) in by_type {
            let index_type: IndexType = match type_key.parse() {
                Ok(it) => it,
                Err(_) => {
                    error!(
                        count = items.len(),
                        index_type = %type_key,
                        "Ignore {} items in queue with malformed type [{}]",
                        items.len(),
                        type_key
                    );
                    continue;
                }
            };
            let indexer = match self.indexers.get(&index_type) {
                Some(indexer) => indexer,
                None => {
                    error!(
                        count = items.len(),
                        index_type = %type_key,
                        "Ignore {} items in queue with unsupported type [{}]",
                        items.len(),
                        type_key
                    );
                    continue;
                }
            };

            let type_stats = self.recover_type(&index_type, indexer.as_ref(), items).await;
            stats.processed += type_stats.processed;
            stats.failed += type_stats.failed;
        }

        info!(
            processed = stats.processed,
            failed = stats.failed,
            "Recovery run completed"
        );
        Ok(stats)
    }

    /// Drain one type's rows in loop-limit batches until done or the circuit
    /// breaker trips. Hard failures from the indexer are caught here; the
    /// scheduler never sees them.
    async fn recover_type(
        &self,
        index_type: &IndexType,
        indexer: &dyn ResilientIndexer,
        items: Vec<RecoveryQueueItem>,
    ) -> RecoveryStats {
        let mut total = IndexingResult::default();
        for batch in items.chunks(self.config.loop_limit.max(1)) {
            match indexer.index(self.queue.as_ref(), batch).await {
                Ok(result) => {
                    total += result;
                }
                Err(e) => {
                    error!(
                        index_type = %index_type.key(),
                        error = %e,
                        "Indexing failed hard, rows stay queued"
                    );
                    total += IndexingResult::new(0, batch.len() as u64);
                }
            }
            if total.failure_ratio() > FAILURE_RATIO_THRESHOLD {
                error!(
                    index_type = %index_type.key(),
                    "Too many failures [{}/{} documents], waiting for next run",
                    total.failure_count(),
                    total.request_count
                );
                break;
            }
        }
        RecoveryStats {
            processed: total.success_count,
            failed: total.failure_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{uuids_for_document, InMemoryQueueStore};
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn issue_type() -> IndexType {
        "issues/issue".parse().unwrap()
    }

    /// Succeeds on the first `succeed_per_batch` items of each batch
    struct PartialIndexer {
        succeed_per_batch: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ResilientIndexer for PartialIndexer {
        fn index_types(&self) -> HashSet<IndexType> {
            [issue_type()].into_iter().collect()
        }

        async fn index(
            &self,
            queue: &dyn QueueStore,
            items: &[RecoveryQueueItem],
        ) -> Result<IndexingResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut success = 0;
            for item in items.iter().take(self.succeed_per_batch) {
                let uuids = uuids_for_document(items, &item.document_id);
                queue.delete_by_uuids(&uuids).await?;
                success += 1;
            }
            Ok(IndexingResult::new(success, items.len() as u64))
        }

        async fn index_on_startup(&self, _types: &HashSet<IndexType>) -> Result<()> {
            Ok(())
        }
    }

    fn backdated(doc: &str) -> RecoveryQueueItem {
        RecoveryQueueItem::new(&issue_type(), doc)
            .with_created_at(Utc::now() - ChronoDuration::minutes(10))
    }

    fn config(loop_limit: usize) -> RecoveryConfig {
        crate::recovery::RecoveryConfigBuilder::new()
            .min_age(Duration::from_secs(300))
            .loop_limit(loop_limit)
            .build()
    }

    #[tokio::test]
    async fn test_circuit_breaker_stops_after_first_bad_batch() {
        let queue = Arc::new(InMemoryQueueStore::new());
        let rows: Vec<RecoveryQueueItem> =
            (0..10).map(|i| backdated(&format!("doc-{}", i))).collect();
        queue.insert(&rows).await.unwrap();

        let indexer = Arc::new(PartialIndexer {
            succeed_per_batch: 1,
            calls: AtomicUsize::new(0),
        });
        let recovery = RecoveryIndexer::new(queue.clone(), vec![indexer.clone()], config(3));

        let stats = recovery.recover().await.unwrap();
        // first batch of 3: 1 success, ratio 2/3 > 0.3, stop
        assert_eq!(indexer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.failed, 2);
        assert_eq!(queue.count().await.unwrap(), 9);
    }

    #[tokio::test]
    async fn test_exactly_threshold_ratio_does_not_trip_breaker() {
        let queue = Arc::new(InMemoryQueueStore::new());
        let rows: Vec<RecoveryQueueItem> =
            (0..20).map(|i| backdated(&format!("doc-{}", i))).collect();
        queue.insert(&rows).await.unwrap();

        // 3 of 10 fail per batch: ratio is exactly 0.3, which must not abort
        let indexer = Arc::new(PartialIndexer {
            succeed_per_batch: 7,
            calls: AtomicUsize::new(0),
        });
        let recovery = RecoveryIndexer::new(queue.clone(), vec![indexer.clone()], config(10));

        let stats = recovery.recover().await.unwrap();
        assert_eq!(indexer.calls.load(Ordering::SeqCst), 2);
        assert_eq!(stats.processed, 14);
        assert_eq!(stats.failed, 6);
    }

    #[tokio::test]
    async fn test_unsupported_type_rows_stay_queued() {
        let queue = Arc::new(InMemoryQueueStore::new());
        let orphan_type: IndexType = "views/view".parse().unwrap();
        let row = RecoveryQueueItem::new(&orphan_type, "doc-1")
            .with_created_at(Utc::now() - ChronoDuration::minutes(10));
        queue.insert(&[row]).await.unwrap();

        let recovery = RecoveryIndexer::new(queue.clone(), vec![], config(10));
        let stats = recovery.recover().await.unwrap();
        assert_eq!(stats, RecoveryStats::default());
        assert_eq!(queue.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_young_rows_are_not_selected() {
        let queue = Arc::new(InMemoryQueueStore::new());
        queue
            .insert(&[RecoveryQueueItem::new(&issue_type(), "fresh")])
            .await
            .unwrap();

        let indexer = Arc::new(PartialIndexer {
            succeed_per_batch: usize::MAX,
            calls: AtomicUsize::new(0),
        });
        let recovery = RecoveryIndexer::new(queue.clone(), vec![indexer.clone()], config(10));
        recovery.recover().await.unwrap();
        assert_eq!(indexer.calls.load(Ordering::SeqCst), 0);
        assert_eq!(queue.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_recover_twice_converges() {
        let queue = Arc::new(InMemoryQueueStore::new());
        let rows: Vec<RecoveryQueueItem> =
            (0..5).map(|i| backdated(&format!("doc-{}", i))).collect();
        queue.insert(&rows).await.unwrap();

        let indexer = Arc::new(PartialIndexer {
            succeed_per_batch: usize::MAX,
            calls: AtomicUsize::new(0),
        });
        let recovery = RecoveryIndexer::new(queue.clone(), vec![indexer.clone()], config(10));

        let first = recovery.recover().await.unwrap();
        assert_eq!(first.processed, 5);
        assert_eq!(queue.count().await.unwrap(), 0);

        let second = recovery.recover().await.unwrap();
        assert_eq!(second, RecoveryStats::default());
        // second run selected nothing, so the indexer was not called again
        assert_eq!(indexer.calls.load(Ordering::SeqCst), 1);
    }

    /// Indexer that always returns an error
    struct BrokenIndexer;

    #[async_trait]
    impl ResilientIndexer for BrokenIndexer {
        fn index_types(&self) -> HashSet<IndexType> {
            [issue_type()].into_iter().collect()
        }

        async fn index(
            &self,
            _queue: &dyn QueueStore,
            _items: &[RecoveryQueueItem],
        ) -> Result<IndexingResult> {
            Err(crate::error::AppError::Backend("connection reset".to_string()))
        }

        async fn index_on_startup(&self, _types: &HashSet<IndexType>) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_hard_failure_is_caught_and_rows_stay() {
        let queue = Arc::new(InMemoryQueueStore::new());
        queue.insert(&[backdated("doc-1")]).await.unwrap();

        let recovery =
            RecoveryIndexer::new(queue.clone(), vec![Arc::new(BrokenIndexer)], config(10));
        let stats = recovery.recover().await.unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(queue.count().await.unwrap(), 1);
    }
}
