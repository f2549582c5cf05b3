//! End-to-end recovery: queue rows drained into the search backend

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use search_sync::backend::{
    BulkRequestItem, IndexSettings, InMemorySearchBackend, Query, SearchClient,
};
use search_sync::error::Result;
use search_sync::queue::{
    uuids_for_document, InMemoryQueueStore, QueueStore, RecoveryQueueItem, SledQueueStore,
};
use search_sync::recovery::{
    IndexingResult, RecoveryConfig, RecoveryConfigBuilder, RecoveryIndexer, RecoveryScheduler,
    ResilientIndexer,
};
use search_sync::schema::IndexType;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn init_logs() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "search_sync=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

fn issue_type() -> IndexType {
    "issues/issue".parse().unwrap()
}

fn backdated(index_type: &IndexType, doc: &str) -> RecoveryQueueItem {
    RecoveryQueueItem::new(index_type, doc)
        .with_created_at(Utc::now() - ChronoDuration::minutes(10))
}

fn test_config() -> RecoveryConfig {
    RecoveryConfigBuilder::new()
        .initial_delay(Duration::from_millis(5))
        .delay(Duration::from_millis(5))
        .min_age(Duration::from_secs(300))
        .loop_limit(100)
        .build()
}

/// Writes each queued document into the backend, coalescing duplicate rows
struct IssueIndexer {
    backend: Arc<InMemorySearchBackend>,
}

#[async_trait]
impl ResilientIndexer for IssueIndexer {
    fn index_types(&self) -> HashSet<IndexType> {
        [issue_type()].into_iter().collect()
    }

    async fn index(
        &self,
        queue: &dyn QueueStore,
        items: &[RecoveryQueueItem],
    ) -> Result<IndexingResult> {
        let mut done: HashSet<String> = HashSet::new();
        let mut success = 0;
        for item in items {
            if !done.insert(item.document_id.clone()) {
                success += 1;
                continue;
            }
            let request = BulkRequestItem::Upsert {
                index_type: issue_type(),
                id: item.document_id.clone(),
                body: json!({"key": item.document_id}),
            };
            self.backend.bulk_execute(vec![request]).await?;
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

async fn backend_with_issues_index() -> Arc<InMemorySearchBackend> {
    let backend = Arc::new(InMemorySearchBackend::new());
    backend
        .create_index("issues", &IndexSettings::default())
        .await
        .unwrap();
    backend
}

#[tokio::test]
async fn test_recover_writes_documents_and_empties_queue() {
    init_logs();
    let backend = backend_with_issues_index().await;
    let queue = Arc::new(InMemoryQueueStore::new());
    let rows: Vec<RecoveryQueueItem> = (0..20)
        .map(|i| backdated(&issue_type(), &format!("doc-{}", i)))
        .collect();
    queue.insert(&rows).await.unwrap();

    let indexer = Arc::new(IssueIndexer {
        backend: backend.clone(),
    });
    let recovery = RecoveryIndexer::new(queue.clone(), vec![indexer], test_config());

    let stats = recovery.recover().await.unwrap();
    assert_eq!(stats.processed, 20);
    assert_eq!(stats.failed, 0);
    assert_eq!(queue.count().await.unwrap(), 0);
    assert_eq!(
        backend.count(&issue_type(), &Query::MatchAll).await.unwrap(),
        20
    );
}

#[tokio::test]
async fn test_duplicate_rows_removed_by_one_success() {
    let backend = backend_with_issues_index().await;
    let queue = Arc::new(InMemoryQueueStore::new());
    // three edits of the same document, one logical unit of work
    let rows = vec![
        backdated(&issue_type(), "doc-1"),
        backdated(&issue_type(), "doc-1"),
        backdated(&issue_type(), "doc-1"),
    ];
    queue.insert(&rows).await.unwrap();

    let indexer = Arc::new(IssueIndexer {
        backend: backend.clone(),
    });
    let recovery = RecoveryIndexer::new(queue.clone(), vec![indexer], test_config());
    recovery.recover().await.unwrap();

    assert_eq!(queue.count().await.unwrap(), 0);
    assert_eq!(
        backend.count(&issue_type(), &Query::MatchAll).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn test_sled_queue_survives_reopen_mid_recovery() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue");
    {
        let queue = SledQueueStore::new(&path).unwrap();
        queue
            .insert(&[backdated(&issue_type(), "doc-1")])
            .await
            .unwrap();
        queue.flush().await.unwrap();
    }

    let backend = backend_with_issues_index().await;
    let queue = Arc::new(SledQueueStore::new(&path).unwrap());
    assert_eq!(queue.count().await.unwrap(), 1);

    let indexer = Arc::new(IssueIndexer {
        backend: backend.clone(),
    });
    let recovery = RecoveryIndexer::new(queue.clone(), vec![indexer], test_config());
    let stats = recovery.recover().await.unwrap();
    assert_eq!(stats.processed, 1);
    assert_eq!(queue.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_scheduler_runs_until_stopped() {
    init_logs();
    let backend = backend_with_issues_index().await;
    let queue = Arc::new(InMemoryQueueStore::new());
    queue
        .insert(&[backdated(&issue_type(), "doc-1")])
        .await
        .unwrap();

    let indexer = Arc::new(IssueIndexer {
        backend: backend.clone(),
    });
    let recovery = Arc::new(RecoveryIndexer::new(
        queue.clone(),
        vec![indexer],
        test_config(),
    ));
    let mut scheduler = RecoveryScheduler::new(recovery);
    scheduler.start();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(queue.count().await.unwrap(), 0);

    // late rows are picked up by a later tick
    queue
        .insert(&[backdated(&issue_type(), "doc-2")])
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(queue.count().await.unwrap(), 0);

    scheduler.stop().await;
    assert!(!scheduler.is_running());
}
