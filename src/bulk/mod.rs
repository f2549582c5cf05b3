//! Adaptive bulk writer
//!
//! Buffers write requests and sends them in size-bounded batches. Two tiers:
//! `Regular` for ordinary incremental updates (sequential sends, replication
//! untouched) and `Large` for backfills and startup rebuilds, which turns
//! replication off for the duration of the load and computes write
//! concurrency from the host's core count and the index's shard count.

use crate::backend::{BulkRequestItem, BulkResponse, SearchClient};
use crate::error::{AppError, Result};
use crate::schema::IndexType;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Default flush threshold, in bytes of estimated request size
pub const DEFAULT_FLUSH_BYTE_SIZE: usize = 5 * 1024 * 1024;

/// Sizing tier of a bulk load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Size {
    /// Incremental updates: sequential sends, replication untouched
    Regular,
    /// Backfill: replication disabled for the duration, concurrent sends
    Large,
}

/// Number of bulk requests allowed in flight beyond the sequential default.
///
/// Deterministic in cores and shards: a 96-core host writing a 5-shard index
/// gets 18; a 4-core host gets 0.
pub fn concurrent_requests(cores: usize, shards: u32) -> usize {
    let shards = shards.max(1) as usize;
    (cores / shards).max(1) - 1
}

/// Counters of one bulk session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkStats {
    pub succeeded: u64,
    pub failed: u64,
    pub flushes: u64,
}

/// Batching writer for one index type
pub struct BulkIndexer {
    client: Arc<dyn SearchClient>,
    index_type: IndexType,
    size: Size,
    flush_byte_size: usize,
    refresh_on_stop: bool,
    /// Injectable for tests; None resolves the host's parallelism
    cores_override: Option<usize>,

    started: bool,
    buffer: Vec<BulkRequestItem>,
    buffered_bytes: usize,
    concurrency: usize,
    semaphore: Option<Arc<Semaphore>>,
    in_flight: JoinSet<Result<BulkResponse>>,
    saved_replicas: Option<u32>,
    stats: BulkStats,
}

impl BulkIndexer {
    pub fn new(client: Arc<dyn SearchClient>, index_type: IndexType, size: Size) -> Self {
        Self {
            client,
            index_type,
            size,
            flush_byte_size: DEFAULT_FLUSH_BYTE_SIZE,
            refresh_on_stop: true,
            cores_override: None,
            started: false,
            buffer: Vec::new(),
            buffered_bytes: 0,
            concurrency: 0,
            semaphore: None,
            in_flight: JoinSet::new(),
            saved_replicas: None,
            stats: BulkStats::default(),
        }
    }

    pub fn set_flush_byte_size(&mut self, bytes: usize) {
        self.flush_byte_size = bytes;
    }

    pub fn set_refresh(&mut self, refresh: bool) {
        self.refresh_on_stop = refresh;
    }

    /// Pin the core count instead of detecting it (tests)
    pub fn set_cores(&mut self, cores: usize) {
        self.cores_override = Some(cores);
    }

    fn cores(&self) -> usize {
        self.cores_override.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    /// Prepare the session. For `Large`, records the current replica count,
    /// disables replication, and sizes the in-flight window.
    pub async fn start(&mut self) -> Result<()> {
        if self.started {
            return Err(AppError::Internal("Bulk indexer already started".to_string()));
        }
        match self.size {
            Size::Regular => {
                self.concurrency = 0;
            }
            Size::Large => {
                let index = self.index_type.index();
                let replicas = self.client.get_replica_count(index).await?;
                self.saved_replicas = Some(replicas);
                self.client.set_replica_count(index, 0).await?;
                let shards = self.client.shard_count(index).await?;
                self.concurrency = concurrent_requests(self.cores(), shards);
                info!(
                    index = index,
                    saved_replicas = replicas,
                    concurrency = self.concurrency,
                    "Large bulk load started, replication disabled"
                );
            }
        }
        if self.concurrency > 0 {
            self.semaphore = Some(Arc::new(Semaphore::new(self.concurrency)));
        }
        self.started = true;
        Ok(())
    }

    /// Buffer one request, flushing when the byte threshold is crossed
    pub async fn add(&mut self, item: BulkRequestItem) -> Result<()> {
        if !self.started {
            return Err(AppError::Internal("Bulk indexer not started".to_string()));
        }
        self.buffered_bytes += item.estimated_size_bytes();
        self.buffer.push(item);
        if self.buffered_bytes >= self.flush_byte_size {
            self.flush().await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.buffer);
        self.buffered_bytes = 0;
        self.stats.flushes += 1;
        debug!(count = batch.len(), "Flushing bulk batch");

        match &self.semaphore {
            None => {
                let response = self.client.bulk_execute(batch).await?;
                self.record(&response);
            }
            Some(semaphore) => {
                let permit = semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|e| AppError::Internal(e.to_string()))?;
                let client = self.client.clone();
                self.in_flight.spawn(async move {
                    let response = client.bulk_execute(batch).await;
                    drop(permit);
                    response
                });
            }
        }
        Ok(())
    }

    fn record(&mut self, response: &BulkResponse) {
        self.stats.succeeded += response.succeeded;
        self.stats.failed += response.failed;
        if response.failed > 0 {
            warn!(
                failed = response.failed,
                failures = ?response.failures,
                "Bulk batch had failed items"
            );
        }
    }

    /// Flush the remainder, wait for all in-flight sends, restore replication
    /// (Large) and refresh the index. Always safe to call once.
    pub async fn stop(&mut self) -> Result<BulkStats> {
        if !self.started {
            return Err(AppError::Internal("Bulk indexer not started".to_string()));
        }
        self.flush().await?;
        while let Some(joined) = self.in_flight.join_next().await {
            let response = joined.map_err(|e| AppError::Internal(e.to_string()))??;
            self.record(&response);
        }

        if let Some(replicas) = self.saved_replicas.take() {
            self.client
                .set_replica_count(self.index_type.index(), replicas)
                .await?;
            info!(
                index = self.index_type.index(),
                replicas = replicas,
                "Replication restored after bulk load"
            );
        }
        if self.refresh_on_stop {
            self.client.refresh(self.index_type.index()).await?;
        }
        self.started = false;

        info!(
            succeeded = self.stats.succeeded,
            failed = self.stats.failed,
            flushes = self.stats.flushes,
            "Bulk session finished"
        );
        Ok(self.stats)
    }
}
