//! Scheduled driver of the recovery loop
//!
//! A single background task sleeps, runs one `recover()` pass to completion,
//! then sleeps again. Runs can never overlap because the same task awaits
//! each pass; `stop()` lets an in-flight pass finish its current batch
//! instead of interrupting it mid-way.

use crate::recovery::core::RecoveryIndexer;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Owns the recovery timer task
pub struct RecoveryScheduler {
    indexer: Arc<RecoveryIndexer>,
    shutdown_tx: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl RecoveryScheduler {
    pub fn new(indexer: Arc<RecoveryIndexer>) -> Self {
        Self {
            indexer,
            shutdown_tx: None,
            handle: None,
        }
    }

    /// Start the background task. Idempotent: a second call while running is
    /// a no-op.
    pub fn start(&mut self) {
        let config = self.indexer.config().clone();
        if !config.enabled {
            info!("Recovery scheduler is disabled in configuration");
            return;
        }
        if self.handle.is_some() {
            warn!("Recovery scheduler is already running");
            return;
        }

        info!(
            initial_delay_ms = config.initial_delay.as_millis() as u64,
            delay_ms = config.delay.as_millis() as u64,
            "Starting recovery scheduler"
        );

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let indexer = self.indexer.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(config.initial_delay) => {}
                _ = shutdown_rx.changed() => return,
            }
            loop {
                debug!("Recovery run starting");
                match indexer.recover().await {
                    Ok(stats) => {
                        debug!(
                            processed = stats.processed,
                            failed = stats.failed,
                            "Recovery run finished"
                        );
                    }
                    Err(e) => {
                        error!(error = %e, "Recovery run failed");
                    }
                }
                tokio::select! {
                    _ = tokio::time::sleep(config.delay) => {}
                    _ = shutdown_rx.changed() => return,
                }
            }
        });

        self.shutdown_tx = Some(shutdown_tx);
        self.handle = Some(handle);
    }

    /// Signal shutdown and wait for the task. An in-progress pass completes
    /// before the task exits.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "Recovery scheduler task panicked");
            }
        }
        info!("Recovery scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }
}

impl Drop for RecoveryScheduler {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
    }
}
