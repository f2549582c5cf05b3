//! Recovery loop: at-least-once reconciliation of the search backend
//!
//! Domain writes enqueue recovery rows in the same transaction as the
//! mutation; a best-effort synchronous indexing attempt removes them
//! immediately on success. Whatever remains is drained here on a fixed
//! schedule, with a per-run circuit breaker against systemic failure.

mod config;
mod core;
mod indexer;
mod scheduler;

pub use config::{RecoveryConfig, RecoveryConfigBuilder};
pub use core::{RecoveryIndexer, RecoveryStats};
pub use indexer::{IndexingResult, ResilientIndexer};
pub use scheduler::RecoveryScheduler;
