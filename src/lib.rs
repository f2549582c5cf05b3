//! Search synchronization core
//!
//! Keeps a search backend eventually consistent with a transactional source
//! of record. Domain mutations enqueue durable recovery rows; a scheduled
//! reconciliation loop drains them through per-domain indexers with a
//! circuit breaker against systemic failure. The schema lifecycle hashes
//! index definitions and recreates indices whose definitions changed, and
//! the query side provides paging contexts, multi-field sort profiles and
//! sticky facets over the backend's aggregation results.
//!
//! The search backend itself stays behind the [`backend::SearchClient`]
//! trait; [`backend::InMemorySearchBackend`] is a complete in-process
//! implementation used by tests and embedded setups.

pub mod backend;
pub mod bulk;
pub mod config;
pub mod error;
pub mod query;
pub mod queue;
pub mod read;
pub mod recovery;
pub mod schema;

pub use config::Config;
pub use error::{AppError, Result};
