//! Opaque search-backend client boundary
//!
//! The synchronization pipeline never talks a wire protocol itself; it only
//! requires the operations below. Production deployments implement
//! [`SearchClient`] against their backend of choice; [`InMemorySearchBackend`]
//! is a complete in-process implementation used by tests and embedded setups.

mod memory;
mod types;

pub use memory::InMemorySearchBackend;
pub use types::{
    AggregationResult, AggregationSpec, Bucket, BucketOrder, BulkRequestItem, BulkResponse, Hit,
    IndexSettings, MissingPlacement, Query, SearchRequest, SearchResponse, SortClause, SortOrder,
};

use crate::error::Result;
use crate::schema::{IndexType, TypeMapping};
use async_trait::async_trait;

/// Client-side contract for the search backend.
///
/// A client-side timeout or transport error must surface as an `Err`; the
/// recovery loop treats those as hard failures and retries on schedule.
#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Execute a batch of upserts/deletes. Per-item failures are reported in
    /// the response, not as an error.
    async fn bulk_execute(&self, items: Vec<BulkRequestItem>) -> Result<BulkResponse>;

    /// Current replica count of a named index
    async fn get_replica_count(&self, index: &str) -> Result<u32>;

    /// Set the replica count of a named index
    async fn set_replica_count(&self, index: &str, replicas: u32) -> Result<()>;

    /// Shard count of a named index
    async fn shard_count(&self, index: &str) -> Result<u32>;

    /// Create an index with the given settings
    async fn create_index(&self, index: &str, settings: &IndexSettings) -> Result<()>;

    /// Declare a type mapping on an existing index
    async fn put_mapping(&self, index_type: &IndexType, mapping: &TypeMapping) -> Result<()>;

    /// Drop an index and all its data
    async fn delete_index(&self, index: &str) -> Result<()>;

    /// Whether a named index exists
    async fn index_exists(&self, index: &str) -> Result<bool>;

    /// Names of all existing indices
    async fn list_indices(&self) -> Result<Vec<String>>;

    /// Make pending writes visible to searches
    async fn refresh(&self, index: &str) -> Result<()>;

    /// Execute a search, returning hits, aggregations and an optional scroll
    /// continuation token
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse>;

    /// Fetch the next page of an open scroll; an empty hit list ends it
    async fn scroll(&self, scroll_id: &str) -> Result<SearchResponse>;

    /// Count documents matching a query
    async fn count(&self, index_type: &IndexType, query: &Query) -> Result<u64>;
}
