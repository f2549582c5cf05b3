//! Wire-shape types exchanged with the search backend client

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::schema::IndexType;

/// Boolean/term query tree sent to the backend.
///
/// This is deliberately the small subset the synchronization and query
/// helpers need; the backend's full query language stays behind the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Query {
    /// Matches every document
    MatchAll,

    /// Exact match on a single field value
    Term { field: String, value: String },

    /// Exact match on any of the given field values
    Terms { field: String, values: Vec<String> },

    /// Boolean combination
    Bool {
        must: Vec<Query>,
        must_not: Vec<Query>,
    },
}

impl Query {
    pub fn term(field: impl Into<String>, value: impl Into<String>) -> Self {
        Query::Term {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn terms(field: impl Into<String>, values: Vec<String>) -> Self {
        Query::Terms {
            field: field.into(),
            values,
        }
    }

    /// Conjunction of the given clauses, flattened to the simplest form
    pub fn all_of(clauses: Vec<Query>) -> Self {
        let mut clauses: Vec<Query> = clauses
            .into_iter()
            .filter(|q| !matches!(q, Query::MatchAll))
            .collect();
        match clauses.len() {
            0 => Query::MatchAll,
            1 => clauses.remove(0),
            _ => Query::Bool {
                must: clauses,
                must_not: Vec::new(),
            },
        }
    }
}

/// How terms buckets are ordered
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BucketOrder {
    /// Descending document count (the default for facets)
    CountDesc,
    /// Ascending key
    KeyAsc,
}

/// Aggregation request tree
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum AggregationSpec {
    /// Scope sub-aggregations to documents matching `filter`
    Filter {
        name: String,
        filter: Query,
        aggs: Vec<AggregationSpec>,
    },

    /// Top-N value counts for a field
    Terms {
        name: String,
        field: String,
        size: usize,
        order: BucketOrder,
        /// When set, only these exact values are bucketed, and every one of
        /// them appears in the result even with a zero count.
        include: Option<Vec<String>>,
        aggs: Vec<AggregationSpec>,
    },
}

impl AggregationSpec {
    pub fn name(&self) -> &str {
        match self {
            AggregationSpec::Filter { name, .. } => name,
            AggregationSpec::Terms { name, .. } => name,
        }
    }
}

/// One bucket of an aggregation result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bucket {
    pub key: String,
    pub doc_count: u64,
    pub aggregations: Vec<AggregationResult>,
}

/// Aggregation result tree, mirroring the request shape
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregationResult {
    pub name: String,
    /// Filter aggregations produce a single unnamed bucket; terms
    /// aggregations produce one bucket per value.
    pub buckets: Vec<Bucket>,
}

/// Direction of a sort clause
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Placement of documents missing the sort field
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MissingPlacement {
    First,
    Last,
}

/// A fully resolved physical sort clause
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SortClause {
    pub field: String,
    pub order: SortOrder,
    pub missing: MissingPlacement,
}

/// A search request executed against one index type
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub index_type: IndexType,
    pub query: Query,
    pub sorts: Vec<SortClause>,
    pub aggregations: Vec<AggregationSpec>,
    pub offset: usize,
    pub limit: usize,
    /// Which source fields to return; empty means all
    pub fields: Vec<String>,
    /// Open a scroll continuation instead of plain paging
    pub scroll: bool,
}

impl SearchRequest {
    pub fn new(index_type: IndexType, query: Query) -> Self {
        Self {
            index_type,
            query,
            sorts: Vec::new(),
            aggregations: Vec::new(),
            offset: 0,
            limit: 10,
            fields: Vec::new(),
            scroll: false,
        }
    }
}

/// One document hit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hit {
    pub id: String,
    pub source: Value,
}

/// Response to a search or scroll request
#[derive(Debug, Clone, Default)]
pub struct SearchResponse {
    pub hits: Vec<Hit>,
    pub total: u64,
    pub aggregations: Vec<AggregationResult>,
    pub scroll_id: Option<String>,
}

/// A single buffered write for the bulk API
#[derive(Debug, Clone)]
pub enum BulkRequestItem {
    Upsert {
        index_type: IndexType,
        id: String,
        body: Value,
    },
    Delete {
        index_type: IndexType,
        id: String,
    },
}

impl BulkRequestItem {
    pub fn document_id(&self) -> &str {
        match self {
            BulkRequestItem::Upsert { id, .. } => id,
            BulkRequestItem::Delete { id, .. } => id,
        }
    }

    /// Approximate wire size, used for flush-threshold accounting
    pub fn estimated_size_bytes(&self) -> usize {
        match self {
            BulkRequestItem::Upsert { id, body, .. } => {
                id.len() + body.to_string().len() + 64
            }
            BulkRequestItem::Delete { id, .. } => id.len() + 64,
        }
    }
}

/// Per-item outcome of a bulk execution
#[derive(Debug, Clone)]
pub struct BulkResponse {
    pub succeeded: u64,
    pub failed: u64,
    /// Document ids that failed, for logging
    pub failures: Vec<String>,
}

/// Index creation settings handed to the backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexSettings {
    pub shards: u32,
    pub replicas: u32,
    pub extra: BTreeMap<String, String>,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            shards: 1,
            replicas: 0,
            extra: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_of_flattens() {
        assert_eq!(Query::all_of(vec![]), Query::MatchAll);
        assert_eq!(
            Query::all_of(vec![Query::MatchAll, Query::term("a", "b")]),
            Query::term("a", "b")
        );
        let q = Query::all_of(vec![Query::term("a", "b"), Query::term("c", "d")]);
        match q {
            Query::Bool { must, must_not } => {
                assert_eq!(must.len(), 2);
                assert!(must_not.is_empty());
            }
            other => panic!("expected bool query, got {:?}", other),
        }
    }

    #[test]
    fn test_bulk_item_size_estimate_counts_body() {
        let small = BulkRequestItem::Delete {
            index_type: "issues/issue".parse().unwrap(),
            id: "x".to_string(),
        };
        let large = BulkRequestItem::Upsert {
            index_type: "issues/issue".parse().unwrap(),
            id: "x".to_string(),
            body: serde_json::json!({"field": "v".repeat(1000)}),
        };
        assert!(large.estimated_size_bytes() > small.estimated_size_bytes() + 900);
    }
}
