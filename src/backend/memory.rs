//! In-process search backend
//!
//! A complete [`SearchClient`] implementation over in-memory state. It backs
//! the integration tests and small embedded deployments; the query and
//! aggregation evaluators cover exactly the subset the pipeline emits.
//!
//! Aggregations are evaluated over the whole index type (global scope); the
//! sticky-facet builder embeds the caller's query into each facet filter, so
//! no per-request aggregation scope is needed.

use crate::backend::types::{
    AggregationResult, AggregationSpec, Bucket, BucketOrder, BulkRequestItem, BulkResponse, Hit,
    IndexSettings, MissingPlacement, Query, SearchRequest, SearchResponse, SortClause, SortOrder,
};
use crate::backend::SearchClient;
use crate::error::{AppError, Result};
use crate::schema::{IndexType, TypeMapping};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

#[derive(Default)]
struct IndexState {
    settings: IndexSettings,
    mappings: HashMap<String, TypeMapping>,
    /// type name -> document id -> source
    docs: HashMap<String, BTreeMap<String, Value>>,
}

struct ScrollState {
    remaining: Vec<Hit>,
    page_size: usize,
}

/// In-memory search backend
#[derive(Default)]
pub struct InMemorySearchBackend {
    indices: DashMap<String, IndexState>,
    scrolls: DashMap<String, Mutex<ScrollState>>,
}

impl InMemorySearchBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of documents held for an index type
    pub fn doc_count(&self, index_type: &IndexType) -> usize {
        self.indices
            .get(index_type.index())
            .and_then(|s| s.docs.get(index_type.type_name()).map(|d| d.len()))
            .unwrap_or(0)
    }

    /// Fetch one document source, for assertions
    pub fn get_doc(&self, index_type: &IndexType, id: &str) -> Option<Value> {
        self.indices
            .get(index_type.index())
            .and_then(|s| s.docs.get(index_type.type_name()).and_then(|d| d.get(id).cloned()))
    }

    fn matching_hits(&self, index_type: &IndexType, query: &Query) -> Vec<Hit> {
        self.indices
            .get(index_type.index())
            .and_then(|state| {
                state.docs.get(index_type.type_name()).map(|docs| {
                    docs.iter()
                        .filter(|(_, source)| matches(query, source))
                        .map(|(id, source)| Hit {
                            id: id.clone(),
                            source: source.clone(),
                        })
                        .collect()
                })
            })
            .unwrap_or_default()
    }

    fn all_docs(&self, index_type: &IndexType) -> Vec<Value> {
        self.indices
            .get(index_type.index())
            .and_then(|state| {
                state
                    .docs
                    .get(index_type.type_name())
                    .map(|docs| docs.values().cloned().collect())
            })
            .unwrap_or_default()
    }
}

/// Field values of a document, normalized to strings; arrays flatten
fn field_values(source: &Value, field: &str) -> Vec<String> {
    match source.get(field) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().filter_map(scalar_to_string).collect(),
        Some(v) => scalar_to_string(v).into_iter().collect(),
    }
}

fn scalar_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn matches(query: &Query, source: &Value) -> bool {
    match query {
        Query::MatchAll => true,
        Query::Term { field, value } => field_values(source, field).contains(value),
        Query::Terms { field, values } => {
            let present = field_values(source, field);
            values.iter().any(|v| present.contains(v))
        }
        Query::Bool { must, must_not } => {
            must.iter().all(|q| matches(q, source))
                && !must_not.iter().any(|q| matches(q, source))
        }
    }
}

fn evaluate_aggregation(spec: &AggregationSpec, docs: &[Value]) -> AggregationResult {
    match spec {
        AggregationSpec::Filter { name, filter, aggs } => {
            let scoped: Vec<Value> = docs.iter().filter(|d| matches(filter, d)).cloned().collect();
            let sub = aggs.iter().map(|a| evaluate_aggregation(a, &scoped)).collect();
            AggregationResult {
                name: name.clone(),
                buckets: vec![Bucket {
                    key: String::new(),
                    doc_count: scoped.len() as u64,
                    aggregations: sub,
                }],
            }
        }
        AggregationSpec::Terms {
            name,
            field,
            size,
            order,
            include,
            aggs,
        } => {
            let mut counts: BTreeMap<String, u64> = BTreeMap::new();
            if let Some(included) = include {
                // forced buckets report zero counts when absent
                for value in included {
                    counts.insert(value.clone(), 0);
                }
            }
            for doc in docs {
                for value in field_values(doc, field) {
                    if include.as_ref().map_or(true, |inc| inc.contains(&value)) {
                        *counts.entry(value).or_insert(0) += 1;
                    }
                }
            }
            let mut entries: Vec<(String, u64)> = counts.into_iter().collect();
            match order {
                BucketOrder::CountDesc => {
                    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)))
                }
                BucketOrder::KeyAsc => entries.sort_by(|a, b| a.0.cmp(&b.0)),
            }
            if include.is_none() {
                entries.truncate(*size);
            }
            let buckets = entries
                .into_iter()
                .map(|(key, doc_count)| {
                    let scoped: Vec<Value> = docs
                        .iter()
                        .filter(|d| field_values(d, field).contains(&key))
                        .cloned()
                        .collect();
                    Bucket {
                        key,
                        doc_count,
                        aggregations: aggs.iter().map(|a| evaluate_aggregation(a, &scoped)).collect(),
                    }
                })
                .collect();
            AggregationResult {
                name: name.clone(),
                buckets,
            }
        }
    }
}

fn compare_hits(a: &Hit, b: &Hit, sorts: &[SortClause]) -> Ordering {
    for clause in sorts {
        let va = field_values(&a.source, &clause.field).into_iter().next();
        let vb = field_values(&b.source, &clause.field).into_iter().next();
        let ord = match (va, vb) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => match clause.missing {
                MissingPlacement::First => Ordering::Less,
                MissingPlacement::Last => Ordering::Greater,
            },
            (Some(_), None) => match clause.missing {
                MissingPlacement::First => Ordering::Greater,
                MissingPlacement::Last => Ordering::Less,
            },
            (Some(x), Some(y)) => {
                let base = compare_values(&x, &y);
                match clause.order {
                    SortOrder::Ascending => base,
                    SortOrder::Descending => base.reverse(),
                }
            }
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.id.cmp(&b.id)
}

fn compare_values(a: &str, b: &str) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.cmp(b),
    }
}

#[async_trait]
impl SearchClient for InMemorySearchBackend {
    async fn bulk_execute(&self, items: Vec<BulkRequestItem>) -> Result<BulkResponse> {
        let mut succeeded = 0;
        for item in items {
            match item {
                BulkRequestItem::Upsert { index_type, id, body } => {
                    let mut state = self.indices.entry(index_type.index().to_string()).or_default();
                    state
                        .docs
                        .entry(index_type.type_name().to_string())
                        .or_default()
                        .insert(id, body);
                    succeeded += 1;
                }
                BulkRequestItem::Delete { index_type, id } => {
                    if let Some(mut state) = self.indices.get_mut(index_type.index()) {
                        if let Some(docs) = state.docs.get_mut(index_type.type_name()) {
                            docs.remove(&id);
                        }
                    }
                    succeeded += 1;
                }
            }
        }
        Ok(BulkResponse {
            succeeded,
            failed: 0,
            failures: Vec::new(),
        })
    }

    async fn get_replica_count(&self, index: &str) -> Result<u32> {
        self.indices
            .get(index)
            .map(|s| s.settings.replicas)
            .ok_or_else(|| AppError::NotFound(format!("Index {} not found", index)))
    }

    async fn set_replica_count(&self, index: &str, replicas: u32) -> Result<()> {
        let mut state = self
            .indices
            .get_mut(index)
            .ok_or_else(|| AppError::NotFound(format!("Index {} not found", index)))?;
        state.settings.replicas = replicas;
        Ok(())
    }

    async fn shard_count(&self, index: &str) -> Result<u32> {
        self.indices
            .get(index)
            .map(|s| s.settings.shards)
            .ok_or_else(|| AppError::NotFound(format!("Index {} not found", index)))
    }

    async fn create_index(&self, index: &str, settings: &IndexSettings) -> Result<()> {
        self.indices.insert(
            index.to_string(),
            IndexState {
                settings: settings.clone(),
                ..Default::default()
            },
        );
        Ok(())
    }

    async fn put_mapping(&self, index_type: &IndexType, mapping: &TypeMapping) -> Result<()> {
        let mut state = self
            .indices
            .get_mut(index_type.index())
            .ok_or_else(|| AppError::NotFound(format!("Index {} not found", index_type.index())))?;
        state
            .mappings
            .insert(index_type.type_name().to_string(), mapping.clone());
        state.docs.entry(index_type.type_name().to_string()).or_default();
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<()> {
        self.indices
            .remove(index)
            .ok_or_else(|| AppError::NotFound(format!("Index {} not found", index)))?;
        Ok(())
    }

    async fn index_exists(&self, index: &str) -> Result<bool> {
        Ok(self.indices.contains_key(index))
    }

    async fn list_indices(&self) -> Result<Vec<String>> {
        Ok(self.indices.iter().map(|e| e.key().clone()).collect())
    }

    async fn refresh(&self, _index: &str) -> Result<()> {
        // writes are immediately visible in this implementation
        Ok(())
    }

    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let mut hits = self.matching_hits(&request.index_type, &request.query);
        hits.sort_by(|a, b| compare_hits(a, b, &request.sorts));
        let total = hits.len() as u64;

        let aggregations = if request.aggregations.is_empty() {
            Vec::new()
        } else {
            let docs = self.all_docs(&request.index_type);
            request
                .aggregations
                .iter()
                .map(|spec| evaluate_aggregation(spec, &docs))
                .collect()
        };

        if request.scroll {
            let page_size = if request.limit > 0 { request.limit } else { 10 };
            let first: Vec<Hit> = hits.iter().take(page_size).cloned().collect();
            let remaining: Vec<Hit> = hits.into_iter().skip(page_size).collect();
            let scroll_id = Uuid::new_v4().to_string();
            self.scrolls.insert(
                scroll_id.clone(),
                Mutex::new(ScrollState { remaining, page_size }),
            );
            return Ok(SearchResponse {
                hits: first,
                total,
                aggregations,
                scroll_id: Some(scroll_id),
            });
        }

        let page: Vec<Hit> = if request.fields.is_empty() {
            hits.into_iter().skip(request.offset).take(request.limit).collect()
        } else {
            hits.into_iter()
                .skip(request.offset)
                .take(request.limit)
                .map(|hit| Hit {
                    id: hit.id,
                    source: project_fields(&hit.source, &request.fields),
                })
                .collect()
        };

        Ok(SearchResponse {
            hits: page,
            total,
            aggregations,
            scroll_id: None,
        })
    }

    async fn scroll(&self, scroll_id: &str) -> Result<SearchResponse> {
        let page = {
            let state = self
                .scrolls
                .get(scroll_id)
                .ok_or_else(|| AppError::NotFound(format!("Scroll {} not found", scroll_id)))?;
            let mut state = state.lock();
            let cut = state.page_size.min(state.remaining.len());
            let rest = state.remaining.split_off(cut);
            std::mem::replace(&mut state.remaining, rest)
        };
        // serving the terminating empty page releases the scroll state
        if page.is_empty() {
            self.scrolls.remove(scroll_id);
        }
        Ok(SearchResponse {
            hits: page,
            total: 0,
            aggregations: Vec::new(),
            scroll_id: Some(scroll_id.to_string()),
        })
    }

    async fn count(&self, index_type: &IndexType, query: &Query) -> Result<u64> {
        Ok(self.matching_hits(index_type, query).len() as u64)
    }
}

fn project_fields(source: &Value, fields: &[String]) -> Value {
    let mut out = serde_json::Map::new();
    for field in fields {
        if let Some(v) = source.get(field) {
            out.insert(field.clone(), v.clone());
        }
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn issue_type() -> IndexType {
        "issues/issue".parse().unwrap()
    }

    async fn seeded_backend() -> InMemorySearchBackend {
        let backend = InMemorySearchBackend::new();
        backend
            .create_index("issues", &IndexSettings::default())
            .await
            .unwrap();
        let docs = vec![
            ("1", json!({"lang": "java", "status": "open", "line": 10})),
            ("2", json!({"lang": "java", "status": "closed", "line": 4})),
            ("3", json!({"lang": "rust", "status": "open"})),
        ];
        let items = docs
            .into_iter()
            .map(|(id, body)| BulkRequestItem::Upsert {
                index_type: issue_type(),
                id: id.to_string(),
                body,
            })
            .collect();
        backend.bulk_execute(items).await.unwrap();
        backend
    }

    #[tokio::test]
    async fn test_term_query_and_count() {
        let backend = seeded_backend().await;
        let count = backend
            .count(&issue_type(), &Query::term("lang", "java"))
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_bool_query_with_must_not() {
        let backend = seeded_backend().await;
        let query = Query::Bool {
            must: vec![Query::term("status", "open")],
            must_not: vec![Query::term("lang", "rust")],
        };
        let count = backend.count(&issue_type(), &query).await.unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_sort_with_missing_placement() {
        let backend = seeded_backend().await;
        let mut request = SearchRequest::new(issue_type(), Query::MatchAll);
        request.limit = 10;
        request.sorts = vec![SortClause {
            field: "line".to_string(),
            order: SortOrder::Ascending,
            missing: MissingPlacement::Last,
        }];
        let response = backend.search(&request).await.unwrap();
        let ids: Vec<&str> = response.hits.iter().map(|h| h.id.as_str()).collect();
        // doc 3 has no line, so it sorts last
        assert_eq!(ids, vec!["2", "1", "3"]);
    }

    #[tokio::test]
    async fn test_scroll_drains_all_pages() {
        let backend = seeded_backend().await;
        let mut request = SearchRequest::new(issue_type(), Query::MatchAll);
        request.limit = 2;
        request.scroll = true;
        let first = backend.search(&request).await.unwrap();
        assert_eq!(first.hits.len(), 2);
        let scroll_id = first.scroll_id.unwrap();
        let second = backend.scroll(&scroll_id).await.unwrap();
        assert_eq!(second.hits.len(), 1);
        let third = backend.scroll(&scroll_id).await.unwrap();
        assert!(third.hits.is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_scroll_is_released() {
        let backend = seeded_backend().await;
        let mut request = SearchRequest::new(issue_type(), Query::MatchAll);
        request.limit = 2;
        request.scroll = true;
        let first = backend.search(&request).await.unwrap();
        let scroll_id = first.scroll_id.unwrap();
        backend.scroll(&scroll_id).await.unwrap();
        let terminal = backend.scroll(&scroll_id).await.unwrap();
        assert!(terminal.hits.is_empty());
        // the terminating empty page drops the server-side state
        assert!(backend.scroll(&scroll_id).await.is_err());
    }

    #[tokio::test]
    async fn test_terms_aggregation_with_include_reports_zero_counts() {
        let backend = seeded_backend().await;
        let mut request = SearchRequest::new(issue_type(), Query::MatchAll);
        request.aggregations = vec![AggregationSpec::Terms {
            name: "langs".to_string(),
            field: "lang".to_string(),
            size: 10,
            order: BucketOrder::CountDesc,
            include: Some(vec!["cobol".to_string()]),
            aggs: Vec::new(),
        }];
        let response = backend.search(&request).await.unwrap();
        let buckets = &response.aggregations[0].buckets;
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].key, "cobol");
        assert_eq!(buckets[0].doc_count, 0);
    }
}
