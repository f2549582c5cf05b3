//! Typed read path over one index type
//!
//! [`DocumentIndex`] deserializes backend hits into domain documents, applies
//! the paging and field selection of a [`QueryContext`], parses facet
//! aggregations, and exposes a scroll iteration for full-index walks.

use crate::backend::{AggregationSpec, Query, SearchClient, SearchRequest, SortClause};
use crate::error::{AppError, Result};
use crate::query::{Facets, QueryContext};
use crate::schema::IndexType;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// Page of typed documents plus the total and parsed facets
#[derive(Debug)]
pub struct SearchResultSet<D> {
    pub docs: Vec<D>,
    pub total: u64,
    pub facets: Facets,
}

/// Typed reader for one index type
pub struct DocumentIndex<D> {
    client: Arc<dyn SearchClient>,
    index_type: IndexType,
    _marker: PhantomData<fn() -> D>,
}

impl<D: DeserializeOwned> DocumentIndex<D> {
    pub fn new(client: Arc<dyn SearchClient>, index_type: IndexType) -> Self {
        Self {
            client,
            index_type,
            _marker: PhantomData,
        }
    }

    pub fn index_type(&self) -> &IndexType {
        &self.index_type
    }

    /// Execute a paged search with resolved sorts and facet aggregations
    pub async fn search(
        &self,
        query: Query,
        context: &QueryContext,
        sorts: Vec<SortClause>,
        aggregations: Vec<AggregationSpec>,
    ) -> Result<SearchResultSet<D>> {
        let request = SearchRequest {
            index_type: self.index_type.clone(),
            query,
            sorts,
            aggregations,
            offset: context.offset(),
            limit: context.limit(),
            fields: context.fields().to_vec(),
            scroll: false,
        };
        let response = self.client.search(&request).await?;
        debug!(
            index_type = %self.index_type.key(),
            total = response.total,
            returned = response.hits.len(),
            "Search executed"
        );

        let docs = response
            .hits
            .into_iter()
            .map(|hit| serde_json::from_value(hit.source).map_err(AppError::from))
            .collect::<Result<Vec<D>>>()?;
        Ok(SearchResultSet {
            docs,
            total: response.total,
            facets: Facets::from_results(&response.aggregations),
        })
    }

    /// Open a scroll over every document matching `query`.
    ///
    /// The scroll snapshots matching documents at open time; writes made
    /// while draining are not observed.
    pub async fn scroll(&self, query: Query, page_size: usize) -> Result<DocumentScroll<D>> {
        let mut request = SearchRequest::new(self.index_type.clone(), query);
        request.limit = page_size;
        request.scroll = true;
        let response = self.client.search(&request).await?;
        Ok(DocumentScroll {
            client: self.client.clone(),
            scroll_id: response.scroll_id,
            first_page: Some(response.hits),
            _marker: PhantomData,
        })
    }

    pub async fn count(&self, query: &Query) -> Result<u64> {
        self.client.count(&self.index_type, query).await
    }
}

/// Open scroll continuation; drain it with a `next_page()` loop
pub struct DocumentScroll<D> {
    client: Arc<dyn SearchClient>,
    scroll_id: Option<String>,
    first_page: Option<Vec<crate::backend::Hit>>,
    _marker: PhantomData<fn() -> D>,
}

impl<D: DeserializeOwned> DocumentScroll<D> {
    /// The next page of documents, or `None` once the scroll is exhausted
    pub async fn next_page(&mut self) -> Result<Option<Vec<D>>> {
        let hits = match self.first_page.take() {
            Some(hits) => hits,
            None => match &self.scroll_id {
                Some(id) => self.client.scroll(id).await?.hits,
                None => Vec::new(),
            },
        };
        if hits.is_empty() {
            self.scroll_id = None;
            return Ok(None);
        }
        let docs = hits
            .into_iter()
            .map(|hit| serde_json::from_value(hit.source).map_err(AppError::from))
            .collect::<Result<Vec<D>>>()?;
        Ok(Some(docs))
    }
}
