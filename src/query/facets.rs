//! Sticky facet construction and aggregation-result parsing
//!
//! A sticky facet's bucket counts ignore that facet's own active filter while
//! still honoring every other filter, so its options remain selectable after
//! the user picks one. Selected values are carried by a companion terms
//! aggregation so they always appear in the result, even with zero matches.

use crate::backend::{AggregationResult, AggregationSpec, BucketOrder, Query};
use std::collections::BTreeMap;

/// Suffix of the companion aggregation carrying user-selected values
pub const SELECTED_SUFFIX: &str = "__selected";
/// Suffix of the filter wrapper around each sticky facet
const FILTER_SUFFIX: &str = "_filter";

/// Default number of buckets per facet
pub const DEFAULT_FACET_SIZE: usize = 10;

/// Builds sticky facet aggregation trees from the active filter map
#[derive(Debug, Clone)]
pub struct StickyFacetBuilder {
    query: Query,
    /// field name -> the filter clause active for that field
    filters: BTreeMap<String, Query>,
}

impl StickyFacetBuilder {
    pub fn new(query: Query, filters: BTreeMap<String, Query>) -> Self {
        Self { query, filters }
    }

    /// One sticky facet on `field`.
    ///
    /// The wrapper filter conjoins the top-level query with every active
    /// filter except the one keyed by `field`; the terms sub-aggregation
    /// takes the top `size` values by descending count, and `selected`
    /// values ride along in a companion aggregation regardless of count.
    pub fn build_sticky_facet(
        &self,
        field: &str,
        facet_name: &str,
        size: usize,
        selected: &[String],
    ) -> AggregationSpec {
        let mut clauses = vec![self.query.clone()];
        for (filter_field, filter) in &self.filters {
            if filter_field != field {
                clauses.push(filter.clone());
            }
        }

        let mut aggs = vec![AggregationSpec::Terms {
            name: facet_name.to_string(),
            field: field.to_string(),
            size,
            order: BucketOrder::CountDesc,
            include: None,
            aggs: Vec::new(),
        }];
        if !selected.is_empty() {
            aggs.push(AggregationSpec::Terms {
                name: format!("{}{}", facet_name, SELECTED_SUFFIX),
                field: field.to_string(),
                size: selected.len(),
                order: BucketOrder::CountDesc,
                include: Some(selected.to_vec()),
                aggs: Vec::new(),
            });
        }

        AggregationSpec::Filter {
            name: format!("{}{}", facet_name, FILTER_SUFFIX),
            filter: Query::all_of(clauses),
            aggs,
        }
    }
}

/// One facet bucket
#[derive(Debug, Clone, PartialEq)]
pub struct FacetValue {
    pub key: String,
    pub count: u64,
    pub sub_facets: Vec<(String, Vec<FacetValue>)>,
}

impl FacetValue {
    fn new(key: String, count: u64) -> Self {
        Self {
            key,
            count,
            sub_facets: Vec::new(),
        }
    }
}

/// Parsed facet results, in the order the aggregations were requested
#[derive(Debug, Clone, Default)]
pub struct Facets {
    names: Vec<String>,
    values: BTreeMap<String, Vec<FacetValue>>,
}

impl Facets {
    /// Parse raw aggregation results, unwrapping sticky filter wrappers and
    /// merging each `__selected` companion into its base facet.
    pub fn from_results(results: &[AggregationResult]) -> Self {
        let mut facets = Facets::default();
        for result in results {
            facets.absorb(result);
        }
        facets
    }

    fn absorb(&mut self, result: &AggregationResult) {
        if result.name.ends_with(FILTER_SUFFIX) {
            // single unnamed bucket wrapping the real facet aggregations
            for bucket in &result.buckets {
                for sub in &bucket.aggregations {
                    self.absorb(sub);
                }
            }
            return;
        }

        if let Some(base) = result.name.strip_suffix(SELECTED_SUFFIX) {
            let base = base.to_string();
            let entry = self.entry(&base);
            for bucket in &result.buckets {
                if !entry.iter().any(|v| v.key == bucket.key) {
                    entry.push(FacetValue::new(bucket.key.clone(), bucket.doc_count));
                }
            }
            return;
        }

        let name = result.name.clone();
        let entry = self.entry(&name);
        for bucket in &result.buckets {
            if entry.iter().any(|v| v.key == bucket.key) {
                continue;
            }
            let mut value = FacetValue::new(bucket.key.clone(), bucket.doc_count);
            if !bucket.aggregations.is_empty() {
                let nested = Facets::from_results(&bucket.aggregations);
                for sub_name in nested.names() {
                    if let Some(sub_values) = nested.get(sub_name) {
                        value
                            .sub_facets
                            .push((sub_name.to_string(), sub_values.to_vec()));
                    }
                }
            }
            entry.push(value);
        }
    }

    fn entry(&mut self, name: &str) -> &mut Vec<FacetValue> {
        if !self.values.contains_key(name) {
            self.names.push(name.to_string());
            self.values.insert(name.to_string(), Vec::new());
        }
        self.values.get_mut(name).unwrap()
    }

    /// Facet names in request order
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn get(&self, name: &str) -> Option<&[FacetValue]> {
        self.values.get(name).map(|v| v.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
