//! Write path through the bulk indexer, read path through facets and sorts

use search_sync::backend::{
    BulkRequestItem, IndexSettings, InMemorySearchBackend, Query, SearchClient,
};
use search_sync::bulk::{BulkIndexer, Size};
use search_sync::query::{QueryContext, Sorting, StickyFacetBuilder};
use search_sync::read::DocumentIndex;
use search_sync::schema::IndexType;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct IssueDoc {
    key: String,
    #[serde(default)]
    lang: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

fn issue_type() -> IndexType {
    "issues/issue".parse().unwrap()
}

async fn loaded_backend() -> Arc<InMemorySearchBackend> {
    let backend = Arc::new(InMemorySearchBackend::new());
    backend
        .create_index(
            "issues",
            &IndexSettings {
                shards: 1,
                replicas: 1,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let docs = vec![
        json!({"key": "i1", "lang": "java", "status": "open", "file": "A.java", "line": 5, "severity": 3}),
        json!({"key": "i2", "lang": "java", "status": "closed", "file": "A.java", "line": 5, "severity": 7}),
        json!({"key": "i3", "lang": "rust", "status": "open", "file": "B.rs", "line": 1, "severity": 1}),
        json!({"key": "i4", "lang": "go", "status": "open", "file": "A.java", "line": 2, "severity": 5}),
    ];
    let mut indexer = BulkIndexer::new(backend.clone(), issue_type(), Size::Regular);
    indexer.start().await.unwrap();
    for doc in docs {
        let id = doc["key"].as_str().unwrap().to_string();
        indexer
            .add(BulkRequestItem::Upsert {
                index_type: issue_type(),
                id,
                body: doc,
            })
            .await
            .unwrap();
    }
    indexer.stop().await.unwrap();
    backend
}

#[tokio::test]
async fn test_sticky_facet_ignores_own_filter_and_keeps_selected() {
    let backend = loaded_backend().await;
    let index: DocumentIndex<IssueDoc> = DocumentIndex::new(backend, issue_type());

    // active filters: lang=java, status=open
    let mut filters = BTreeMap::new();
    filters.insert("lang".to_string(), Query::term("lang", "java"));
    filters.insert("status".to_string(), Query::term("status", "open"));
    let builder = StickyFacetBuilder::new(Query::MatchAll, filters.clone());
    let facet = builder.build_sticky_facet("lang", "langs", 10, &["cobol".to_string()]);

    let query = Query::all_of(filters.into_values().collect());
    let mut ctx = QueryContext::new();
    ctx.add_facets(["langs"]);
    let result = index.search(query, &ctx, Vec::new(), vec![facet]).await.unwrap();

    // the query itself matches only open java issues
    assert_eq!(result.total, 1);
    assert_eq!(result.docs[0].key, "i1");

    let values = result.facets.get("langs").unwrap();
    let counts: BTreeMap<&str, u64> = values.iter().map(|v| (v.key.as_str(), v.count)).collect();
    // lang counts ignore lang=java but honor status=open
    assert_eq!(counts.get("java"), Some(&1));
    assert_eq!(counts.get("rust"), Some(&1));
    assert_eq!(counts.get("go"), Some(&1));
    // selected value with zero matches still appears
    assert_eq!(counts.get("cobol"), Some(&0));
}

#[tokio::test]
async fn test_sort_profile_orders_results() {
    let backend = loaded_backend().await;
    let index: DocumentIndex<IssueDoc> = DocumentIndex::new(backend, issue_type());

    let mut sorting = Sorting::new();
    sorting.add("fileLine", "file");
    sorting.add("fileLine", "line");
    sorting.add("fileLine", "severity").reverse();
    sorting.add("fileLine", "key").missing_last();

    let sorts = sorting.fill("fileLine", true).unwrap();
    let ctx = QueryContext::new();
    let result = index
        .search(Query::MatchAll, &ctx, sorts, Vec::new())
        .await
        .unwrap();
    let keys: Vec<&str> = result.docs.iter().map(|d| d.key.as_str()).collect();
    // file asc, then line asc, then severity desc as tiebreaker
    assert_eq!(keys, vec!["i4", "i2", "i1", "i3"]);
}

#[tokio::test]
async fn test_paging_and_field_selection() {
    let backend = loaded_backend().await;
    let index: DocumentIndex<IssueDoc> = DocumentIndex::new(backend, issue_type());

    let mut ctx = QueryContext::new();
    ctx.set_page(2, 3).unwrap();
    ctx.add_fields(["key"]);
    let result = index
        .search(Query::MatchAll, &ctx, Vec::new(), Vec::new())
        .await
        .unwrap();
    assert_eq!(result.total, 4);
    assert_eq!(result.docs.len(), 1);
    // projected source carries only the requested field
    assert!(result.docs[0].lang.is_none());
    assert!(result.docs[0].status.is_none());
}

#[tokio::test]
async fn test_scroll_covers_the_whole_index() {
    let backend = loaded_backend().await;
    let index: DocumentIndex<IssueDoc> = DocumentIndex::new(backend, issue_type());

    let mut scroll = index.scroll(Query::MatchAll, 3).await.unwrap();
    let mut keys = Vec::new();
    while let Some(page) = scroll.next_page().await.unwrap() {
        keys.extend(page.into_iter().map(|d| d.key));
    }
    keys.sort();
    assert_eq!(keys, vec!["i1", "i2", "i3", "i4"]);
}
