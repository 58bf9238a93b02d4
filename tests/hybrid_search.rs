// tests/hybrid_search.rs
// Hybrid vector+lexical search ranking over a small indexed corpus.

mod common;

use chrono::Utc;
use common::KeywordEmbeddingProvider;
use ivdex::embedding::EmbeddingProvider;
use ivdex::model::IssueRecord;
use ivdex::store::filter::Filter;
use ivdex::store::VectorStore;

fn record(key: &str, summary: &str, vector: Vec<f32>) -> IssueRecord {
    let now = Utc::now();
    IssueRecord {
        issue_key: key.to_string(),
        project_key: "PROJ".to_string(),
        vector,
        summary: summary.to_string(),
        description_preview: String::new(),
        issue_type: "Bug".to_string(),
        status: "Open".to_string(),
        status_category: "To Do".to_string(),
        priority: None,
        assignee: None,
        reporter: "jdoe".to_string(),
        labels: vec![],
        components: vec![],
        created_at: now,
        updated_at: now,
        resolved_at: None,
        parent_key: None,
        linked_issues: vec![],
        content_hash: "hash".to_string(),
        embedding_version: "1".to_string(),
        indexed_at: now,
    }
}

#[tokio::test]
async fn hybrid_search_ranks_login_issue_first() {
    let dir = tempfile::tempdir().unwrap();
    let store = VectorStore::connect(&dir.path().join("store.db")).await.unwrap();
    let provider = KeywordEmbeddingProvider::new(vec!["login", "bug", "crash", "load", "slow", "query"]);

    let texts = vec!["login bug".to_string(), "crash on load".to_string(), "slow query".to_string()];
    let vectors = provider.embed_batch(&texts).await.unwrap();

    let records = vec![
        record("PROJ-1", "login bug", vectors[0].clone()),
        record("PROJ-2", "crash on load", vectors[1].clone()),
        record("PROJ-3", "slow query", vectors[2].clone()),
    ];
    store.bulk_insert_issues(&records).await.unwrap();

    let query_vec = provider.embed_batch(&["login".to_string()]).await.unwrap().remove(0);
    let (hits, total) = store
        .hybrid_search(&query_vec, "login", 10, 0, &Filter::new(), 0.3, 0.2)
        .await
        .unwrap();

    assert!(total >= 1);
    assert_eq!(hits[0].key, "PROJ-1");
}
