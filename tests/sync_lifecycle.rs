// tests/sync_lifecycle.rs
// Full-sync bootstrap, no-op incremental re-sync, and deletion reconciliation
// against a fake remote issue tracker.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use common::{sample_issue, FakeIssueSource, KeywordEmbeddingProvider};
use ivdex::config::SyncConfig;
use ivdex::embedding::EmbeddingPipeline;
use ivdex::store::VectorStore;
use ivdex::sync::SyncEngine;

fn test_config() -> SyncConfig {
    SyncConfig {
        enabled: true,
        interval_minutes: 30,
        projects: vec!["PROJ".to_string()],
        sync_comments: false,
        embed_batch_size: 100,
        full_sync_lookback_days: 365,
    }
}

#[tokio::test]
async fn full_sync_then_noop_incremental_then_deletion() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(VectorStore::connect(&dir.path().join("store.db")).await.unwrap());
    let provider = Arc::new(KeywordEmbeddingProvider::new(vec!["login", "bug", "crash", "load", "slow", "query"]));
    let pipeline = Arc::new(EmbeddingPipeline::new(provider, None, 100, 5));

    let now = Utc::now();
    let issues = vec![
        sample_issue("PROJ-1", "login bug", now),
        sample_issue("PROJ-2", "crash on load", now),
        sample_issue("PROJ-3", "slow query", now),
    ];
    let mut pages = HashMap::new();
    pages.insert("PROJ", vec![issues.clone(), issues.clone(), issues.clone()]);
    let source = Arc::new(FakeIssueSource::new(vec!["PROJ"], pages));

    let engine = SyncEngine::new(source.clone(), store.clone(), pipeline, dir.path().join("sync_state.json"), test_config());

    // E2E-1
    let first = engine.full_sync(None).await.unwrap();
    assert_eq!(first.issues_embedded, 3);
    assert_eq!(first.issues_skipped, 0);
    let ids = store.get_all_issue_ids(Some("PROJ")).await.unwrap();
    assert_eq!(ids.len(), 3);
    let state = engine.get_sync_status().await.unwrap();
    assert_eq!(state.last_issue_updated, Some(now));

    // E2E-2: re-run incremental with no remote changes.
    let second = engine.incremental_sync(None).await.unwrap();
    assert_eq!(second.issues_processed, 3);
    assert_eq!(second.issues_skipped, 3);
    assert_eq!(second.issues_embedded, 0);

    // E2E-3: delete PROJ-2 remotely, then incremental sync.
    source.delete_remotely("PROJ-2");
    let third = engine.incremental_sync(None).await.unwrap();
    assert_eq!(third.issues_deleted, 1);
    let remaining = store.get_all_issue_ids(Some("PROJ")).await.unwrap();
    let mut remaining = remaining;
    remaining.sort();
    assert_eq!(remaining, vec!["PROJ-1".to_string(), "PROJ-3".to_string()]);
}
