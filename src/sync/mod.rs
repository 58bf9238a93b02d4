// src/sync/mod.rs
// Keeps the vector store current with the remote issue tracker: full
// bootstrap syncs, incremental catch-up syncs, deletion detection, and
// comment syncing. Full sync pages by descending key; incremental sync
// pages by ascending `updated_at` (see `§4.6.1` in the design notes for
// why offset pagination against a live-updating server is unsound).

mod error;
pub mod state;

pub use error::{SyncError, SyncResult};

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::config::SyncConfig;
use crate::embedding::EmbeddingPipeline;
use crate::model::{IssueRecord, RawComment, RawIssue, SyncResult as SyncRunStats, SyncState};
use crate::store::VectorStore;
use crate::text;

/// Which end of the key/update ordering a page request should sort by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOrder {
    KeyDescending,
    UpdatedAscending,
}

/// A page request built from JQL-ish components. The concrete `IssueSource`
/// is responsible for rendering these into whatever query language its
/// remote speaks.
///
/// The two cursor fields are mutually exclusive and depend on `order`:
/// `after_key` renders as `AND key < {after_key}` and only makes sense
/// alongside `KeyDescending` (full sync), since key order has no relation
/// to `updated_at` order. `after_updated` renders as
/// `AND updated >= {after_updated}` and is the cursor for
/// `UpdatedAscending` (incremental sync); duplicate rows at the boundary
/// are expected and are suppressed by the in-run `synced_ids` dedup.
pub struct IssuePage {
    pub project_key: String,
    pub updated_floor: DateTime<Utc>,
    pub after_key: Option<String>,
    pub after_updated: Option<DateTime<Utc>>,
    pub order: SyncOrder,
    pub page_size: usize,
}

/// Abstraction over the remote issue tracker. Implementations talk to
/// whatever API backs the tracker; the engine only needs pagination,
/// comment fetch, an existence check for deletion detection, and a project
/// listing for the "sync everything" case.
#[async_trait]
pub trait IssueSource: Send + Sync {
    async fn list_projects(&self) -> SyncResult<Vec<String>>;
    async fn fetch_issue_page(&self, page: &IssuePage) -> SyncResult<Vec<RawIssue>>;
    async fn fetch_comments(&self, issue_key: &str) -> SyncResult<Vec<RawComment>>;
    /// Of the given keys (assumed same project), return the subset that
    /// still exists remotely.
    async fn existing_keys(&self, project_key: &str, keys: &[String]) -> SyncResult<HashSet<String>>;
}

pub struct SyncEngine {
    source: Arc<dyn IssueSource>,
    store: Arc<VectorStore>,
    pipeline: Arc<EmbeddingPipeline>,
    state_path: PathBuf,
    config: SyncConfig,
    cancel: Arc<AtomicBool>,
}

impl SyncEngine {
    pub fn new(source: Arc<dyn IssueSource>, store: Arc<VectorStore>, pipeline: Arc<EmbeddingPipeline>, state_path: PathBuf, config: SyncConfig) -> Self {
        Self {
            source,
            store,
            pipeline,
            state_path,
            config,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cooperative cancellation. Checked between projects and
    /// between embed batches within a project.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub async fn get_sync_status(&self) -> SyncResult<SyncState> {
        state::load(&self.state_path).await
    }

    pub async fn full_sync(&self, projects: Option<Vec<String>>) -> SyncResult<SyncRunStats> {
        self.run_sync(projects, true).await
    }

    pub async fn incremental_sync(&self, projects: Option<Vec<String>>) -> SyncResult<SyncRunStats> {
        self.run_sync(projects, false).await
    }

    async fn run_sync(&self, projects: Option<Vec<String>>, full: bool) -> SyncResult<SyncRunStats> {
        self.cancel.store(false, Ordering::SeqCst);
        let start = std::time::Instant::now();
        let mut state = state::load(&self.state_path).await?;
        let mut stats = SyncRunStats::default();

        let target_projects = self.resolve_projects(projects, &state, full).await?;
        info!("starting {} sync for projects: {target_projects:?}", if full { "full" } else { "incremental" });

        for project_key in &target_projects {
            if self.cancelled() {
                stats.errors.push("cancelled".to_string());
                break;
            }
            match self.sync_project(project_key, full, &mut state).await {
                Ok(project_stats) => merge_stats(&mut stats, project_stats),
                Err(e) => {
                    let msg = format!("error syncing project {project_key}: {e}");
                    error!("{msg}");
                    stats.errors.push(msg);
                }
            }
            if !state.projects_synced.iter().any(|p| p == project_key) {
                state.projects_synced.push(project_key.clone());
            }
        }

        state.last_sync_at = Some(Utc::now());
        state.total_issues_indexed += stats.issues_embedded;
        state.total_comments_indexed += stats.comments_embedded;
        state::save(&self.state_path, &state).await?;

        stats.duration_seconds = start.elapsed().as_secs_f64();
        info!("sync complete: {} issues embedded in {:.1}s", stats.issues_embedded, stats.duration_seconds);
        Ok(stats)
    }

    async fn resolve_projects(&self, explicit: Option<Vec<String>>, state: &SyncState, full: bool) -> SyncResult<Vec<String>> {
        if let Some(projects) = explicit {
            return Ok(projects);
        }
        if !self.config.projects.is_empty() {
            return Ok(self.config.projects.clone());
        }
        if !full && !state.projects_synced.is_empty() {
            return Ok(state.projects_synced.clone());
        }
        self.source.list_projects().await
    }

    async fn sync_project(&self, project_key: &str, full: bool, state: &mut SyncState) -> SyncResult<SyncRunStats> {
        let mut stats = SyncRunStats::default();

        if full {
            self.store.clear_issues(Some(project_key)).await?;
        }

        let floor = if full {
            Utc::now() - chrono::Duration::days(self.config.full_sync_lookback_days)
        } else {
            state.last_issue_updated.unwrap_or_else(|| Utc::now() - chrono::Duration::days(self.config.full_sync_lookback_days))
        };
        let order = if full { SyncOrder::KeyDescending } else { SyncOrder::UpdatedAscending };

        let mut synced_ids: HashSet<String> = HashSet::new();
        let mut batch: Vec<(RawIssue, String)> = Vec::new();
        let mut max_updated = state.last_issue_updated;
        let mut after_key: Option<String> = None;
        let mut after_updated: Option<DateTime<Utc>> = None;
        let page_size = self.config.embed_batch_size.max(1);

        loop {
            if self.cancelled() {
                break;
            }
            let page_request = IssuePage {
                project_key: project_key.to_string(),
                updated_floor: floor,
                after_key: after_key.clone(),
                after_updated,
                order,
                page_size,
            };
            let page = match self.source.fetch_issue_page(&page_request).await {
                Ok(page) => page,
                Err(e) => {
                    stats.errors.push(format!("error fetching page for {project_key}: {e}"));
                    break;
                }
            };
            if page.is_empty() {
                break;
            }

            for issue in &page {
                if !synced_ids.insert(issue.key.clone()) {
                    continue;
                }
                stats.issues_processed += 1;
                let content_hash = text::compute_content_hash(&issue.summary, issue.description.as_deref(), &issue.labels, &issue.status);

                if !full {
                    if let Ok(Some(existing)) = self.store.get_issue_by_key(&issue.key).await {
                        if existing.content_hash == content_hash {
                            stats.issues_skipped += 1;
                            continue;
                        }
                    }
                }

                if max_updated.is_none_or(|m| issue.updated_at > m) {
                    max_updated = Some(issue.updated_at);
                }
                batch.push((issue.clone(), content_hash));
            }

            match order {
                SyncOrder::KeyDescending => after_key = page.iter().map(|i| i.key.clone()).min(),
                SyncOrder::UpdatedAscending => after_updated = page.iter().map(|i| i.updated_at).max().or(after_updated),
            }

            if batch.len() >= self.config.embed_batch_size {
                let embedded = self.embed_and_store(&batch, full).await?;
                stats.issues_embedded += embedded;
                batch.clear();
                state.checkpoint_project = Some(project_key.to_string());
                state.checkpoint_offset += embedded;
            }

            if page.len() < page_size {
                break;
            }
        }

        if !batch.is_empty() {
            let embedded = self.embed_and_store(&batch, full).await?;
            stats.issues_embedded += embedded;
        }

        if let Some(updated) = max_updated {
            if state.last_issue_updated.is_none_or(|m| updated > m) {
                state.last_issue_updated = Some(updated);
            }
        }
        state.checkpoint_project = None;
        state.checkpoint_offset = 0;

        if !full && stats.issues_processed > 0 {
            if let Err(e) = self.detect_deletions(project_key, &mut stats).await {
                warn!("deletion detection failed for {project_key}, treating as no-op: {e}");
            }
        }

        if self.config.sync_comments && stats.issues_embedded > 0 {
            self.sync_comments_for_project(project_key, &mut stats).await;
        }

        self.store.compact().await;
        Ok(stats)
    }

    async fn embed_and_store(&self, batch: &[(RawIssue, String)], full: bool) -> SyncResult<u64> {
        if batch.is_empty() {
            return Ok(0);
        }
        let texts: Vec<String> = batch.iter().map(|(issue, _)| text::to_embed_text(issue)).collect();
        let embedded = self.pipeline.embed_batch(&texts).await?;

        let now = Utc::now();
        let records: Vec<IssueRecord> = embedded
            .into_iter()
            .map(|e| {
                let (issue, content_hash) = &batch[e.index];
                issue_to_record(issue, content_hash.clone(), e.vector, now)
            })
            .collect();

        if full {
            self.store.bulk_insert_issues(&records).await.map_err(SyncError::from)
        } else {
            self.store.upsert_issues(&records).await.map_err(SyncError::from)
        }
    }

    /// List all indexed keys for the project, batch them by 100, and check
    /// each batch against the remote. Keys absent remotely are deleted.
    /// Any per-batch error aborts deletion for that batch only.
    async fn detect_deletions(&self, project_key: &str, stats: &mut SyncRunStats) -> SyncResult<()> {
        let indexed_keys = self.store.get_all_issue_ids(Some(project_key)).await?;
        for batch in indexed_keys.chunks(100) {
            match self.source.existing_keys(project_key, batch).await {
                Ok(remote_present) => {
                    let missing: Vec<String> = batch.iter().filter(|k| !remote_present.contains(*k)).cloned().collect();
                    if !missing.is_empty() {
                        let deleted = self.store.delete_issues_by_ids(&missing).await?;
                        stats.issues_deleted += deleted;
                    }
                }
                Err(e) => {
                    warn!("deletion-detection batch check failed for {project_key}, skipping batch: {e}");
                }
            }
        }
        Ok(())
    }

    async fn sync_comments_for_project(&self, project_key: &str, stats: &mut SyncRunStats) {
        let issue_keys = match self.store.get_all_issue_ids(Some(project_key)).await {
            Ok(keys) => keys,
            Err(e) => {
                stats.errors.push(format!("could not list issues for comment sync in {project_key}: {e}"));
                return;
            }
        };

        for issue_key in issue_keys {
            match self.sync_comments_for_issue(&issue_key).await {
                Ok(embedded) => stats.comments_embedded += embedded,
                Err(e) => stats.errors.push(format!("comment sync failed for {issue_key}: {e}")),
            }
        }
    }

    async fn sync_comments_for_issue(&self, issue_key: &str) -> SyncResult<u64> {
        let comments = self.source.fetch_comments(issue_key).await?;
        if comments.is_empty() {
            return Ok(0);
        }

        let issue = self.store.get_issue_by_key(issue_key).await?;
        let (project_key, issue_type, issue_status, issue_summary) = match &issue {
            Some(issue) => (issue.project_key.clone(), issue.issue_type.clone(), issue.status.clone(), issue.summary.clone()),
            None => return Ok(0),
        };

        let texts: Vec<String> = comments
            .iter()
            .map(|c| text::to_comment_embed_text(&c.issue_key, &issue_summary, &c.author, &c.body))
            .collect();
        let embedded = self.pipeline.embed_batch(&texts).await?;

        let now = Utc::now();
        let records = embedded
            .into_iter()
            .map(|e| {
                let comment = &comments[e.index];
                crate::model::CommentRecord {
                    comment_id: comment.comment_id.clone(),
                    issue_key: comment.issue_key.clone(),
                    vector: e.vector,
                    body_preview: text::comment_body_preview(&comment.body),
                    author: comment.author.clone(),
                    created_at: comment.created_at,
                    project_key: project_key.clone(),
                    issue_type: issue_type.clone(),
                    issue_status: issue_status.clone(),
                    content_hash: text::compute_comment_content_hash(&comment.body),
                    indexed_at: now,
                }
            })
            .collect::<Vec<_>>();

        let count = records.len() as u64;
        self.store.upsert_comments(&records).await?;
        Ok(count)
    }
}

fn issue_to_record(issue: &RawIssue, content_hash: String, vector: Vec<f32>, now: DateTime<Utc>) -> IssueRecord {
    IssueRecord {
        issue_key: issue.key.clone(),
        project_key: issue.project_key(),
        vector,
        summary: issue.summary.clone(),
        description_preview: text::description_preview(issue.description.as_deref()),
        issue_type: issue.issue_type.clone(),
        status: issue.status.clone(),
        status_category: issue.status_category.clone(),
        priority: issue.priority.clone(),
        assignee: issue.assignee.clone(),
        reporter: issue.reporter.clone(),
        labels: issue.labels.clone(),
        components: issue.components.clone(),
        created_at: issue.created_at,
        updated_at: issue.updated_at,
        resolved_at: issue.resolved_at,
        parent_key: issue.parent_key.clone(),
        linked_issues: issue.linked_issues.clone(),
        content_hash,
        embedding_version: "1".to_string(),
        indexed_at: now,
    }
}

fn merge_stats(into: &mut SyncRunStats, from: SyncRunStats) {
    into.issues_processed += from.issues_processed;
    into.issues_embedded += from.issues_embedded;
    into.issues_skipped += from.issues_skipped;
    into.issues_deleted += from.issues_deleted;
    into.comments_processed += from.comments_processed;
    into.comments_embedded += from.comments_embedded;
    into.errors.extend(from.errors);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::sync::Mutex as AsyncMutex;

    struct FakeSource {
        pages_by_project: AsyncMutex<std::collections::HashMap<String, Vec<Vec<RawIssue>>>>,
        projects: Vec<String>,
        deleted_from_remote: Mutex<HashSet<String>>,
        requests: Mutex<Vec<(Option<String>, Option<DateTime<Utc>>, SyncOrder)>>,
    }

    #[async_trait]
    impl IssueSource for FakeSource {
        async fn list_projects(&self) -> SyncResult<Vec<String>> {
            Ok(self.projects.clone())
        }

        async fn fetch_issue_page(&self, page: &IssuePage) -> SyncResult<Vec<RawIssue>> {
            self.requests.lock().unwrap().push((page.after_key.clone(), page.after_updated, page.order));
            let mut pages = self.pages_by_project.lock().await;
            let queue = pages.entry(page.project_key.clone()).or_default();
            Ok(if queue.is_empty() { Vec::new() } else { queue.remove(0) })
        }

        async fn fetch_comments(&self, _issue_key: &str) -> SyncResult<Vec<RawComment>> {
            Ok(Vec::new())
        }

        async fn existing_keys(&self, _project_key: &str, keys: &[String]) -> SyncResult<HashSet<String>> {
            let deleted = self.deleted_from_remote.lock().unwrap();
            Ok(keys.iter().filter(|k| !deleted.contains(*k)).cloned().collect())
        }
    }

    fn sample_issue(key: &str, updated_at: DateTime<Utc>) -> RawIssue {
        RawIssue {
            key: key.to_string(),
            summary: "sample".to_string(),
            description: None,
            issue_type: "Bug".to_string(),
            status: "Open".to_string(),
            status_category: "To Do".to_string(),
            priority: None,
            assignee: None,
            reporter: "jdoe".to_string(),
            labels: vec![],
            components: vec![],
            created_at: updated_at,
            updated_at,
            resolved_at: None,
            parent_key: None,
            linked_issues: vec![],
        }
    }

    struct AlwaysEmptyProvider;

    #[async_trait]
    impl crate::embedding::EmbeddingProvider for AlwaysEmptyProvider {
        async fn embed_batch(&self, texts: &[String]) -> crate::embedding::EmbeddingResult<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
        fn dimensions(&self) -> usize {
            2
        }
    }

    async fn test_engine(pages: Vec<Vec<RawIssue>>) -> (SyncEngine, tempfile::TempDir) {
        let (engine, _source, dir) = test_engine_with_source(pages, 100).await;
        (engine, dir)
    }

    async fn test_engine_with_source(pages: Vec<Vec<RawIssue>>, embed_batch_size: usize) -> (SyncEngine, Arc<FakeSource>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(VectorStore::connect(&dir.path().join("store.db")).await.unwrap());
        let pipeline = Arc::new(EmbeddingPipeline::new(Arc::new(AlwaysEmptyProvider), None, 100, 5));
        let mut pages_by_project = std::collections::HashMap::new();
        pages_by_project.insert("PROJ".to_string(), pages);
        let source = Arc::new(FakeSource {
            pages_by_project: AsyncMutex::new(pages_by_project),
            projects: vec!["PROJ".to_string()],
            deleted_from_remote: Mutex::new(HashSet::new()),
            requests: Mutex::new(Vec::new()),
        });
        let config = SyncConfig {
            enabled: true,
            interval_minutes: 30,
            projects: vec!["PROJ".to_string()],
            sync_comments: false,
            embed_batch_size,
            full_sync_lookback_days: 365,
        };
        let engine = SyncEngine::new(source.clone(), store, pipeline, dir.path().join("sync_state.json"), config);
        (engine, source, dir)
    }

    #[tokio::test]
    async fn full_sync_embeds_all_issues_in_one_page() {
        let now = Utc::now();
        let issues = vec![sample_issue("PROJ-1", now), sample_issue("PROJ-2", now)];
        let (engine, _dir) = test_engine(vec![issues]).await;
        let stats = engine.full_sync(None).await.unwrap();
        assert_eq!(stats.issues_processed, 2);
        assert_eq!(stats.issues_embedded, 2);
        assert!(stats.errors.is_empty());
    }

    #[tokio::test]
    async fn incremental_sync_skips_unchanged_content_hash() {
        let now = Utc::now();
        let issue = sample_issue("PROJ-1", now);
        let (engine, _dir) = test_engine(vec![vec![issue.clone()], vec![issue.clone()]]).await;

        let first = engine.full_sync(None).await.unwrap();
        assert_eq!(first.issues_embedded, 1);

        let second = engine.incremental_sync(None).await.unwrap();
        assert_eq!(second.issues_skipped, 1);
        assert_eq!(second.issues_embedded, 0);
    }

    #[tokio::test]
    async fn state_persists_projects_synced_after_run() {
        let now = Utc::now();
        let (engine, _dir) = test_engine(vec![vec![sample_issue("PROJ-1", now)]]).await;
        engine.full_sync(None).await.unwrap();
        let state = engine.get_sync_status().await.unwrap();
        assert_eq!(state.projects_synced, vec!["PROJ".to_string()]);
        assert!(state.last_sync_at.is_some());
    }

    #[tokio::test]
    async fn incremental_sync_paginates_by_updated_at_not_key() {
        let t0 = Utc::now() - chrono::Duration::hours(3);
        let t1 = Utc::now() - chrono::Duration::hours(2);
        let t2 = Utc::now() - chrono::Duration::hours(1);
        let t3 = Utc::now();

        // Queue: one page for the bootstrap full sync, then two pages for
        // the incremental run. Keys are assigned against the grain of
        // `updated_at` order so a key-based cursor would misbehave.
        let bootstrap = vec![sample_issue("PROJ-5", t0)];
        let incremental_page_1 = vec![sample_issue("PROJ-9", t1), sample_issue("PROJ-1", t2)];
        let incremental_page_2 = vec![sample_issue("PROJ-7", t3)];

        let (engine, source, _dir) = test_engine_with_source(vec![bootstrap, incremental_page_1, incremental_page_2], 2).await;

        engine.full_sync(None).await.unwrap();
        source.requests.lock().unwrap().clear();

        let stats = engine.incremental_sync(None).await.unwrap();
        assert_eq!(stats.issues_processed, 3);
        assert_eq!(stats.issues_embedded, 3);

        let requests = source.requests.lock().unwrap();
        assert_eq!(requests.len(), 2, "expected both incremental pages to be fetched");
        for (after_key, _, order) in requests.iter() {
            assert_eq!(*order, SyncOrder::UpdatedAscending);
            assert!(after_key.is_none(), "incremental pagination must not cursor by key");
        }
        assert_eq!(requests[0].1, None);
        assert_eq!(requests[1].1, Some(t2), "second page must cursor off the max updated_at seen in page one");
    }

    #[tokio::test]
    async fn cancel_before_run_stops_before_any_project() {
        let now = Utc::now();
        let (engine, _dir) = test_engine(vec![vec![sample_issue("PROJ-1", now)]]).await;
        engine.cancel();
        let stats = engine.full_sync(None).await.unwrap();
        assert!(stats.errors.iter().any(|e| e == "cancelled"));
        assert_eq!(stats.issues_processed, 0);
    }
}
