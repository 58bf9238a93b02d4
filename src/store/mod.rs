// src/store/mod.rs
// Vector store: two SQLite-backed columnar tables (`issues`, `comments`)
// with an FTS5 lexical shadow, a filter-DSL-to-SQL translation layer, and
// an in-process cosine-similarity scan over a SQL-bounded candidate set
// standing in for a native vector index (see DESIGN.md).

mod error;
pub mod filter;

pub use error::{IntoStoreErrorResult, StoreError, StoreResult};
pub use filter::Filter;

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

use crate::model::{CommentRecord, DuplicateReport, DuplicateVerdict, IssueRecord, SearchHit, Value as ExtraValue};
use crate::vecmath::{blob_to_vector, cosine_distance, vector_to_blob};

#[derive(Debug, Clone, Default)]
pub struct ProjectAggregations {
    pub issue_count: u64,
    pub issue_type_counts: BTreeMap<String, u64>,
    pub status_category_counts: BTreeMap<String, u64>,
    pub priority_counts: BTreeMap<String, u64>,
    pub top_assignees: Vec<(String, u64)>,
    pub top_labels: Vec<(String, u64)>,
    pub top_components: Vec<(String, u64)>,
}

pub struct VectorStore {
    pool: SqlitePool,
}

impl VectorStore {
    pub async fn connect(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> StoreResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS issues (
                issue_key TEXT PRIMARY KEY,
                project_key TEXT NOT NULL,
                vector BLOB NOT NULL,
                summary TEXT NOT NULL,
                description_preview TEXT NOT NULL,
                issue_type TEXT NOT NULL,
                status TEXT NOT NULL,
                status_category TEXT NOT NULL,
                priority TEXT,
                assignee TEXT,
                reporter TEXT NOT NULL,
                labels TEXT NOT NULL,
                components TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                resolved_at TEXT,
                parent_key TEXT,
                linked_issues TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                embedding_version TEXT NOT NULL,
                indexed_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_issues_project ON issues(project_key)")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "CREATE VIRTUAL TABLE IF NOT EXISTS issues_fts USING fts5(
                issue_key UNINDEXED, summary, description_preview
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS comments (
                comment_id TEXT PRIMARY KEY,
                issue_key TEXT NOT NULL,
                vector BLOB NOT NULL,
                body_preview TEXT NOT NULL,
                author TEXT NOT NULL,
                created_at TEXT NOT NULL,
                project_key TEXT NOT NULL,
                issue_type TEXT NOT NULL,
                issue_status TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                indexed_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_comments_issue ON comments(issue_key)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ---- writes -------------------------------------------------------

    /// Deduplicate by key (last occurrence wins), then append directly.
    /// Used after a project clear, where no existing rows can collide.
    pub async fn bulk_insert_issues(&self, records: &[IssueRecord]) -> StoreResult<u64> {
        let deduped = dedupe_last_wins(records, |r| r.issue_key.clone());
        let mut tx = self.pool.begin().await?;
        for record in &deduped {
            insert_issue(&mut tx, record).await?;
        }
        tx.commit().await?;
        Ok(deduped.len() as u64)
    }

    /// Partition by existence: delete-then-add for existing keys, append
    /// for new ones. Deduplicates within the batch first.
    pub async fn upsert_issues(&self, records: &[IssueRecord]) -> StoreResult<u64> {
        let deduped = dedupe_last_wins(records, |r| r.issue_key.clone());
        let mut tx = self.pool.begin().await?;
        for record in &deduped {
            sqlx::query("DELETE FROM issues WHERE issue_key = ?")
                .bind(&record.issue_key)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM issues_fts WHERE issue_key = ?")
                .bind(&record.issue_key)
                .execute(&mut *tx)
                .await?;
            insert_issue(&mut tx, record).await?;
        }
        tx.commit().await?;
        Ok(deduped.len() as u64)
    }

    pub async fn upsert_comments(&self, records: &[CommentRecord]) -> StoreResult<u64> {
        let deduped = dedupe_last_wins(records, |r| r.comment_id.clone());
        let mut tx = self.pool.begin().await?;
        for record in &deduped {
            sqlx::query("DELETE FROM comments WHERE comment_id = ?")
                .bind(&record.comment_id)
                .execute(&mut *tx)
                .await?;
            insert_comment(&mut tx, record).await?;
        }
        tx.commit().await?;
        Ok(deduped.len() as u64)
    }

    /// Delete all issues, optionally scoped to one project. Returns the
    /// number of deleted rows.
    pub async fn clear_issues(&self, project_key: Option<&str>) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await?;
        let deleted = match project_key {
            Some(project) => {
                sqlx::query("DELETE FROM issues_fts WHERE issue_key IN (SELECT issue_key FROM issues WHERE project_key = ?)")
                    .bind(project)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query("DELETE FROM issues WHERE project_key = ?")
                    .bind(project)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected()
            }
            None => {
                sqlx::query("DELETE FROM issues_fts").execute(&mut *tx).await?;
                sqlx::query("DELETE FROM issues").execute(&mut *tx).await?.rows_affected()
            }
        };
        tx.commit().await?;
        Ok(deleted)
    }

    /// Delete issues by id, batched by 500 to respect SQL IN-clause limits.
    pub async fn delete_issues_by_ids(&self, ids: &[String]) -> StoreResult<u64> {
        let mut total = 0u64;
        for batch in ids.chunks(500) {
            if batch.is_empty() {
                continue;
            }
            let placeholders = vec!["?"; batch.len()].join(", ");
            let mut tx = self.pool.begin().await?;
            let fts_sql = format!("DELETE FROM issues_fts WHERE issue_key IN ({placeholders})");
            let mut fts_query = sqlx::query(&fts_sql);
            for id in batch {
                fts_query = fts_query.bind(id);
            }
            fts_query.execute(&mut *tx).await?;

            let sql = format!("DELETE FROM issues WHERE issue_key IN ({placeholders})");
            let mut query = sqlx::query(&sql);
            for id in batch {
                query = query.bind(id);
            }
            let result = query.execute(&mut *tx).await?;
            tx.commit().await?;
            total += result.rows_affected();
        }
        Ok(total)
    }

    pub async fn get_issue_by_key(&self, key: &str) -> StoreResult<Option<IssueRecord>> {
        let row = sqlx::query("SELECT * FROM issues WHERE issue_key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| decode_issue_row(&r)).transpose()
    }

    pub async fn get_all_issue_ids(&self, project_key: Option<&str>) -> StoreResult<Vec<String>> {
        let rows = match project_key {
            Some(project) => {
                sqlx::query("SELECT issue_key FROM issues WHERE project_key = ?")
                    .bind(project)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => sqlx::query("SELECT issue_key FROM issues").fetch_all(&self.pool).await?,
        };
        Ok(rows.iter().map(|r| r.get("issue_key")).collect())
    }

    /// Load full issue records (vectors included) for a project, or for the
    /// whole store when `project_key` is `None`. Used by the insights
    /// engine, which needs the raw vectors rather than search hits.
    pub async fn get_issues_for_project(&self, project_key: Option<&str>) -> StoreResult<Vec<IssueRecord>> {
        let rows = match project_key {
            Some(project) => {
                sqlx::query("SELECT * FROM issues WHERE project_key = ?")
                    .bind(project)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => sqlx::query("SELECT * FROM issues").fetch_all(&self.pool).await?,
        };
        rows.iter().map(decode_issue_row).collect()
    }

    pub async fn get_comments_for_issue(&self, issue_key: &str) -> StoreResult<Vec<CommentRecord>> {
        let rows = sqlx::query("SELECT * FROM comments WHERE issue_key = ? ORDER BY created_at ASC")
            .bind(issue_key)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(decode_comment_row).collect()
    }

    // ---- search ---------------------------------------------------------

    /// Cosine-KNN search over the issues table. Fetches `5*(limit+offset)`
    /// raw candidates matching `filters`, scores them, drops anything below
    /// `min_score`, deduplicates by key (first occurrence wins), and
    /// paginates. Returns the page plus the total post-threshold count.
    pub async fn search_issues(
        &self,
        query_vec: &[f32],
        limit: usize,
        offset: usize,
        filters: &Filter,
        min_score: f32,
    ) -> StoreResult<(Vec<SearchHit>, usize)> {
        let cap = 5 * (limit + offset).max(1);
        let scored = self.scored_issue_candidates(query_vec, filters, cap, min_score).await?;
        let hits: Vec<(f32, SearchHit)> = scored
            .into_iter()
            .map(|(_, score, record)| (score, issue_record_to_hit(&record, score)))
            .collect();
        Ok(paginate_hits(hits, limit, offset))
    }

    /// Same scoring as `search_issues` but over the comments table, with no
    /// pagination (the caller takes the first `limit`).
    pub async fn search_comments(&self, query_vec: &[f32], limit: usize, filters: &Filter) -> StoreResult<Vec<SearchHit>> {
        let where_sql = filter::filter_to_sql(filters);
        let sql = format!("SELECT * FROM comments WHERE {where_sql} ORDER BY rowid DESC LIMIT ?");
        let cap = (5 * limit.max(1)) as i64;
        let rows = sqlx::query(&sql).bind(cap).fetch_all(&self.pool).await?;

        let mut scored = Vec::new();
        for row in &rows {
            let record = decode_comment_row(row)?;
            let score = 1.0 - cosine_distance(query_vec, &record.vector);
            scored.push((score.clamp(0.0, 1.0), comment_record_to_hit(&record, score.clamp(0.0, 1.0))));
        }
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored.into_iter().take(limit).map(|(_, hit)| hit).collect())
    }

    async fn scored_issue_candidates(
        &self,
        query_vec: &[f32],
        filters: &Filter,
        cap: usize,
        min_score: f32,
    ) -> StoreResult<Vec<(String, f32, IssueRecord)>> {
        let where_sql = filter::filter_to_sql(filters);
        let sql = format!("SELECT * FROM issues WHERE {where_sql} ORDER BY rowid DESC LIMIT ?");
        let rows = sqlx::query(&sql).bind(cap as i64).fetch_all(&self.pool).await?;

        let mut seen = std::collections::HashSet::new();
        let mut scored = Vec::new();
        for row in &rows {
            let record = decode_issue_row(row)?;
            if !seen.insert(record.issue_key.clone()) {
                continue;
            }
            let similarity = (1.0 - cosine_distance(query_vec, &record.vector)).clamp(0.0, 1.0);
            if similarity < min_score {
                continue;
            }
            scored.push((record.issue_key.clone(), similarity, record));
        }
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored)
    }

    /// Weighted fusion of vector similarity and lexical (FTS-or-LIKE) score.
    /// See SPEC_FULL.md §4.4.1 for the exact algorithm.
    pub async fn hybrid_search(
        &self,
        query_vec: &[f32],
        query_text: &str,
        limit: usize,
        offset: usize,
        filters: &Filter,
        fts_weight: f32,
        min_score: f32,
    ) -> StoreResult<(Vec<SearchHit>, usize)> {
        let vector_candidates = self
            .scored_issue_candidates(query_vec, filters, 3 * (limit + offset).max(1), min_score * 0.5)
            .await?;

        let fts_candidates = self.lexical_candidates(query_text, filters).await?;

        // Insertion-order-preserving fusion map: vector hits first (their
        // relative order is already similarity-descending), then any
        // lexical-only hits appended in the order they were found.
        let mut order: Vec<String> = Vec::new();
        let mut vector_scores: HashMap<String, f32> = HashMap::new();
        let mut records: HashMap<String, IssueRecord> = HashMap::new();
        for (key, score, record) in vector_candidates {
            vector_scores.insert(key.clone(), score);
            records.insert(key.clone(), record);
            order.push(key);
        }

        let mut fts_scores: HashMap<String, f32> = HashMap::new();
        for (key, score, record) in fts_candidates {
            if !vector_scores.contains_key(&key) {
                order.push(key.clone());
            }
            records.entry(key.clone()).or_insert(record);
            fts_scores.insert(key, score);
        }

        let mut fused = Vec::new();
        for key in order {
            let has_vector = vector_scores.contains_key(&key);
            let has_fts = fts_scores.contains_key(&key);
            // A candidate missing the side the current weighting relies on
            // exclusively has no real signal; treat it as absent instead of
            // scoring it 0, or it would leak into a pure-vector
            // (fts_weight=0) or pure-FTS (fts_weight=1) result set.
            if !has_fts && fts_weight >= 1.0 {
                continue;
            }
            if !has_vector && fts_weight <= 0.0 {
                continue;
            }
            let vector_score = vector_scores.get(&key).copied().unwrap_or(0.0);
            let fts_score = fts_scores.get(&key).copied().unwrap_or(0.0);
            let score = (1.0 - fts_weight) * vector_score + fts_weight * fts_score;
            if score < min_score {
                continue;
            }
            if let Some(record) = records.get(&key) {
                fused.push((key.clone(), score, record.clone()));
            }
        }
        fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let scored: Vec<(String, f32, IssueRecord)> = fused;
        let hits: Vec<(f32, SearchHit)> = scored
            .into_iter()
            .map(|(_, score, record)| (score, issue_record_to_hit(&record, score)))
            .collect();
        Ok(paginate_hits(hits, limit, offset))
    }

    /// Native FTS5 search on `summary`/`description_preview`; on failure
    /// (e.g. malformed query syntax) falls back to a case-insensitive LIKE
    /// scan. FTS hits get a baseline score of 0.5.
    async fn lexical_candidates(&self, query_text: &str, filters: &Filter) -> StoreResult<Vec<(String, f32, IssueRecord)>> {
        if query_text.trim().is_empty() {
            return Ok(Vec::new());
        }

        match self.fts_search(query_text, filters).await {
            Ok(results) if !results.is_empty() => Ok(results),
            Ok(_) => self.like_search(query_text, filters).await,
            Err(e) => {
                warn!("native full-text search failed, falling back to LIKE: {e}");
                self.like_search(query_text, filters).await
            }
        }
    }

    async fn fts_search(&self, query_text: &str, filters: &Filter) -> StoreResult<Vec<(String, f32, IssueRecord)>> {
        let escaped = sanitize_fts_query(query_text);
        if escaped.is_empty() {
            return Ok(Vec::new());
        }
        let where_sql = filter::filter_to_sql(filters);
        let sql = format!(
            "SELECT issues.* FROM issues_fts
             JOIN issues ON issues.issue_key = issues_fts.issue_key
             WHERE issues_fts MATCH ? AND {where_sql}
             LIMIT 200"
        );
        let rows = sqlx::query(&sql).bind(escaped).fetch_all(&self.pool).await?;
        let mut out = Vec::new();
        for row in &rows {
            let record = decode_issue_row(row)?;
            out.push((record.issue_key.clone(), 0.5, record));
        }
        Ok(out)
    }

    async fn like_search(&self, query_text: &str, filters: &Filter) -> StoreResult<Vec<(String, f32, IssueRecord)>> {
        let pattern = format!("%{}%", query_text.replace('%', "").replace('_', ""));
        let where_sql = filter::filter_to_sql(filters);
        let sql = format!(
            "SELECT * FROM issues WHERE {where_sql}
             AND (summary LIKE ? COLLATE NOCASE OR description_preview LIKE ? COLLATE NOCASE)
             LIMIT 200"
        );
        let rows = sqlx::query(&sql)
            .bind(&pattern)
            .bind(&pattern)
            .fetch_all(&self.pool)
            .await?;
        let mut out = Vec::new();
        for row in &rows {
            let record = decode_issue_row(row)?;
            out.push((record.issue_key.clone(), 0.5, record));
        }
        Ok(out)
    }

    // ---- analytics helpers ---------------------------------------------

    pub async fn get_project_aggregations(&self, project_key: &str) -> StoreResult<ProjectAggregations> {
        let rows = sqlx::query(
            "SELECT issue_type, status_category, priority, assignee, labels, components
             FROM issues WHERE project_key = ?",
        )
        .bind(project_key)
        .fetch_all(&self.pool)
        .await?;

        let mut agg = ProjectAggregations::default();
        let mut assignee_counts: HashMap<String, u64> = HashMap::new();
        let mut label_counts: HashMap<String, u64> = HashMap::new();
        let mut component_counts: HashMap<String, u64> = HashMap::new();

        for row in &rows {
            agg.issue_count += 1;
            let issue_type: String = row.get("issue_type");
            *agg.issue_type_counts.entry(issue_type).or_insert(0) += 1;

            let status_category: String = row.get("status_category");
            *agg.status_category_counts.entry(status_category).or_insert(0) += 1;

            if let Some(priority) = row.get::<Option<String>, _>("priority") {
                *agg.priority_counts.entry(priority).or_insert(0) += 1;
            }
            if let Some(assignee) = row.get::<Option<String>, _>("assignee") {
                *assignee_counts.entry(assignee).or_insert(0) += 1;
            }
            let labels: Vec<String> = parse_json_list(&row.get::<String, _>("labels"));
            for label in labels {
                *label_counts.entry(label).or_insert(0) += 1;
            }
            let components: Vec<String> = parse_json_list(&row.get::<String, _>("components"));
            for component in components {
                *component_counts.entry(component).or_insert(0) += 1;
            }
        }

        agg.top_assignees = top_n(assignee_counts, 10);
        agg.top_labels = top_n(label_counts, 10);
        agg.top_components = top_n(component_counts, 10);
        Ok(agg)
    }

    pub async fn get_recent_issues(&self, project_key: Option<&str>, days: i64, limit: usize) -> StoreResult<Vec<SearchHit>> {
        let cutoff = (Utc::now() - chrono::Duration::days(days)).to_rfc3339();
        let rows = match project_key {
            Some(project) => {
                sqlx::query(
                    "SELECT * FROM issues WHERE project_key = ? AND updated_at >= ?
                     ORDER BY updated_at DESC LIMIT ?",
                )
                .bind(project)
                .bind(&cutoff)
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM issues WHERE updated_at >= ? ORDER BY updated_at DESC LIMIT ?")
                    .bind(&cutoff)
                    .bind(limit as i64)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter()
            .map(|r| decode_issue_row(r).map(|record| issue_record_to_hit(&record, 0.0)))
            .collect()
    }

    /// Embed the candidate text and search the same project for near
    /// duplicates. `exclude_key` omits the candidate's own row if it is
    /// already indexed (e.g. re-checking an existing issue).
    pub async fn find_duplicates(
        &self,
        project_key: &str,
        candidate_vector: &[f32],
        exclude_key: Option<&str>,
        threshold: f32,
        similar_threshold: f32,
        limit: usize,
    ) -> StoreResult<DuplicateReport> {
        let mut filter = Filter::new();
        filter.insert("project_key".to_string(), serde_json::Value::String(project_key.to_string()));
        let (mut candidates, _total) = self.search_issues(candidate_vector, limit + 1, 0, &filter, 0.0).await?;
        if let Some(exclude) = exclude_key {
            candidates.retain(|hit| hit.key != exclude);
        }
        candidates.truncate(limit);

        let verdict = match candidates.first() {
            Some(top) if top.score >= threshold => DuplicateVerdict::DuplicateLikely,
            Some(top) if top.score >= similar_threshold => DuplicateVerdict::Similar,
            _ => DuplicateVerdict::Unique,
        };

        Ok(DuplicateReport { verdict, candidates })
    }

    /// Merge storage fragments if the underlying engine supports it. For
    /// the SQLite realization this runs `VACUUM`/`ANALYZE`; failures are
    /// logged, not propagated, since compaction is a maintenance nicety.
    pub async fn compact(&self) {
        if let Err(e) = sqlx::query("VACUUM").execute(&self.pool).await {
            warn!("compact: VACUUM failed: {e}");
        }
        if let Err(e) = sqlx::query("ANALYZE").execute(&self.pool).await {
            warn!("compact: ANALYZE failed: {e}");
        }
        debug!("vector store compaction complete");
    }
}

fn paginate_hits(scored: Vec<(f32, SearchHit)>, limit: usize, offset: usize) -> (Vec<SearchHit>, usize) {
    let total = scored.len();
    let page = scored.into_iter().skip(offset).take(limit).map(|(_, hit)| hit).collect();
    (page, total)
}

fn dedupe_last_wins<T: Clone>(records: &[T], key_of: impl Fn(&T) -> String) -> Vec<T> {
    let mut order: Vec<String> = Vec::new();
    let mut by_key: HashMap<String, T> = HashMap::new();
    for record in records {
        let key = key_of(record);
        if !by_key.contains_key(&key) {
            order.push(key.clone());
        }
        by_key.insert(key, record.clone());
    }
    order.into_iter().map(|k| by_key.remove(&k).unwrap()).collect()
}

fn top_n(counts: HashMap<String, u64>, n: usize) -> Vec<(String, u64)> {
    let mut entries: Vec<(String, u64)> = counts.into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    entries.truncate(n);
    entries
}

fn parse_json_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

fn sanitize_fts_query(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();
    cleaned
        .split_whitespace()
        .map(|word| format!("\"{word}\""))
        .collect::<Vec<_>>()
        .join(" OR ")
}

async fn insert_issue(tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>, record: &IssueRecord) -> StoreResult<()> {
    sqlx::query(
        "INSERT INTO issues (
            issue_key, project_key, vector, summary, description_preview, issue_type, status,
            status_category, priority, assignee, reporter, labels, components, created_at,
            updated_at, resolved_at, parent_key, linked_issues, content_hash, embedding_version, indexed_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&record.issue_key)
    .bind(&record.project_key)
    .bind(vector_to_blob(&record.vector))
    .bind(&record.summary)
    .bind(&record.description_preview)
    .bind(&record.issue_type)
    .bind(&record.status)
    .bind(&record.status_category)
    .bind(&record.priority)
    .bind(&record.assignee)
    .bind(&record.reporter)
    .bind(serde_json::to_string(&record.labels).unwrap())
    .bind(serde_json::to_string(&record.components).unwrap())
    .bind(record.created_at.to_rfc3339())
    .bind(record.updated_at.to_rfc3339())
    .bind(record.resolved_at.map(|d| d.to_rfc3339()))
    .bind(&record.parent_key)
    .bind(serde_json::to_string(&record.linked_issues).unwrap())
    .bind(&record.content_hash)
    .bind(&record.embedding_version)
    .bind(record.indexed_at.to_rfc3339())
    .execute(&mut **tx)
    .await?;

    sqlx::query("INSERT INTO issues_fts (issue_key, summary, description_preview) VALUES (?, ?, ?)")
        .bind(&record.issue_key)
        .bind(&record.summary)
        .bind(&record.description_preview)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn insert_comment(tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>, record: &CommentRecord) -> StoreResult<()> {
    sqlx::query(
        "INSERT INTO comments (
            comment_id, issue_key, vector, body_preview, author, created_at,
            project_key, issue_type, issue_status, content_hash, indexed_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&record.comment_id)
    .bind(&record.issue_key)
    .bind(vector_to_blob(&record.vector))
    .bind(&record.body_preview)
    .bind(&record.author)
    .bind(record.created_at.to_rfc3339())
    .bind(&record.project_key)
    .bind(&record.issue_type)
    .bind(&record.issue_status)
    .bind(&record.content_hash)
    .bind(record.indexed_at.to_rfc3339())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn decode_issue_row(row: &sqlx::sqlite::SqliteRow) -> StoreResult<IssueRecord> {
    let parse_dt = |s: String| -> StoreResult<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&s)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| StoreError::internal(format!("bad timestamp '{s}': {e}")))
    };

    Ok(IssueRecord {
        issue_key: row.get("issue_key"),
        project_key: row.get("project_key"),
        vector: blob_to_vector(&row.get::<Vec<u8>, _>("vector")),
        summary: row.get("summary"),
        description_preview: row.get("description_preview"),
        issue_type: row.get("issue_type"),
        status: row.get("status"),
        status_category: row.get("status_category"),
        priority: row.get("priority"),
        assignee: row.get("assignee"),
        reporter: row.get("reporter"),
        labels: parse_json_list(&row.get::<String, _>("labels")),
        components: parse_json_list(&row.get::<String, _>("components")),
        created_at: parse_dt(row.get("created_at"))?,
        updated_at: parse_dt(row.get("updated_at"))?,
        resolved_at: row.get::<Option<String>, _>("resolved_at").map(parse_dt).transpose()?,
        parent_key: row.get("parent_key"),
        linked_issues: parse_json_list(&row.get::<String, _>("linked_issues")),
        content_hash: row.get("content_hash"),
        embedding_version: row.get("embedding_version"),
        indexed_at: parse_dt(row.get("indexed_at"))?,
    })
}

fn decode_comment_row(row: &sqlx::sqlite::SqliteRow) -> StoreResult<CommentRecord> {
    let parse_dt = |s: String| -> StoreResult<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&s)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| StoreError::internal(format!("bad timestamp '{s}': {e}")))
    };
    Ok(CommentRecord {
        comment_id: row.get("comment_id"),
        issue_key: row.get("issue_key"),
        vector: blob_to_vector(&row.get::<Vec<u8>, _>("vector")),
        body_preview: row.get("body_preview"),
        author: row.get("author"),
        created_at: parse_dt(row.get("created_at"))?,
        project_key: row.get("project_key"),
        issue_type: row.get("issue_type"),
        issue_status: row.get("issue_status"),
        content_hash: row.get("content_hash"),
        indexed_at: parse_dt(row.get("indexed_at"))?,
    })
}

fn issue_record_to_hit(record: &IssueRecord, score: f32) -> SearchHit {
    let mut extras = BTreeMap::new();
    extras.insert("status_category".to_string(), ExtraValue::Str(record.status_category.clone()));
    if let Some(priority) = &record.priority {
        extras.insert("priority".to_string(), ExtraValue::Str(priority.clone()));
    }
    if let Some(assignee) = &record.assignee {
        extras.insert("assignee".to_string(), ExtraValue::Str(assignee.clone()));
    }
    extras.insert("labels".to_string(), ExtraValue::List(record.labels.clone()));
    extras.insert("components".to_string(), ExtraValue::List(record.components.clone()));
    extras.insert("created_at".to_string(), ExtraValue::Str(record.created_at.to_rfc3339()));
    extras.insert("updated_at".to_string(), ExtraValue::Str(record.updated_at.to_rfc3339()));

    SearchHit {
        key: record.issue_key.clone(),
        summary: record.summary.clone(),
        issue_type: record.issue_type.clone(),
        status: record.status.clone(),
        project_key: record.project_key.clone(),
        score,
        extras,
    }
}

fn comment_record_to_hit(record: &CommentRecord, score: f32) -> SearchHit {
    let mut extras = BTreeMap::new();
    extras.insert("author".to_string(), ExtraValue::Str(record.author.clone()));
    extras.insert("body_preview".to_string(), ExtraValue::Str(record.body_preview.clone()));
    extras.insert("comment_id".to_string(), ExtraValue::Str(record.comment_id.clone()));

    SearchHit {
        key: record.issue_key.clone(),
        summary: record.body_preview.clone(),
        issue_type: record.issue_type.clone(),
        status: record.issue_status.clone(),
        project_key: record.project_key.clone(),
        score,
        extras,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> VectorStore {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::connect(&dir.path().join("store.db")).await.unwrap();
        std::mem::forget(dir);
        store
    }

    fn sample_issue(key: &str, summary: &str, vector: Vec<f32>) -> IssueRecord {
        let now = Utc::now();
        IssueRecord {
            issue_key: key.to_string(),
            project_key: crate::model::project_key_of(key),
            vector,
            summary: summary.to_string(),
            description_preview: String::new(),
            issue_type: "Bug".to_string(),
            status: "Open".to_string(),
            status_category: "To Do".to_string(),
            priority: Some("High".to_string()),
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
    async fn bulk_insert_then_get_round_trips() {
        let store = test_store().await;
        let record = sample_issue("PROJ-1", "login bug", vec![1.0, 0.0, 0.0]);
        store.bulk_insert_issues(&[record.clone()]).await.unwrap();

        let fetched = store.get_issue_by_key("PROJ-1").await.unwrap().unwrap();
        assert_eq!(fetched.summary, "login bug");
        assert_eq!(fetched.vector, vec![1.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn bulk_insert_dedupes_last_wins() {
        let store = test_store().await;
        let first = sample_issue("PROJ-1", "first", vec![1.0, 0.0]);
        let second = sample_issue("PROJ-1", "second", vec![0.0, 1.0]);
        let inserted = store.bulk_insert_issues(&[first, second]).await.unwrap();
        assert_eq!(inserted, 1);
        let fetched = store.get_issue_by_key("PROJ-1").await.unwrap().unwrap();
        assert_eq!(fetched.summary, "second");
    }

    #[tokio::test]
    async fn clear_issues_scoped_to_project() {
        let store = test_store().await;
        store
            .bulk_insert_issues(&[sample_issue("PROJ-1", "a", vec![1.0]), sample_issue("OTHER-1", "b", vec![1.0])])
            .await
            .unwrap();
        let deleted = store.clear_issues(Some("PROJ")).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(store.get_issue_by_key("PROJ-1").await.unwrap().is_none());
        assert!(store.get_issue_by_key("OTHER-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn search_issues_ranks_by_similarity_and_respects_min_score() {
        let store = test_store().await;
        store
            .bulk_insert_issues(&[
                sample_issue("PROJ-1", "close match", vec![1.0, 0.0]),
                sample_issue("PROJ-2", "far match", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let (hits, total) = store
            .search_issues(&[1.0, 0.0], 10, 0, &Filter::new(), 0.5)
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key, "PROJ-1");
    }

    #[tokio::test]
    async fn search_issues_paginates() {
        let store = test_store().await;
        store
            .bulk_insert_issues(&[
                sample_issue("PROJ-1", "a", vec![1.0, 0.0]),
                sample_issue("PROJ-2", "b", vec![0.9, 0.1]),
                sample_issue("PROJ-3", "c", vec![0.8, 0.2]),
            ])
            .await
            .unwrap();
        let (page1, total) = store.search_issues(&[1.0, 0.0], 1, 0, &Filter::new(), 0.0).await.unwrap();
        let (page2, _) = store.search_issues(&[1.0, 0.0], 1, 1, &Filter::new(), 0.0).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(page1.len(), 1);
        assert_ne!(page1[0].key, page2[0].key);
    }

    #[tokio::test]
    async fn hybrid_search_with_zero_fts_weight_matches_vector_only() {
        let store = test_store().await;
        store
            .bulk_insert_issues(&[sample_issue("PROJ-1", "login bug", vec![1.0, 0.0])])
            .await
            .unwrap();
        let (vector_hits, _) = store.search_issues(&[1.0, 0.0], 10, 0, &Filter::new(), 0.0).await.unwrap();
        let (hybrid_hits, _) = store
            .hybrid_search(&[1.0, 0.0], "unrelated text", 10, 0, &Filter::new(), 0.0, 0.0)
            .await
            .unwrap();
        assert_eq!(vector_hits.len(), hybrid_hits.len());
        assert_eq!(vector_hits[0].score, hybrid_hits[0].score);
    }

    #[tokio::test]
    async fn hybrid_search_with_full_fts_weight_matches_fts_only() {
        let store = test_store().await;
        store
            .bulk_insert_issues(&[
                sample_issue("PROJ-1", "login bug", vec![1.0, 0.0]),
                sample_issue("PROJ-2", "unrelated vector neighbor", vec![0.99, 0.01]),
            ])
            .await
            .unwrap();
        // PROJ-2's vector is nearly identical to the query vector but its
        // summary doesn't match the query text at all.
        let (hybrid_hits, total) = store
            .hybrid_search(&[1.0, 0.0], "login", 10, 0, &Filter::new(), 1.0, 0.0)
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(hybrid_hits.len(), 1);
        assert_eq!(hybrid_hits[0].key, "PROJ-1");
        assert_eq!(hybrid_hits[0].score, 0.5);
    }

    #[tokio::test]
    async fn find_duplicates_flags_near_identical_vector() {
        let store = test_store().await;
        store
            .bulk_insert_issues(&[sample_issue("PROJ-1", "login bug on startup", vec![1.0, 0.0, 0.0])])
            .await
            .unwrap();
        let report = store
            .find_duplicates("PROJ", &[0.99, 0.01, 0.0], None, 0.85, 0.70, 5)
            .await
            .unwrap();
        assert_eq!(report.verdict, DuplicateVerdict::DuplicateLikely);
        assert_eq!(report.candidates[0].key, "PROJ-1");
    }
}
