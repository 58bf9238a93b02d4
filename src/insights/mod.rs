// src/insights/mod.rs
// Analytics over the indexed issue set: clustering, trend windows, bug
// pattern detection and velocity metrics. CPU-bound vector work (K-means,
// pairwise similarity grouping) runs on `spawn_blocking` so it never blocks
// the async runtime's worker threads.

mod error;
mod keywords;
mod kmeans;

pub use error::{InsightsError, InsightsResult};

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::model::IssueRecord;
use crate::store::VectorStore;
use crate::vecmath::{l2_distance, normalize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub cluster_id: usize,
    pub size: usize,
    pub representative_keys: Vec<String>,
    pub top_labels: Vec<(String, u64)>,
    pub top_components: Vec<(String, u64)>,
    pub top_keywords: Vec<(String, usize)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendWindow {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub created_count: u64,
    pub resolved_count: u64,
    pub net: i64,
    pub type_counts: BTreeMap<String, u64>,
    pub priority_counts: BTreeMap<String, u64>,
    pub top_labels: Vec<(String, u64)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BugPatternGroup {
    pub sample_keys: Vec<String>,
    pub size: usize,
    pub common_terms: Vec<(String, usize)>,
    pub status_counts: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyVelocity {
    pub week_start: DateTime<Utc>,
    pub created: u64,
    pub resolved: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VelocityMetrics {
    pub weeks: Vec<WeeklyVelocity>,
    pub avg_created: f64,
    pub avg_resolved: f64,
    pub trend: String,
}

pub struct InsightsEngine {
    store: Arc<VectorStore>,
}

impl InsightsEngine {
    pub fn new(store: Arc<VectorStore>) -> Self {
        Self { store }
    }

    pub async fn cluster_issues(&self, project: Option<&str>, n_clusters: usize, min_size: usize) -> InsightsResult<Vec<ClusterSummary>> {
        let records = self.store.get_issues_for_project(project).await?;
        if records.len() < n_clusters * min_size || n_clusters == 0 {
            return Ok(Vec::new());
        }

        let vectors: Vec<Vec<f32>> = records.iter().map(|r| r.vector.clone()).collect();
        let (assignments, centroids) = tokio::task::spawn_blocking(move || kmeans::kmeans(&vectors, n_clusters, kmeans::CLUSTER_SEED)).await?;

        let mut members: Vec<Vec<usize>> = vec![Vec::new(); n_clusters];
        for (i, &cluster) in assignments.iter().enumerate() {
            members[cluster].push(i);
        }

        let mut summaries = Vec::new();
        for (cluster_id, indices) in members.into_iter().enumerate() {
            if indices.len() < min_size {
                continue;
            }
            let centroid = &centroids[cluster_id];
            let mut by_distance: Vec<(usize, f32)> = indices.iter().map(|&i| (i, l2_distance(&records[i].vector, centroid))).collect();
            by_distance.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
            let representative_keys = by_distance.iter().take(3).map(|(i, _)| records[*i].issue_key.clone()).collect();

            let cluster_records: Vec<&IssueRecord> = indices.iter().map(|&i| &records[i]).collect();
            let top_labels = top_n_counts(cluster_records.iter().flat_map(|r| r.labels.iter().cloned()), 5);
            let top_components = top_n_counts(cluster_records.iter().flat_map(|r| r.components.iter().cloned()), 5);
            let summaries_text: Vec<String> = cluster_records.iter().map(|r| r.summary.clone()).collect();
            let top_keywords = keywords::extract_keywords(&summaries_text, 5);

            summaries.push(ClusterSummary {
                cluster_id,
                size: indices.len(),
                representative_keys,
                top_labels,
                top_components,
                top_keywords,
            });
        }

        summaries.sort_by(|a, b| b.size.cmp(&a.size));
        Ok(summaries)
    }

    pub async fn analyze_trends(&self, project: Option<&str>, days: i64, period_days: i64) -> InsightsResult<Vec<TrendWindow>> {
        let records = self.store.get_issues_for_project(project).await?;
        let now = Utc::now();
        let range_start = now - Duration::days(days);
        let period = Duration::days(period_days.max(1));

        let mut windows = Vec::new();
        let mut window_start = range_start;
        while window_start < now {
            let window_end = (window_start + period).min(now);
            let in_window: Vec<&IssueRecord> = records
                .iter()
                .filter(|r| r.created_at >= window_start && r.created_at < window_end)
                .collect();
            let resolved_count = records
                .iter()
                .filter(|r| r.resolved_at.is_some_and(|d| d >= window_start && d < window_end))
                .count() as u64;

            let type_counts = count_by(in_window.iter().map(|r| r.issue_type.clone()));
            let priority_counts = count_by(in_window.iter().filter_map(|r| r.priority.clone()));
            let top_labels = top_n_counts(in_window.iter().flat_map(|r| r.labels.iter().cloned()), 5);

            windows.push(TrendWindow {
                window_start,
                window_end,
                created_count: in_window.len() as u64,
                resolved_count,
                net: in_window.len() as i64 - resolved_count as i64,
                type_counts,
                priority_counts,
                top_labels,
            });

            window_start = window_end;
        }

        Ok(windows)
    }

    pub async fn find_bug_patterns(&self, project: Option<&str>, min_similarity: f32) -> InsightsResult<Vec<BugPatternGroup>> {
        let mut records = self.store.get_issues_for_project(project).await?;
        records.retain(|r| r.issue_type == "Bug");
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let normalized: Vec<Vec<f32>> = records.iter().map(|r| normalize(&r.vector)).collect();
        let groups = tokio::task::spawn_blocking(move || group_by_similarity(&normalized, min_similarity)).await?;

        let mut patterns = Vec::new();
        for indices in groups {
            if indices.len() < 2 {
                continue;
            }
            let group_records: Vec<&IssueRecord> = indices.iter().map(|&i| &records[i]).collect();
            let sample_keys = group_records.iter().take(3).map(|r| r.issue_key.clone()).collect();
            let summaries: Vec<String> = group_records.iter().map(|r| r.summary.clone()).collect();
            let common_terms = keywords::extract_keywords(&summaries, 3);
            let status_counts = count_by(group_records.iter().map(|r| r.status.clone()));

            patterns.push(BugPatternGroup {
                sample_keys,
                size: indices.len(),
                common_terms,
                status_counts,
            });
        }

        patterns.sort_by(|a, b| b.size.cmp(&a.size));
        patterns.truncate(10);
        Ok(patterns)
    }

    pub async fn get_velocity_metrics(&self, project: &str, weeks: usize) -> InsightsResult<VelocityMetrics> {
        let records = self.store.get_issues_for_project(Some(project)).await?;
        let now = Utc::now();
        let weeks = weeks.max(1);

        let mut weekly = Vec::with_capacity(weeks);
        for week in (0..weeks).rev() {
            let window_end = now - Duration::weeks(week as i64);
            let window_start = window_end - Duration::weeks(1);
            let created = records.iter().filter(|r| r.created_at >= window_start && r.created_at < window_end).count() as u64;
            let resolved = records
                .iter()
                .filter(|r| r.resolved_at.is_some_and(|d| d >= window_start && d < window_end))
                .count() as u64;
            weekly.push(WeeklyVelocity {
                week_start: window_start,
                created,
                resolved,
            });
        }

        let avg_created = weekly.iter().map(|w| w.created as f64).sum::<f64>() / weeks as f64;
        let avg_resolved = weekly.iter().map(|w| w.resolved as f64).sum::<f64>() / weeks as f64;
        let trend = if avg_created > avg_resolved { "growing" } else { "shrinking" }.to_string();

        Ok(VelocityMetrics {
            weeks: weekly,
            avg_created,
            avg_resolved,
            trend,
        })
    }
}

/// Union-find-free pairwise grouping: `1 - L2(a,b)/2` on normalized vectors
/// as the similarity measure, matching the design notes' derivation.
fn group_by_similarity(normalized: &[Vec<f32>], min_similarity: f32) -> Vec<Vec<usize>> {
    let mut visited = vec![false; normalized.len()];
    let mut groups = Vec::new();

    for i in 0..normalized.len() {
        if visited[i] {
            continue;
        }
        let mut group = vec![i];
        visited[i] = true;
        for j in (i + 1)..normalized.len() {
            if visited[j] {
                continue;
            }
            let similarity = 1.0 - l2_distance(&normalized[i], &normalized[j]) / 2.0;
            if similarity >= min_similarity {
                group.push(j);
                visited[j] = true;
            }
        }
        groups.push(group);
    }
    groups
}

fn count_by(items: impl Iterator<Item = String>) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    for item in items {
        *counts.entry(item).or_insert(0) += 1;
    }
    counts
}

fn top_n_counts(items: impl Iterator<Item = String>, n: usize) -> Vec<(String, u64)> {
    let mut order = Vec::new();
    let mut counts: HashMap<String, u64> = HashMap::new();
    for item in items {
        if !counts.contains_key(&item) {
            order.push(item.clone());
        }
        *counts.entry(item).or_insert(0) += 1;
    }
    let mut ranked: Vec<(String, u64)> = order.into_iter().map(|k| {
        let c = counts[&k];
        (k, c)
    }).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.truncate(n);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    async fn test_store() -> VectorStore {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::connect(&dir.path().join("store.db")).await.unwrap();
        std::mem::forget(dir);
        store
    }

    fn sample_issue(key: &str, summary: &str, vector: Vec<f32>, issue_type: &str, created_at: DateTime<Utc>) -> IssueRecord {
        IssueRecord {
            issue_key: key.to_string(),
            project_key: crate::model::project_key_of(key),
            vector,
            summary: summary.to_string(),
            description_preview: String::new(),
            issue_type: issue_type.to_string(),
            status: "Open".to_string(),
            status_category: "To Do".to_string(),
            priority: Some("High".to_string()),
            assignee: None,
            reporter: "jdoe".to_string(),
            labels: vec!["auth".to_string()],
            components: vec![],
            created_at,
            updated_at: created_at,
            resolved_at: None,
            parent_key: None,
            linked_issues: vec![],
            content_hash: "hash".to_string(),
            embedding_version: "1".to_string(),
            indexed_at: created_at,
        }
    }

    #[tokio::test]
    async fn cluster_issues_returns_empty_below_capacity() {
        let store = test_store().await;
        store.bulk_insert_issues(&[sample_issue("PROJ-1", "login bug", vec![1.0, 0.0], "Bug", Utc::now())]).await.unwrap();
        let engine = InsightsEngine::new(Arc::new(store));
        let clusters = engine.cluster_issues(None, 2, 5).await.unwrap();
        assert!(clusters.is_empty());
    }

    #[tokio::test]
    async fn cluster_issues_groups_similar_vectors_together() {
        let store = test_store().await;
        let now = Utc::now();
        let records = vec![
            sample_issue("PROJ-1", "login fails for user", vec![1.0, 0.0], "Bug", now),
            sample_issue("PROJ-2", "login broken after update", vec![0.9, 0.1], "Bug", now),
            sample_issue("PROJ-3", "export to csv crashes", vec![0.0, 1.0], "Bug", now),
            sample_issue("PROJ-4", "csv export produces garbage", vec![0.1, 0.9], "Bug", now),
        ];
        store.bulk_insert_issues(&records).await.unwrap();

        let engine = InsightsEngine::new(Arc::new(store));
        let clusters = engine.cluster_issues(None, 2, 2).await.unwrap();
        assert_eq!(clusters.len(), 2);
        assert!(clusters.iter().all(|c| c.size == 2));
    }

    #[tokio::test]
    async fn find_bug_patterns_groups_near_duplicate_bugs() {
        let store = test_store().await;
        let now = Utc::now();
        let records = vec![
            sample_issue("PROJ-1", "login fails on startup", vec![1.0, 0.0, 0.0], "Bug", now),
            sample_issue("PROJ-2", "login failure on startup", vec![0.99, 0.01, 0.0], "Bug", now),
            sample_issue("PROJ-3", "unrelated export issue", vec![0.0, 0.0, 1.0], "Bug", now),
        ];
        store.bulk_insert_issues(&records).await.unwrap();

        let engine = InsightsEngine::new(Arc::new(store));
        let patterns = engine.find_bug_patterns(None, 0.9).await.unwrap();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].size, 2);
    }

    #[tokio::test]
    async fn velocity_metrics_computes_trend_direction() {
        let store = test_store().await;
        let now = Utc::now();
        let records = vec![
            sample_issue("PROJ-1", "a", vec![1.0], "Bug", now),
            sample_issue("PROJ-2", "b", vec![1.0], "Bug", now),
            sample_issue("PROJ-3", "c", vec![1.0], "Bug", now),
        ];
        store.bulk_insert_issues(&records).await.unwrap();

        let engine = InsightsEngine::new(Arc::new(store));
        let metrics = engine.get_velocity_metrics("PROJ", 2).await.unwrap();
        assert_eq!(metrics.weeks.len(), 2);
        assert_eq!(metrics.trend, "growing");
    }
}
