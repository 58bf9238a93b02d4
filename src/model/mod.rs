// src/model/mod.rs
// Shared record shapes used across components.
//
// Mirrors the "dynamic mixed-type records" redesign flag: rather than a
// dictionary of `str -> Any`, search results carry a small tagged-union
// `Value` in their `extras` map for the handful of column kinds the store
// actually produces.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A Jira-style issue as read from the remote `IssueSource`, before it is
/// embedded or persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawIssue {
    pub key: String,
    pub summary: String,
    pub description: Option<String>,
    pub issue_type: String,
    pub status: String,
    pub status_category: String,
    pub priority: Option<String>,
    pub assignee: Option<String>,
    pub reporter: String,
    pub labels: Vec<String>,
    pub components: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub parent_key: Option<String>,
    pub linked_issues: Vec<String>,
}

impl RawIssue {
    pub fn project_key(&self) -> String {
        project_key_of(&self.key)
    }
}

/// Derive the project key from an issue key (`"PROJ-123" -> "PROJ"`).
pub fn project_key_of(issue_key: &str) -> String {
    issue_key
        .rsplit_once('-')
        .map(|(project, _)| project.to_string())
        .unwrap_or_else(|| issue_key.to_string())
}

/// A raw comment as read from the remote `IssueSource`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawComment {
    pub comment_id: String,
    pub issue_key: String,
    pub author: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// A fully-assembled, embedded issue record ready for the vector store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueRecord {
    pub issue_key: String,
    pub project_key: String,
    pub vector: Vec<f32>,
    pub summary: String,
    pub description_preview: String,
    pub issue_type: String,
    pub status: String,
    pub status_category: String,
    pub priority: Option<String>,
    pub assignee: Option<String>,
    pub reporter: String,
    pub labels: Vec<String>,
    pub components: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub parent_key: Option<String>,
    pub linked_issues: Vec<String>,
    pub content_hash: String,
    pub embedding_version: String,
    pub indexed_at: DateTime<Utc>,
}

/// A fully-assembled, embedded comment record ready for the vector store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentRecord {
    pub comment_id: String,
    pub issue_key: String,
    pub vector: Vec<f32>,
    pub body_preview: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub project_key: String,
    pub issue_type: String,
    pub issue_status: String,
    pub content_hash: String,
    pub indexed_at: DateTime<Utc>,
}

/// Persisted sync state singleton (`{db_path}/sync_state.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncState {
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_issue_updated: Option<DateTime<Utc>>,
    pub projects_synced: Vec<String>,
    pub total_issues_indexed: u64,
    pub total_comments_indexed: u64,
    pub embedding_model: String,
    pub embedding_version: String,
    pub checkpoint_project: Option<String>,
    pub checkpoint_offset: u64,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            last_sync_at: None,
            last_issue_updated: None,
            projects_synced: Vec::new(),
            total_issues_indexed: 0,
            total_comments_indexed: 0,
            embedding_model: String::new(),
            embedding_version: "1".to_string(),
            checkpoint_project: None,
            checkpoint_offset: 0,
        }
    }
}

/// Result of a single `full_sync`/`incremental_sync` run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncResult {
    pub issues_processed: u64,
    pub issues_embedded: u64,
    pub issues_skipped: u64,
    pub issues_deleted: u64,
    pub comments_processed: u64,
    pub comments_embedded: u64,
    pub errors: Vec<String>,
    pub duration_seconds: f64,
}

/// A single filterable/sortable scalar value, covering the kinds the store
/// actually produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Str(String),
    Num(f64),
    Bool(bool),
    List(Vec<String>),
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s}"),
            Value::Num(n) => write!(f, "{n}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::List(items) => write!(f, "{}", items.join(", ")),
        }
    }
}

/// A single search result, returned by both pure vector and hybrid search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub key: String,
    pub summary: String,
    pub issue_type: String,
    pub status: String,
    pub project_key: String,
    pub score: f32,
    pub extras: BTreeMap<String, Value>,
}

/// Duplicate-detection verdict for `find_duplicates`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DuplicateVerdict {
    DuplicateLikely,
    Similar,
    Unique,
}

impl std::fmt::Display for DuplicateVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DuplicateVerdict::DuplicateLikely => "DUPLICATE_LIKELY",
            DuplicateVerdict::Similar => "SIMILAR",
            DuplicateVerdict::Unique => "UNIQUE",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateReport {
    pub verdict: DuplicateVerdict,
    pub candidates: Vec<SearchHit>,
}
