// tests/common/mod.rs
// Hand-written fakes shared across integration tests: no mocking framework,
// matching the corpus's own testing style.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ivdex::embedding::{EmbeddingProvider, EmbeddingResult};
use ivdex::model::{RawComment, RawIssue};
use ivdex::self_query::{ChatProvider, SelfQueryResult};
use ivdex::sync::{IssuePage, IssueSource, SyncResult};
use tokio::sync::Mutex as AsyncMutex;

/// Feeds a fixed queue of issue pages per project and simulates remote
/// deletions via `delete_remotely`.
pub struct FakeIssueSource {
    pages_by_project: AsyncMutex<HashMap<String, Vec<Vec<RawIssue>>>>,
    projects: Vec<String>,
    deleted_from_remote: Mutex<HashSet<String>>,
}

impl FakeIssueSource {
    pub fn new(projects: Vec<&str>, pages_by_project: HashMap<&str, Vec<Vec<RawIssue>>>) -> Self {
        let pages = pages_by_project.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        Self {
            pages_by_project: AsyncMutex::new(pages),
            projects: projects.into_iter().map(String::from).collect(),
            deleted_from_remote: Mutex::new(HashSet::new()),
        }
    }

    pub fn delete_remotely(&self, key: &str) {
        self.deleted_from_remote.lock().unwrap().insert(key.to_string());
    }
}

#[async_trait]
impl IssueSource for FakeIssueSource {
    async fn list_projects(&self) -> SyncResult<Vec<String>> {
        Ok(self.projects.clone())
    }

    async fn fetch_issue_page(&self, page: &IssuePage) -> SyncResult<Vec<RawIssue>> {
        let mut pages = self.pages_by_project.lock().await;
        let queue = pages.entry(page.project_key.clone()).or_default();
        if queue.is_empty() {
            return Ok(Vec::new());
        }
        Ok(queue.remove(0))
    }

    async fn fetch_comments(&self, _issue_key: &str) -> SyncResult<Vec<RawComment>> {
        Ok(Vec::new())
    }

    async fn existing_keys(&self, _project_key: &str, keys: &[String]) -> SyncResult<HashSet<String>> {
        let deleted = self.deleted_from_remote.lock().unwrap();
        Ok(keys.iter().filter(|k| !deleted.contains(*k)).cloned().collect())
    }
}

pub fn sample_issue(key: &str, summary: &str, updated_at: DateTime<Utc>) -> RawIssue {
    RawIssue {
        key: key.to_string(),
        summary: summary.to_string(),
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

/// A deterministic bag-of-words embedding over a small fixed vocabulary, so
/// cosine similarity in tests tracks lexical overlap instead of being
/// arbitrary. Unknown words fall into a shared catch-all dimension.
pub struct KeywordEmbeddingProvider {
    vocabulary: Vec<&'static str>,
}

impl KeywordEmbeddingProvider {
    pub fn new(vocabulary: Vec<&'static str>) -> Self {
        Self { vocabulary }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.vocabulary.len() + 1];
        let lowercase = text.to_lowercase();
        for word in lowercase.split_whitespace() {
            match self.vocabulary.iter().position(|v| *v == word) {
                Some(idx) => vector[idx] += 1.0,
                None => *vector.last_mut().unwrap() += 1.0,
            }
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.vocabulary.len() + 1
    }
}

/// Always returns a fixed JSON body, for self-query parser tests.
pub struct StaticChatProvider {
    pub response: String,
}

#[async_trait]
impl ChatProvider for StaticChatProvider {
    async fn complete(&self, _system_prompt: &str, _user_message: &str) -> SelfQueryResult<String> {
        Ok(self.response.clone())
    }
}
