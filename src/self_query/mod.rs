// src/self_query/mod.rs
// Natural-language query parsing: an LLM turns a free-text query into a
// semantic-search string plus structured filters in the Vector Store's own
// DSL, so the two components share one representation with no translation
// layer.

mod dates;
mod error;

pub use error::{SelfQueryError, SelfQueryResult};

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::store::Filter;

/// Anything capable of a single-shot chat completion at temperature 0. The
/// OpenAI-backed implementation lives in `provider::openai`; tests supply
/// hand-written fakes.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_message: &str) -> SelfQueryResult<String>;
}

pub mod provider;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ParsedQuery {
    pub semantic_query: String,
    pub filters: Filter,
    pub interpretation: String,
    pub confidence: f32,
    pub raw_query: String,
}

struct FieldSpec {
    name: &'static str,
    description: &'static str,
    operators: &'static [&'static str],
    enum_values: &'static [&'static str],
}

const FIELD_SCHEMA: &[FieldSpec] = &[
    FieldSpec {
        name: "project_key",
        description: "Jira project key (e.g., 'PROJ', 'ENG', 'PLATFORM')",
        operators: &["$eq", "$in"],
        enum_values: &[],
    },
    FieldSpec {
        name: "issue_type",
        description: "Type of issue: Bug, Story, Task, Epic, Sub-task",
        operators: &["$eq", "$in"],
        enum_values: &["Bug", "Story", "Task", "Epic", "Sub-task"],
    },
    FieldSpec {
        name: "status",
        description: "Issue status (e.g., 'Open', 'In Progress', 'Done')",
        operators: &["$eq", "$in", "$ne"],
        enum_values: &[],
    },
    FieldSpec {
        name: "status_category",
        description: "Status category: 'To Do', 'In Progress', 'Done'",
        operators: &["$eq", "$ne"],
        enum_values: &["To Do", "In Progress", "Done"],
    },
    FieldSpec {
        name: "priority",
        description: "Issue priority (e.g., 'Critical', 'High', 'Medium', 'Low')",
        operators: &["$eq", "$in"],
        enum_values: &["Critical", "High", "Medium", "Low", "Lowest"],
    },
    FieldSpec {
        name: "assignee",
        description: "Person assigned to the issue (username or display name)",
        operators: &["$eq", "$in"],
        enum_values: &[],
    },
    FieldSpec {
        name: "reporter",
        description: "Person who created the issue",
        operators: &["$eq"],
        enum_values: &[],
    },
    FieldSpec {
        name: "labels",
        description: "Labels attached to the issue",
        operators: &["$contains"],
        enum_values: &[],
    },
    FieldSpec {
        name: "components",
        description: "Components the issue belongs to",
        operators: &["$contains"],
        enum_values: &[],
    },
    FieldSpec {
        name: "created_at",
        description: "When the issue was created",
        operators: &["$gte", "$lte", "$gt", "$lt"],
        enum_values: &[],
    },
    FieldSpec {
        name: "updated_at",
        description: "When the issue was last updated",
        operators: &["$gte", "$lte", "$gt", "$lt"],
        enum_values: &[],
    },
];

lazy_static! {
    static ref SYSTEM_PROMPT_TEMPLATE: String = {
        let mut schema_lines = Vec::new();
        for field in FIELD_SCHEMA {
            let ops = field.operators.join(", ");
            if field.enum_values.is_empty() {
                schema_lines.push(format!("- {}: {}. Ops: {}", field.name, field.description, ops));
            } else {
                schema_lines.push(format!(
                    "- {}: {}. Ops: {}. Values: {}",
                    field.name,
                    field.description,
                    ops,
                    field.enum_values.join(", ")
                ));
            }
        }
        format!(
            "You are a query parser for an issue search system. Extract structured \
filters and semantic search terms from natural language queries.\n\n\
## Available Fields for Filtering\n\n{}\n\n\
## Instructions\n\n\
1. Extract any explicit filters mentioned in the query\n\
2. Identify the semantic search portion (what to search for by meaning)\n\
3. Return a JSON object with:\n\
   - \"semantic_query\": string - the part to search semantically (empty if filter-only)\n\
   - \"filters\": object - structured filters using field names and operators\n\
   - \"interpretation\": string - brief explanation of how you interpreted the query\n\n\
## Filter Format\n\n\
- Simple equality: {{\"field\": \"value\"}}\n\
- Operators: {{\"field\": {{\"$op\": \"value\"}}}}\n\
- Multiple values: {{\"field\": {{\"$in\": [\"val1\", \"val2\"]}}}}\n\
- Date comparisons: {{\"created_at\": {{\"$gte\": \"2024-01-01\"}}}}\n\n\
## Date Handling\n\n\
For relative dates like \"last week\", \"last month\", \"last 30 days\", use the marker:\n\
{{\"created_at\": {{\"$gte\": \"RELATIVE:last month\"}}}}\n\n\
The system will resolve these to actual dates.\n\n\
## Important Rules\n\n\
1. Be conservative - only add filters when explicitly mentioned or clearly implied\n\
2. If something is ambiguous, put it in semantic_query instead of filters\n\
3. Project keys are usually UPPERCASE (e.g., PROJ, ENG, PLATFORM)\n\
4. Common synonyms: \"bugs\" = Bug, \"stories\" = Story, \"tasks\" = Task\n\
5. \"open\" usually means status_category != \"Done\"\n\
6. \"closed\" or \"done\" means status_category = \"Done\"\n\
7. \"in progress\" means status_category = \"In Progress\"\n\n\
Return ONLY valid JSON, no markdown or explanation outside the JSON.",
            schema_lines.join("\n")
        )
    };
}

#[derive(Deserialize)]
struct LlmResponseBody {
    #[serde(default)]
    semantic_query: String,
    #[serde(default)]
    filters: Filter,
    #[serde(default)]
    interpretation: String,
}

struct CacheEntry {
    value: ParsedQuery,
    inserted_at: Instant,
}

pub struct SelfQueryParser {
    provider: Box<dyn ChatProvider>,
    cache: Mutex<HashMap<String, CacheEntry>>,
    cache_ttl: Duration,
    cache_cap: usize,
}

impl SelfQueryParser {
    pub fn new(provider: Box<dyn ChatProvider>, cache_ttl_seconds: u64, cache_cap: usize) -> Self {
        Self {
            provider,
            cache: Mutex::new(HashMap::new()),
            cache_ttl: Duration::from_secs(cache_ttl_seconds),
            cache_cap: cache_cap.max(1),
        }
    }

    fn cache_key(query: &str) -> String {
        format!("{:x}", md5::compute(query.trim().to_lowercase().as_bytes()))
    }

    pub async fn parse(&self, query: &str) -> ParsedQuery {
        if query.trim().is_empty() {
            return ParsedQuery {
                semantic_query: String::new(),
                filters: Filter::new(),
                interpretation: "Empty query".to_string(),
                confidence: 0.0,
                raw_query: query.to_string(),
            };
        }

        let key = Self::cache_key(query);
        if let Some(cached) = self.cached(&key) {
            let mut result = cached;
            result.raw_query = query.to_string();
            return result;
        }

        let parsed = match self.provider.complete(&SYSTEM_PROMPT_TEMPLATE, query).await {
            Ok(content) => {
                let mut parsed = parse_llm_response(&content, query);
                self.store(&key, parsed.clone());
                parsed.filters = resolve_relative_dates(parsed.filters);
                parsed
            }
            Err(e) => {
                warn!("self-query LLM call failed for '{query}': {e}");
                ParsedQuery {
                    semantic_query: query.to_string(),
                    filters: Filter::new(),
                    interpretation: "Fallback: treating entire query as semantic search".to_string(),
                    confidence: 0.5,
                    raw_query: query.to_string(),
                }
            }
        };
        parsed
    }

    fn cached(&self, key: &str) -> Option<ParsedQuery> {
        let cache = self.cache.lock().unwrap();
        cache.get(key).and_then(|entry| {
            if entry.inserted_at.elapsed() <= self.cache_ttl {
                Some(entry.value.clone())
            } else {
                None
            }
        })
    }

    /// Cache before relative-date resolution, so the cached entry is
    /// reusable regardless of when it is next read.
    fn store(&self, key: &str, value: ParsedQuery) {
        let mut cache = self.cache.lock().unwrap();
        if cache.len() >= self.cache_cap && !cache.contains_key(key) {
            evict_oldest(&mut cache, self.cache_cap / 10);
        }
        cache.insert(
            key.to_string(),
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }
}

fn evict_oldest(cache: &mut HashMap<String, CacheEntry>, count: usize) {
    let mut keys: Vec<(String, Instant)> = cache.iter().map(|(k, v)| (k.clone(), v.inserted_at)).collect();
    keys.sort_by_key(|(_, inserted_at)| *inserted_at);
    for (key, _) in keys.into_iter().take(count.max(1)) {
        cache.remove(&key);
    }
}

fn parse_llm_response(content: &str, original_query: &str) -> ParsedQuery {
    let trimmed = strip_markdown_fences(content.trim());
    match serde_json::from_str::<LlmResponseBody>(trimmed) {
        Ok(body) => ParsedQuery {
            semantic_query: body.semantic_query,
            filters: body.filters,
            interpretation: body.interpretation,
            confidence: 0.9,
            raw_query: original_query.to_string(),
        },
        Err(e) => {
            warn!("failed to parse self-query LLM JSON response: {e}");
            ParsedQuery {
                semantic_query: original_query.to_string(),
                filters: Filter::new(),
                interpretation: "Failed to parse LLM response".to_string(),
                confidence: 0.3,
                raw_query: original_query.to_string(),
            }
        }
    }
}

fn strip_markdown_fences(content: &str) -> &str {
    let without_prefix = content
        .strip_prefix("```json")
        .or_else(|| content.strip_prefix("```"))
        .unwrap_or(content)
        .trim_start();
    without_prefix.strip_suffix("```").unwrap_or(without_prefix).trim()
}

fn resolve_relative_dates(filters: Filter) -> Filter {
    let mut resolved = Map::new();
    for (field, value) in filters {
        match value {
            Value::Object(ops) => {
                let mut resolved_ops = Map::new();
                for (op, operand) in ops {
                    let resolved_operand = match &operand {
                        Value::String(s) if s.starts_with("RELATIVE:") => {
                            let expr = &s[9..];
                            match dates::parse_date_expression(expr) {
                                Some(resolved_date) => Value::String(resolved_date.to_rfc3339()),
                                None => operand,
                            }
                        }
                        _ => operand,
                    };
                    resolved_ops.insert(op, resolved_operand);
                }
                resolved.insert(field, Value::Object(resolved_ops));
            }
            other => {
                resolved.insert(field, other);
            }
        }
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct StaticProvider {
        response: String,
    }

    #[async_trait]
    impl ChatProvider for StaticProvider {
        async fn complete(&self, _system_prompt: &str, _user_message: &str) -> SelfQueryResult<String> {
            Ok(self.response.clone())
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl ChatProvider for FailingProvider {
        async fn complete(&self, _system_prompt: &str, _user_message: &str) -> SelfQueryResult<String> {
            Err(SelfQueryError::provider_failure("unreachable"))
        }
    }

    #[tokio::test]
    async fn empty_query_short_circuits_with_zero_confidence() {
        let parser = SelfQueryParser::new(Box::new(FailingProvider), 300, 1000);
        let result = parser.parse("   ").await;
        assert_eq!(result.confidence, 0.0);
        assert!(result.filters.is_empty());
    }

    #[tokio::test]
    async fn well_formed_json_parses_with_high_confidence() {
        let body = json!({
            "semantic_query": "auth authentication",
            "filters": {"issue_type": "Bug"},
            "interpretation": "Auth bugs"
        })
        .to_string();
        let parser = SelfQueryParser::new(Box::new(StaticProvider { response: body }), 300, 1000);
        let result = parser.parse("auth bugs").await;
        assert_eq!(result.confidence, 0.9);
        assert_eq!(result.semantic_query, "auth authentication");
        assert_eq!(result.filters.get("issue_type").unwrap(), "Bug");
    }

    #[tokio::test]
    async fn markdown_fenced_json_is_stripped() {
        let body = format!("```json\n{}\n```", json!({"semantic_query": "x", "filters": {}, "interpretation": "y"}));
        let parser = SelfQueryParser::new(Box::new(StaticProvider { response: body }), 300, 1000);
        let result = parser.parse("anything").await;
        assert_eq!(result.confidence, 0.9);
        assert_eq!(result.semantic_query, "x");
    }

    #[tokio::test]
    async fn malformed_json_falls_back_with_low_confidence() {
        let parser = SelfQueryParser::new(Box::new(StaticProvider { response: "not json".to_string() }), 300, 1000);
        let result = parser.parse("weird query").await;
        assert_eq!(result.confidence, 0.3);
        assert_eq!(result.semantic_query, "weird query");
    }

    #[tokio::test]
    async fn unreachable_provider_falls_back_with_medium_confidence() {
        let parser = SelfQueryParser::new(Box::new(FailingProvider), 300, 1000);
        let result = parser.parse("weird query").await;
        assert_eq!(result.confidence, 0.5);
        assert_eq!(result.interpretation, "Fallback: treating entire query as semantic search");
    }

    #[tokio::test]
    async fn relative_date_marker_is_resolved() {
        let body = json!({
            "semantic_query": "",
            "filters": {"created_at": {"$gte": "RELATIVE:today"}},
            "interpretation": "today's issues"
        })
        .to_string();
        let parser = SelfQueryParser::new(Box::new(StaticProvider { response: body }), 300, 1000);
        let result = parser.parse("today's issues").await;
        let resolved = result.filters.get("created_at").unwrap().get("$gte").unwrap().as_str().unwrap();
        assert!(!resolved.starts_with("RELATIVE:"));
    }

    #[tokio::test]
    async fn cache_stores_pre_resolution_form() {
        let body = json!({
            "semantic_query": "",
            "filters": {"created_at": {"$gte": "RELATIVE:today"}},
            "interpretation": "today's issues"
        })
        .to_string();
        let parser = SelfQueryParser::new(Box::new(StaticProvider { response: body }), 300, 1000);
        let _ = parser.parse("today's issues").await;

        let key = SelfQueryParser::cache_key("today's issues");
        let cached = parser.cached(&key).expect("entry should be cached");
        let raw = cached.filters.get("created_at").unwrap().get("$gte").unwrap().as_str().unwrap();
        assert_eq!(raw, "RELATIVE:today");
    }

    #[tokio::test]
    async fn repeated_query_hits_cache() {
        let body = json!({"semantic_query": "a", "filters": {}, "interpretation": "i"}).to_string();
        let parser = SelfQueryParser::new(Box::new(StaticProvider { response: body }), 300, 1000);
        let first = parser.parse("Same Query").await;
        let second = parser.parse("same query").await;
        assert_eq!(first.semantic_query, second.semantic_query);
        assert_eq!(second.raw_query, "same query");
    }
}
