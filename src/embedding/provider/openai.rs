// src/embedding/provider/openai.rs
// OpenAI-compatible batch embeddings provider

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::embedding::error::{EmbeddingError, EmbeddingResult};

use super::EmbeddingProvider;

pub struct OpenAiEmbeddings {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    dimensions: usize,
}

impl OpenAiEmbeddings {
    pub fn new(api_key: String, model: String, base_url: String, dimensions: usize) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("failed to build reqwest client");
        Self {
            client,
            api_key,
            model,
            base_url,
            dimensions,
        }
    }

    fn embeddings_url(&self) -> String {
        format!("{}/embeddings", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Deserialize)]
struct OpenAiEmbeddingItem {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingItem>,
}

#[derive(Deserialize)]
struct OpenAiErrorBody {
    error: OpenAiErrorDetail,
}

#[derive(Deserialize)]
struct OpenAiErrorDetail {
    message: String,
    #[serde(rename = "type")]
    kind: String,
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    async fn embed_batch(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(self.embeddings_url())
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "input": texts,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_error(status, &body));
        }

        let mut parsed: OpenAiEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::internal(format!("malformed embeddings response: {e}")))?;

        parsed.data.sort_by_key(|item| item.index);
        Ok(parsed.data.into_iter().map(|item| item.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

fn classify_error(status: reqwest::StatusCode, body: &str) -> EmbeddingError {
    if status.as_u16() == 429 || status.is_server_error() {
        return EmbeddingError::transient(format!("status {status}: {body}"));
    }
    if let Ok(parsed) = serde_json::from_str::<OpenAiErrorBody>(body) {
        if parsed.error.kind == "insufficient_quota" || status.as_u16() == 401 {
            return EmbeddingError::provider_failure(parsed.error.message);
        }
        return EmbeddingError::provider_failure(parsed.error.message);
    }
    EmbeddingError::provider_failure(format!("status {status}: {body}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embeddings_url_strips_trailing_slash() {
        let provider = OpenAiEmbeddings::new(
            "key".to_string(),
            "text-embedding-3-small".to_string(),
            "https://api.openai.com/v1/".to_string(),
            1536,
        );
        assert_eq!(provider.embeddings_url(), "https://api.openai.com/v1/embeddings");
    }

    #[test]
    fn rate_limit_status_is_classified_transient() {
        let err = classify_error(reqwest::StatusCode::TOO_MANY_REQUESTS, "{}");
        assert!(err.is_retryable());
    }

    #[test]
    fn auth_error_is_classified_hard_failure() {
        let body = r#"{"error":{"message":"invalid api key","type":"invalid_request_error"}}"#;
        let err = classify_error(reqwest::StatusCode::UNAUTHORIZED, body);
        assert!(!err.is_retryable());
    }
}
