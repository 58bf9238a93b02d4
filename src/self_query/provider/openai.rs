// src/self_query/provider/openai.rs
// Chat-completion backed implementation of `ChatProvider`, used to turn a
// free-text query plus the field-schema system prompt into parseable JSON.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::self_query::{ChatProvider, SelfQueryError, SelfQueryResult};

pub struct OpenAiChat {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiChat {
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("failed to build reqwest client");
        Self {
            client,
            api_key,
            model,
            base_url,
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[async_trait]
impl ChatProvider for OpenAiChat {
    async fn complete(&self, system_prompt: &str, user_message: &str) -> SelfQueryResult<String> {
        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "messages": [
                    {"role": "system", "content": system_prompt},
                    {"role": "user", "content": user_message},
                ],
                "temperature": 0.0,
                "max_tokens": 500,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SelfQueryError::provider_failure(format!("status {status}: {body}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| SelfQueryError::internal(format!("malformed chat completion response: {e}")))?;

        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completions_url_strips_trailing_slash() {
        let provider = OpenAiChat::new("key".to_string(), "gpt-4o-mini".to_string(), "https://api.openai.com/v1/".to_string());
        assert_eq!(provider.completions_url(), "https://api.openai.com/v1/chat/completions");
    }
}
