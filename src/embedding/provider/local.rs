// src/embedding/provider/local.rs
// Local (in-process model) embedding provider. Loading and running an
// on-disk sentence-transformer model is out of scope for this core; this
// provider exists at the seam so the pipeline can select it by config, but
// encoding itself is not implemented here (mirrors the source, which raises
// NotImplementedError from the equivalent local path).

use async_trait::async_trait;

use crate::embedding::error::{EmbeddingError, EmbeddingResult};

use super::EmbeddingProvider;

pub struct LocalEmbeddings {
    model: String,
    dimensions: usize,
}

impl LocalEmbeddings {
    pub fn new(model: String, dimensions: usize) -> Self {
        Self { model, dimensions }
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbeddings {
    async fn embed_batch(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        Err(EmbeddingError::provider_failure(format!(
            "local embedding model '{}' is not loaded in this build",
            self.model
        )))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embed_batch_reports_unloaded_model() {
        let provider = LocalEmbeddings::new("all-MiniLM-L6-v2".to_string(), 384);
        let err = provider.embed_batch(&["hello".to_string()]).await.unwrap_err();
        assert!(err.to_string().contains("not loaded"));
    }

    #[tokio::test]
    async fn embed_batch_empty_input_is_ok() {
        let provider = LocalEmbeddings::new("all-MiniLM-L6-v2".to_string(), 384);
        assert_eq!(provider.embed_batch(&[]).await.unwrap(), Vec::<Vec<f32>>::new());
    }
}
