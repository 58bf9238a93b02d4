// src/embedding/provider/mod.rs
// Embedding provider abstraction and implementations

pub mod local;
pub mod openai;

use async_trait::async_trait;

use crate::embedding::error::EmbeddingResult;

pub use local::LocalEmbeddings;
pub use openai::OpenAiEmbeddings;

/// A provider that turns texts into dense vectors. Implementations may
/// raise `EmbeddingError::Transient` for rate-limit/timeout/connection
/// errors so the pipeline's retry loop can distinguish them from hard
/// failures (auth, quota).
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed_batch(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f32>>>;

    fn dimensions(&self) -> usize;
}
