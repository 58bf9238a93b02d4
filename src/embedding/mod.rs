// src/embedding/mod.rs
// Batched, concurrency-limited, retried embedding generation backed by the
// two-tier cache.

mod error;
pub mod provider;

pub use error::{EmbeddingError, EmbeddingResult};
pub use provider::EmbeddingProvider;

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::cache::EmbeddingCache;

const BASE_BACKOFF_SECS: u64 = 1;
const MAX_BACKOFF_SECS: u64 = 60;
const MAX_ATTEMPTS: u32 = 5;

/// One embedded input, tagged with its position in the original `embed_batch`
/// input list. Failed items are simply absent, so callers that need to map
/// back to e.g. issues use `index` rather than assuming a 1:1 length match.
#[derive(Debug, Clone)]
pub struct EmbeddedText {
    pub index: usize,
    pub vector: Vec<f32>,
}

pub struct EmbeddingPipeline {
    provider: Arc<dyn EmbeddingProvider>,
    cache: Option<Arc<EmbeddingCache>>,
    semaphore: Arc<Semaphore>,
    batch_size: usize,
}

impl EmbeddingPipeline {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, cache: Option<Arc<EmbeddingCache>>, batch_size: usize, max_concurrent: usize) -> Self {
        Self {
            provider,
            cache,
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            batch_size: batch_size.max(1),
        }
    }

    fn cache_key(text: &str) -> String {
        format!("{:x}", md5::compute(text.as_bytes()))
    }

    /// Embed a single text.
    pub async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        let texts = vec![text.to_string()];
        let mut embedded = self.embed_batch(&texts).await?;
        embedded
            .pop()
            .map(|e| e.vector)
            .ok_or_else(|| EmbeddingError::internal("embedding failed after retries"))
    }

    /// Embed a list of texts. Cached entries are resolved without touching
    /// the provider; uncached entries are chunked to `batch_size` and
    /// processed concurrently, bounded by the pipeline's semaphore. Chunks
    /// that fail after retries are dropped from the output; successful
    /// items retain their original-index alignment via `EmbeddedText::index`.
    pub async fn embed_batch(&self, texts: &[String]) -> EmbeddingResult<Vec<EmbeddedText>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut results = Vec::with_capacity(texts.len());
        let mut uncached: Vec<(usize, String)> = Vec::new();

        for (index, text) in texts.iter().enumerate() {
            if let Some(cache) = &self.cache {
                let key = Self::cache_key(text);
                if let Some(vector) = cache.get(&key).await {
                    results.push(EmbeddedText { index, vector });
                    continue;
                }
            }
            uncached.push((index, text.clone()));
        }

        if uncached.is_empty() {
            results.sort_by_key(|e| e.index);
            return Ok(results);
        }

        let chunks: Vec<&[(usize, String)]> = uncached.chunks(self.batch_size).collect();
        let mut chunk_futures = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            chunk_futures.push(self.embed_chunk_with_retry(chunk));
        }
        let chunk_results = futures::future::join_all(chunk_futures).await;

        for chunk_result in chunk_results {
            results.extend(chunk_result);
        }

        results.sort_by_key(|e| e.index);
        Ok(results)
    }

    async fn embed_chunk_with_retry(&self, chunk: &[(usize, String)]) -> Vec<EmbeddedText> {
        let _permit = self.semaphore.acquire().await.expect("semaphore closed");

        let texts: Vec<String> = chunk.iter().map(|(_, t)| t.clone()).collect();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.provider.embed_batch(&texts).await {
                Ok(vectors) => {
                    let mut embedded = Vec::with_capacity(vectors.len());
                    for ((index, text), vector) in chunk.iter().zip(vectors.into_iter()) {
                        if let Some(cache) = &self.cache {
                            cache.set(&Self::cache_key(text), &vector).await;
                        }
                        embedded.push(EmbeddedText { index: *index, vector });
                    }
                    return embedded;
                }
                Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                    let delay = backoff_delay(attempt);
                    warn!("transient embedding error (attempt {attempt}/{MAX_ATTEMPTS}): {e}; retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!("embedding chunk of {} text(s) failed, dropping from output: {e}", chunk.len());
                    return Vec::new();
                }
            }
        }
    }

    /// Stream an unbounded iterator of texts through the pipeline, yielding
    /// `(text, vector)` pairs as each accumulated batch completes.
    pub async fn embed_stream<I>(&self, texts: I) -> EmbeddingResult<Vec<(String, Vec<f32>)>>
    where
        I: IntoIterator<Item = String>,
    {
        let mut out = Vec::new();
        let mut buffer: Vec<String> = Vec::with_capacity(self.batch_size);

        for text in texts {
            buffer.push(text);
            if buffer.len() >= self.batch_size {
                out.extend(self.drain_buffer(&mut buffer).await?);
            }
        }
        if !buffer.is_empty() {
            out.extend(self.drain_buffer(&mut buffer).await?);
        }
        Ok(out)
    }

    async fn drain_buffer(&self, buffer: &mut Vec<String>) -> EmbeddingResult<Vec<(String, Vec<f32>)>> {
        let chunk = std::mem::take(buffer);
        let embedded = self.embed_batch(&chunk).await?;
        debug!("embed_stream: {}/{} texts survived in this chunk", embedded.len(), chunk.len());
        Ok(embedded
            .into_iter()
            .map(|e| (chunk[e.index].clone(), e.vector))
            .collect())
    }
}

fn backoff_delay(attempt: u32) -> std::time::Duration {
    let secs = BASE_BACKOFF_SECS.saturating_mul(1u64 << (attempt.saturating_sub(1)));
    std::time::Duration::from_secs(secs.min(MAX_BACKOFF_SECS))
}
