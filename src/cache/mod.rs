// src/cache/mod.rs
// Two-tier embedding cache: an unbounded in-process hot map backed by a
// SQLite-persisted tier with LRU-by-last_accessed eviction.

mod error;

pub use error::{CacheError, CacheResult, IntoCacheErrorResult};

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

pub struct EmbeddingCache {
    pool: SqlitePool,
    hot: Mutex<HashMap<String, Vec<f32>>>,
    max_entries: usize,
}

impl EmbeddingCache {
    pub async fn connect(path: &Path, max_entries: usize) -> CacheResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        // A single writer connection makes the "single connection per pipeline
        // instance" requirement structural rather than advisory.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS embedding_cache (
                content_hash TEXT PRIMARY KEY,
                embedding TEXT NOT NULL,
                created_at REAL NOT NULL,
                last_accessed REAL NOT NULL
            )",
        )
        .execute(&pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_embedding_cache_last_accessed ON embedding_cache(last_accessed)")
            .execute(&pool)
            .await?;

        Ok(Self {
            pool,
            hot: Mutex::new(HashMap::new()),
            max_entries,
        })
    }

    /// Look up a cached embedding. Hits the hot map first; on miss, falls
    /// through to the persistent tier. Any persistence error is logged and
    /// treated as a cache miss (the pipeline must continue regardless).
    pub async fn get(&self, content_hash: &str) -> Option<Vec<f32>> {
        if let Some(vector) = self.hot.lock().unwrap().get(content_hash).cloned() {
            return Some(vector);
        }

        match self.get_persistent(content_hash).await {
            Ok(Some(vector)) => {
                self.hot
                    .lock()
                    .unwrap()
                    .insert(content_hash.to_string(), vector.clone());
                Some(vector)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("embedding cache read failed, treating as miss: {e}");
                None
            }
        }
    }

    async fn get_persistent(&self, content_hash: &str) -> CacheResult<Option<Vec<f32>>> {
        let row = sqlx::query("SELECT embedding FROM embedding_cache WHERE content_hash = ?")
            .bind(content_hash)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let now = now_unix();
        sqlx::query("UPDATE embedding_cache SET last_accessed = ? WHERE content_hash = ?")
            .bind(now)
            .bind(content_hash)
            .execute(&self.pool)
            .await?;

        let raw: String = row.get("embedding");
        let vector: Vec<f32> =
            serde_json::from_str(&raw).map_err(|e| CacheError::internal(format!("corrupt cache entry: {e}")))?;
        Ok(Some(vector))
    }

    /// Store an embedding. Always populates the hot tier; persistence
    /// failures are logged, not propagated, per the cache's failure mode.
    pub async fn set(&self, content_hash: &str, vector: &[f32]) {
        self.hot
            .lock()
            .unwrap()
            .insert(content_hash.to_string(), vector.to_vec());

        if let Err(e) = self.set_persistent(content_hash, vector).await {
            warn!("embedding cache write failed: {e}");
        }
    }

    async fn set_persistent(&self, content_hash: &str, vector: &[f32]) -> CacheResult<()> {
        let now = now_unix();
        let serialized = serde_json::to_string(vector).map_err(|e| CacheError::internal(e.to_string()))?;
        sqlx::query(
            "INSERT INTO embedding_cache (content_hash, embedding, created_at, last_accessed)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(content_hash) DO UPDATE SET
                embedding = excluded.embedding,
                last_accessed = excluded.last_accessed",
        )
        .bind(content_hash)
        .bind(serialized)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.evict_if_over_capacity().await
    }

    async fn evict_if_over_capacity(&self) -> CacheResult<()> {
        let count: i64 = sqlx::query("SELECT COUNT(*) AS c FROM embedding_cache")
            .fetch_one(&self.pool)
            .await?
            .get("c");

        if (count as usize) <= self.max_entries {
            return Ok(());
        }

        let evict_count = (self.max_entries / 10).max(1);
        debug!("embedding cache over capacity ({count} > {}), evicting {evict_count} oldest entries", self.max_entries);
        sqlx::query(
            "DELETE FROM embedding_cache WHERE content_hash IN (
                SELECT content_hash FROM embedding_cache ORDER BY last_accessed ASC LIMIT ?
            )",
        )
        .bind(evict_count as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[cfg(test)]
    async fn row_count(&self) -> i64 {
        sqlx::query("SELECT COUNT(*) AS c FROM embedding_cache")
            .fetch_one(&self.pool)
            .await
            .unwrap()
            .get("c")
    }
}

fn now_unix() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
