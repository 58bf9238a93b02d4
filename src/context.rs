// src/context.rs
// Composition root: builds every component once at startup and hands out
// shared handles. Replaces the lazy module-global singleton pattern the
// original implementation used for its vector store/sync engine.

use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::EmbeddingCache;
use crate::config::AppConfig;
use crate::embedding::provider::{EmbeddingProvider, LocalEmbeddings, OpenAiEmbeddings};
use crate::embedding::EmbeddingPipeline;
use crate::error::{IndexError, IndexResult};
use crate::insights::InsightsEngine;
use crate::scheduler::Scheduler;
use crate::self_query::provider::OpenAiChat;
use crate::self_query::SelfQueryParser;
use crate::store::VectorStore;
use crate::sync::{IssueSource, SyncEngine};

pub struct AppContext {
    pub config: AppConfig,
    pub store: Arc<VectorStore>,
    pub pipeline: Arc<EmbeddingPipeline>,
    pub sync_engine: Arc<SyncEngine>,
    pub self_query: Option<Arc<SelfQueryParser>>,
    pub insights: Arc<InsightsEngine>,
    pub scheduler: Arc<Scheduler>,
}

impl AppContext {
    pub async fn new(config: AppConfig, source: Arc<dyn IssueSource>) -> IndexResult<Self> {
        std::fs::create_dir_all(&config.db_path).map_err(|e| IndexError::Internal(format!("failed to create db directory: {e}")))?;

        let store = Arc::new(VectorStore::connect(&config.vector_store_path()).await?);

        let provider = build_embedding_provider(&config)?;
        let cache = if config.embedding.cache_embeddings {
            Some(Arc::new(EmbeddingCache::connect(&config.cache_db_path(), config.embedding.max_cache_entries).await?))
        } else {
            None
        };
        let pipeline = Arc::new(EmbeddingPipeline::new(
            provider,
            cache,
            config.embedding.batch_size,
            config.embedding.max_concurrent_embeddings,
        ));

        let sync_engine = Arc::new(SyncEngine::new(
            source,
            Arc::clone(&store),
            Arc::clone(&pipeline),
            sync_state_path(&config.db_path),
            config.sync.clone(),
        ));

        let self_query = config.self_query.api_key.clone().map(|api_key| {
            let chat = OpenAiChat::new(api_key, config.self_query.model.clone(), config.embedding.openai_base_url.clone());
            Arc::new(SelfQueryParser::new(Box::new(chat), config.self_query.cache_ttl_seconds, config.self_query.cache_cap))
        });

        let insights = Arc::new(InsightsEngine::new(Arc::clone(&store)));
        let scheduler = Scheduler::new(Arc::clone(&sync_engine), config.sync.interval_minutes);

        Ok(Self {
            config,
            store,
            pipeline,
            sync_engine,
            self_query,
            insights,
            scheduler,
        })
    }
}

fn sync_state_path(db_path: &std::path::Path) -> PathBuf {
    db_path.join("sync_state.json")
}

fn build_embedding_provider(config: &AppConfig) -> IndexResult<Arc<dyn EmbeddingProvider>> {
    use crate::config::embedding::ProviderKind;
    match config.embedding.provider {
        ProviderKind::OpenAi => {
            let api_key = config
                .embedding
                .openai_api_key
                .clone()
                .ok_or_else(|| IndexError::Internal("OPENAI_API_KEY missing for openai embedding provider".to_string()))?;
            Ok(Arc::new(OpenAiEmbeddings::new(
                api_key,
                config.embedding.model.clone(),
                config.embedding.openai_base_url.clone(),
                config.embedding.dimensions,
            )))
        }
        ProviderKind::Local => Ok(Arc::new(LocalEmbeddings::new(config.embedding.model.clone(), config.embedding.dimensions))),
    }
}
