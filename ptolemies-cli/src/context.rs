use crate::error::CliError;
use ptolemies_cache::Cache;
use ptolemies_core::config::EngineConfig;
use ptolemies_embed::{Embedder, MockEmbedder, OpenAiCompatible};
use ptolemies_store::graph::GraphStore;
use ptolemies_store::vector::VectorStore;
use std::sync::Arc;

/// Resources every subcommand needs, built once from `EngineConfig`.
pub struct EngineContext {
    pub config: EngineConfig,
    pub vector: Arc<VectorStore>,
    pub graph: Arc<GraphStore>,
    pub embedder: Arc<Embedder>,
    pub cache: Arc<Cache>,
}

fn sqlite_path(url: &str) -> &str {
    url.strip_prefix("sqlite://").unwrap_or(url)
}

impl EngineContext {
    pub async fn build(config: EngineConfig) -> Result<Self, CliError> {
        let vector = VectorStore::open(sqlite_path(&config.vector_store_url), config.tunables.embedding_dimension).await?;
        let graph = GraphStore::connect(&config.graph_store_url).await?;
        let cache = Cache::new(1024).expect("literal capacity is never zero");

        let embedder: Arc<dyn ptolemies_embed::EmbeddingModel> = match &config.embedding_api_key {
            Some(api_key) => Arc::new(OpenAiCompatible::new(
                "https://api.openai.com/v1/embeddings",
                api_key.clone(),
                "text-embedding-3-large",
                config.tunables.embedding_dimension,
            )),
            None => Arc::new(MockEmbedder::new(config.tunables.embedding_dimension)),
        };

        Ok(Self {
            vector: Arc::new(vector),
            graph: Arc::new(graph),
            embedder: Arc::new(Embedder::new(embedder, config.tunables.batch_max)),
            cache: Arc::new(cache),
            config,
        })
    }
}
