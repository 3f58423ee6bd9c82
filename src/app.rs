//! Application assembly.
//!
//! Every dependency is constructed here and passed explicitly: embedder,
//! per-category indexes, category store, fingerprint store, pipeline,
//! retrievers. Backend dispatch is an exhaustive match, so a new backend
//! has to be wired in code.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::embedding::{EmbeddingProvider, GeminiEmbedding};
use crate::error::{RagError, Result};
use crate::ingest::IngestionPipeline;
use crate::knowledge::index::{MemoryIndex, TextIndex};
use crate::knowledge::lance::LanceIndex;
use crate::knowledge::store::{Category, CategoryStore, StoreKind};
use crate::knowledge::FingerprintStore;
use crate::llm::{AnswerGenerator, DeepSeekClient, QueryProcessor};
use crate::retrieve::CombinedRetriever;
use crate::scrape::{HotelApiScraper, RecordSource, SnapshotSource};

// ============================================================================
// App
// ============================================================================

pub struct App {
    config: AppConfig,
    store: Arc<CategoryStore>,
    fingerprints: Arc<FingerprintStore>,
}

impl App {
    /// Assemble with the production embedder (API key from the environment).
    pub async fn build(config: AppConfig) -> Result<Self> {
        let embedder: Arc<dyn EmbeddingProvider> =
            Arc::new(GeminiEmbedding::from_env(config.embedding.dimension)?);
        Self::with_embedder(config, embedder).await
    }

    /// Assemble around an injected embedder.
    pub async fn with_embedder(
        config: AppConfig,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        config.validate()?;
        let data_dir = config.data_dir();

        let mut indexes: HashMap<Category, Arc<dyn TextIndex>> = HashMap::new();
        for category in Category::ALL {
            let index: Arc<dyn TextIndex> = match config.store.backend {
                StoreKind::Lance => Arc::new(
                    LanceIndex::open(
                        &data_dir.join("lancedb"),
                        category.table_name(),
                        embedder.clone(),
                    )
                    .await?,
                ),
                StoreKind::Memory if config.store.persistent => Arc::new(MemoryIndex::persistent(
                    embedder.clone(),
                    data_dir
                        .join("memory")
                        .join(format!("{}.json", category.table_name())),
                )?),
                StoreKind::Memory => Arc::new(MemoryIndex::ephemeral(embedder.clone())),
            };
            indexes.insert(category, index);
        }

        let store = Arc::new(CategoryStore::new(config.store.backend, indexes)?);
        let fingerprints = Arc::new(FingerprintStore::open_in(&data_dir)?);

        tracing::info!(
            backend = %config.store.backend,
            data_dir = %data_dir.display(),
            embedder = embedder.name(),
            "app assembled"
        );

        Ok(Self {
            config,
            store,
            fingerprints,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<CategoryStore> {
        &self.store
    }

    pub fn fingerprints(&self) -> &Arc<FingerprintStore> {
        &self.fingerprints
    }

    /// Record source for an ingestion run: a snapshot file when given,
    /// otherwise the live scraper over the configured URLs.
    pub fn record_source(
        &self,
        snapshot: Option<&std::path::Path>,
    ) -> Result<Arc<dyn RecordSource>> {
        let snapshot = snapshot.or(self.config.scraper.snapshot.as_deref());
        if let Some(path) = snapshot {
            return Ok(Arc::new(SnapshotSource::new(path)));
        }
        self.record_source_live()
    }

    /// The live scraper, ignoring any configured snapshot.
    pub fn record_source_live(&self) -> Result<Arc<dyn RecordSource>> {
        if self.config.scraper.urls.is_empty() {
            return Err(RagError::Config(
                "no hotel URLs configured and no snapshot given".to_string(),
            ));
        }
        Ok(Arc::new(HotelApiScraper::new(
            self.config.scraper.base_url.clone(),
            self.config.scraper.urls.clone(),
        )?))
    }

    pub fn pipeline(&self, source: Arc<dyn RecordSource>) -> IngestionPipeline {
        IngestionPipeline::new(
            source,
            self.store.clone(),
            self.fingerprints.clone(),
            self.config.chunking.clone(),
        )
    }

    pub fn combined_retriever(&self) -> Result<CombinedRetriever> {
        CombinedRetriever::new(
            self.store.retriever(Category::Info, self.config.retrieval.top_k),
            self.store
                .retriever(Category::Review, self.config.retrieval.top_k),
        )
    }

    pub fn query_processor(&self) -> Result<QueryProcessor> {
        let generator: Arc<dyn AnswerGenerator> = Arc::new(DeepSeekClient::from_env()?.with_options(
            self.config.llm.model.clone(),
            self.config.llm.temperature,
            self.config.llm.max_tokens,
        ));
        Ok(QueryProcessor::new(
            Arc::new(self.combined_retriever()?),
            generator,
        ))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::knowledge::testing::StubEmbedding;
    use tempfile::TempDir;

    fn memory_config(dir: &TempDir, persistent: bool) -> AppConfig {
        AppConfig {
            data_dir: Some(dir.path().to_path_buf()),
            store: StoreConfig {
                backend: StoreKind::Memory,
                persistent,
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_memory_assembly() {
        let dir = TempDir::new().unwrap();
        let app = App::with_embedder(memory_config(&dir, false), Arc::new(StubEmbedding::new(8)))
            .await
            .unwrap();

        assert_eq!(app.store().kind(), StoreKind::Memory);
        assert_eq!(app.store().count(Category::Info).await.unwrap(), 0);
        assert!(app.combined_retriever().is_ok());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let dir = TempDir::new().unwrap();
        let mut config = memory_config(&dir, false);
        config.retrieval.top_k = 0;

        let result = App::with_embedder(config, Arc::new(StubEmbedding::new(8))).await;
        assert!(matches!(result, Err(RagError::Config(_))));
    }

    #[tokio::test]
    async fn test_source_requires_urls_or_snapshot() {
        let dir = TempDir::new().unwrap();
        let app = App::with_embedder(memory_config(&dir, false), Arc::new(StubEmbedding::new(8)))
            .await
            .unwrap();

        assert!(matches!(
            app.record_source(None),
            Err(RagError::Config(_))
        ));

        let snapshot = dir.path().join("records.json");
        assert!(app.record_source(Some(&snapshot)).is_ok());
    }
}
