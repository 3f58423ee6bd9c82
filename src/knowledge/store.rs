//! Category-partitioned document store.
//!
//! Documents live in closed categories (hotel descriptive info, guest
//! reviews), each backed by its own text index. Operations on one category
//! never observe or mutate another.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::knowledge::index::TextIndex;

// ============================================================================
// Data Directory
// ============================================================================

/// Data directory path (~/.hotel-rag/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".hotel-rag")
}

// ============================================================================
// Types
// ============================================================================

/// Metadata key carrying the stable hotel identifier that joins info and
/// review documents.
pub const SOURCE_ID_KEY: &str = "hotel_source_id";

/// Chunk metadata: a JSON object copied verbatim from the formatted unit.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// An indexed chunk: text plus its metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    pub metadata: Metadata,
}

impl Document {
    pub fn new(content: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            content: content.into(),
            metadata,
        }
    }

    /// Stable hotel identifier, if the metadata carries one.
    pub fn source_id(&self) -> Option<&str> {
        self.metadata.get(SOURCE_ID_KEY).and_then(|v| v.as_str())
    }
}

/// Document category. Closed set: adding a category is a code change, not
/// a configuration value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Info,
    Review,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::Info, Category::Review];

    /// Stable tag used in composite fingerprint keys and CLI arguments.
    pub fn tag(&self) -> &'static str {
        match self {
            Category::Info => "info",
            Category::Review => "review",
        }
    }

    /// Backing table name in the vector index.
    pub fn table_name(&self) -> &'static str {
        match self {
            Category::Info => "hotel_info_chunks",
            Category::Review => "hotel_review_chunks",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "info" => Ok(Category::Info),
            "review" => Ok(Category::Review),
            other => Err(RagError::UnsupportedCategory(other.to_string())),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Store backend. Closed set, dispatched exhaustively at assembly time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Lance,
    Memory,
}

impl StoreKind {
    /// Stable tag used in composite fingerprint keys. Changing a tag
    /// invalidates every fingerprint recorded under it.
    pub fn tag(&self) -> &'static str {
        match self {
            StoreKind::Lance => "lance",
            StoreKind::Memory => "memory",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "lance" => Ok(StoreKind::Lance),
            "memory" => Ok(StoreKind::Memory),
            other => Err(RagError::UnsupportedBackend(other.to_string())),
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

// ============================================================================
// CategoryStore
// ============================================================================

/// Facade over one text index per category.
pub struct CategoryStore {
    indexes: HashMap<Category, Arc<dyn TextIndex>>,
    kind: StoreKind,
}

impl CategoryStore {
    /// Build the store from a full category -> index map.
    ///
    /// Every category must be present; a partial map is a wiring bug and
    /// is rejected up front rather than surfacing later as a missing-key
    /// panic mid-ingestion.
    pub fn new(kind: StoreKind, indexes: HashMap<Category, Arc<dyn TextIndex>>) -> Result<Self> {
        for category in Category::ALL {
            if !indexes.contains_key(&category) {
                return Err(RagError::Config(format!(
                    "store is missing an index for category '{}'",
                    category
                )));
            }
        }
        Ok(Self { indexes, kind })
    }

    // new() guarantees every category has an index.
    fn index(&self, category: Category) -> &Arc<dyn TextIndex> {
        &self.indexes[&category]
    }

    /// Append documents to a category. Returns the number of documents
    /// indexed; data is durable (flushed) before this returns.
    pub async fn add(&self, category: Category, docs: Vec<Document>) -> Result<usize> {
        if docs.is_empty() {
            return Ok(0);
        }
        let count = docs.len();
        self.index(category).index(docs).await?;
        tracing::debug!(category = %category, count, "indexed documents");
        Ok(count)
    }

    /// Similarity search within one category.
    pub async fn search(&self, category: Category, query: &str, k: usize) -> Result<Vec<Document>> {
        self.index(category).query(query, k).await
    }

    /// Query-capable handle bound to one category and a fixed result size.
    pub fn retriever(&self, category: Category, top_k: usize) -> CategoryRetriever {
        CategoryRetriever {
            index: Arc::clone(self.index(category)),
            category,
            top_k,
        }
    }

    /// Remove every document in a category. Other categories are untouched.
    pub async fn clear(&self, category: Category) -> Result<()> {
        self.index(category).clear().await?;
        tracing::info!(category = %category, "cleared category");
        Ok(())
    }

    pub async fn count(&self, category: Category) -> Result<usize> {
        self.index(category).count().await
    }

    pub fn kind(&self) -> StoreKind {
        self.kind
    }
}

/// Retrieval handle over a single category.
#[derive(Clone)]
pub struct CategoryRetriever {
    index: Arc<dyn TextIndex>,
    category: Category,
    top_k: usize,
}

impl CategoryRetriever {
    pub async fn retrieve(&self, query: &str) -> Result<Vec<Document>> {
        self.index.query(query, self.top_k).await
    }

    pub fn category(&self) -> Category {
        self.category
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::index::MemoryIndex;
    use crate::knowledge::testing::{meta, StubEmbedding};

    fn memory_store() -> CategoryStore {
        let embedder = Arc::new(StubEmbedding::new(8));
        let mut indexes: HashMap<Category, Arc<dyn TextIndex>> = HashMap::new();
        for category in Category::ALL {
            indexes.insert(
                category,
                Arc::new(MemoryIndex::ephemeral(embedder.clone())),
            );
        }
        CategoryStore::new(StoreKind::Memory, indexes).unwrap()
    }

    #[test]
    fn test_tags_are_stable() {
        assert_eq!(Category::Info.tag(), "info");
        assert_eq!(Category::Review.tag(), "review");
        assert_eq!(StoreKind::Lance.tag(), "lance");
        assert_eq!(StoreKind::Memory.tag(), "memory");
    }

    #[test]
    fn test_parse_rejects_unknown_tags() {
        assert!(matches!(
            Category::parse("faq"),
            Err(RagError::UnsupportedCategory(_))
        ));
        assert!(matches!(
            StoreKind::parse("chroma"),
            Err(RagError::UnsupportedBackend(_))
        ));
    }

    #[test]
    fn test_missing_category_rejected() {
        let embedder = Arc::new(StubEmbedding::new(8));
        let mut indexes: HashMap<Category, Arc<dyn TextIndex>> = HashMap::new();
        indexes.insert(
            Category::Info,
            Arc::new(MemoryIndex::ephemeral(embedder)) as Arc<dyn TextIndex>,
        );
        let err = CategoryStore::new(StoreKind::Memory, indexes);
        assert!(matches!(err, Err(RagError::Config(_))));
    }

    #[tokio::test]
    async fn test_add_and_search_roundtrip() {
        let store = memory_store();
        let docs = vec![
            Document::new("Espinas hotel has a rooftop pool", meta("h1")),
            Document::new("Parsian hotel is near the bazaar", meta("h2")),
        ];

        let added = store.add(Category::Info, docs).await.unwrap();
        assert_eq!(added, 2);
        assert_eq!(store.count(Category::Info).await.unwrap(), 2);

        let hits = store
            .search(Category::Info, "rooftop pool", 1)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_categories_are_isolated() {
        let store = memory_store();
        store
            .add(
                Category::Info,
                vec![Document::new("hotel info", meta("h1"))],
            )
            .await
            .unwrap();
        store
            .add(
                Category::Review,
                vec![Document::new("great stay", meta("h1"))],
            )
            .await
            .unwrap();

        store.clear(Category::Review).await.unwrap();

        assert_eq!(store.count(Category::Info).await.unwrap(), 1);
        assert_eq!(store.count(Category::Review).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_add_is_noop() {
        let store = memory_store();
        let added = store.add(Category::Info, vec![]).await.unwrap();
        assert_eq!(added, 0);
        assert_eq!(store.count(Category::Info).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_retriever_respects_top_k() {
        let store = memory_store();
        let docs = (0..5)
            .map(|i| Document::new(format!("review text {}", i), meta("h1")))
            .collect();
        store.add(Category::Review, docs).await.unwrap();

        let retriever = store.retriever(Category::Review, 3);
        let hits = retriever.retrieve("review").await.unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(retriever.category(), Category::Review);
    }
}
