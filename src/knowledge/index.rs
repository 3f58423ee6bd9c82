//! Text-indexing capability.
//!
//! A `TextIndex` accepts documents, embeds them through the injected
//! provider and answers similarity queries. Callers never see embeddings;
//! the vector representation stays behind this trait.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::knowledge::store::{Document, Metadata};

// ============================================================================
// TextIndex trait
// ============================================================================

/// Append-only similarity index over text documents.
#[async_trait]
pub trait TextIndex: Send + Sync {
    /// Embed and store documents. Data is durable before this returns.
    async fn index(&self, docs: Vec<Document>) -> Result<()>;

    /// Top-k similarity search. Results are ordered best first.
    async fn query(&self, text: &str, k: usize) -> Result<Vec<Document>>;

    /// Drop every stored document.
    async fn clear(&self) -> Result<()>;

    /// Number of stored documents.
    async fn count(&self) -> Result<usize>;
}

// ============================================================================
// Cosine similarity
// ============================================================================

/// Cosine similarity between two vectors. Mismatched lengths and zero
/// vectors score 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

// ============================================================================
// MemoryIndex
// ============================================================================

/// Stored entry: document plus its embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    content: String,
    metadata: Metadata,
    embedding: Vec<f32>,
}

/// In-process index with brute-force cosine scoring.
///
/// In persistent mode every mutation is flushed to a JSON file before the
/// call returns, and the file is reloaded on open. Used as the `memory`
/// backend and throughout the test suite.
pub struct MemoryIndex {
    entries: RwLock<Vec<IndexEntry>>,
    embedder: Arc<dyn EmbeddingProvider>,
    persist_path: Option<PathBuf>,
}

impl MemoryIndex {
    /// Index that lives and dies with the process.
    pub fn ephemeral(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            embedder,
            persist_path: None,
        }
    }

    /// Index backed by a JSON file, loaded if it already exists.
    pub fn persistent(embedder: Arc<dyn EmbeddingProvider>, path: PathBuf) -> Result<Self> {
        let entries = if path.exists() {
            let raw = std::fs::read(&path)
                .map_err(|e| RagError::StorageUnavailable(format!("{}: {}", path.display(), e)))?;
            serde_json::from_slice(&raw)
                .map_err(|e| RagError::StorageUnavailable(format!("{}: {}", path.display(), e)))?
        } else {
            Vec::new()
        };

        Ok(Self {
            entries: RwLock::new(entries),
            embedder,
            persist_path: Some(path),
        })
    }

    async fn flush(&self, entries: &[IndexEntry]) -> Result<()> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RagError::StorageUnavailable(e.to_string()))?;
        }

        let raw = serde_json::to_vec(entries)
            .map_err(|e| RagError::StorageUnavailable(e.to_string()))?;
        tokio::fs::write(path, raw)
            .await
            .map_err(|e| RagError::StorageUnavailable(format!("{}: {}", path.display(), e)))?;

        Ok(())
    }
}

#[async_trait]
impl TextIndex for MemoryIndex {
    async fn index(&self, docs: Vec<Document>) -> Result<()> {
        if docs.is_empty() {
            return Ok(());
        }

        let texts: Vec<String> = docs.iter().map(|d| d.content.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;

        let mut entries = self.entries.write().await;
        for (doc, embedding) in docs.into_iter().zip(embeddings) {
            entries.push(IndexEntry {
                content: doc.content,
                metadata: doc.metadata,
                embedding,
            });
        }

        self.flush(&entries).await
    }

    async fn query(&self, text: &str, k: usize) -> Result<Vec<Document>> {
        if k == 0 {
            return Ok(vec![]);
        }

        let query_embedding = self.embedder.embed(text).await?;

        let entries = self.entries.read().await;
        let mut scored: Vec<(f32, &IndexEntry)> = entries
            .iter()
            .map(|e| (cosine_similarity(&query_embedding, &e.embedding), e))
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(_, e)| Document::new(e.content.clone(), e.metadata.clone()))
            .collect())
    }

    async fn clear(&self) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.clear();

        if let Some(path) = &self.persist_path {
            if path.exists() {
                tokio::fs::remove_file(path)
                    .await
                    .map_err(|e| RagError::StorageUnavailable(e.to_string()))?;
            }
        }

        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.entries.read().await.len())
    }
}

// ============================================================================
// Tests
// ============================================================================
