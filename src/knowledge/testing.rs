//! Shared test doubles for the knowledge and ingestion tests.

use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::knowledge::store::{Metadata, SOURCE_ID_KEY};

/// Metadata map carrying only the join key.
pub fn meta(source_id: &str) -> Metadata {
    let mut m = Metadata::new();
    m.insert(
        SOURCE_ID_KEY.to_string(),
        serde_json::Value::String(source_id.to_string()),
    );
    m
}

/// Deterministic offline embedder.
///
/// Hashes whitespace tokens into a fixed number of buckets, so texts that
/// share words get a higher cosine score. No network, stable across runs.
pub struct StubEmbedding {
    dimension: usize,
}

impl StubEmbedding {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn bucket(&self, token: &str) -> usize {
        // FNV-1a, 64-bit
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in token.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x100000001b3);
        }
        (hash % self.dimension as u64) as usize
    }
}

#[async_trait]
impl EmbeddingProvider for StubEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text.to_lowercase().split_whitespace() {
            vector[self.bucket(token)] += 1.0;
        }
        Ok(vector)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "stub"
    }
}
