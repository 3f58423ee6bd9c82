//! Embedding module - text vectorization through the Gemini API.
//!
//! The provider trait is the seam the indexes depend on; the Gemini client
//! is the production implementation, tests substitute a deterministic stub.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{RagError, Result};

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// Turns text into vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Batch embedding. Default: sequential calls.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    fn dimension(&self) -> usize;

    fn name(&self) -> &str;
}

// ============================================================================
// Google Gemini Embedding
// ============================================================================

/// Gemini embedding endpoint (gemini-embedding-001, MRL dimensions)
/// source: https://ai.google.dev/gemini-api/docs/embeddings
const GEMINI_EMBED_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-embedding-001:embedContent";

pub const DEFAULT_DIMENSION: usize = 768;

/// Dimensions the endpoint accepts.
const SUPPORTED_DIMENSIONS: [usize; 3] = [768, 1536, 3072];

/// Minimum spacing between requests (free tier: 60 RPM).
const MIN_DELAY: Duration = Duration::from_millis(1000);
/// Retries on 429 before giving up.
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 2000;

pub struct GeminiEmbedding {
    api_key: String,
    client: reqwest::Client,
    dimension: usize,
    // Interval gate: next request waits until MIN_DELAY after the last.
    last_request: Mutex<Option<Instant>>,
}

impl GeminiEmbedding {
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_dimension(api_key, DEFAULT_DIMENSION)
    }

    pub fn with_dimension(api_key: String, dimension: usize) -> Result<Self> {
        if !SUPPORTED_DIMENSIONS.contains(&dimension) {
            return Err(RagError::Config(format!(
                "unsupported embedding dimension {} (expected one of {:?})",
                dimension, SUPPORTED_DIMENSIONS
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            api_key,
            client,
            dimension,
            last_request: Mutex::new(None),
        })
    }

    /// Key priority: GEMINI_API_KEY, then GOOGLE_AI_API_KEY.
    pub fn from_env(dimension: usize) -> Result<Self> {
        Self::with_dimension(get_api_key()?, dimension)
    }

    async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(at) = *last {
            let elapsed = at.elapsed();
            if elapsed < MIN_DELAY {
                tokio::time::sleep(MIN_DELAY - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn request_once(&self, request: &EmbedRequest) -> Result<EmbedOutcome> {
        self.pace().await;

        // Key goes in a header, never the URL.
        let response = self
            .client
            .post(GEMINI_EMBED_URL)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            let parsed: EmbedResponse = serde_json::from_str(&body)
                .map_err(|e| RagError::Embedding(format!("malformed response: {}", e)))?;
            return Ok(EmbedOutcome::Done(parsed.embedding.values));
        }

        if status.as_u16() == 429 {
            return Ok(EmbedOutcome::RateLimited);
        }

        if let Ok(err) = serde_json::from_str::<GeminiError>(&body) {
            return Err(RagError::Embedding(format!(
                "{}: {}",
                err.error.status, err.error.message
            )));
        }
        Err(RagError::Embedding(format!("{}: {}", status, body)))
    }
}

enum EmbedOutcome {
    Done(Vec<f32>),
    RateLimited,
}

/// Request body.
/// source: https://ai.google.dev/gemini-api/docs/embeddings
#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    content: EmbedContent,
    #[serde(rename = "taskType")]
    task_type: String,
    #[serde(rename = "outputDimensionality")]
    output_dimensionality: usize,
}

#[derive(Debug, Serialize)]
struct EmbedContent {
    parts: Vec<EmbedPart>,
}

#[derive(Debug, Serialize)]
struct EmbedPart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
    #[serde(default)]
    status: String,
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        let request = EmbedRequest {
            model: "models/gemini-embedding-001".to_string(),
            content: EmbedContent {
                parts: vec![EmbedPart {
                    text: text.to_string(),
                }],
            },
            task_type: "RETRIEVAL_DOCUMENT".to_string(),
            output_dimensionality: self.dimension,
        };

        for attempt in 0..=MAX_RETRIES {
            match self.request_once(&request).await {
                Ok(EmbedOutcome::Done(values)) => {
                    if values.len() != self.dimension {
                        return Err(RagError::Embedding(format!(
                            "dimension mismatch: got {}, expected {}",
                            values.len(),
                            self.dimension
                        )));
                    }
                    return Ok(values);
                }
                Ok(EmbedOutcome::RateLimited) if attempt < MAX_RETRIES => {
                    let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt));
                    tracing::warn!(
                        attempt = attempt + 1,
                        max = MAX_RETRIES,
                        "rate limited (429), backing off {:?}",
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
                Ok(EmbedOutcome::RateLimited) => {
                    return Err(RagError::Embedding(format!(
                        "rate limit persisted after {} retries",
                        MAX_RETRIES
                    )));
                }
                Err(e) => return Err(e),
            }
        }

        Err(RagError::Embedding("retry loop exhausted".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        // No batch endpoint; sequential calls, paced by the interval gate.
        let mut results = Vec::with_capacity(texts.len());
        for (i, text) in texts.iter().enumerate() {
            tracing::debug!(current = i + 1, total = texts.len(), "embedding batch item");
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "gemini-embedding-001"
    }
}

// ============================================================================
// API Key Management
// ============================================================================

pub fn get_api_key() -> Result<String> {
    for var in ["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"] {
        if let Ok(key) = std::env::var(var) {
            if !key.is_empty() {
                tracing::debug!("using API key from {}", var);
                return Ok(key);
            }
        }
    }

    Err(RagError::Config(
        "API key not found. Set GEMINI_API_KEY or GOOGLE_AI_API_KEY.\n\
         Get a key at: https://aistudio.google.com/app/apikey"
            .to_string(),
    ))
}

pub fn has_api_key() -> bool {
    get_api_key().is_ok()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_dimension_rejected() {
        let result = GeminiEmbedding::with_dimension("fake_key".to_string(), 999);
        assert!(matches!(result, Err(RagError::Config(_))));
    }

    #[test]
    fn test_supported_dimensions_accepted() {
        for dim in SUPPORTED_DIMENSIONS {
            let embedder = GeminiEmbedding::with_dimension("fake_key".to_string(), dim).unwrap();
            assert_eq!(embedder.dimension(), dim);
        }
    }

    #[tokio::test]
    async fn test_empty_text_embeds_to_zero_vector() {
        let embedder = GeminiEmbedding::with_dimension("fake_key".to_string(), 768).unwrap();
        let vector = embedder.embed("   ").await.unwrap();
        assert_eq!(vector.len(), 768);
        assert!(vector.iter().all(|v| *v == 0.0));
    }
}
