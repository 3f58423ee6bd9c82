//! Typed application configuration.
//!
//! Loaded from a JSON file; every section has defaults, unknown fields are
//! rejected at load time. Backend and category tags are closed enums, so a
//! typo fails here instead of at first use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::knowledge::chunker::ChunkConfig;
use crate::knowledge::store::{get_data_dir, StoreKind};

// ============================================================================
// AppConfig
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct AppConfig {
    /// Overrides the platform data directory when set.
    pub data_dir: Option<PathBuf>,
    pub store: StoreConfig,
    pub chunking: ChunkConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub scraper: ScraperConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct StoreConfig {
    pub backend: StoreKind,
    /// Memory backend only: flush the index to a JSON file on every write.
    pub persistent: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreKind::Lance,
            persistent: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RetrievalConfig {
    /// Hits requested per category.
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 5 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EmbeddingConfig {
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimension: crate::embedding::DEFAULT_DIMENSION,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LlmConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "deepseek-chat".to_string(),
            temperature: 0.3,
            max_tokens: 512,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ScraperConfig {
    pub base_url: String,
    /// Hotel page URLs to scrape.
    pub urls: Vec<String>,
    /// Default snapshot file for `--snapshot` / `--save-snapshot`.
    pub snapshot: Option<PathBuf>,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.iranhotelonline.com".to_string(),
            urls: Vec::new(),
            snapshot: None,
        }
    }
}

impl AppConfig {
    /// Read and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RagError::Config(format!("cannot read config {}: {}", path.display(), e))
        })?;
        let config: AppConfig = serde_json::from_str(&raw)
            .map_err(|e| RagError::Config(format!("invalid config {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        if self.retrieval.top_k == 0 {
            return Err(RagError::Config(
                "retrieval.top_k must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolved data directory.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(get_data_dir)
    }
}

// ============================================================================
// Tests
// ============================================================================
