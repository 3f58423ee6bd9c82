//! hotel-rag - incremental hotel RAG pipeline
//!
//! Scrapes hotel info and reviews, detects changed records through content
//! fingerprints, indexes each category into its own vector table, and
//! answers queries over info documents joined with their reviews.

pub mod app;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod knowledge;
pub mod llm;
pub mod retrieve;
pub mod scrape;

// Re-exports
pub use app::App;
pub use config::AppConfig;
pub use embedding::{get_api_key, has_api_key, EmbeddingProvider, GeminiEmbedding};
pub use error::{RagError, Result};
pub use ingest::{IngestReport, IngestionPipeline};
pub use knowledge::{
    get_data_dir, Category, CategoryStore, ChunkConfig, Chunker, Document, FingerprintStore,
    LanceIndex, MemoryIndex, StoreKind, TextIndex,
};
pub use llm::{AnswerGenerator, DeepSeekClient, QueryProcessor};
pub use retrieve::{CombinedRetriever, Retriever};
pub use scrape::{HotelApiScraper, HotelRecord, RawReview, RecordSource, SnapshotSource};
