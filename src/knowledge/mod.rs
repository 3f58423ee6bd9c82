//! Knowledge module - category-partitioned document store.
//!
//! - store: closed categories, the document type, the store facade
//! - index: text-indexing capability (memory backend, cosine scoring)
//! - lance: LanceDB backend, one table per category
//! - fingerprint: SHA-256 change detection over formatted content
//! - chunker: recursive splitter for info text, passthrough for reviews

pub mod chunker;
pub mod fingerprint;
pub mod index;
pub mod lance;
pub mod store;

#[cfg(test)]
pub mod testing;

// Re-exports
pub use chunker::{chunker_for, ChunkConfig, Chunker, PassthroughChunker, SplittingChunker};
pub use fingerprint::{composite_key, fingerprint, FingerprintStore};
pub use index::{cosine_similarity, MemoryIndex, TextIndex};
pub use lance::LanceIndex;
pub use store::{
    get_data_dir, Category, CategoryRetriever, CategoryStore, Document, Metadata, StoreKind,
    SOURCE_ID_KEY,
};
