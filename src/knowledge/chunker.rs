//! Text chunking strategies.
//!
//! Descriptive hotel text goes through a recursive separator-priority
//! splitter with bounded chunk size and overlap. Review text is short and
//! self-contained, so it passes through as a single chunk.

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::knowledge::store::{Category, Document, Metadata};

// ============================================================================
// Chunk Configuration
// ============================================================================

/// Splitter settings. Sizes are in characters, not bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ChunkConfig {
    /// Maximum chunk size including overlap.
    pub max_characters: usize,
    /// Characters of the previous chunk repeated at the start of the next.
    pub overlap_characters: usize,
    /// Separators tried in order; later entries split finer.
    pub separators: Vec<String>,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_characters: 512,
            overlap_characters: 50,
            // Persian comma included: descriptive fields arrive in Persian.
            separators: ["\n\n", "\n", "،", ".", ";", ":"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl ChunkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_characters == 0 {
            return Err(RagError::Config(
                "chunking.max_characters must be positive".to_string(),
            ));
        }
        if self.overlap_characters >= self.max_characters {
            return Err(RagError::Config(format!(
                "chunking.overlap_characters ({}) must be smaller than max_characters ({})",
                self.overlap_characters, self.max_characters
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// Chunking strategy: formatted text in, indexed documents out.
///
/// Chunk metadata is a verbatim copy of the unit metadata.
pub trait Chunker: Send + Sync {
    fn chunk(&self, text: &str, metadata: &Metadata) -> Result<Vec<Document>>;

    fn name(&self) -> &'static str;
}

/// Chunker for a category. Closed dispatch: a new category picks its
/// strategy here, in code.
pub fn chunker_for(category: Category, config: &ChunkConfig) -> Result<Box<dyn Chunker>> {
    match category {
        Category::Info => Ok(Box::new(SplittingChunker::new(config.clone())?)),
        Category::Review => Ok(Box::new(PassthroughChunker)),
    }
}

// ============================================================================
// SplittingChunker
// ============================================================================

/// Recursive separator-priority splitter.
///
/// Text is cut into segments no longer than `max_characters -
/// overlap_characters`, preferring earlier separators and falling through
/// to finer ones (and finally a hard character split) only when a piece
/// still exceeds the budget. Adjacent segments are then merged greedily,
/// and each chunk after the first starts with the tail of the previous
/// segment. Separators stay attached to the text, so stripping the
/// overlap prefixes and concatenating the chunks reconstructs the input.
pub struct SplittingChunker {
    config: ChunkConfig,
}

impl SplittingChunker {
    pub fn new(config: ChunkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn with_defaults() -> Self {
        Self {
            config: ChunkConfig::default(),
        }
    }

    /// Per-segment budget. Overlap is added on top, so segment + overlap
    /// never exceeds `max_characters`.
    fn segment_budget(&self) -> usize {
        self.config.max_characters - self.config.overlap_characters
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let budget = self.segment_budget();
        if char_len(text) <= budget {
            return vec![text.to_string()];
        }

        let Some((sep, rest)) = separators.split_first() else {
            return hard_split(text, budget);
        };

        let parts = split_keep_separator(text, sep);
        if parts.len() == 1 {
            return self.split_recursive(text, rest);
        }

        let mut pieces = Vec::new();
        for part in parts {
            if char_len(&part) <= budget {
                pieces.push(part);
            } else {
                pieces.extend(self.split_recursive(&part, rest));
            }
        }
        pieces
    }

    /// Combine adjacent pieces while the result stays within the budget.
    fn merge_pieces(&self, pieces: Vec<String>) -> Vec<String> {
        let budget = self.segment_budget();
        let mut result: Vec<String> = Vec::new();

        for piece in pieces {
            match result.last_mut() {
                Some(last) if char_len(last) + char_len(&piece) <= budget => {
                    last.push_str(&piece);
                }
                _ => result.push(piece),
            }
        }

        result
    }

    fn apply_overlap(&self, segments: Vec<String>) -> Vec<String> {
        let overlap = self.config.overlap_characters;
        if overlap == 0 || segments.len() < 2 {
            return segments;
        }

        let mut result = Vec::with_capacity(segments.len());
        for (i, segment) in segments.iter().enumerate() {
            if i == 0 {
                result.push(segment.clone());
            } else {
                let tail = char_tail(&segments[i - 1], overlap);
                result.push(format!("{}{}", tail, segment));
            }
        }
        result
    }
}

impl Chunker for SplittingChunker {
    fn chunk(&self, text: &str, metadata: &Metadata) -> Result<Vec<Document>> {
        if text.trim().is_empty() {
            return Err(RagError::Chunking("empty input text".to_string()));
        }

        let pieces = self.split_recursive(text, &self.config.separators);
        let segments = self.merge_pieces(pieces);
        let chunks = self.apply_overlap(segments);

        Ok(chunks
            .into_iter()
            .map(|content| Document::new(content, metadata.clone()))
            .collect())
    }

    fn name(&self) -> &'static str {
        "SplittingChunker"
    }
}

// ============================================================================
// PassthroughChunker
// ============================================================================

/// Emits the input as exactly one chunk, text and metadata unchanged.
pub struct PassthroughChunker;

impl Chunker for PassthroughChunker {
    fn chunk(&self, text: &str, metadata: &Metadata) -> Result<Vec<Document>> {
        if text.trim().is_empty() {
            return Err(RagError::Chunking("empty input text".to_string()));
        }
        Ok(vec![Document::new(text, metadata.clone())])
    }

    fn name(&self) -> &'static str {
        "PassthroughChunker"
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split on `sep`, keeping the separator attached to the preceding piece.
fn split_keep_separator(text: &str, sep: &str) -> Vec<String> {
    if sep.is_empty() {
        return vec![text.to_string()];
    }

    let mut parts = Vec::new();
    let mut rest = text;
    while let Some(pos) = rest.find(sep) {
        let end = pos + sep.len();
        parts.push(rest[..end].to_string());
        rest = &rest[end..];
    }
    if !rest.is_empty() {
        parts.push(rest.to_string());
    }
    parts
}

/// Cut into windows of at most `budget` characters.
fn hard_split(text: &str, budget: usize) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut count = 0;

    for ch in text.chars() {
        if count == budget {
            parts.push(std::mem::take(&mut current));
            count = 0;
        }
        current.push(ch);
        count += 1;
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

/// Last `n` characters of `s`, on a char boundary.
fn char_tail(s: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    let total = char_len(s);
    if total <= n {
        return s;
    }
    let start = s
        .char_indices()
        .nth(total - n)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &s[start..]
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::testing::meta;

    fn small_config() -> ChunkConfig {
        ChunkConfig {
            max_characters: 40,
            overlap_characters: 10,
            ..ChunkConfig::default()
        }
    }

    #[test]
    fn test_empty_input_is_an_error() {
        let chunker = SplittingChunker::with_defaults();
        assert!(matches!(
            chunker.chunk("   ", &meta("h1")),
            Err(RagError::Chunking(_))
        ));
        assert!(matches!(
            PassthroughChunker.chunk("", &meta("h1")),
            Err(RagError::Chunking(_))
        ));
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunker = SplittingChunker::with_defaults();
        let docs = chunker.chunk("A short description.", &meta("h1")).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, "A short description.");
        assert_eq!(docs[0].source_id(), Some("h1"));
    }

    #[test]
    fn test_chunks_respect_max_characters() {
        let chunker = SplittingChunker::new(small_config()).unwrap();
        let text = "First paragraph with some words.\n\nSecond paragraph, also with words.\n\nThird paragraph closes the text here.";
        let docs = chunker.chunk(text, &meta("h1")).unwrap();

        assert!(docs.len() > 1);
        for doc in &docs {
            assert!(doc.content.chars().count() <= 40);
        }
    }

    #[test]
    fn test_overlap_reconstruction() {
        let config = small_config();
        let overlap = config.overlap_characters;
        let chunker = SplittingChunker::new(config).unwrap();
        let text = "Alpha block of text.\n\nBeta block of text.\n\nGamma block of text.\n\nDelta block of text, slightly longer than others.";
        let docs = chunker.chunk(text, &meta("h1")).unwrap();
        assert!(docs.len() > 1);

        let mut rebuilt = String::new();
        let mut prev_segment_chars = 0;
        for (i, doc) in docs.iter().enumerate() {
            let segment: String = if i == 0 {
                doc.content.clone()
            } else {
                let skip = overlap.min(prev_segment_chars);
                doc.content.chars().skip(skip).collect()
            };
            prev_segment_chars = segment.chars().count();
            rebuilt.push_str(&segment);
        }

        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_persian_comma_is_a_split_point() {
        let config = ChunkConfig {
            max_characters: 30,
            overlap_characters: 0,
            ..ChunkConfig::default()
        };
        let chunker = SplittingChunker::new(config).unwrap();
        let text = "هتل نزدیک حرم است، پارکینگ دارد، صبحانه رایگان است، اینترنت خوب است";
        let docs = chunker.chunk(text, &meta("h1")).unwrap();

        assert!(docs.len() > 1);
        let rebuilt: String = docs.iter().map(|d| d.content.as_str()).collect();
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_hard_split_without_separators() {
        let config = ChunkConfig {
            max_characters: 10,
            overlap_characters: 0,
            separators: vec![],
        };
        let chunker = SplittingChunker::new(config).unwrap();
        let text = "abcdefghijklmnopqrstuvwxy";
        let docs = chunker.chunk(text, &meta("h1")).unwrap();

        assert_eq!(docs.len(), 3);
        assert_eq!(docs[0].content, "abcdefghij");
        assert_eq!(docs[2].content, "uvwxy");
    }

    #[test]
    fn test_passthrough_single_chunk() {
        let metadata = meta("h7");
        let docs = PassthroughChunker
            .chunk("A single review text.", &metadata)
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, "A single review text.");
        assert_eq!(docs[0].metadata, metadata);
    }

    #[test]
    fn test_category_dispatch() {
        let config = ChunkConfig::default();
        assert_eq!(
            chunker_for(Category::Info, &config).unwrap().name(),
            "SplittingChunker"
        );
        assert_eq!(
            chunker_for(Category::Review, &config).unwrap().name(),
            "PassthroughChunker"
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ChunkConfig {
            max_characters: 10,
            overlap_characters: 10,
            ..ChunkConfig::default()
        };
        assert!(matches!(
            SplittingChunker::new(config),
            Err(RagError::Config(_))
        ));

        let config = ChunkConfig {
            max_characters: 0,
            overlap_characters: 0,
            ..ChunkConfig::default()
        };
        assert!(matches!(
            SplittingChunker::new(config),
            Err(RagError::Config(_))
        ));
    }
}
