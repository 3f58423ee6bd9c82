//! Retrieval - per-category handles and the combined info+review retriever.
//!
//! The combined retriever queries both categories concurrently, groups
//! review hits by hotel, and appends each hotel's reviews to its info
//! document. Info hits drive the result: order and count are preserved,
//! review hits without a matching info hit are dropped.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::knowledge::store::{Category, CategoryRetriever, Document};

/// Section header separating a hotel's info text from its appended reviews.
const REVIEWS_DELIMITER: &str = "\n\nReviews:\n";

// ============================================================================
// Retriever Trait
// ============================================================================

/// Query-to-documents capability.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str) -> Result<Vec<Document>>;

    fn name(&self) -> &str;
}

#[async_trait]
impl Retriever for CategoryRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<Document>> {
        CategoryRetriever::retrieve(self, query).await
    }

    fn name(&self) -> &str {
        self.category().tag()
    }
}

// ============================================================================
// CombinedRetriever
// ============================================================================

/// Joins info hits with review hits on the hotel source id.
pub struct CombinedRetriever {
    info: CategoryRetriever,
    review: CategoryRetriever,
}

impl CombinedRetriever {
    pub fn new(info: CategoryRetriever, review: CategoryRetriever) -> Result<Self> {
        for (retriever, expected) in [(&info, Category::Info), (&review, Category::Review)] {
            if retriever.category() != expected {
                return Err(crate::error::RagError::Config(format!(
                    "combined retriever wired with '{}' where '{}' was expected",
                    retriever.category(),
                    expected
                )));
            }
        }
        Ok(Self { info, review })
    }

    /// Review hits keyed by hotel, store order kept within each group.
    fn group_reviews(hits: Vec<Document>) -> HashMap<String, Vec<String>> {
        let mut groups: HashMap<String, Vec<String>> = HashMap::new();
        for hit in hits {
            match hit.source_id() {
                Some(id) => groups
                    .entry(id.to_string())
                    .or_default()
                    .push(hit.content),
                None => {
                    tracing::debug!("review hit without a hotel source id dropped");
                }
            }
        }
        groups
    }

    fn join(info_hits: Vec<Document>, review_hits: Vec<Document>) -> Vec<Document> {
        let mut groups = Self::group_reviews(review_hits);

        info_hits
            .into_iter()
            .map(|doc| {
                let matched = doc.source_id().and_then(|id| groups.remove(id));
                match matched {
                    Some(reviews) => {
                        let content =
                            format!("{}{}{}", doc.content, REVIEWS_DELIMITER, reviews.join("\n"));
                        Document::new(content, doc.metadata)
                    }
                    None => doc,
                }
            })
            .collect()
    }
}

#[async_trait]
impl Retriever for CombinedRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<Document>> {
        let (info_hits, review_hits) =
            tokio::join!(self.info.retrieve(query), self.review.retrieve(query));

        let info_hits = info_hits?;
        // Review-side failure degrades to info-only results.
        let review_hits = match review_hits {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(error = %e, "review retrieval failed, returning info only");
                Vec::new()
            }
        };

        tracing::debug!(
            info = info_hits.len(),
            reviews = review_hits.len(),
            "combined retrieval"
        );
        Ok(Self::join(info_hits, review_hits))
    }

    fn name(&self) -> &str {
        "combined"
    }
}

// ============================================================================
// Tests
// ============================================================================
