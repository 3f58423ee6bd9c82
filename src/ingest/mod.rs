//! Ingestion orchestrator.
//!
//! Pulls records from a source, formats and fingerprints each record per
//! category, chunks only what changed, and appends one batch per category.
//! Fingerprints are committed only after the category batch has landed, so
//! a failed write is re-indexed on the next run.

pub mod format;

pub use format::{formatter_for, FormattedUnit, Formatter, InfoFormatter, ReviewFormatter};

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::knowledge::chunker::{chunker_for, ChunkConfig, Chunker};
use crate::knowledge::fingerprint::{composite_key, fingerprint, FingerprintStore};
use crate::knowledge::store::{Category, CategoryStore, Document};
use crate::scrape::{HotelRecord, RecordSource};

// ============================================================================
// IngestReport
// ============================================================================

/// Outcome of one ingestion run.
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Records pulled from the source.
    pub records_seen: usize,
    /// Record-category pairs whose fingerprint matched the stored one.
    pub unchanged: usize,
    /// Chunks appended, per category. Absent key means no batch was written.
    pub chunks_added: HashMap<Category, usize>,
    /// Per-record failures, isolated from the rest of the batch.
    pub errors: Vec<String>,
    /// Every newly indexed chunk, in write order.
    pub documents: Vec<Document>,
}

impl IngestReport {
    pub fn total_chunks(&self) -> usize {
        self.chunks_added.values().sum()
    }
}

// ============================================================================
// IngestionPipeline
// ============================================================================

enum Staged {
    Changed(Vec<Document>),
    Unchanged,
}

pub struct IngestionPipeline {
    source: Arc<dyn RecordSource>,
    store: Arc<CategoryStore>,
    fingerprints: Arc<FingerprintStore>,
    chunk_config: ChunkConfig,
}

impl IngestionPipeline {
    pub fn new(
        source: Arc<dyn RecordSource>,
        store: Arc<CategoryStore>,
        fingerprints: Arc<FingerprintStore>,
        chunk_config: ChunkConfig,
    ) -> Self {
        Self {
            source,
            store,
            fingerprints,
            chunk_config,
        }
    }

    /// Run one ingestion pass over the source.
    pub async fn ingest(&self) -> Result<IngestReport> {
        let records = self.source.records().await?;
        tracing::info!(
            source = self.source.name(),
            count = records.len(),
            "records pulled"
        );

        let mut report = IngestReport {
            records_seen: records.len(),
            ..Default::default()
        };

        for category in Category::ALL {
            let formatter = formatter_for(category);
            let chunker = chunker_for(category, &self.chunk_config)?;

            let mut batch: Vec<Document> = Vec::new();
            let mut staged_keys: Vec<String> = Vec::new();

            for record in &records {
                let key = composite_key(&record.source_id, self.store.kind(), category);
                match self.stage_record(record, category, &key, chunker.as_ref(), formatter.as_ref())
                {
                    Ok(Staged::Changed(docs)) => {
                        staged_keys.push(key);
                        batch.extend(docs);
                    }
                    Ok(Staged::Unchanged) => report.unchanged += 1,
                    Err(e) => {
                        tracing::warn!(
                            hotel = %record.source_id,
                            category = %category,
                            error = %e,
                            "record skipped"
                        );
                        report
                            .errors
                            .push(format!("{} [{}]: {}", record.source_id, category, e));
                    }
                }
            }

            if batch.is_empty() {
                tracing::debug!(category = %category, "no changes");
                continue;
            }

            report.documents.extend(batch.iter().cloned());
            let added = self.store.add(category, batch).await?;
            // Fingerprints persist only after the batch landed.
            let committed = self.fingerprints.commit_staged(category, &staged_keys)?;

            tracing::info!(
                category = %category,
                chunks = added,
                fingerprints = committed,
                "category batch indexed"
            );
            report.chunks_added.insert(category, added);
        }

        Ok(report)
    }

    /// Format, fingerprint, and chunk one record for one category.
    fn stage_record(
        &self,
        record: &HotelRecord,
        category: Category,
        key: &str,
        chunker: &dyn Chunker,
        formatter: &dyn Formatter,
    ) -> Result<Staged> {
        let units = formatter.format(record)?;
        if units.is_empty() {
            // Nothing to index for this category (e.g. a hotel without
            // reviews); no fingerprint is recorded either.
            return Ok(Staged::Unchanged);
        }

        let joined = units
            .iter()
            .map(|u| u.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let hash = fingerprint(&joined);

        if !self.fingerprints.change_check(category, key, &hash)? {
            tracing::debug!(hotel = %record.source_id, category = %category, "unchanged");
            return Ok(Staged::Unchanged);
        }

        let mut docs = Vec::new();
        for unit in &units {
            docs.extend(chunker.chunk(&unit.content, &unit.metadata)?);
        }
        Ok(Staged::Changed(docs))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RagError;
    use crate::knowledge::index::{MemoryIndex, TextIndex};
    use crate::knowledge::store::StoreKind;
    use crate::knowledge::testing::StubEmbedding;
    use crate::scrape::{DescriptiveInfo, RawReview};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct StubSource(Mutex<Vec<HotelRecord>>);

    #[async_trait]
    impl RecordSource for StubSource {
        async fn records(&self) -> Result<Vec<HotelRecord>> {
            Ok(self.0.lock().unwrap().clone())
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    fn record(source_id: &str, review_texts: &[&str]) -> HotelRecord {
        HotelRecord {
            source_id: source_id.to_string(),
            name: format!("hotel {}", source_id),
            city: "تهران".to_string(),
            url: format!("https://example.com/hotel/{}", source_id),
            scraped_at: Utc::now(),
            info: DescriptiveInfo {
                summary: format!("summary for {}", source_id),
                ..Default::default()
            },
            reviews: review_texts
                .iter()
                .map(|text| RawReview {
                    reviewer: "علی".to_string(),
                    date: "1403/01/15".to_string(),
                    rating: Some(4.0),
                    room_type: "دو تخته".to_string(),
                    main_text: text.to_string(),
                    positive_viewpoints: vec![],
                    negative_viewpoints: vec![],
                })
                .collect(),
        }
    }

    struct Fixture {
        source: Arc<StubSource>,
        store: Arc<CategoryStore>,
        fingerprints: Arc<FingerprintStore>,
        pipeline: IngestionPipeline,
        _dir: TempDir,
    }

    fn fixture(records: Vec<HotelRecord>) -> Fixture {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(StubSource(Mutex::new(records)));

        let mut indexes: HashMap<Category, Arc<dyn TextIndex>> = HashMap::new();
        for category in Category::ALL {
            indexes.insert(
                category,
                Arc::new(MemoryIndex::ephemeral(Arc::new(StubEmbedding::new(8)))),
            );
        }
        let store = Arc::new(CategoryStore::new(StoreKind::Memory, indexes).unwrap());
        let fingerprints = Arc::new(FingerprintStore::open_in(dir.path()).unwrap());

        let pipeline = IngestionPipeline::new(
            source.clone(),
            store.clone(),
            fingerprints.clone(),
            ChunkConfig::default(),
        );

        Fixture {
            source,
            store,
            fingerprints,
            pipeline,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_bootstrap_then_idempotent() {
        let fx = fixture(vec![
            record("h1", &["clean room", "good breakfast"]),
            record("h2", &[]),
        ]);

        let first = fx.pipeline.ingest().await.unwrap();
        assert_eq!(first.records_seen, 2);
        assert_eq!(first.chunks_added[&Category::Info], 2);
        assert_eq!(first.chunks_added[&Category::Review], 2);
        assert!(first.errors.is_empty());
        assert_eq!(first.documents.len(), 4);

        assert_eq!(fx.store.count(Category::Info).await.unwrap(), 2);
        assert_eq!(fx.store.count(Category::Review).await.unwrap(), 2);
        assert_eq!(fx.fingerprints.count(Category::Info).unwrap(), 2);
        // h2 has no reviews, so only h1 carries a review fingerprint.
        assert_eq!(fx.fingerprints.count(Category::Review).unwrap(), 1);

        let second = fx.pipeline.ingest().await.unwrap();
        assert!(second.chunks_added.is_empty());
        assert!(second.documents.is_empty());
        assert_eq!(second.unchanged, 4);
        assert_eq!(fx.store.count(Category::Info).await.unwrap(), 2);
        assert_eq!(fx.store.count(Category::Review).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_changed_review_reindexes_only_reviews() {
        let fx = fixture(vec![record("h1", &["clean room"])]);
        fx.pipeline.ingest().await.unwrap();

        *fx.source.0.lock().unwrap() = vec![record("h1", &["clean room", "noisy street"])];
        let report = fx.pipeline.ingest().await.unwrap();

        assert!(!report.chunks_added.contains_key(&Category::Info));
        assert_eq!(report.chunks_added[&Category::Review], 2);
        assert_eq!(report.unchanged, 1);
        assert_eq!(fx.store.count(Category::Info).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_new_record_only_adds_new_chunks() {
        let fx = fixture(vec![record("h1", &["clean room"])]);
        fx.pipeline.ingest().await.unwrap();

        fx.source.0.lock().unwrap().push(record("h2", &["nice view"]));
        let report = fx.pipeline.ingest().await.unwrap();

        assert_eq!(report.records_seen, 2);
        assert_eq!(report.unchanged, 2);
        assert_eq!(report.chunks_added[&Category::Info], 1);
        assert_eq!(report.chunks_added[&Category::Review], 1);
        assert_eq!(fx.store.count(Category::Info).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_bad_record_is_isolated() {
        let fx = fixture(vec![record("", &["orphan review"]), record("h1", &[])]);

        let report = fx.pipeline.ingest().await.unwrap();

        // The bad record fails once per category; the good one still lands.
        assert_eq!(report.errors.len(), 2);
        assert!(report.errors.iter().all(|e| e.contains("formatting failed")));
        assert_eq!(report.chunks_added[&Category::Info], 1);
        assert_eq!(fx.store.count(Category::Info).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_source_failure_propagates() {
        struct FailingSource;

        #[async_trait]
        impl RecordSource for FailingSource {
            async fn records(&self) -> Result<Vec<HotelRecord>> {
                Err(RagError::Config("snapshot missing".to_string()))
            }

            fn name(&self) -> &str {
                "failing"
            }
        }

        let fx = fixture(vec![]);
        let pipeline = IngestionPipeline::new(
            Arc::new(FailingSource),
            fx.store.clone(),
            fx.fingerprints.clone(),
            ChunkConfig::default(),
        );

        assert!(pipeline.ingest().await.is_err());
    }
}
