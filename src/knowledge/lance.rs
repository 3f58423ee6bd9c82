//! LanceDB-backed text index.
//!
//! One Lance table per category. Rows carry the chunk text, its metadata
//! serialized as a JSON column, and the embedding as a fixed-size float
//! list. ref: https://lancedb.github.io/lancedb/

use std::path::Path;
use std::sync::Arc;

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::knowledge::index::TextIndex;
use crate::knowledge::store::Document;

// ============================================================================
// LanceIndex
// ============================================================================

pub struct LanceIndex {
    db: Connection,
    table_name: String,
    embedder: Arc<dyn EmbeddingProvider>,
    dimension: i32,
}

impl LanceIndex {
    /// Open (or create) the database directory and bind to one table.
    pub async fn open(
        path: &Path,
        table_name: &str,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| RagError::StorageUnavailable(e.to_string()))?;
            }
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| RagError::StorageUnavailable("invalid path encoding".to_string()))?;

        let db = lancedb::connect(path_str).execute().await?;
        let dimension = embedder.dimension() as i32;

        Ok(Self {
            db,
            table_name: table_name.to_string(),
            embedder,
            dimension,
        })
    }

    fn schema(&self) -> Schema {
        Schema::new(vec![
            Field::new("content", DataType::Utf8, false),
            Field::new("metadata", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dimension,
                ),
                false,
            ),
        ])
    }

    fn to_batch(&self, docs: &[Document], embeddings: &[Vec<f32>]) -> Result<RecordBatch> {
        let contents: Vec<&str> = docs.iter().map(|d| d.content.as_str()).collect();
        let metadata: Vec<String> = docs
            .iter()
            .map(|d| serde_json::to_string(&d.metadata))
            .collect::<std::result::Result<_, _>>()?;
        let metadata_refs: Vec<&str> = metadata.iter().map(|s| s.as_str()).collect();

        let flat: Vec<f32> = embeddings.iter().flatten().copied().collect();
        let values = Float32Array::from(flat);
        let item_field = Arc::new(Field::new("item", DataType::Float32, true));
        let embedding_list = FixedSizeListArray::try_new(
            item_field,
            self.dimension,
            Arc::new(values) as Arc<dyn Array>,
            None,
        )?;

        let batch = RecordBatch::try_new(
            Arc::new(self.schema()),
            vec![
                Arc::new(StringArray::from(contents)),
                Arc::new(StringArray::from(metadata_refs)),
                Arc::new(embedding_list),
            ],
        )?;

        Ok(batch)
    }

    async fn table_exists(&self) -> bool {
        self.db
            .table_names()
            .execute()
            .await
            .map(|names| names.contains(&self.table_name))
            .unwrap_or(false)
    }

    async fn open_table(&self) -> Result<lancedb::table::Table> {
        Ok(self.db.open_table(&self.table_name).execute().await?)
    }
}

#[async_trait]
impl TextIndex for LanceIndex {
    async fn index(&self, docs: Vec<Document>) -> Result<()> {
        if docs.is_empty() {
            return Ok(());
        }

        let texts: Vec<String> = docs.iter().map(|d| d.content.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;

        let batch = self.to_batch(&docs, &embeddings)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        if self.table_exists().await {
            let table = self.open_table().await?;
            table.add(batches).execute().await?;
        } else {
            self.db
                .create_table(&self.table_name, batches)
                .execute()
                .await?;
        }

        tracing::debug!(table = %self.table_name, count = docs.len(), "lance batch written");
        Ok(())
    }

    async fn query(&self, text: &str, k: usize) -> Result<Vec<Document>> {
        if k == 0 || !self.table_exists().await {
            return Ok(vec![]);
        }

        let query_embedding = self.embedder.embed(text).await?;
        let table = self.open_table().await?;

        let stream = table
            .vector_search(query_embedding)?
            .limit(k)
            .execute()
            .await?;

        let batches: Vec<RecordBatch> = stream.try_collect().await?;
        let mut docs = Vec::new();

        for batch in batches {
            let contents = batch
                .column_by_name("content")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                .ok_or_else(|| RagError::StorageUnavailable("missing content column".to_string()))?;

            let metadata = batch
                .column_by_name("metadata")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                .ok_or_else(|| {
                    RagError::StorageUnavailable("missing metadata column".to_string())
                })?;

            for i in 0..batch.num_rows() {
                let meta = serde_json::from_str(metadata.value(i)).map_err(|e| {
                    RagError::StorageUnavailable(format!("corrupt metadata row: {}", e))
                })?;
                docs.push(Document::new(contents.value(i), meta));
            }
        }

        // LanceDB returns rows nearest first; results may span batches but
        // stay ordered.
        docs.truncate(k);
        Ok(docs)
    }

    async fn clear(&self) -> Result<()> {
        if self.table_exists().await {
            self.db.drop_table(&self.table_name).await?;
        }
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        if !self.table_exists().await {
            return Ok(0);
        }
        let table = self.open_table().await?;
        Ok(table.count_rows(None).await?)
    }
}

// ============================================================================
// Tests
// ============================================================================
