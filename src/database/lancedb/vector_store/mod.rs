#[cfg(test)]
mod tests;

use super::{ChunkMetadata, DocumentRecord, RetrievedMatch};
use crate::config::Config;
use crate::{RagError, Result};
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType,
    query::{ExecutableQuery, QueryBase},
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Distance metric the index is built and queried with. The metric is fixed
/// at index build time and recorded in the manifest; switching metrics
/// mid-corpus is rejected at open rather than silently tolerated.
pub const DISTANCE_METRIC: &str = "l2";

/// Pinned identity of the index: the embedding model, its dimension, and
/// the distance metric. Written next to the vector data on first open and
/// checked on every subsequent open, because a corpus embedded with one
/// model and queried with another degrades relevance without any error
/// signal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexManifest {
    pub model: String,
    pub dimension: u32,
    pub metric: String,
}

/// Durable key-value store over embedding vectors with nearest-neighbor
/// search, backed by LanceDB.
///
/// Writes upsert by `id` (last write wins); `search` is read-only and
/// freely concurrent with writes, with no snapshot isolation promised.
pub struct VectorStore {
    connection: Connection,
    table_name: String,
    dimension: usize,
}

impl VectorStore {
    /// Open (or create) the configured collection.
    ///
    /// Fails with a `Config` error when the persisted index manifest
    /// disagrees with the configured model, dimension, or metric, and with
    /// a `Database` error when the storage layer is unavailable.
    #[inline]
    pub async fn new(config: &Config) -> Result<Self> {
        let db_path = config.vector_database_path();
        debug!("Initializing LanceDB at path: {:?}", db_path);

        fs::create_dir_all(&db_path).map_err(|e| {
            RagError::Database(format!("Failed to create vector database directory: {}", e))
        })?;

        Self::verify_manifest(config)?;

        let uri = format!("file://{}", db_path.display());
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to connect to LanceDB: {}", e)))?;

        let store = Self {
            connection,
            table_name: config.storage.collection.clone(),
            dimension: config.ollama.embedding_dimension as usize,
        };

        store.initialize_table().await?;

        // Only persisted once the table exists; a manifest must never pin
        // an embedding setup no index was built with.
        Self::persist_manifest(config)?;

        info!(
            "Vector store initialized: collection '{}' at {}",
            store.table_name,
            db_path.display()
        );
        Ok(store)
    }

    fn expected_manifest(config: &Config) -> IndexManifest {
        IndexManifest {
            model: config.ollama.model.clone(),
            dimension: config.ollama.embedding_dimension,
            metric: DISTANCE_METRIC.to_string(),
        }
    }

    /// Verify the persisted index identity against the configuration.
    fn verify_manifest(config: &Config) -> Result<()> {
        let manifest_path = config.index_manifest_path();
        if !manifest_path.exists() {
            return Ok(());
        }

        let expected = Self::expected_manifest(config);
        let content = fs::read_to_string(&manifest_path)?;
        let existing: IndexManifest = toml::from_str(&content).map_err(|e| {
            RagError::Config(format!(
                "Failed to parse index manifest {}: {}",
                manifest_path.display(),
                e
            ))
        })?;

        if existing != expected {
            return Err(RagError::Config(format!(
                "Index at {} was built with model '{}' ({} dimensions, {} metric) \
                 but the configuration now specifies model '{}' ({} dimensions, {} metric); \
                 reset the index before changing the embedding setup",
                manifest_path.display(),
                existing.model,
                existing.dimension,
                existing.metric,
                expected.model,
                expected.dimension,
                expected.metric
            )));
        }

        Ok(())
    }

    /// Record the index identity next to the vector data on first open.
    fn persist_manifest(config: &Config) -> Result<()> {
        let manifest_path = config.index_manifest_path();
        if manifest_path.exists() {
            return Ok(());
        }

        let expected = Self::expected_manifest(config);
        let content = toml::to_string_pretty(&expected)
            .map_err(|e| RagError::Config(format!("Failed to serialize index manifest: {}", e)))?;
        fs::write(&manifest_path, content)?;
        debug!("Wrote index manifest to {}", manifest_path.display());
        Ok(())
    }

    /// Create the collection table if it does not exist yet.
    async fn initialize_table(&self) -> Result<()> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to list tables: {}", e)))?;

        if table_names.contains(&self.table_name) {
            debug!("Collection table '{}' already exists", self.table_name);
            return Ok(());
        }

        let schema = self.create_schema();
        self.connection
            .create_empty_table(&self.table_name, schema)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to create table: {}", e)))?;

        info!(
            "Created collection table '{}' with {} dimensions",
            self.table_name, self.dimension
        );
        Ok(())
    }

    fn create_schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    self.dimension as i32,
                ),
                false,
            ),
            Field::new("text", DataType::Utf8, false),
            Field::new("document_name", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, false),
            Field::new("page_number", DataType::UInt32, false),
            Field::new("chunk_id", DataType::Utf8, false),
            Field::new("chunk_index", DataType::UInt32, false),
            Field::new("token_length", DataType::UInt32, false),
            Field::new("ingestion_time", DataType::Utf8, false),
        ]))
    }

    /// Why a record cannot be stored, or `None` if it is acceptable.
    fn validate_record(&self, record: &DocumentRecord) -> Option<String> {
        if record.id.trim().is_empty() {
            return Some("missing id".to_string());
        }
        if record.text.is_empty() {
            return Some(format!("record '{}' has empty text", record.id));
        }
        if record.embedding.is_empty() {
            return Some(format!("record '{}' has no embedding", record.id));
        }
        if record.embedding.len() != self.dimension {
            return Some(format!(
                "record '{}' has embedding dimension {} but the index expects {}",
                record.id,
                record.embedding.len(),
                self.dimension
            ));
        }
        if record.embedding.iter().any(|v| !v.is_finite()) {
            return Some(format!("record '{}' has non-finite embedding values", record.id));
        }
        None
    }

    /// Upsert a batch of records by `id`.
    ///
    /// Malformed records are logged and skipped without aborting the batch;
    /// an empty batch (before or after validation) is a no-op. A storage
    /// layer failure is fatal and propagates. Returns the number of records
    /// stored.
    #[inline]
    pub async fn add(&self, records: Vec<DocumentRecord>) -> Result<usize> {
        if records.is_empty() {
            debug!("No records provided, skipping insert");
            return Ok(0);
        }

        let mut accepted = Vec::with_capacity(records.len());
        for (idx, record) in records.into_iter().enumerate() {
            match self.validate_record(&record) {
                Some(reason) => warn!("Skipping record at index {}: {}", idx, reason),
                None => accepted.push(record),
            }
        }

        if accepted.is_empty() {
            warn!("No valid records left after validation, nothing stored");
            return Ok(0);
        }

        let record_batch = self.create_record_batch(&accepted)?;

        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to open table: {}", e)))?;

        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);

        let mut merge = table.merge_insert(&["id"]);
        merge
            .when_matched_update_all(None)
            .when_not_matched_insert_all();
        merge
            .execute(Box::new(reader))
            .await
            .map_err(|e| RagError::Database(format!("Failed to upsert records: {}", e)))?;

        info!(
            "Stored {} records in collection '{}'",
            accepted.len(),
            self.table_name
        );
        Ok(accepted.len())
    }

    fn create_record_batch(&self, records: &[DocumentRecord]) -> Result<RecordBatch> {
        let len = records.len();

        let mut ids = Vec::with_capacity(len);
        let mut texts = Vec::with_capacity(len);
        let mut document_names = Vec::with_capacity(len);
        let mut sources = Vec::with_capacity(len);
        let mut page_numbers = Vec::with_capacity(len);
        let mut chunk_ids = Vec::with_capacity(len);
        let mut chunk_indices = Vec::with_capacity(len);
        let mut token_lengths = Vec::with_capacity(len);
        let mut ingestion_times = Vec::with_capacity(len);

        let mut flat_values = Vec::with_capacity(len * self.dimension);
        for record in records {
            ids.push(record.id.as_str());
            texts.push(record.text.as_str());
            document_names.push(record.metadata.document_name.as_str());
            sources.push(record.metadata.source.as_str());
            page_numbers.push(record.metadata.page_number);
            chunk_ids.push(record.metadata.chunk_id.as_str());
            chunk_indices.push(record.metadata.chunk_index);
            token_lengths.push(record.metadata.token_length);
            ingestion_times.push(record.metadata.ingestion_time.as_str());
            flat_values.extend_from_slice(&record.embedding);
        }

        let values_array = Float32Array::from(flat_values);
        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array = FixedSizeListArray::try_new(
            field,
            self.dimension as i32,
            Arc::new(values_array),
            None,
        )
        .map_err(|e| RagError::Database(format!("Failed to create vector array: {}", e)))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(texts)),
            Arc::new(StringArray::from(document_names)),
            Arc::new(StringArray::from(sources)),
            Arc::new(UInt32Array::from(page_numbers)),
            Arc::new(StringArray::from(chunk_ids)),
            Arc::new(UInt32Array::from(chunk_indices)),
            Arc::new(UInt32Array::from(token_lengths)),
            Arc::new(StringArray::from(ingestion_times)),
        ];

        RecordBatch::try_new(self.create_schema(), arrays)
            .map_err(|e| RagError::Database(format!("Failed to create record batch: {}", e)))
    }

    /// Nearest-neighbor search, most similar first.
    ///
    /// Returns up to `top_k` matches ordered by non-decreasing distance.
    /// Never fails: an empty store or a backend search failure degrades to
    /// zero matches (logged) so the query pipeline keeps working.
    #[inline]
    pub async fn search(&self, query_vector: &[f32], top_k: usize) -> Vec<RetrievedMatch> {
        match self.try_search(query_vector, top_k).await {
            Ok(mut matches) => {
                matches.sort_by(|a, b| a.score.total_cmp(&b.score));
                debug!("Similarity search returned {} matches", matches.len());
                matches
            }
            Err(e) => {
                warn!("Similarity search failed, returning no matches: {}", e);
                Vec::new()
            }
        }
    }

    async fn try_search(&self, query_vector: &[f32], top_k: usize) -> Result<Vec<RetrievedMatch>> {
        if query_vector.len() != self.dimension {
            return Err(RagError::Database(format!(
                "Query vector has dimension {} but the index expects {}",
                query_vector.len(),
                self.dimension
            )));
        }

        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to open table: {}", e)))?;

        let mut results = table
            .vector_search(query_vector)
            .map_err(|e| RagError::Database(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(DistanceType::L2)
            .limit(top_k)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to execute search: {}", e)))?;

        let mut matches = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| RagError::Database(format!("Failed to read result stream: {}", e)))?
        {
            matches.extend(self.parse_match_batch(&batch)?);
        }

        Ok(matches)
    }

    fn parse_match_batch(&self, batch: &RecordBatch) -> Result<Vec<RetrievedMatch>> {
        let texts = string_column(batch, "text")?;
        let document_names = string_column(batch, "document_name")?;
        let sources = string_column(batch, "source")?;
        let page_numbers = u32_column(batch, "page_number")?;
        let chunk_ids = string_column(batch, "chunk_id")?;
        let chunk_indices = u32_column(batch, "chunk_index")?;
        let token_lengths = u32_column(batch, "token_length")?;
        let ingestion_times = string_column(batch, "ingestion_time")?;

        let distances = batch
            .column_by_name("_distance")
            .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

        let mut matches = Vec::with_capacity(batch.num_rows());
        for row in 0..batch.num_rows() {
            let score = distances.map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

            matches.push(RetrievedMatch {
                text: texts.value(row).to_string(),
                metadata: ChunkMetadata {
                    document_name: document_names.value(row).to_string(),
                    source: sources.value(row).to_string(),
                    page_number: page_numbers.value(row),
                    chunk_id: chunk_ids.value(row).to_string(),
                    chunk_index: chunk_indices.value(row),
                    token_length: token_lengths.value(row),
                    ingestion_time: ingestion_times.value(row).to_string(),
                },
                score,
            });
        }

        Ok(matches)
    }

    /// Total number of records in the collection.
    #[inline]
    pub async fn count(&self) -> Result<u64> {
        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to open table: {}", e)))?;

        let count = table
            .count_rows(None)
            .await
            .map_err(|e| RagError::Database(format!("Failed to count rows: {}", e)))?;

        Ok(count as u64)
    }

    /// Drop and recreate the collection, discarding all records.
    #[inline]
    pub async fn reset(&self) -> Result<()> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to list tables: {}", e)))?;

        if table_names.contains(&self.table_name) {
            self.connection
                .drop_table(&self.table_name)
                .await
                .map_err(|e| RagError::Database(format!("Failed to drop table: {}", e)))?;
        }

        self.initialize_table().await?;
        info!("Collection '{}' reset", self.table_name);
        Ok(())
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|col| col.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| RagError::Database(format!("Missing or invalid column: {}", name)))
}

fn u32_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a UInt32Array> {
    batch
        .column_by_name(name)
        .and_then(|col| col.as_any().downcast_ref::<UInt32Array>())
        .ok_or_else(|| RagError::Database(format!("Missing or invalid column: {}", name)))
}
