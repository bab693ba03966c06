// Ingestion pipeline
// Chunks extracted pages, embeds the chunks, and upserts the results into
// the vector store.

use std::sync::Arc;
use tracing::{debug, info};

use crate::database::VectorStore;
use crate::embeddings::chunking::Chunker;
use crate::embeddings::Embedder;
use crate::pdf::PageText;
use crate::{RagError, Result};

/// Outcome of one document ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestSummary {
    pub document_name: String,
    pub pages: usize,
    pub chunks: usize,
    pub records_stored: usize,
    pub embedding_dimension: usize,
}

/// Turns extracted pages into stored embeddings.
///
/// Ingestion is fail-fast: an embedding failure anywhere in the batch means
/// nothing is written, so the store never holds a partially embedded
/// document. Record ids are deterministic, so re-ingesting an unchanged
/// document replaces its records instead of duplicating them.
pub struct Ingestor {
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
    store: Arc<VectorStore>,
}

impl Ingestor {
    #[inline]
    pub fn new(chunker: Chunker, embedder: Arc<dyn Embedder>, store: Arc<VectorStore>) -> Self {
        Self {
            chunker,
            embedder,
            store,
        }
    }

    /// Chunk, embed, and store one document.
    pub async fn ingest_document(
        &self,
        pages: &[PageText],
        document_name: &str,
        source: &str,
    ) -> Result<IngestSummary> {
        debug!(
            "Ingesting document '{}' from '{}' ({} pages)",
            document_name,
            source,
            pages.len()
        );

        let chunks = self.chunker.chunk_document(pages, document_name, source);
        if chunks.is_empty() {
            return Err(RagError::Validation(format!(
                "No text found in document '{}'",
                document_name
            )));
        }

        let embedded = self.embedder.embed_chunks(&chunks)?;

        if embedded.len() != chunks.len() {
            return Err(RagError::Embedding(format!(
                "Embedded {} chunks but expected {}",
                embedded.len(),
                chunks.len()
            )));
        }

        let dimension = embedded[0].embedding.len();
        if embedded.iter().any(|c| c.embedding.len() != dimension) {
            return Err(RagError::Embedding(
                "Embedding batch returned mixed dimensions".to_string(),
            ));
        }

        let records = embedded.into_iter().map(Into::into).collect();
        let records_stored = self.store.add(records).await?;

        // Individually malformed records are skipped by the store, but a
        // non-empty batch storing nothing means every embedding was bad
        // (typically the model's dimension disagrees with the index).
        if records_stored == 0 {
            return Err(RagError::Embedding(format!(
                "None of the {} chunks of '{}' produced a storable embedding \
                 ({} dimensions); check that the embedding model matches the index",
                chunks.len(),
                document_name,
                dimension
            )));
        }

        let summary = IngestSummary {
            document_name: document_name.to_string(),
            pages: pages.len(),
            chunks: chunks.len(),
            records_stored,
            embedding_dimension: dimension,
        };

        info!(
            "Ingested '{}': {} pages, {} chunks, {} records stored",
            summary.document_name, summary.pages, summary.chunks, summary.records_stored
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChunkingConfig, Config};
    use crate::embeddings::chunking::Chunk;
    use crate::embeddings::EmbeddedChunk;
    use tempfile::TempDir;

    const TEST_DIMENSION: u32 = 4;

    struct StubEmbedder;

    impl Embedder for StubEmbedder {
        fn embed_chunks(&self, chunks: &[Chunk]) -> crate::Result<Vec<EmbeddedChunk>> {
            Ok(chunks
                .iter()
                .map(|chunk| EmbeddedChunk {
                    id: chunk.metadata.chunk_id.clone(),
                    embedding: vec![0.1, 0.2, 0.3, 0.4],
                    text: chunk.text.clone(),
                    metadata: chunk.metadata.clone(),
                })
                .collect())
        }

        fn embed_query(&self, _text: &str) -> crate::Result<Vec<f32>> {
            Ok(vec![0.1, 0.2, 0.3, 0.4])
        }
    }

    /// Produces vectors of a different dimension than the store expects.
    struct WrongDimensionEmbedder;

    impl Embedder for WrongDimensionEmbedder {
        fn embed_chunks(&self, chunks: &[Chunk]) -> crate::Result<Vec<EmbeddedChunk>> {
            Ok(chunks
                .iter()
                .map(|chunk| EmbeddedChunk {
                    id: chunk.metadata.chunk_id.clone(),
                    embedding: vec![0.1; 8],
                    text: chunk.text.clone(),
                    metadata: chunk.metadata.clone(),
                })
                .collect())
        }

        fn embed_query(&self, _text: &str) -> crate::Result<Vec<f32>> {
            Ok(vec![0.1; 8])
        }
    }

    struct FailingEmbedder;

    impl Embedder for FailingEmbedder {
        fn embed_chunks(&self, _chunks: &[Chunk]) -> crate::Result<Vec<EmbeddedChunk>> {
            Err(RagError::Embedding("embedding server unreachable".to_string()))
        }

        fn embed_query(&self, _text: &str) -> crate::Result<Vec<f32>> {
            Err(RagError::Embedding("embedding server unreachable".to_string()))
        }
    }

    async fn test_store(temp_dir: &TempDir) -> Arc<VectorStore> {
        let mut config = Config::load(temp_dir.path()).expect("Failed to load config");
        config.ollama.embedding_dimension = TEST_DIMENSION;
        Arc::new(
            VectorStore::new(&config)
                .await
                .expect("Failed to create store"),
        )
    }

    fn test_chunker() -> Chunker {
        Chunker::new(ChunkingConfig::default()).expect("Failed to create chunker")
    }

    fn page_of_words(page_number: u32, count: usize) -> PageText {
        let text = (0..count)
            .map(|i| format!("w{i}"))
            .collect::<Vec<_>>()
            .join(" ");
        PageText { page_number, text }
    }

    #[tokio::test]
    async fn six_hundred_fifty_word_page_creates_two_records() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = test_store(&temp_dir).await;
        let ingestor = Ingestor::new(test_chunker(), Arc::new(StubEmbedder), Arc::clone(&store));

        let summary = ingestor
            .ingest_document(&[page_of_words(1, 650)], "manual", "manual.pdf")
            .await
            .expect("Failed to ingest document");

        assert_eq!(summary.pages, 1);
        assert_eq!(summary.chunks, 2);
        assert_eq!(summary.records_stored, 2);
        assert_eq!(summary.embedding_dimension, TEST_DIMENSION as usize);
        assert_eq!(store.count().await.expect("Failed to count"), 2);
    }

    #[tokio::test]
    async fn reingest_unchanged_document_keeps_count() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = test_store(&temp_dir).await;
        let ingestor = Ingestor::new(test_chunker(), Arc::new(StubEmbedder), Arc::clone(&store));
        let pages = [page_of_words(1, 650)];

        ingestor
            .ingest_document(&pages, "manual", "manual.pdf")
            .await
            .expect("Failed to ingest document");
        ingestor
            .ingest_document(&pages, "manual", "manual.pdf")
            .await
            .expect("Failed to re-ingest document");

        assert_eq!(store.count().await.expect("Failed to count"), 2);
    }

    #[tokio::test]
    async fn empty_document_rejected() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = test_store(&temp_dir).await;
        let ingestor = Ingestor::new(test_chunker(), Arc::new(StubEmbedder), store);

        let result = ingestor.ingest_document(&[], "empty", "empty.pdf").await;

        assert!(matches!(result, Err(RagError::Validation(_))));
    }

    #[tokio::test]
    async fn dimension_mismatch_fails_instead_of_storing_nothing() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = test_store(&temp_dir).await;
        let ingestor = Ingestor::new(
            test_chunker(),
            Arc::new(WrongDimensionEmbedder),
            Arc::clone(&store),
        );

        let result = ingestor
            .ingest_document(&[page_of_words(1, 650)], "manual", "manual.pdf")
            .await;

        assert!(matches!(result, Err(RagError::Embedding(_))));
        assert_eq!(store.count().await.expect("Failed to count"), 0);
    }

    #[tokio::test]
    async fn embedding_failure_prevents_writes() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = test_store(&temp_dir).await;
        let ingestor = Ingestor::new(test_chunker(), Arc::new(FailingEmbedder), Arc::clone(&store));

        let result = ingestor
            .ingest_document(&[page_of_words(1, 650)], "manual", "manual.pdf")
            .await;

        assert!(matches!(result, Err(RagError::Embedding(_))));
        assert_eq!(store.count().await.expect("Failed to count"), 0);
    }
}
