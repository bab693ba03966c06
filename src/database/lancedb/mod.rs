// LanceDB vector database module
// Handles vector storage and nearest-neighbor search for document chunks

pub mod vector_store;

pub use vector_store::{IndexManifest, VectorStore};

use serde::{Deserialize, Serialize};

use crate::embeddings::EmbeddedChunk;

/// Record persisted in the vector store.
///
/// `id` is the store's primary key: inserting an existing id replaces the
/// prior record, so re-ingesting an unchanged document does not grow the
/// store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// Lineage metadata stored alongside each chunk embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkMetadata {
    /// Display name of the document this chunk belongs to
    pub document_name: String,
    /// Source file the document was ingested from
    pub source: String,
    /// 1-based page the chunk was taken from
    pub page_number: u32,
    /// Deterministic chunk id, unique within a document and ingestion
    pub chunk_id: String,
    /// 0-based order of the chunk within its document
    pub chunk_index: u32,
    /// Word count of the chunk text
    pub token_length: u32,
    /// RFC 3339 timestamp of the ingestion that produced the chunk
    pub ingestion_time: String,
}

/// Result of a similarity query. `score` is a non-negative distance:
/// smaller means more similar. Created fresh per query, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedMatch {
    pub text: String,
    pub metadata: ChunkMetadata,
    pub score: f32,
}

impl From<EmbeddedChunk> for DocumentRecord {
    #[inline]
    fn from(chunk: EmbeddedChunk) -> Self {
        Self {
            id: chunk.id,
            embedding: chunk.embedding,
            text: chunk.text,
            metadata: chunk.metadata,
        }
    }
}
