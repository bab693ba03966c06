// Embedding generation module
// Chunking of page text and vector generation via Ollama.

pub mod chunking;
pub mod ollama;

use crate::Result;
use crate::database::lancedb::ChunkMetadata;
use chunking::Chunk;

/// A chunk paired with its embedding vector, ready for persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedChunk {
    /// Globally unique id, derived from the chunk id (or a generated
    /// fallback when the chunk id is empty).
    pub id: String,
    pub embedding: Vec<f32>,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// Seam between the orchestrators and the embedding model.
///
/// Both methods must be backed by the same model instance: query vectors are
/// only comparable to corpus vectors embedded with the identical model.
/// All embeddings produced by one implementation share a single dimension.
pub trait Embedder: Send + Sync {
    /// Embed a batch of chunks. Output order matches input order.
    fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<EmbeddedChunk>>;

    /// Embed a query string with the same model as `embed_chunks`.
    fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
}
