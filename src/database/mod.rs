// Storage layer
// LanceDB-backed persistence for chunk embeddings.

pub mod lancedb;

pub use lancedb::{ChunkMetadata, DocumentRecord, RetrievedMatch, VectorStore};
