use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

/// Crate-wide error taxonomy.
///
/// Write-path failures (`Validation`, `Ingestion`, `Embedding`, `Database`)
/// are fail-fast: an incompletely indexed document must not appear partially
/// searchable. Read-path retrieval failures degrade to zero matches inside
/// the vector store and never surface here; only `Generation` terminates a
/// query.
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Ingestion error: {0}")]
    Ingestion(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod generation;
pub mod indexer;
pub mod pdf;
pub mod rag;
