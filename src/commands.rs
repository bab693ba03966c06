use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::database::VectorStore;
use crate::embeddings::chunking::Chunker;
use crate::embeddings::ollama::OllamaClient;
use crate::generation::ChatClient;
use crate::indexer::Ingestor;
use crate::pdf::extract_pages;
use crate::rag::RagPipeline;
use crate::{RagError, Result};

/// Ingest one PDF file into the vector store.
#[inline]
pub async fn ingest_file(config: &Config, file: &Path, name: Option<String>) -> Result<()> {
    let source = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| RagError::Validation(format!("Not a file path: {}", file.display())))?;
    let document_name = name.unwrap_or_else(|| source.clone());

    info!("Ingesting '{}' from {}", document_name, file.display());

    let pages = extract_pages(file)?;
    if pages.is_empty() {
        return Err(RagError::Validation(format!(
            "No extractable text in {}",
            file.display()
        )));
    }

    let chunker = Chunker::new(config.chunking.clone())?;
    let embedder = Arc::new(OllamaClient::new(config)?);
    let store = Arc::new(VectorStore::new(config).await?);

    let ingestor = Ingestor::new(chunker, embedder, Arc::clone(&store));
    let summary = ingestor
        .ingest_document(&pages, &document_name, &source)
        .await?;

    println!("Ingested document: {}", summary.document_name);
    println!("  Pages with text: {}", summary.pages);
    println!("  Chunks: {}", summary.chunks);
    println!("  Records stored: {}", summary.records_stored);
    println!("  Embedding dimension: {}", summary.embedding_dimension);
    println!("  Total records: {}", store.count().await?);

    Ok(())
}

/// Answer a question from the indexed corpus.
#[inline]
pub async fn query_documents(config: &Config, query: &str, top_k: usize) -> Result<()> {
    let embedder = Arc::new(OllamaClient::new(config)?);
    let store = Arc::new(VectorStore::new(config).await?);
    let backend = Arc::new(ChatClient::new(config)?);

    let pipeline = RagPipeline::new(embedder, store, backend);
    let response = pipeline.query(query, top_k).await?;

    println!("{}", response.answer);

    if !response.sources.is_empty() {
        println!();
        println!("Sources:");
        for source in &response.sources {
            println!(
                "  {} (page {}, {})",
                source.source, source.page_number, source.document_name
            );
        }
    }

    Ok(())
}

/// Show the state of the index and its backing services.
#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    println!("Data directory: {}", config.base_dir.display());
    println!("Vector store: {}", config.vector_database_path().display());
    println!("Collection: {}", config.storage.collection);
    println!("Embedding model: {}", config.ollama.model);
    println!("Embedding dimension: {}", config.ollama.embedding_dimension);
    println!("Generation model: {}", config.generation.model);
    println!();

    let store = VectorStore::new(config).await?;
    println!("Stored records: {}", store.count().await?);

    let client = OllamaClient::new(config)?;
    match client.health_check() {
        Ok(()) => println!("Ollama server: reachable, model available"),
        Err(e) => {
            warn!("Ollama health check failed: {}", e);
            println!("Ollama server: unavailable ({})", e);
        }
    }

    Ok(())
}

/// Drop every record from the vector store.
#[inline]
pub async fn reset_store(config: &Config) -> Result<()> {
    let store = VectorStore::new(config).await?;
    store.reset().await?;
    println!("Collection '{}' reset.", config.storage.collection);
    Ok(())
}

/// Print the active configuration as TOML.
#[inline]
pub fn show_config(config: &Config) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| RagError::Config(format!("Failed to serialize config: {}", e)))?;
    println!("Configuration file: {}", config.config_file_path().display());
    println!();
    print!("{}", content);
    Ok(())
}

/// Write the active configuration to disk so it can be edited.
#[inline]
pub fn init_config(config: &Config) -> Result<()> {
    config
        .save()
        .map_err(|e| RagError::Config(e.to_string()))?;
    println!("Wrote configuration to {}", config.config_file_path().display());
    Ok(())
}
