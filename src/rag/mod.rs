// Query pipeline
// Embeds a question, retrieves the closest chunks, and asks the generation
// backend for an answer grounded in those chunks.


use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::database::{RetrievedMatch, VectorStore};
use crate::embeddings::Embedder;
use crate::generation::GenerationBackend;
use crate::{RagError, Result};

/// Answer returned without calling the generation backend when retrieval
/// finds nothing.
pub const NO_MATCHES_ANSWER: &str = "No relevant documents found.";

/// Phrase the backend is instructed to reply with when the excerpts do not
/// contain the answer.
const NOT_FOUND_PHRASE: &str = "The answer is not in the provided documents";

/// Default number of chunks retrieved per query.
pub const DEFAULT_TOP_K: usize = 5;

/// Whether the generated answer declares the documents insufficient.
///
/// Sources are attribution for a grounded answer; when this returns true the
/// response carries no sources. Every caller goes through this predicate so
/// the not-found contract lives in one place.
#[inline]
pub fn answer_is_unsupported(answer: &str) -> bool {
    answer.contains(NOT_FOUND_PHRASE)
}

/// Document provenance attached to an answer. One entry per distinct
/// `(source, page_number)` pair, in retrieval order.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Source {
    pub document_name: String,
    pub source: String,
    pub page_number: u32,
    pub chunk_id: String,
}

/// Answer plus the provenance it was grounded in.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QueryResponse {
    pub answer: String,
    pub sources: Vec<Source>,
}

/// Deduplicate retrieved matches into citable sources.
///
/// Two chunks from the same page of the same file are one citation; the
/// first occurrence wins and retrieval order is preserved.
#[inline]
pub fn extract_sources(matches: &[RetrievedMatch]) -> Vec<Source> {
    let mut seen: HashSet<(String, u32)> = HashSet::new();
    let mut sources = Vec::new();

    for m in matches {
        let key = (m.metadata.source.clone(), m.metadata.page_number);
        if seen.insert(key) {
            sources.push(Source {
                document_name: m.metadata.document_name.clone(),
                source: m.metadata.source.clone(),
                page_number: m.metadata.page_number,
                chunk_id: m.metadata.chunk_id.clone(),
            });
        }
    }

    sources
}

/// Assemble the completion prompt from the retrieved chunks and the query.
///
/// Chunk texts are included verbatim, in retrieval order. The backend is
/// told to use only the excerpts and to reply with the exact not-found
/// phrase when they do not contain the answer.
fn build_prompt(matches: &[RetrievedMatch], query: &str) -> String {
    let excerpts = matches
        .iter()
        .map(|m| m.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Use ONLY the following document excerpts to answer the question. \
         If the answer is not in the excerpts, reply exactly: \
         \"{NOT_FOUND_PHRASE}\"\n\n\
         Documents:\n{excerpts}\n\n\
         Question: {query}\n\n\
         Answer:"
    )
}

/// Retrieval-augmented query pipeline.
///
/// Holds one embedder, one vector store, and one generation backend for the
/// process lifetime. Queries share the embedding model with ingestion, which
/// is what makes the distances meaningful.
pub struct RagPipeline {
    embedder: Arc<dyn Embedder>,
    store: Arc<VectorStore>,
    backend: Arc<dyn GenerationBackend>,
}

impl RagPipeline {
    #[inline]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<VectorStore>,
        backend: Arc<dyn GenerationBackend>,
    ) -> Self {
        Self {
            embedder,
            store,
            backend,
        }
    }

    /// Answer a question from the indexed corpus.
    ///
    /// Retrieves up to `top_k` chunks. When retrieval comes back empty the
    /// pipeline answers with [`NO_MATCHES_ANSWER`] and never touches the
    /// generation backend. When the backend declares the documents
    /// insufficient the response carries no sources.
    pub async fn query(&self, query: &str, top_k: usize) -> Result<QueryResponse> {
        if top_k == 0 {
            return Err(RagError::Validation(
                "top_k must be at least 1".to_string(),
            ));
        }

        debug!("Embedding query for retrieval (top_k = {})", top_k);
        let query_vector = self.embedder.embed_query(query)?;

        let matches = self.store.search(&query_vector, top_k).await;
        if matches.is_empty() {
            info!("No matches retrieved, answering without generation");
            return Ok(QueryResponse {
                answer: NO_MATCHES_ANSWER.to_string(),
                sources: Vec::new(),
            });
        }

        debug!("Retrieved {} matches, generating answer", matches.len());
        let prompt = build_prompt(&matches, query);
        let answer = self.backend.generate(&prompt)?.trim().to_string();

        let sources = if answer_is_unsupported(&answer) {
            debug!("Answer declares the documents insufficient, dropping sources");
            Vec::new()
        } else {
            extract_sources(&matches)
        };

        Ok(QueryResponse { answer, sources })
    }
}
