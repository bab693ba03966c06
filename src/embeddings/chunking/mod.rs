
use chrono::Utc;
use tracing::debug;

use crate::config::ChunkingConfig;
use crate::database::lancedb::ChunkMetadata;
use crate::pdf::PageText;
use crate::{RagError, Result};

/// A bounded, overlapping window of a document's text: the unit of indexing.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// Splits page text into overlapping fixed-size word windows and attaches
/// lineage metadata.
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    /// Construct a chunker, rejecting any configuration whose overlap is not
    /// strictly smaller than the window size (the window step would be
    /// non-positive and chunking would never terminate).
    #[inline]
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| RagError::Config(e.to_string()))?;
        Ok(Self { config })
    }

    /// Chunk all pages of one document.
    ///
    /// `chunk_index` is threaded across pages, so it is 0-based and strictly
    /// increasing over the whole document. All chunks of one call share a
    /// single ingestion timestamp.
    #[inline]
    pub fn chunk_document(
        &self,
        pages: &[PageText],
        document_name: &str,
        source: &str,
    ) -> Vec<Chunk> {
        let ingestion_time = Utc::now().to_rfc3339();
        let mut chunks = Vec::new();
        let mut chunk_index: u32 = 0;

        for page in pages {
            self.chunk_page(
                &page.text,
                document_name,
                source,
                page.page_number,
                &ingestion_time,
                &mut chunk_index,
                &mut chunks,
            );
        }

        debug!(
            "Chunked document '{}' into {} chunks across {} pages",
            document_name,
            chunks.len(),
            pages.len()
        );

        chunks
    }

    /// Slide a window of `chunk_size` words with step `chunk_size - overlap`
    /// over one page. The final window may be shorter than the window size;
    /// empty page text yields zero chunks.
    #[expect(clippy::too_many_arguments, reason = "internal helper")]
    fn chunk_page(
        &self,
        text: &str,
        document_name: &str,
        source: &str,
        page_number: u32,
        ingestion_time: &str,
        chunk_index: &mut u32,
        chunks: &mut Vec<Chunk>,
    ) {
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.is_empty() {
            return;
        }

        // Positive by the construction-time invariant.
        let step = self.config.chunk_size - self.config.overlap;
        let mut start = 0;

        while start < words.len() {
            let end = (start + self.config.chunk_size).min(words.len());
            let window = &words[start..end];
            let index = *chunk_index;

            chunks.push(Chunk {
                text: window.join(" "),
                metadata: ChunkMetadata {
                    document_name: document_name.to_string(),
                    source: source.to_string(),
                    page_number,
                    chunk_id: format!("{}_p{}_{}", document_name, page_number, index),
                    chunk_index: index,
                    token_length: window.len() as u32,
                    ingestion_time: ingestion_time.to_string(),
                },
            });

            *chunk_index += 1;
            start += step;
        }
    }
}
