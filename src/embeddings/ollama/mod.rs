
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use crate::config::Config;
use crate::embeddings::chunking::Chunk;
use crate::embeddings::{EmbeddedChunk, Embedder};
use crate::{RagError, Result};

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

/// Client for the Ollama embedding API.
///
/// One instance is constructed at process start and shared for the process
/// lifetime; document and query embeddings must come from the same model,
/// so the model name is fixed at construction.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    model: String,
    batch_size: u32,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    #[serde(rename = "input")]
    inputs: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
    pub digest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = config
            .ollama_url()
            .map_err(|e| RagError::Config(e.to_string()))?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            base_url,
            model: config.ollama.model.clone(),
            batch_size: config.ollama.batch_size,
            agent,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// The pinned embedding model identity.
    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Test connection to the Ollama server and verify model availability.
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        debug!("Performing health check for Ollama at {}", self.base_url);

        self.ping()?;
        self.validate_model()?;

        info!(
            "Health check passed for Ollama server at {} with model {}",
            self.base_url, self.model
        );
        Ok(())
    }

    /// Ping the Ollama server to check if it's responsive.
    #[inline]
    pub fn ping(&self) -> Result<()> {
        let url = self.tags_url()?;

        debug!("Pinging Ollama server at {}", url);

        self.make_request_with_retry(|| {
            self.agent
                .get(url.as_str())
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        debug!("Server ping successful");
        Ok(())
    }

    /// Validate that the configured model is available on the server.
    #[inline]
    pub fn validate_model(&self) -> Result<()> {
        let models = self.list_models()?;

        if models.iter().any(|m| m.name == self.model) {
            debug!("Model {} is available", self.model);
            Ok(())
        } else {
            let available_models: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
            Err(RagError::Embedding(format!(
                "Model '{}' is not available. Available models: {:?}",
                self.model, available_models
            )))
        }
    }

    /// List all models available on the server.
    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = self.tags_url()?;

        let response_text = self.make_request_with_retry(|| {
            self.agent
                .get(url.as_str())
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        let models_response: ModelsResponse = serde_json::from_str(&response_text)
            .map_err(|e| RagError::Embedding(format!("Failed to parse models response: {}", e)))?;

        Ok(models_response.models)
    }

    fn tags_url(&self) -> Result<Url> {
        self.base_url
            .join("/api/tags")
            .map_err(|e| RagError::Embedding(format!("Failed to build tags URL: {}", e)))
    }

    /// Run the batch embed endpoint over the texts, sub-batched by the
    /// configured batch size. Output order matches input order.
    fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = self
            .base_url
            .join("/api/embed")
            .map_err(|e| RagError::Embedding(format!("Failed to build embed URL: {}", e)))?;

        let mut embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size as usize) {
            let request = EmbedRequest {
                model: self.model.clone(),
                inputs: batch.to_vec(),
            };

            let request_json = serde_json::to_string(&request).map_err(|e| {
                RagError::Embedding(format!("Failed to serialize embed request: {}", e))
            })?;

            let response_text = self.make_request_with_retry(|| {
                self.agent
                    .post(url.as_str())
                    .header("Content-Type", "application/json")
                    .send(&request_json)
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })?;

            let response: EmbedResponse = serde_json::from_str(&response_text).map_err(|e| {
                RagError::Embedding(format!("Failed to parse embed response: {}", e))
            })?;

            if response.embeddings.len() != batch.len() {
                return Err(RagError::Embedding(format!(
                    "Mismatch between request and response counts: {} vs {}",
                    batch.len(),
                    response.embeddings.len()
                )));
            }

            embeddings.extend(response.embeddings);
        }

        Ok(embeddings)
    }

    fn make_request_with_retry<F>(&self, mut request_fn: F) -> Result<String>
    where
        F: FnMut() -> std::result::Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response_text) => return Ok(response_text),
                Err(error) => {
                    let should_retry = match &error {
                        ureq::Error::StatusCode(status) => {
                            if *status >= 500 {
                                warn!(
                                    "Server error (status {}), attempt {}/{}",
                                    status, attempt, self.retry_attempts
                                );
                                true
                            } else {
                                return Err(RagError::Embedding(format!(
                                    "Client error: HTTP {}",
                                    status
                                )));
                            }
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Transport error: {}, attempt {}/{}",
                                error, attempt, self.retry_attempts
                            );
                            true
                        }
                        _ => {
                            return Err(RagError::Embedding(format!(
                                "Non-retryable error: {}",
                                error
                            )));
                        }
                    };

                    if should_retry {
                        last_error = Some(error);
                    }

                    if attempt < self.retry_attempts {
                        let delay_ms = EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000;
                        debug!("Waiting {}ms before retry", delay_ms);
                        std::thread::sleep(Duration::from_millis(delay_ms));
                    }
                }
            }
        }

        error!("All retry attempts failed for request to {}", self.base_url);

        Err(RagError::Embedding(match last_error {
            Some(error) => format!("Request failed after retries: {}", error),
            None => "Request failed after retries".to_string(),
        }))
    }
}

impl Embedder for OllamaClient {
    #[inline]
    fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<EmbeddedChunk>> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} chunks", chunks.len());

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embed_texts(&texts)?;

        let embedded = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| {
                let id = if chunk.metadata.chunk_id.is_empty() {
                    Uuid::new_v4().to_string()
                } else {
                    chunk.metadata.chunk_id.clone()
                };
                EmbeddedChunk {
                    id,
                    embedding,
                    text: chunk.text.clone(),
                    metadata: chunk.metadata.clone(),
                }
            })
            .collect();

        Ok(embedded)
    }

    #[inline]
    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.embed_texts(&[text.to_string()])?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Embedding("Embed response was empty".to_string()))
    }
}
