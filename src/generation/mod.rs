// Answer generation backend
// OpenAI-compatible chat completion client used by the query pipeline.

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};
use url::Url;

use crate::config::Config;
use crate::{RagError, Result};

const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

/// Produces an answer from a fully assembled prompt.
///
/// The backend receives the prompt verbatim and returns plain text; prompt
/// assembly and source attribution stay in the query pipeline.
pub trait GenerationBackend: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String>;
}

/// Client for an OpenAI-compatible chat completions endpoint.
///
/// Completions are requested at temperature zero so repeated queries over an
/// unchanged corpus produce stable answers. Every call is bounded by the
/// configured timeout.
pub struct ChatClient {
    endpoint: Url,
    model: String,
    api_key: Option<String>,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl ChatClient {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let endpoint = config
            .generation
            .completions_url()
            .map_err(|e| RagError::Config(e.to_string()))?;

        let api_key = std::env::var(&config.generation.api_key_env).ok();
        if api_key.is_none() {
            warn!(
                "Environment variable {} is not set, completion requests will be unauthenticated",
                config.generation.api_key_env
            );
        }

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.generation.timeout_seconds)))
            .build()
            .into();

        Ok(Self {
            endpoint,
            model: config.generation.model.clone(),
            api_key,
            agent,
            retry_attempts: config.generation.retry_attempts,
        })
    }

    /// The configured completion model name.
    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn make_request_with_retry(&self, request_json: &str) -> Result<String> {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!(
                "Completion request attempt {}/{}",
                attempt, self.retry_attempts
            );

            let mut request = self
                .agent
                .post(self.endpoint.as_str())
                .header("Content-Type", "application/json");
            if let Some(key) = &self.api_key {
                request = request.header("Authorization", format!("Bearer {}", key).as_str());
            }

            match request
                .send(request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
            {
                Ok(response_text) => return Ok(response_text),
                Err(error) => {
                    match &error {
                        ureq::Error::StatusCode(status) if *status >= 500 => {
                            warn!(
                                "Server error (status {}), attempt {}/{}",
                                status, attempt, self.retry_attempts
                            );
                        }
                        ureq::Error::StatusCode(status) => {
                            return Err(RagError::Generation(format!(
                                "Completion endpoint rejected the request: HTTP {}",
                                status
                            )));
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Transport error: {}, attempt {}/{}",
                                error, attempt, self.retry_attempts
                            );
                        }
                        _ => {
                            return Err(RagError::Generation(format!(
                                "Non-retryable error: {}",
                                error
                            )));
                        }
                    }
                    last_error = Some(error);

                    if attempt < self.retry_attempts {
                        let delay_ms = EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000;
                        debug!("Waiting {}ms before retry", delay_ms);
                        std::thread::sleep(Duration::from_millis(delay_ms));
                    }
                }
            }
        }

        error!("All retry attempts failed for request to {}", self.endpoint);

        Err(RagError::Generation(match last_error {
            Some(error) => format!("Completion request failed after retries: {}", error),
            None => "Completion request failed after retries".to_string(),
        }))
    }
}

impl GenerationBackend for ChatClient {
    #[inline]
    fn generate(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: 0.0,
        };

        let request_json = serde_json::to_string(&request).map_err(|e| {
            RagError::Generation(format!("Failed to serialize completion request: {}", e))
        })?;

        let response_text = self.make_request_with_retry(&request_json)?;

        let response: ChatResponse = serde_json::from_str(&response_text).map_err(|e| {
            RagError::Generation(format!("Failed to parse completion response: {}", e))
        })?;

        // Returned verbatim; the query pipeline trims whitespace so every
        // backend behaves the same.
        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| {
                RagError::Generation("Completion response contained no choices".to_string())
            })
    }
}
