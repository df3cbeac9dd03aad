use async_trait::async_trait;
use thiserror::Error;

use super::types::ChatRequest;

/// Failure of the hosted model or embedding service.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("provider request failed: {0}")]
    Transport(String),
    #[error("provider returned an error: {0}")]
    Provider(String),
    #[error("provider response was malformed: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        UpstreamError::Transport(err.to_string())
    }
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// return the provider name (e.g. "openai")
    fn name(&self) -> &str;

    /// chat completion (non-streaming)
    async fn chat(&self, request: ChatRequest) -> Result<String, UpstreamError>;
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;

    /// One vector per input, in input order.
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, UpstreamError>;
}
