pub mod hashing;
pub mod openai;
pub mod provider;
pub mod types;

#[cfg(test)]
mod tests;

pub use hashing::HashingEmbedder;
pub use openai::OpenAiProvider;
pub use provider::{EmbeddingProvider, LlmProvider, UpstreamError};
pub use types::{ChatMessage, ChatRequest};
