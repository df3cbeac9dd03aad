use std::sync::Arc;

use crate::llm::{ChatMessage, ChatRequest, LlmProvider, UpstreamError};
use crate::session::Turn;

pub const CONTEXTUALIZE_PROMPT: &str = "Given a chat history and the latest user question \
which might reference context in the chat history, formulate a standalone question \
which can be understood without the chat history. \
Do NOT answer the question, just reformulate it if needed and otherwise return it as is.";

/// Turns a follow-up message into a standalone retrieval query.
#[derive(Clone)]
pub struct QueryRewriter {
    llm: Arc<dyn LlmProvider>,
    max_history_turns: usize,
}

impl QueryRewriter {
    pub fn new(llm: Arc<dyn LlmProvider>, max_history_turns: usize) -> Self {
        Self {
            llm,
            max_history_turns,
        }
    }

    pub async fn rewrite(&self, history: &[Turn], message: &str) -> Result<String, UpstreamError> {
        let recent = recent_turns(history, self.max_history_turns);
        if recent.is_empty() {
            return Ok(message.to_string());
        }

        let mut messages = Vec::with_capacity(recent.len() + 2);
        messages.push(ChatMessage::system(CONTEXTUALIZE_PROMPT));
        messages.extend(recent.iter().map(ChatMessage::from));
        messages.push(ChatMessage::user(message));

        let rewritten = self
            .llm
            .chat(ChatRequest::new(messages).with_temperature(0.0))
            .await?;
        let rewritten = rewritten.trim();
        if rewritten.is_empty() {
            return Ok(message.to_string());
        }

        tracing::debug!(original = %message, rewritten = %rewritten, "Rewrote query");
        Ok(rewritten.to_string())
    }
}

/// The last `limit` turns of `history`.
pub fn recent_turns(history: &[Turn], limit: usize) -> &[Turn] {
    &history[history.len().saturating_sub(limit)..]
}
