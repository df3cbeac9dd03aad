use tracing::Instrument;

use super::exact_match::ExactAnswers;
use super::rewriter::QueryRewriter;
use super::rules::ChartRules;
use super::synthesizer::{AnswerSynthesizer, SynthesisInput};
use super::{ChatResponse, PipelineError};
use crate::history::HistoryStore;
use crate::query_log::QueryLog;
use crate::rag::Retriever;
use crate::session::{ResolvedSession, SessionManager, Turn};

#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub session_id: String,
    pub response: ChatResponse,
}

/// One chat request from validated input to persisted exchange.
///
/// Stages run in order: rewrite, retrieve, synthesize, then append to the
/// session and the history store. A failure before synthesis completes
/// leaves the session untouched.
pub struct ChatPipeline {
    sessions: SessionManager,
    rewriter: QueryRewriter,
    retriever: Retriever,
    synthesizer: AnswerSynthesizer,
    rules: ChartRules,
    max_input_length: usize,
    sweep_on_request: bool,
    exact_answers: Option<ExactAnswers>,
    history: Option<HistoryStore>,
    query_log: Option<QueryLog>,
}

impl ChatPipeline {
    pub fn new(
        sessions: SessionManager,
        rewriter: QueryRewriter,
        retriever: Retriever,
        synthesizer: AnswerSynthesizer,
        rules: ChartRules,
        max_input_length: usize,
    ) -> Self {
        Self {
            sessions,
            rewriter,
            retriever,
            synthesizer,
            rules,
            max_input_length,
            sweep_on_request: true,
            exact_answers: None,
            history: None,
            query_log: None,
        }
    }

    pub fn with_request_sweep(mut self, enabled: bool) -> Self {
        self.sweep_on_request = enabled;
        self
    }

    pub fn with_exact_answers(mut self, answers: ExactAnswers) -> Self {
        self.exact_answers = Some(answers);
        self
    }

    pub fn with_history(mut self, history: HistoryStore) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_query_log(mut self, log: QueryLog) -> Self {
        self.query_log = Some(log);
        self
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub async fn handle(
        &self,
        message: Option<&str>,
        session_id: Option<&str>,
    ) -> Result<ChatOutcome, PipelineError> {
        let message = self.validate(message)?;

        if self.sweep_on_request {
            self.sessions.sweep_expired();
        }
        if let Some(log) = &self.query_log {
            log.record(message).await;
        }

        let session = self.sessions.resolve(session_id);
        let span = tracing::info_span!("chat", session_id = %session.id);
        self.run(message, session).instrument(span).await
    }

    fn validate<'a>(&self, message: Option<&'a str>) -> Result<&'a str, PipelineError> {
        let message = message
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .ok_or_else(|| PipelineError::Validation("No message provided".to_string()))?;

        if message.chars().count() > self.max_input_length {
            return Err(PipelineError::Validation(format!(
                "Message is too long (max {} characters)",
                self.max_input_length
            )));
        }
        Ok(message)
    }

    async fn run(&self, message: &str, session: ResolvedSession) -> Result<ChatOutcome, PipelineError> {
        tracing::debug!(
            stage = "received",
            created = session.created,
            turns = session.history.len(),
            "Chat request"
        );

        let exact = self
            .exact_answers
            .as_ref()
            .and_then(|answers| answers.lookup(message));
        let response = match exact {
            Some(answer) => {
                tracing::debug!(stage = "exact_match", "Answered from known question");
                ChatResponse::Text {
                    text: answer.to_string(),
                }
            }
            None => self.generate(message, &session.history).await?,
        };

        let stage = match &response {
            ChatResponse::Visualization { .. } => "structured",
            ChatResponse::Text { .. } => "plain",
        };
        tracing::debug!(stage, "Answer ready");

        self.sessions.append_exchange(
            &session.id,
            Turn::user(message),
            Turn::assistant(response.text()),
        );

        if let Some(history) = &self.history {
            if let Err(e) = history
                .record_exchange(&session.id, message, response.text(), response.chart_json())
                .await
            {
                tracing::warn!("Failed to persist exchange: {}", e);
            }
        }
        tracing::debug!(stage = "persisted", "Exchange stored");

        Ok(ChatOutcome {
            session_id: session.id,
            response,
        })
    }

    async fn generate(&self, message: &str, history: &[Turn]) -> Result<ChatResponse, PipelineError> {
        let query = self.rewriter.rewrite(history, message).await?;
        tracing::debug!(stage = "rewritten", query = %query, "Query rewritten");

        let intent = self.rules.classify(message, &query);
        let context = self.retriever.retrieve(&query).await?;
        tracing::debug!(stage = "retrieved", chunks = context.len(), intent = ?intent, "Context retrieved");

        let response = self
            .synthesizer
            .synthesize(SynthesisInput {
                message,
                history,
                context: &context,
                intent: &intent,
            })
            .await?;
        tracing::debug!(stage = "synthesized", "Answer synthesized");
        Ok(response)
    }
}
