use std::sync::Arc;

use super::answer::{parse_answer, ParsedAnswer};
use super::rewriter::recent_turns;
use super::rules::{ChartIntent, ChartRules};
use super::{ChatResponse, VizType};
use crate::core::config::defaults::{DEFAULT_PERSONA_NAME, DEFAULT_PERSONA_PROMPT};
use crate::core::config::settings::PersonaSettings;
use crate::knowledge::{DataPoint, StatisticsTable};
use crate::llm::{ChatMessage, ChatRequest, LlmProvider, UpstreamError};
use crate::rag::RetrievedChunk;
use crate::session::Turn;

const FALLBACK_ANSWER: &str = "I'm not sure about that.";

pub struct SynthesisInput<'a> {
    /// The user's own wording, not the rewritten query.
    pub message: &'a str,
    pub history: &'a [Turn],
    pub context: &'a [RetrievedChunk],
    pub intent: &'a ChartIntent,
}

#[derive(Debug, Clone)]
pub struct SynthesizerOptions {
    pub temperature: f64,
    pub max_tokens: Option<u32>,
    pub max_history_turns: usize,
    pub chart_years: usize,
}

pub struct AnswerSynthesizer {
    llm: Arc<dyn LlmProvider>,
    system_prompt: String,
    statistics: Arc<StatisticsTable>,
    rules: ChartRules,
    options: SynthesizerOptions,
}

impl AnswerSynthesizer {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        persona: &PersonaSettings,
        statistics: Arc<StatisticsTable>,
        rules: ChartRules,
        options: SynthesizerOptions,
    ) -> Self {
        Self {
            llm,
            system_prompt: build_system_prompt(persona),
            statistics,
            rules,
            options,
        }
    }

    pub async fn synthesize(&self, input: SynthesisInput<'_>) -> Result<ChatResponse, UpstreamError> {
        let messages = self.build_messages(&input);
        let request = ChatRequest::new(messages)
            .with_temperature(self.options.temperature)
            .with_max_tokens(self.options.max_tokens);

        let raw = self.llm.chat(request).await?;
        Ok(self.finalize(&raw, input.intent))
    }

    pub fn build_messages(&self, input: &SynthesisInput<'_>) -> Vec<ChatMessage> {
        let mut messages = Vec::new();
        messages.push(ChatMessage::system(format!(
            "{}\n\nContext:\n{}",
            self.system_prompt,
            format_context(input.context)
        )));

        if let Some(chart_message) = self.chart_instructions(input.intent) {
            messages.push(ChatMessage::system(chart_message));
        }

        messages.extend(
            recent_turns(input.history, self.options.max_history_turns)
                .iter()
                .map(ChatMessage::from),
        );
        messages.push(ChatMessage::user(input.message));
        messages
    }

    fn chart_instructions(&self, intent: &ChartIntent) -> Option<String> {
        match intent {
            ChartIntent::None => None,
            ChartIntent::StatisticOnly { column } => {
                let rows = self.recent_rows(column);
                if rows.is_empty() {
                    return None;
                }
                Some(format!(
                    "Recent {} figures (year: value):\n{}",
                    column,
                    format_rows(&rows)
                ))
            }
            ChartIntent::AskWhichStatistic(viz_type) => {
                let options: Vec<&str> = self
                    .rules
                    .statistics()
                    .iter()
                    .map(|rule| rule.column.as_str())
                    .collect();
                Some(format!(
                    "The user asked for a {} but did not say which statistic. \
Do not make one up. Ask them which of these they want to see: {}.",
                    viz_type.as_str(),
                    options.join(", ")
                ))
            }
            ChartIntent::Visualization(intent) => {
                let rows = self.recent_rows(&intent.column);
                let data_section = if rows.is_empty() {
                    "No data is available for it. Say so kindly in \"response\" and leave \"data\" empty."
                        .to_string()
                } else {
                    format!("Data (year: value):\n{}", format_rows(&rows))
                };
                Some(format!(
                    "The user wants a {viz} of {column}. {data}\n\n\
Reply with ONLY a JSON object and nothing else, in exactly this shape:\n\
{{\"type\": \"{viz}\", \"title\": \"<short title>\", \"response\": \"<one or two friendly sentences about the data>\", \
\"data\": [{{\"year\": <integer>, \"value\": <number>}}]}}",
                    viz = intent.viz_type.as_str(),
                    column = intent.column,
                    data = data_section,
                ))
            }
        }
    }

    fn recent_rows(&self, column: &str) -> Vec<DataPoint> {
        self.statistics.recent(column, self.options.chart_years)
    }

    /// Turns raw model output into the final response.
    ///
    /// With a visualization intent the plotted points always come from the
    /// statistics table; the model only contributes type, title and
    /// narration. Without one, model points are capped to the most recent
    /// `chart_years`.
    pub fn finalize(&self, raw: &str, intent: &ChartIntent) -> ChatResponse {
        match parse_answer(raw) {
            ParsedAnswer::Plain(text) if text.is_empty() => ChatResponse::Text {
                text: FALLBACK_ANSWER.to_string(),
            },
            ParsedAnswer::Plain(text) => ChatResponse::Text { text },
            ParsedAnswer::Structured(mut payload) => {
                match intent {
                    ChartIntent::Visualization(intent) => {
                        let model_points = payload.data.len();
                        payload.data = self.recent_rows(&intent.column);
                        tracing::debug!(
                            column = %intent.column,
                            model_points,
                            table_points = payload.data.len(),
                            "Chart data taken from statistics table"
                        );
                    }
                    _ => {
                        // Points arrive sorted ascending by year.
                        let excess = payload.data.len().saturating_sub(self.options.chart_years);
                        payload.data.drain(..excess);
                    }
                }
                if payload.data.is_empty() {
                    tracing::debug!("Structured answer had no data, returning text");
                    let text = if payload.response.is_empty() {
                        FALLBACK_ANSWER.to_string()
                    } else {
                        payload.response
                    };
                    return ChatResponse::Text { text };
                }
                ChatResponse::Visualization {
                    viz_type: payload.viz_type,
                    title: payload.title,
                    narration: payload.response,
                    data_points: payload.data,
                }
            }
        }
    }
}

fn build_system_prompt(persona: &PersonaSettings) -> String {
    let base = match &persona.system_prompt {
        Some(prompt) => prompt.clone(),
        None => DEFAULT_PERSONA_PROMPT.replace(DEFAULT_PERSONA_NAME, &persona.name),
    };
    format!(
        "{base}\n\n\
Rules you must always follow:\n\
- Answer ONLY using the context below. If the context does not cover the question, \
say \"I'm not sure about that\" or \"I don't have that information\". Never guess.\n\
- If the user says they are younger than {age}, do not give any sexual advice. \
Respond calmly and only encourage abstinence.\n\
- Keep answers short, friendly and suitable for teenagers.",
        base = base,
        age = persona.age_threshold
    )
}

fn format_context(context: &[RetrievedChunk]) -> String {
    if context.is_empty() {
        return "(no relevant information found)".to_string();
    }
    context
        .iter()
        .enumerate()
        .map(|(i, chunk)| format!("[{}] {}", i + 1, chunk.text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn format_rows(rows: &[DataPoint]) -> String {
    rows.iter()
        .map(|point| format!("{}: {}", point.year, point.value))
        .collect::<Vec<_>>()
        .join("\n")
}
