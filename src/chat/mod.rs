//! The chat pipeline: rewrite, retrieve, synthesize, persist.

pub mod answer;
pub mod exact_match;
pub mod pipeline;
pub mod rewriter;
pub mod rules;
pub mod synthesizer;

use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::knowledge::DataPoint;
use crate::llm::UpstreamError;

pub use pipeline::{ChatOutcome, ChatPipeline};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Validation(String),
    #[error("upstream model failure: {0}")]
    Upstream(#[from] UpstreamError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VizType {
    Chart,
    Table,
}

impl VizType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VizType::Chart => "chart",
            VizType::Table => "table",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChatResponse {
    Text {
        text: String,
    },
    Visualization {
        viz_type: VizType,
        title: String,
        narration: String,
        data_points: Vec<DataPoint>,
    },
}

impl ChatResponse {
    /// What the assistant turn records: the text, or the narration of a chart.
    pub fn text(&self) -> &str {
        match self {
            ChatResponse::Text { text } => text,
            ChatResponse::Visualization { narration, .. } => narration,
        }
    }

    /// `{type, title, data}` for visualizations, as sent to clients.
    pub fn chart_json(&self) -> Option<Value> {
        match self {
            ChatResponse::Text { .. } => None,
            ChatResponse::Visualization {
                viz_type,
                title,
                data_points,
                ..
            } => Some(json!({
                "type": viz_type,
                "title": title,
                "data": data_points,
            })),
        }
    }
}
