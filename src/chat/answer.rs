//! Classifies raw model output as a structured chart/table payload or plain text.

use serde_json::Value;

use super::VizType;
use crate::knowledge::DataPoint;

#[derive(Debug, Clone, PartialEq)]
pub struct StructuredPayload {
    pub viz_type: VizType,
    pub title: String,
    pub response: String,
    /// Sorted by year, oldest first.
    pub data: Vec<DataPoint>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedAnswer {
    Structured(StructuredPayload),
    Plain(String),
}

/// Accepts an optionally fenced JSON object of the shape
/// `{"type", "title", "response", "data": [{"year", "value"}]}`.
/// Anything else comes back as trimmed plain text.
pub fn parse_answer(raw: &str) -> ParsedAnswer {
    let trimmed = raw.trim();
    match parse_structured(trimmed) {
        Some(payload) => ParsedAnswer::Structured(payload),
        None => ParsedAnswer::Plain(trimmed.to_string()),
    }
}

fn parse_structured(text: &str) -> Option<StructuredPayload> {
    let body = strip_fence(text);
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    if end < start {
        return None;
    }

    let value: Value = serde_json::from_str(&body[start..=end]).ok()?;
    let object = value.as_object()?;

    let viz_type = match object.get("type")?.as_str()?.trim().to_lowercase().as_str() {
        "chart" => VizType::Chart,
        "table" => VizType::Table,
        _ => return None,
    };
    let title = object.get("title")?.as_str()?.trim().to_string();
    let response = object.get("response")?.as_str()?.trim().to_string();

    let items = object.get("data")?.as_array()?;
    let mut data: Vec<DataPoint> = Vec::with_capacity(items.len());
    for item in items {
        match parse_point(item) {
            Some(point) => data.push(point),
            None => tracing::debug!("Dropping malformed data point: {}", item),
        }
    }
    data.sort_by_key(|point| point.year);

    Some(StructuredPayload {
        viz_type,
        title,
        response,
        data,
    })
}

fn strip_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (`json`) along with the rest of the opening line.
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest.trim_start_matches("json"),
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn parse_point(item: &Value) -> Option<DataPoint> {
    let year = match item.get("year")? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))?,
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    let value = match item.get("value")? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    Some(DataPoint {
        year: i32::try_from(year).ok()?,
        value,
    })
}
