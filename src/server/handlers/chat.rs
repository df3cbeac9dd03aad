use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ChatRequestBody {
    pub message: Option<String>,
    pub session_id: Option<String>,
}

/// `POST /chat` and `POST /api/v1/chat`.
///
/// An unparsable body is treated like one without a message.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let payload: ChatRequestBody = serde_json::from_slice(&body).unwrap_or_else(|e| {
        tracing::debug!("Unreadable chat body: {}", e);
        ChatRequestBody::default()
    });

    let outcome = state
        .pipeline
        .handle(payload.message.as_deref(), payload.session_id.as_deref())
        .await?;

    let mut body = json!({
        "response": outcome.response.text(),
        "session_id": outcome.session_id,
    });
    if let (Some(chart), Some(obj)) = (outcome.response.chart_json(), body.as_object_mut()) {
        obj.insert("chart".to_string(), chart);
    }
    Ok(Json(body))
}
