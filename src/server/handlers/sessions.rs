use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};

use crate::core::errors::ApiError;
use crate::state::AppState;

/// Persisted sessions when the history store is on, live ones otherwise.
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let result: Vec<Value> = match &state.history {
        Some(history) => history
            .list_sessions()
            .await?
            .into_iter()
            .map(|session| {
                json!({
                    "id": session.id,
                    "created_at": session.created_at,
                    "updated_at": session.updated_at,
                    "message_count": session.message_count
                })
            })
            .collect(),
        None => state
            .sessions()
            .list()
            .into_iter()
            .map(|session| {
                json!({
                    "id": session.id,
                    "created_at": session.created_at.to_rfc3339(),
                    "updated_at": session.last_activity.to_rfc3339(),
                    "message_count": session.history.len()
                })
            })
            .collect(),
    };
    Ok(Json(json!({"sessions": result})))
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let not_found = || ApiError::NotFound("Session not found".to_string());

    if let Some(history) = &state.history {
        let session = history.get_session(&session_id).await?.ok_or_else(not_found)?;
        let messages: Vec<Value> = history
            .get_history(&session_id, 0)
            .await?
            .into_iter()
            .map(|msg| {
                let mut entry = json!({
                    "role": msg.role,
                    "content": msg.content,
                    "created_at": msg.created_at
                });
                if let (Some(chart), Some(obj)) = (msg.metadata, entry.as_object_mut()) {
                    obj.insert("chart".to_string(), chart);
                }
                entry
            })
            .collect();
        return Ok(Json(json!({"session": session, "messages": messages})));
    }

    let session = state.sessions().get(&session_id).ok_or_else(not_found)?;
    let messages: Vec<Value> = session
        .history
        .iter()
        .map(|turn| json!({"role": turn.role, "content": turn.content}))
        .collect();
    Ok(Json(json!({
        "session": {
            "id": session.id,
            "created_at": session.created_at.to_rfc3339(),
            "updated_at": session.last_activity.to_rfc3339(),
            "message_count": session.history.len()
        },
        "messages": messages
    })))
}
