use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use super::openai::OpenAiProvider;
use super::provider::{EmbeddingProvider, LlmProvider, UpstreamError};
use super::types::{ChatMessage, ChatRequest};

// Serves canned OpenAI-shaped responses on an ephemeral port.
async fn spawn_fake_provider(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{}/v1", addr)
}

fn provider(base_url: String) -> OpenAiProvider {
    OpenAiProvider::new(
        base_url,
        Some("test-key".to_string()),
        "chat-model".to_string(),
        "embed-model".to_string(),
    )
}

#[tokio::test]
async fn chat_returns_first_choice_content() {
    let router = Router::new().route(
        "/v1/chat/completions",
        post(|Json(body): Json<Value>| async move {
            let last = body["messages"]
                .as_array()
                .and_then(|m| m.last())
                .and_then(|m| m["content"].as_str())
                .unwrap_or_default()
                .to_string();
            Json(json!({
                "model": body["model"],
                "choices": [{ "message": { "role": "assistant", "content": format!("echo: {}", last) } }]
            }))
        }),
    );
    let base_url = spawn_fake_provider(router).await;

    let request = ChatRequest::new(vec![
        ChatMessage::system("be brief"),
        ChatMessage::user("hello"),
    ])
    .with_temperature(0.2);
    let reply = provider(base_url).chat(request).await.unwrap();

    assert_eq!(reply, "echo: hello");
}

#[tokio::test]
async fn chat_maps_error_status_to_provider_error() {
    let router = Router::new().route(
        "/v1/chat/completions",
        post(|| async {
            (
                axum::http::StatusCode::UNAUTHORIZED,
                Json(json!({ "error": { "message": "bad key" } })),
            )
        }),
    );
    let base_url = spawn_fake_provider(router).await;

    let err = provider(base_url)
        .chat(ChatRequest::new(vec![ChatMessage::user("hi")]))
        .await
        .unwrap_err();

    assert!(matches!(err, UpstreamError::Provider(_)));
}

#[tokio::test]
async fn embed_orders_vectors_by_index() {
    let router = Router::new().route(
        "/v1/embeddings",
        post(|| async {
            Json(json!({
                "data": [
                    { "index": 1, "embedding": [0.0, 1.0] },
                    { "index": 0, "embedding": [1.0, 0.0] }
                ]
            }))
        }),
    );
    let base_url = spawn_fake_provider(router).await;

    let vectors = provider(base_url)
        .embed(&["first".to_string(), "second".to_string()])
        .await
        .unwrap();

    assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
}

#[tokio::test]
async fn unreachable_provider_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = provider(format!("http://{}/v1", addr))
        .chat(ChatRequest::new(vec![ChatMessage::user("hi")]))
        .await
        .unwrap_err();

    assert!(matches!(err, UpstreamError::Transport(_)));
}
