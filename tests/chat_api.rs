use std::fs;
use std::net::SocketAddr;
use std::path::Path;

use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use khalifa_backend::core::config::{AppPaths, Settings};
use khalifa_backend::server::router::router;
use khalifa_backend::state::AppState;

const FAQ: &str = "Question,Answer,Link
What is chlamydia?,A common bacterial STI. It often has no symptoms.,https://example.org/chlamydia
Where can I get tested?,The clinic phone number is 1(869)664-8976.,
";

const STATISTICS: &str = "Year,HIV (per 1000),chlamydia (per 1000),gonorrhea (per 1000),syphilis (per 1000)
2015,1.0,15.0,3.0,0.5
2016,1.1,16.0,3.1,0.6
2017,1.2,17.0,3.2,0.7
2018,1.3,18.0,3.3,0.8
2019,1.4,19.0,3.4,0.9
2020,1.5,20.0,3.5,1.0
2021,1.6,21.0,3.6,1.1
2022,1.7,22.0,3.7,1.2
";

fn message_text(message: &Value) -> &str {
    message["content"].as_str().unwrap_or_default()
}

// OpenAI-shaped fake: rewrites by echoing, answers chart prompts with JSON.
async fn fake_completions(Json(body): Json<Value>) -> Json<Value> {
    let messages = body["messages"].as_array().cloned().unwrap_or_default();
    let last_user = messages
        .iter()
        .rev()
        .find(|m| m["role"] == "user")
        .map(|m| message_text(m).to_string())
        .unwrap_or_default();

    let content = if message_text(&messages[0]).contains("Do NOT answer the question") {
        last_user
    } else if messages
        .iter()
        .any(|m| message_text(m).contains("Reply with ONLY a JSON object"))
    {
        json!({
            "type": "chart",
            "title": "Chlamydia rates",
            "response": "Here's how chlamydia rates have changed recently.",
            "data": []
        })
        .to_string()
    } else {
        "Hey there! I'm Miss Khalifa. What would you like to know?".to_string()
    };

    Json(json!({ "choices": [{ "message": { "role": "assistant", "content": content } }] }))
}

async fn spawn_fake_llm() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().route("/v1/chat/completions", post(fake_completions));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{}/v1", addr)
}

fn write_data(root: &Path) {
    let data = root.join("data");
    fs::create_dir_all(&data).unwrap();
    fs::write(data.join("faq.csv"), FAQ).unwrap();
    fs::write(data.join("SexED-Statistics.csv"), STATISTICS).unwrap();
}

async fn spawn_app(root: &Path, overrides: Value) -> String {
    write_data(root);
    let paths = AppPaths::with_dirs(root.to_path_buf(), root.join("user"));

    let mut config = json!({
        "llm": { "base_url": spawn_fake_llm().await, "api_key": "test-key" },
        "embedding": { "provider": "hashing", "dimensions": 128 },
        "knowledge": { "chunk_size": 200, "chunk_overlap": 40 }
    });
    if let (Some(base), Some(extra)) = (config.as_object_mut(), overrides.as_object()) {
        for (key, value) in extra {
            base.insert(key.clone(), value.clone());
        }
    }
    let settings = Settings::from_config(&config, &paths);

    let state = AppState::initialize(settings, &paths).await.unwrap();
    let app = router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await;
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn greeting_then_chart_request_keeps_the_session() {
    let tmp = tempfile::tempdir().unwrap();
    let base = spawn_app(tmp.path(), json!({})).await;
    let client = reqwest::Client::new();

    let first: Value = client
        .post(format!("{}/chat", base))
        .json(&json!({ "message": "hi" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let session_id = first["session_id"].as_str().unwrap().to_string();
    assert!(!session_id.is_empty());
    assert!(first["response"].as_str().unwrap().contains("Miss Khalifa"));
    assert!(first.get("chart").is_none());

    let res = client
        .post(format!("{}/api/v1/chat", base))
        .json(&json!({
            "message": "what about chlamydia rates, plot it",
            "session_id": session_id
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let second: Value = res.json().await.unwrap();

    assert_eq!(second["session_id"], session_id.as_str());
    assert_eq!(second["chart"]["type"], "chart");
    let years: Vec<i64> = second["chart"]["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|point| point["year"].as_i64().unwrap())
        .collect();
    assert_eq!(years, vec![2018, 2019, 2020, 2021, 2022]);
    assert_eq!(second["chart"]["data"][4]["value"], 22.0);

    let session: Value = client
        .get(format!("{}/sessions/{}", base, session_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let messages = session["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[2]["content"], "what about chlamydia rates, plot it");
    assert_eq!(messages[3]["chart"]["type"], "chart");

    let listed: Value = client
        .get(format!("{}/sessions", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed["sessions"][0]["id"], session_id.as_str());
    assert_eq!(listed["sessions"][0]["message_count"], 4);

    let health: Value = client
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert!(health["chunks"].as_u64().unwrap() >= 1);
    assert_eq!(health["sessions"], 1);
}

#[tokio::test]
async fn bad_requests_get_json_errors() {
    let tmp = tempfile::tempdir().unwrap();
    let base = spawn_app(tmp.path(), json!({ "app": { "max_input_length": 50 } })).await;
    let client = reqwest::Client::new();

    for body in [json!({}), json!({ "message": "   " }), json!({ "message": null })] {
        let res = client
            .post(format!("{}/chat", base))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 400);
        let error: Value = res.json().await.unwrap();
        assert_eq!(error["error"], "No message provided");
    }

    let res = client
        .post(format!("{}/chat", base))
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);

    let res = client
        .post(format!("{}/chat", base))
        .json(&json!({ "message": "x".repeat(51) }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);

    let res = client
        .get(format!("{}/sessions/does-not-exist", base))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);
}

#[tokio::test]
async fn in_memory_sessions_are_listed_when_history_is_off() {
    let tmp = tempfile::tempdir().unwrap();
    let base = spawn_app(tmp.path(), json!({ "history": { "enabled": false } })).await;
    let client = reqwest::Client::new();

    let reply: Value = client
        .post(format!("{}/chat", base))
        .json(&json!({ "message": "hi" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let session_id = reply["session_id"].as_str().unwrap();

    let session: Value = client
        .get(format!("{}/sessions/{}", base, session_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(session["session"]["message_count"], 2);
    assert_eq!(session["messages"][0]["role"], "user");
    assert_eq!(session["messages"][1]["role"], "assistant");
    assert!(!tmp.path().join("user").join("khalifa_history.db").exists());
}

#[tokio::test]
async fn chat_is_rate_limited_per_client() {
    let tmp = tempfile::tempdir().unwrap();
    let base = spawn_app(
        tmp.path(),
        json!({ "server": { "rate_limit_per_minute": 1, "rate_limit_burst": 1 } }),
    )
    .await;
    let client = reqwest::Client::new();

    let first = client
        .post(format!("{}/chat", base))
        .json(&json!({ "message": "hi" }))
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), 200);

    let second = client
        .post(format!("{}/chat", base))
        .json(&json!({ "message": "hi again" }))
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), 429);
    let error: Value = second.json().await.unwrap();
    assert_eq!(error["error"], "Too many requests");

    // Introspection endpoints are not throttled.
    let health = client.get(format!("{}/health", base)).send().await.unwrap();
    assert_eq!(health.status(), 200);
}
