use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid config at '{path}': {reason}")]
    Invalid { path: String, reason: String },
}

pub fn validate_config(config: &Value) -> Result<(), ConfigError> {
    let root = config
        .as_object()
        .ok_or_else(|| config_type_error("root", "object"))?;

    if let Some(app) = expect_optional_object(root, "app")? {
        validate_u64_field(app, "app.max_input_length", "max_input_length", 1, 1_000_000)?;
    }

    if let Some(server) = expect_optional_object(root, "server")? {
        validate_optional_string_field(server, "server.host", "host")?;
        validate_u64_field(server, "server.port", "port", 0, 65535)?;
        validate_string_array_field(
            server,
            "server.cors_allowed_origins",
            "cors_allowed_origins",
        )?;
        validate_u64_field(
            server,
            "server.rate_limit_per_minute",
            "rate_limit_per_minute",
            1,
            100_000,
        )?;
        validate_u64_field(server, "server.rate_limit_burst", "rate_limit_burst", 1, 10_000)?;
    }

    if let Some(knowledge) = expect_optional_object(root, "knowledge")? {
        validate_optional_string_field(knowledge, "knowledge.data_dir", "data_dir")?;
        validate_optional_string_field(knowledge, "knowledge.statistics_file", "statistics_file")?;
        validate_u64_field(knowledge, "knowledge.chunk_size", "chunk_size", 1, 100_000)?;
        validate_u64_field(knowledge, "knowledge.chunk_overlap", "chunk_overlap", 0, 100_000)?;
        validate_bool_field(knowledge, "knowledge.exact_match", "exact_match")?;

        let size = knowledge.get("chunk_size").and_then(Value::as_u64);
        let overlap = knowledge.get("chunk_overlap").and_then(Value::as_u64);
        if let (Some(size), Some(overlap)) = (size, overlap) {
            if overlap >= size {
                return Err(ConfigError::Invalid {
                    path: "knowledge.chunk_overlap".to_string(),
                    reason: format!("must be smaller than chunk_size ({})", size),
                });
            }
        }
    }

    if let Some(retrieval) = expect_optional_object(root, "retrieval")? {
        validate_u64_field(retrieval, "retrieval.top_k", "top_k", 1, 100)?;
        validate_u64_field(
            retrieval,
            "retrieval.embed_batch_size",
            "embed_batch_size",
            1,
            2048,
        )?;
    }

    if let Some(llm) = expect_optional_object(root, "llm")? {
        validate_optional_string_field(llm, "llm.base_url", "base_url")?;
        validate_optional_string_field(llm, "llm.model", "model")?;
        validate_optional_string_field(llm, "llm.api_key", "api_key")?;
        validate_f64_field(llm, "llm.temperature", "temperature", 0.0, 2.0)?;
        validate_u64_field(llm, "llm.max_tokens", "max_tokens", 1, 1_000_000)?;
    }

    if let Some(embedding) = expect_optional_object(root, "embedding")? {
        validate_enum_field(
            embedding,
            "embedding.provider",
            "provider",
            &["openai", "hashing"],
        )?;
        validate_optional_string_field(embedding, "embedding.model", "model")?;
        validate_u64_field(embedding, "embedding.dimensions", "dimensions", 1, 65_536)?;
    }

    if let Some(session) = expect_optional_object(root, "session")? {
        validate_u64_field(session, "session.expiry_secs", "expiry_secs", 1, 31_536_000)?;
        validate_enum_field(session, "session.sweep", "sweep", &["on_request", "interval"])?;
        validate_u64_field(
            session,
            "session.sweep_interval_secs",
            "sweep_interval_secs",
            1,
            86_400,
        )?;
        validate_u64_field(
            session,
            "session.max_history_turns",
            "max_history_turns",
            0,
            10_000,
        )?;
    }

    if let Some(persona) = expect_optional_object(root, "persona")? {
        validate_optional_string_field(persona, "persona.name", "name")?;
        validate_optional_string_field(persona, "persona.system_prompt", "system_prompt")?;
        validate_u64_field(persona, "persona.age_threshold", "age_threshold", 1, 120)?;
    }

    if let Some(charts) = expect_optional_object(root, "charts")? {
        validate_u64_field(charts, "charts.years", "years", 1, 200)?;
        if let Some(rules) = charts.get("rules") {
            let items = rules
                .as_array()
                .ok_or_else(|| config_type_error("charts.rules", "array"))?;
            for (index, item) in items.iter().enumerate() {
                let path = format!("charts.rules[{}]", index);
                let entry = item
                    .as_object()
                    .ok_or_else(|| config_type_error(&path, "object"))?;
                validate_required_string_field(entry, &format!("{}.column", path), "column")?;
                validate_string_array_field(entry, &format!("{}.keywords", path), "keywords")?;
            }
        }
    }

    if let Some(history) = expect_optional_object(root, "history")? {
        validate_bool_field(history, "history.enabled", "enabled")?;
    }

    if let Some(query_log) = expect_optional_object(root, "query_log")? {
        validate_bool_field(query_log, "query_log.enabled", "enabled")?;
        validate_optional_string_field(query_log, "query_log.path", "path")?;
    }

    Ok(())
}

fn expect_optional_object<'a>(
    root: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, ConfigError> {
    match root.get(key) {
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(config_type_error(key, "object")),
        None => Ok(None),
    }
}

fn validate_bool_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ConfigError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.as_bool().is_some() {
        return Ok(());
    }
    Err(config_type_error(path, "boolean"))
}

fn validate_u64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: u64,
    max: u64,
) -> Result<(), ConfigError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_u64() else {
        return Err(config_type_error(path, "integer"));
    };
    if number < min || number > max {
        return Err(out_of_range(path, min, max));
    }
    Ok(())
}

fn validate_f64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: f64,
    max: f64,
) -> Result<(), ConfigError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_f64() else {
        return Err(config_type_error(path, "number"));
    };
    if number < min || number > max {
        return Err(out_of_range(path, min, max));
    }
    Ok(())
}

fn validate_enum_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    allowed: &[&str],
) -> Result<(), ConfigError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(text) = value.as_str() else {
        return Err(config_type_error(path, "string"));
    };
    if allowed.contains(&text) {
        return Ok(());
    }
    Err(ConfigError::Invalid {
        path: path.to_string(),
        reason: format!("must be one of {}", allowed.join(", ")),
    })
}

fn validate_required_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ConfigError> {
    let value = section.get(key).ok_or_else(|| ConfigError::Invalid {
        path: path.to_string(),
        reason: "value is required".to_string(),
    })?;
    let Some(text) = value.as_str() else {
        return Err(config_type_error(path, "string"));
    };
    if text.trim().is_empty() {
        return Err(ConfigError::Invalid {
            path: path.to_string(),
            reason: "value cannot be empty".to_string(),
        });
    }
    Ok(())
}

fn validate_optional_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ConfigError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.as_str().is_none() {
        return Err(config_type_error(path, "string"));
    }
    Ok(())
}

fn validate_string_array_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ConfigError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(items) = value.as_array() else {
        return Err(config_type_error(path, "array of strings"));
    };
    for (index, item) in items.iter().enumerate() {
        let Some(text) = item.as_str() else {
            return Err(config_type_error(&format!("{}[{}]", path, index), "string"));
        };
        if text.trim().is_empty() {
            return Err(ConfigError::Invalid {
                path: format!("{}[{}]", path, index),
                reason: "value cannot be empty".to_string(),
            });
        }
    }
    Ok(())
}

fn out_of_range<T: std::fmt::Display>(path: &str, min: T, max: T) -> ConfigError {
    ConfigError::Invalid {
        path: path.to_string(),
        reason: format!("must be between {} and {}", min, max),
    }
}

fn config_type_error(path: &str, expected: &str) -> ConfigError {
    ConfigError::Invalid {
        path: path.to_string(),
        reason: format!("expected {}", expected),
    }
}
