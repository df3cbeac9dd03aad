use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;

use super::defaults::{
    default_local_origins, default_statistic_rules, DEFAULT_AGE_THRESHOLD, DEFAULT_CHAT_MODEL,
    DEFAULT_EMBEDDING_MODEL, DEFAULT_LLM_BASE_URL, DEFAULT_PERSONA_NAME,
};
use super::paths::AppPaths;
use crate::chat::rules::StatisticRule;

/// How idle sessions get evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepMode {
    /// Scan at the start of every chat request.
    OnRequest,
    /// Scan from a background task on a fixed period.
    Interval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProviderKind {
    OpenAi,
    Hashing,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
    pub rate_limit_per_minute: u32,
    pub rate_limit_burst: u32,
}

#[derive(Debug, Clone)]
pub struct KnowledgeSettings {
    pub data_dir: PathBuf,
    pub statistics_file: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub exact_match: bool,
}

#[derive(Debug, Clone)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub embed_batch_size: usize,
}

#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProviderKind,
    pub model: String,
    pub dimensions: usize,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub expiry: Duration,
    pub sweep: SweepMode,
    pub sweep_interval: Duration,
    pub max_history_turns: usize,
}

#[derive(Debug, Clone)]
pub struct PersonaSettings {
    pub name: String,
    pub system_prompt: Option<String>,
    pub age_threshold: u32,
}

#[derive(Debug, Clone)]
pub struct ChartSettings {
    pub years: usize,
    pub rules: Vec<StatisticRule>,
}

#[derive(Debug, Clone)]
pub struct QueryLogSettings {
    pub enabled: bool,
    pub path: PathBuf,
}

/// Typed view over the merged YAML configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub max_input_length: usize,
    pub server: ServerSettings,
    pub knowledge: KnowledgeSettings,
    pub retrieval: RetrievalSettings,
    pub llm: LlmSettings,
    pub embedding: EmbeddingSettings,
    pub session: SessionSettings,
    pub persona: PersonaSettings,
    pub charts: ChartSettings,
    pub history_enabled: bool,
    pub query_log: QueryLogSettings,
}

impl Settings {
    /// Extracts settings from an already validated config value.
    ///
    /// Missing keys fall back to defaults; relative paths resolve against the
    /// project root (knowledge) or the user data dir (query log).
    pub fn from_config(config: &Value, paths: &AppPaths) -> Self {
        let server = ServerSettings {
            host: get_str(config, &["server", "host"]).unwrap_or_else(|| "127.0.0.1".to_string()),
            port: get_u64(config, &["server", "port"]).unwrap_or(5000).min(65535) as u16,
            cors_allowed_origins: get_string_list(config, &["server", "cors_allowed_origins"])
                .filter(|origins| !origins.is_empty())
                .unwrap_or_else(default_local_origins),
            rate_limit_per_minute: get_u64(config, &["server", "rate_limit_per_minute"])
                .unwrap_or(30)
                .clamp(1, 100_000) as u32,
            rate_limit_burst: get_u64(config, &["server", "rate_limit_burst"])
                .unwrap_or(10)
                .clamp(1, 10_000) as u32,
        };

        let chunk_size = get_u64(config, &["knowledge", "chunk_size"])
            .unwrap_or(1000)
            .max(1) as usize;
        let chunk_overlap = (get_u64(config, &["knowledge", "chunk_overlap"]).unwrap_or(200)
            as usize)
            .min(chunk_size.saturating_sub(1));
        let knowledge = KnowledgeSettings {
            data_dir: paths.resolve(
                &get_str(config, &["knowledge", "data_dir"]).unwrap_or_else(|| "data".to_string()),
            ),
            statistics_file: paths.resolve(
                &get_str(config, &["knowledge", "statistics_file"])
                    .unwrap_or_else(|| "data/SexED-Statistics.csv".to_string()),
            ),
            chunk_size,
            chunk_overlap,
            exact_match: get_bool(config, &["knowledge", "exact_match"]).unwrap_or(false),
        };

        let retrieval = RetrievalSettings {
            top_k: get_u64(config, &["retrieval", "top_k"]).unwrap_or(3).clamp(1, 100) as usize,
            embed_batch_size: get_u64(config, &["retrieval", "embed_batch_size"])
                .unwrap_or(64)
                .clamp(1, 2048) as usize,
        };

        let base_url = get_str(config, &["llm", "base_url"])
            .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string());
        let llm = LlmSettings {
            base_url,
            api_key: get_str(config, &["llm", "api_key"]).filter(|key| !key.trim().is_empty()),
            model: get_str(config, &["llm", "model"])
                .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            temperature: get_f64(config, &["llm", "temperature"])
                .unwrap_or(0.7)
                .clamp(0.0, 2.0),
            max_tokens: get_u64(config, &["llm", "max_tokens"]).map(|v| v as u32),
        };

        let embedding = EmbeddingSettings {
            provider: match get_str(config, &["embedding", "provider"]).as_deref() {
                Some("hashing") => EmbeddingProviderKind::Hashing,
                _ => EmbeddingProviderKind::OpenAi,
            },
            model: get_str(config, &["embedding", "model"])
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            dimensions: get_u64(config, &["embedding", "dimensions"])
                .unwrap_or(384)
                .clamp(1, 65_536) as usize,
        };

        let session = SessionSettings {
            expiry: Duration::from_secs(
                get_u64(config, &["session", "expiry_secs"]).unwrap_or(3600).max(1),
            ),
            sweep: match get_str(config, &["session", "sweep"]).as_deref() {
                Some("interval") => SweepMode::Interval,
                _ => SweepMode::OnRequest,
            },
            sweep_interval: Duration::from_secs(
                get_u64(config, &["session", "sweep_interval_secs"])
                    .unwrap_or(60)
                    .max(1),
            ),
            max_history_turns: get_u64(config, &["session", "max_history_turns"]).unwrap_or(20)
                as usize,
        };

        let persona = PersonaSettings {
            name: get_str(config, &["persona", "name"])
                .unwrap_or_else(|| DEFAULT_PERSONA_NAME.to_string()),
            system_prompt: get_str(config, &["persona", "system_prompt"])
                .filter(|prompt| !prompt.trim().is_empty()),
            age_threshold: get_u64(config, &["persona", "age_threshold"])
                .map(|v| v as u32)
                .unwrap_or(DEFAULT_AGE_THRESHOLD),
        };

        let charts = ChartSettings {
            years: get_u64(config, &["charts", "years"]).unwrap_or(5).clamp(1, 200) as usize,
            rules: parse_statistic_rules(config).unwrap_or_else(default_statistic_rules),
        };

        let query_log = QueryLogSettings {
            enabled: get_bool(config, &["query_log", "enabled"]).unwrap_or(false),
            path: {
                let raw = get_str(config, &["query_log", "path"])
                    .unwrap_or_else(|| "user_inputs.csv".to_string());
                let candidate = PathBuf::from(&raw);
                if candidate.is_absolute() {
                    candidate
                } else {
                    paths.user_data_dir.join(candidate)
                }
            },
        };

        Settings {
            max_input_length: get_u64(config, &["app", "max_input_length"])
                .unwrap_or(4000)
                .max(1) as usize,
            server,
            knowledge,
            retrieval,
            llm,
            embedding,
            session,
            persona,
            charts,
            history_enabled: get_bool(config, &["history", "enabled"]).unwrap_or(true),
            query_log,
        }
    }
}

fn parse_statistic_rules(config: &Value) -> Option<Vec<StatisticRule>> {
    let items = lookup(config, &["charts", "rules"])?.as_array()?;
    let rules: Vec<StatisticRule> = items
        .iter()
        .filter_map(|item| {
            let column = item.get("column")?.as_str()?.trim().to_string();
            let keywords = item
                .get("keywords")?
                .as_array()?
                .iter()
                .filter_map(|k| k.as_str())
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect::<Vec<_>>();
            if column.is_empty() || keywords.is_empty() {
                return None;
            }
            Some(StatisticRule { column, keywords })
        })
        .collect();
    if rules.is_empty() {
        None
    } else {
        Some(rules)
    }
}

fn lookup<'a>(config: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(config, |current, key| current.get(*key))
}

fn get_str(config: &Value, path: &[&str]) -> Option<String> {
    lookup(config, path)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

fn get_u64(config: &Value, path: &[&str]) -> Option<u64> {
    lookup(config, path).and_then(|v| v.as_u64())
}

fn get_f64(config: &Value, path: &[&str]) -> Option<f64> {
    lookup(config, path).and_then(|v| v.as_f64())
}

fn get_bool(config: &Value, path: &[&str]) -> Option<bool> {
    lookup(config, path).and_then(|v| v.as_bool())
}

fn get_string_list(config: &Value, path: &[&str]) -> Option<Vec<String>> {
    lookup(config, path).and_then(|v| v.as_array()).map(|list| {
        list.iter()
            .filter_map(|item| item.as_str())
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| item.to_string())
            .collect()
    })
}
