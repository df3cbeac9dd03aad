use crate::chat::rules::StatisticRule;

pub const DEFAULT_PERSONA_NAME: &str = "Miss Khalifa";

pub const DEFAULT_PERSONA_PROMPT: &str = "You are Miss Khalifa, a young and friendly virtual sexual health assistant. \
Your goal is to provide accurate and helpful information about sexual health to teenagers \
in a way that is easy for them to understand and relate to.\n\
Keep your answers simple, short and to the point.\n\
Speak in a casual, friendly tone, like a cool older sister or a young, approachable doctor.\n\
Use simple language and avoid medical jargon. If you need to use a technical term, explain it.\n\
Be supportive, non-judgmental, and empathetic.\n\
If appropriate, use emojis or common teen slang, but don't overdo it.\n\
If the question is a greeting or asks who you are, introduce yourself in a friendly way.";

pub const DEFAULT_AGE_THRESHOLD: u32 = 16;

pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

pub fn default_statistic_rules() -> Vec<StatisticRule> {
    vec![
        StatisticRule::new("HIV (per 1000)", &["hiv", "aids"]),
        StatisticRule::new("chlamydia (per 1000)", &["chlamydia"]),
        StatisticRule::new("gonorrhea (per 1000)", &["gonorrhea", "gonorrhoea"]),
        StatisticRule::new("syphilis (per 1000)", &["syphilis"]),
    ]
}

pub fn default_local_origins() -> Vec<String> {
    vec![
        "http://localhost".to_string(),
        "http://localhost:3000".to_string(),
        "http://localhost:5173".to_string(),
        "http://127.0.0.1".to_string(),
        "http://127.0.0.1:3000".to_string(),
        "http://127.0.0.1:5173".to_string(),
    ]
}
