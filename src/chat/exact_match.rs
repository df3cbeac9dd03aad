use std::collections::HashMap;

use crate::knowledge::KnowledgeRecord;

/// Answers messages that repeat a known question verbatim (case-insensitive).
#[derive(Debug, Clone, Default)]
pub struct ExactAnswers {
    answers: HashMap<String, String>,
}

impl ExactAnswers {
    /// First occurrence of a question wins.
    pub fn from_records(records: &[KnowledgeRecord]) -> Self {
        let mut answers = HashMap::new();
        for record in records {
            let answer = match &record.link {
                Some(link) => format!("{}\n\nSource: {}", record.answer, link),
                None => record.answer.clone(),
            };
            answers.entry(normalize(&record.question)).or_insert(answer);
        }
        Self { answers }
    }

    pub fn lookup(&self, message: &str) -> Option<&str> {
        self.answers.get(&normalize(message)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}
