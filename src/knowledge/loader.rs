use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use super::decode_text;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KnowledgeRecord {
    pub question: String,
    pub answer: String,
    pub link: Option<String>,
}

#[derive(Debug, Error)]
pub enum DataSourceError {
    #[error("knowledge directory not found: {0}")]
    Missing(PathBuf),
    #[error("knowledge path is not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("failed to list knowledge directory {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Reads every `*.csv` file directly under `dir`, in filename order.
///
/// Files that cannot be read or parsed are logged and skipped.
pub fn load_knowledge(dir: &Path) -> Result<Vec<KnowledgeRecord>, DataSourceError> {
    if !dir.exists() {
        return Err(DataSourceError::Missing(dir.to_path_buf()));
    }
    if !dir.is_dir() {
        return Err(DataSourceError::NotADirectory(dir.to_path_buf()));
    }

    let entries = fs::read_dir(dir).map_err(|source| DataSourceError::Unreadable {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_csv(path))
        .collect();
    files.sort();

    let mut records = Vec::new();
    for file in &files {
        match load_file(file) {
            Ok(mut loaded) => {
                tracing::debug!(file = %file.display(), rows = loaded.len(), "Loaded knowledge file");
                records.append(&mut loaded);
            }
            Err(e) => {
                tracing::warn!(file = %file.display(), "Skipping knowledge file: {}", e);
            }
        }
    }

    tracing::info!(
        files = files.len(),
        records = records.len(),
        "Knowledge loaded from {}",
        dir.display()
    );
    Ok(records)
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false)
}

fn load_file(path: &Path) -> anyhow::Result<Vec<KnowledgeRecord>> {
    let bytes = fs::read(path)?;
    let (text, latin1) = decode_text(&bytes);
    if latin1 {
        tracing::warn!(file = %path.display(), "File is not valid UTF-8, decoded as Latin-1");
    }
    parse_records(&text, path)
}

fn parse_records(text: &str, path: &Path) -> anyhow::Result<Vec<KnowledgeRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();
    let find = |names: &[&str]| {
        headers
            .iter()
            .position(|h| names.iter().any(|name| h.trim().eq_ignore_ascii_case(name)))
    };

    let Some(question_col) = find(&["question", "questions"]) else {
        tracing::debug!(file = %path.display(), "No question column, file contributes nothing");
        return Ok(Vec::new());
    };
    let answer_col = find(&["answer", "answers"]);
    let link_col = find(&["link", "links"]);

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let field = |col: Option<usize>| {
            col.and_then(|c| row.get(c))
                .map(|value| value.trim().to_string())
                .unwrap_or_default()
        };

        let question = field(Some(question_col));
        if question.is_empty() {
            continue;
        }
        let link = field(link_col);
        records.push(KnowledgeRecord {
            question,
            answer: field(answer_col),
            link: if link.is_empty() { None } else { Some(link) },
        });
    }
    Ok(records)
}
