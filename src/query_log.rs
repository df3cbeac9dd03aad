use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Append-only CSV of raw user inputs (`timestamp,user_input`).
///
/// Writes run on the blocking pool so the chat handler never does file I/O
/// on a runtime worker.
#[derive(Clone)]
pub struct QueryLog {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl QueryLog {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Failures are logged and swallowed.
    pub async fn record(&self, message: &str) {
        let log = self.clone();
        let message = message.to_string();
        let result = tokio::task::spawn_blocking(move || log.append(&message)).await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(file = %self.path.display(), "Failed to write query log: {}", e);
            }
            Err(e) => {
                tracing::warn!(file = %self.path.display(), "Query log task failed: {}", e);
            }
        }
    }

    fn append(&self, message: &str) -> anyhow::Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let is_new = fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let mut writer = csv::Writer::from_writer(file);
        if is_new {
            writer.write_record(["timestamp", "user_input"])?;
        }
        let timestamp = chrono::Utc::now().to_rfc3339();
        writer.write_record([timestamp.as_str(), message])?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_header_once_and_quotes_fields() {
        let tmp = tempfile::tempdir().unwrap();
        let log = QueryLog::new(tmp.path().join("logs").join("user_inputs.csv"));

        log.record("hi").await;
        log.record("what about chlamydia, plot it").await;

        let mut reader = csv::Reader::from_path(log.path()).unwrap();
        let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(headers, vec!["timestamp", "user_input"]);
        let inputs: Vec<String> = reader
            .records()
            .map(|r| r.unwrap()[1].to_string())
            .collect();
        assert_eq!(inputs, vec!["hi", "what about chlamydia, plot it"]);
    }

    #[tokio::test]
    async fn concurrent_records_share_one_header() {
        let tmp = tempfile::tempdir().unwrap();
        let log = QueryLog::new(tmp.path().join("user_inputs.csv"));

        let writes = (0..8).map(|i| {
            let log = log.clone();
            tokio::spawn(async move { log.record(&format!("question {}", i)).await })
        });
        for write in writes.collect::<Vec<_>>() {
            write.await.unwrap();
        }

        let mut reader = csv::Reader::from_path(log.path()).unwrap();
        assert_eq!(reader.records().count(), 8);
        let text = fs::read_to_string(log.path()).unwrap();
        assert_eq!(text.matches("timestamp,user_input").count(), 1);
    }

    #[tokio::test]
    async fn unwritable_path_is_swallowed() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("not_a_dir");
        fs::write(&blocker, "x").unwrap();
        let log = QueryLog::new(blocker.join("user_inputs.csv"));

        log.record("hi").await;
        assert!(!log.path().exists());
    }
}
