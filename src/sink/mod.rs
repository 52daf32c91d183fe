//! Artifact sinks - where successful task payloads land.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Result, SwarmError};

/// One emitted artifact, produced per Success outcome.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactRecord {
    pub task_id: u64,
    pub category_key: String,
    pub timestamp: DateTime<Utc>,
    /// Parsed JSON object when the payload parsed, raw text otherwise
    pub payload: serde_json::Value,
}

impl ArtifactRecord {
    pub fn new(task_id: u64, category_key: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            task_id,
            category_key: category_key.into(),
            timestamp: Utc::now(),
            payload,
        }
    }
}

/// Pluggable destination for artifact records.
pub trait ArtifactSink: Send + Sync {
    fn emit(&self, record: &ArtifactRecord) -> Result<()>;
}

/// Append-only JSONL file sink, one record per line.
pub struct JsonlSink {
    path: PathBuf,
    // Serializes concurrent emitters onto the file
    write_lock: Mutex<()>,
}

impl JsonlSink {
    /// Create a sink at the given path, creating parent directories.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ArtifactSink for JsonlSink {
    fn emit(&self, record: &ArtifactRecord) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| SwarmError::Sink(e.to_string()))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", serde_json::to_string(record)?)?;
        Ok(())
    }
}

/// Discards everything. For tests and dry runs.
pub struct NullSink;

impl ArtifactSink for NullSink {
    fn emit(&self, _record: &ArtifactRecord) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_jsonl_sink_appends_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("artifacts.jsonl");
        let sink = JsonlSink::new(&path).unwrap();

        sink.emit(&ArtifactRecord::new(1, "blog_post", json!({"title": "a"})))
            .unwrap();
        sink.emit(&ArtifactRecord::new(2, "cold_email", json!("raw text")))
            .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["task_id"], 1);
        assert_eq!(first["category_key"], "blog_post");
        assert_eq!(first["payload"]["title"], "a");

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["payload"], "raw text");
    }

    #[test]
    fn test_jsonl_sink_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("dir").join("a.jsonl");
        let sink = JsonlSink::new(&path).unwrap();
        sink.emit(&ArtifactRecord::new(1, "x", json!(null))).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_null_sink_accepts_anything() {
        let sink = NullSink;
        assert!(sink.emit(&ArtifactRecord::new(1, "x", json!({}))).is_ok());
    }

    #[test]
    fn test_concurrent_emits_keep_lines_whole() {
        use std::sync::Arc;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("artifacts.jsonl");
        let sink = Arc::new(JsonlSink::new(&path).unwrap());

        let mut handles = Vec::new();
        for t in 0..4u64 {
            let sink = Arc::clone(&sink);
            handles.push(std::thread::spawn(move || {
                for i in 0..25u64 {
                    sink.emit(&ArtifactRecord::new(t * 25 + i, "blog_post", json!({"n": i})))
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let content = fs::read_to_string(&path).unwrap();
        let mut parsed = 0;
        for line in content.lines() {
            let _: serde_json::Value = serde_json::from_str(line).unwrap();
            parsed += 1;
        }
        assert_eq!(parsed, 100);
    }
}
