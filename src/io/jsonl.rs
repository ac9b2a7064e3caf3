//! Append-only JSONL writer
//!
//! Records are written one JSON object per line. Used for the raw event
//! audit trail and for the file-backed trigger publisher.

use parking_lot::Mutex;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum JsonlError {
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("write to {path} failed: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// JSONL file appender
pub struct JsonlWriter {
    file_path: PathBuf,
    // Serializes appends from concurrent event tasks
    write_lock: Mutex<()>,
}

impl JsonlWriter {
    pub fn new<P: AsRef<Path>>(file_path: P) -> Self {
        let file_path = file_path.as_ref().to_path_buf();
        info!(file_path = %file_path.display(), "jsonl_writer_initialized");
        Self { file_path, write_lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Serialize `record` and append it as one line
    pub fn append<T: Serialize>(&self, record: &T) -> Result<(), JsonlError> {
        let line = serde_json::to_string(record)?;
        self.append_line(&line).map_err(|source| JsonlError::Io {
            path: self.file_path.display().to_string(),
            source,
        })
    }

    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let _guard = self.write_lock.lock();

        // Create parent directories if they don't exist
        if let Some(parent) = self.file_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&self.file_path)?;
        writeln!(file, "{}", line)?;
        debug!(file = %self.file_path.display(), bytes = %line.len(), "jsonl_written");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[derive(Serialize)]
    struct Record {
        id: u32,
        name: &'static str,
    }

    #[test]
    fn test_append_writes_one_line_per_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.jsonl");
        let writer = JsonlWriter::new(&path);

        writer.append(&Record { id: 1, name: "first" }).unwrap();
        writer.append(&Record { id: 2, name: "second" }).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(content.ends_with('\n'));

        let parsed: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed["id"], 2);
        assert_eq!(parsed["name"], "second");
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("nested").join("dir").join("records.jsonl");
        let writer = JsonlWriter::new(&nested);

        writer.append(&Record { id: 7, name: "nested" }).unwrap();
        assert!(nested.exists());
    }

    #[test]
    fn test_append_mode_keeps_existing_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.jsonl");
        fs::write(&path, "{\"existing\":\"data\"}\n").unwrap();

        let writer = JsonlWriter::new(&path);
        writer.append(&Record { id: 3, name: "appended" }).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("existing"));
        assert!(lines[1].contains("appended"));
    }
}
