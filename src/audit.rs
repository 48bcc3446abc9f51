//! Append-only audit log — one JSON object per processed message.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::ProcessError;

/// One audit line. Written before any reply or notification is attempted.
#[derive(Debug, Serialize)]
pub struct AuditRecord<'a> {
    pub timestamp: DateTime<Utc>,
    pub from: &'a str,
    pub subject: &'a str,
    pub body: &'a str,
}

/// Append-only JSON-lines log. Never rewritten or truncated by the watcher.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Append one record as a newline-terminated JSON object.
    ///
    /// Opens the file per append so an externally rotated log is picked up
    /// on the next write.
    pub fn append(&self, record: &AuditRecord) -> Result<(), ProcessError> {
        let line = serde_json::to_string(record)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record<'a>(from: &'a str, subject: &'a str, body: &'a str) -> AuditRecord<'a> {
        AuditRecord {
            timestamp: Utc::now(),
            from,
            subject,
            body,
        }
    }

    #[test]
    fn appends_valid_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("tasks.log"));

        log.append(&record("Alice <a@x.com>", "Hi", "hello")).unwrap();
        log.append(&record("Alice <a@x.com>", "Hi", "hello")).unwrap();

        let contents = std::fs::read_to_string(dir.path().join("tasks.log")).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let v: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(v.get("timestamp").is_some());
            assert_eq!(v["from"], "Alice <a@x.com>");
            assert_eq!(v["subject"], "Hi");
            assert_eq!(v["body"], "hello");
        }
    }

    #[test]
    fn timestamp_serializes_as_iso8601() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("tasks.log"));
        log.append(&record("a@x.com", "s", "b")).unwrap();

        let contents = std::fs::read_to_string(dir.path().join("tasks.log")).unwrap();
        let v: serde_json::Value = serde_json::from_str(contents.trim()).unwrap();
        let ts = v["timestamp"].as_str().unwrap();
        assert!(ts.parse::<DateTime<Utc>>().is_ok());
    }

    #[test]
    fn existing_log_is_never_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.log");
        std::fs::write(&path, "{\"old\":true}\n").unwrap();

        let log = AuditLog::new(&path);
        log.append(&record("a@x.com", "s", "b")).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("{\"old\":true}"));
        assert_eq!(contents.lines().count(), 2);
    }
}
