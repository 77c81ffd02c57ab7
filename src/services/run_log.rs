//! Append-only per-run audit log.
//!
//! Every line the agent writes is appended verbatim, in the order received.
//! Lifecycle records (launch, signal, exit, reconciliation) are interleaved as
//! single JSON lines tagged with `"taskrelay_event"`.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::domain::errors::{DomainError, DomainResult};

/// Which agent stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Handle to one run's log file. Cheap to clone.
#[derive(Debug, Clone)]
pub struct RunLog {
    path: PathBuf,
    file: Arc<Mutex<File>>,
}

/// Deterministic file name for a run: `{task_id}-{YYYYMMDDTHHMMSSZ}.log`.
pub fn log_file_name(task_id: &str, started_at: DateTime<Utc>) -> String {
    let safe_id: String = task_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{safe_id}-{}.log", started_at.format("%Y%m%dT%H%M%SZ"))
}

impl RunLog {
    /// Create (or append to) the log for a run, creating `dir` if needed.
    pub fn create(dir: &Path, task_id: &str, started_at: DateTime<Utc>) -> DomainResult<Self> {
        std::fs::create_dir_all(dir).map_err(|e| {
            DomainError::Io(format!("failed to create run log directory {}: {e}", dir.display()))
        })?;

        let path = dir.join(log_file_name(task_id, started_at));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| DomainError::Io(format!("failed to open run log {}: {e}", path.display())))?;

        Ok(Self {
            path,
            file: Arc::new(Mutex::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line(&self, line: &str) -> DomainResult<()> {
        let mut file = self
            .file
            .lock()
            .map_err(|e| DomainError::Io(format!("run log mutex poisoned: {e}")))?;
        writeln!(file, "{line}")?;
        file.flush()?;
        Ok(())
    }

    /// Append one agent output line verbatim. Stderr lines get a `[stderr] ` prefix.
    pub fn append_output(&self, stream: OutputStream, line: &str) -> DomainResult<()> {
        match stream {
            OutputStream::Stdout => self.write_line(line),
            OutputStream::Stderr => self.write_line(&format!("[stderr] {line}")),
        }
    }

    /// Append a lifecycle record.
    pub fn record(&self, event: &str, fields: Value) -> DomainResult<()> {
        let mut entry = json!({
            "taskrelay_event": event,
            "timestamp": Utc::now().to_rfc3339(),
        });
        if let (Some(entry), Value::Object(extra)) = (entry.as_object_mut(), fields) {
            entry.extend(extra);
        }
        self.write_line(&entry.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_log_file_name_is_deterministic() {
        let started = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(log_file_name("86abc", started), "86abc-20260304T050607Z.log");
        assert_eq!(log_file_name("a/b c", started), "a_b_c-20260304T050607Z.log");
    }

    #[test]
    fn test_lines_are_appended_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = RunLog::create(dir.path(), "T1", Utc::now()).unwrap();

        log.append_output(OutputStream::Stdout, r#"{"type":"system"}"#).unwrap();
        log.append_output(OutputStream::Stderr, "warning: x").unwrap();
        log.record("exit", json!({"code": 0})).unwrap();

        let contents = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], r#"{"type":"system"}"#);
        assert_eq!(lines[1], "[stderr] warning: x");
        let record: Value = serde_json::from_str(lines[2]).unwrap();
        assert_eq!(record["taskrelay_event"], "exit");
        assert_eq!(record["code"], 0);
    }
}
