//! Retention for per-run audit logs and rolled process logs.
//!
//! Files ending in `.log` (or rolled variants such as `taskrelay.log.2024-01-01`)
//! older than the retention period are deleted.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use std::path::Path;
use tracing::{debug, info, warn};

/// Deletes log files past their retention period.
#[derive(Debug, Clone, Copy)]
pub struct LogRetention {
    retention_days: u32,
}

impl LogRetention {
    pub const fn new(retention_days: u32) -> Self {
        Self { retention_days }
    }

    fn is_log_file(path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(".log") || name.contains(".log."))
    }

    /// Delete expired log files in `log_dir`, returning how many were removed.
    ///
    /// A missing directory is not an error.
    pub async fn cleanup_old_logs(&self, log_dir: impl AsRef<Path>) -> Result<usize> {
        let log_dir = log_dir.as_ref();

        if !log_dir.exists() {
            debug!(path = %log_dir.display(), "log directory does not exist");
            return Ok(0);
        }

        let cutoff = Utc::now() - Duration::days(i64::from(self.retention_days));
        let mut deleted_count = 0;

        let mut entries = tokio::fs::read_dir(log_dir)
            .await
            .context("failed to read log directory")?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .context("failed to read directory entry")?
        {
            let path = entry.path();
            if !Self::is_log_file(&path) {
                continue;
            }

            let modified: DateTime<Utc> = entry
                .metadata()
                .await
                .and_then(|m| m.modified())
                .context("failed to get file modification time")?
                .into();

            if modified < cutoff {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => {
                        debug!(path = %path.display(), age_days = (Utc::now() - modified).num_days(), "deleted old log file");
                        deleted_count += 1;
                    }
                    Err(e) => warn!(path = %path.display(), error = %e, "failed to delete old log file"),
                }
            }
        }

        if deleted_count > 0 {
            info!(count = deleted_count, dir = %log_dir.display(), "cleaned up old log files");
        }

        Ok(deleted_count)
    }

    /// Run cleanup for every directory in `dirs` once per `interval`, forever.
    pub async fn run_periodic_cleanup(&self, dirs: Vec<std::path::PathBuf>, interval: std::time::Duration) {
        let mut interval_timer = tokio::time::interval(interval);

        loop {
            interval_timer.tick().await;
            for dir in &dirs {
                if let Err(e) = self.cleanup_old_logs(dir).await {
                    warn!(error = %e, dir = %dir.display(), "failed to run periodic cleanup");
                }
            }
        }
    }
}
