//! Logging setup.
//!
//! Console and daily-rolling file output through `tracing_subscriber`, with
//! timestamps in the server's local timezone and a retention sweep for old
//! log files.

use std::path::Path;

use chrono::{Local, Utc};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::utils::fs;

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "courtside=info,tower_http=info";

/// Log retention period in days.
pub const LOG_RETENTION_DAYS: i64 = 7;

/// Prefix of the rolling log file names (`courtside.log.YYYY-MM-DD`).
const LOG_FILE_PREFIX: &str = "courtside.log";

/// Timer that formats timestamps in the local timezone.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Initialize logging.
///
/// `RUST_LOG` overrides [`DEFAULT_LOG_FILTER`]. The returned guard flushes the
/// file writer on drop and must be kept alive for the lifetime of the process.
pub fn init_logging(log_dir: &Path) -> crate::Result<WorkerGuard> {
    fs::ensure_dir_all_sync_with_op("creating log directory", log_dir)?;

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(true).with_timer(LocalTimer))
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_timer(LocalTimer),
        )
        .try_init()
        .map_err(|e| {
            crate::Error::Other(format!("Failed to set global default subscriber: {}", e))
        })?;

    Ok(guard)
}

/// Delete rolled log files older than `retention_days`.
///
/// Returns the number of files removed.
pub async fn cleanup_old_logs(log_dir: &Path, retention_days: i64) -> std::io::Result<usize> {
    let cutoff = (Utc::now() - chrono::Duration::days(retention_days)).date_naive();
    let prefix = format!("{LOG_FILE_PREFIX}.");

    let mut entries = tokio::fs::read_dir(log_dir).await?;
    let mut deleted_count = 0;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }

        let Some(date_str) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix(&prefix))
        else {
            continue;
        };

        let Ok(file_date) = chrono::NaiveDate::parse_from_str(date_str, "%Y-%m-%d") else {
            continue;
        };

        if file_date < cutoff {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    deleted_count += 1;
                    debug!(path = %path.display(), "Deleted old log file");
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to delete old log file"),
            }
        }
    }

    if deleted_count > 0 {
        info!(count = deleted_count, "Cleaned up old log files");
    }

    Ok(deleted_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_filter() {
        assert!(DEFAULT_LOG_FILTER.contains("courtside=info"));
    }

    #[tokio::test]
    async fn test_cleanup_removes_only_expired_logs() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();

        let old = dir.join("courtside.log.2001-01-01");
        let today = dir.join(format!(
            "courtside.log.{}",
            Utc::now().date_naive().format("%Y-%m-%d")
        ));
        let unrelated = dir.join("notes.txt");
        for path in [&old, &today, &unrelated] {
            std::fs::write(path, b"x").unwrap();
        }

        let removed = cleanup_old_logs(dir, LOG_RETENTION_DAYS).await.unwrap();

        assert_eq!(removed, 1);
        assert!(!old.exists());
        assert!(today.exists());
        assert!(unrelated.exists());
    }
}
