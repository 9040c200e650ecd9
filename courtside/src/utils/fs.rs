//! Filesystem helpers shared across modules.
//!
//! These helpers attach the operation and path to IO errors so a failure in
//! a handler reads as "stat video ..." instead of a bare OS error.

use std::path::Path;

use crate::{Error, Result};

/// Convert an IO error into an application error with operation + path context.
pub fn io_error(op: &'static str, path: &Path, source: std::io::Error) -> Error {
    Error::io_path(op, path, source)
}

/// Ensure a directory exists (synchronous variant) with a custom operation label.
pub fn ensure_dir_all_sync_with_op(op: &'static str, path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| io_error(op, path, e))
}

/// Returns `true` if `path` names an existing regular file.
///
/// Any error (missing file, permission denied, broken symlink) counts as
/// absent; callers treat absence as a normal outcome.
pub async fn is_file(path: &Path) -> bool {
    matches!(tokio::fs::metadata(path).await, Ok(meta) if meta.is_file())
}

/// Size of a file in bytes.
pub async fn file_size(path: &Path) -> Result<u64> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| io_error("reading metadata of", path, e))?;
    Ok(meta.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_is_file_distinguishes_dirs_and_missing() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("a.bin");
        std::fs::write(&file, b"abc").unwrap();

        assert!(is_file(&file).await);
        assert!(!is_file(temp.path()).await);
        assert!(!is_file(&temp.path().join("missing.bin")).await);
    }

    #[tokio::test]
    async fn test_file_size_reports_path_on_error() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("missing.mp4");
        let err = file_size(&missing).await.unwrap_err();
        assert!(err.to_string().contains("missing.mp4"));
    }

    #[test]
    fn test_ensure_dir_all_sync_creates_nested() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("a").join("b");
        ensure_dir_all_sync_with_op("creating", &nested).unwrap();
        assert!(nested.is_dir());
    }
}
