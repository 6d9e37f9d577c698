//! Incomplete download cleanup

use crate::events::{CurationEvent, ReportSink};
use shared_utils::batch::{is_part_file, require_directory, BatchResult};
use shared_utils::errors::{CurateError, Result};
use shared_utils::safety::check_safe_for_destructive;
use std::path::{Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;

/// Every `*.part` file under `root`, sorted.
pub fn find_part_files(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_part_file(e.path()))
        .map(|e| e.path().to_path_buf())
        .collect()
}

pub fn remove_part_files(root: &Path, dry_run: bool, sink: &mut dyn ReportSink) -> Result<BatchResult> {
    require_directory(root)?;
    if !dry_run {
        check_safe_for_destructive(root, "delete partial downloads in")?;
    }

    let mut result = BatchResult::new();
    for path in find_part_files(root) {
        let bytes = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);

        if dry_run {
            result.success();
            sink.emit(CurationEvent::FileRemoved { path, bytes, dry_run: true });
            continue;
        }

        match std::fs::remove_file(&path) {
            Ok(()) => {
                result.success();
                sink.emit(CurationEvent::FileRemoved { path, bytes, dry_run: false });
            }
            Err(e) => {
                let error = CurateError::filesystem("remove", &path, e).to_string();
                result.fail(path.clone(), error.clone());
                sink.emit(CurationEvent::RemovalFailed { path, error });
            }
        }
    }

    info!(
        root = %root.display(),
        removed = result.succeeded,
        failed = result.failed,
        "Partial download cleanup finished"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingSink;
    use std::fs;
    use tempfile::TempDir;

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("pkg/sub")).unwrap();
        fs::write(dir.path().join("pkg/movie.mp4"), b"done").unwrap();
        fs::write(dir.path().join("pkg/movie.mp4.part"), b"half").unwrap();
        fs::write(dir.path().join("pkg/sub/extra.PART"), b"half").unwrap();
        dir
    }

    #[test]
    fn test_remove_part_files() {
        let dir = fixture();
        let mut sink = CollectingSink::new();
        let result = remove_part_files(dir.path(), false, &mut sink).unwrap();

        assert_eq!(result.succeeded, 2);
        assert_eq!(result.failed, 0);
        assert!(!dir.path().join("pkg/movie.mp4.part").exists());
        assert!(!dir.path().join("pkg/sub/extra.PART").exists());
        assert!(dir.path().join("pkg/movie.mp4").exists());
        assert_eq!(sink.events.len(), 2);
    }

    #[test]
    fn test_dry_run_keeps_files() {
        let dir = fixture();
        let result = remove_part_files(dir.path(), true, &mut CollectingSink::new()).unwrap();
        assert_eq!(result.succeeded, 2);
        assert!(dir.path().join("pkg/movie.mp4.part").exists());
    }

    #[test]
    fn test_missing_root() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            remove_part_files(&dir.path().join("gone"), false, &mut CollectingSink::new()),
            Err(CurateError::DirectoryNotFound(_))
        ));
    }
}
