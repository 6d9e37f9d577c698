//! File operations shared by the re-encode, dedupe and relocation commands
//!
//! - output integrity check before anything replaces an original
//! - same-volume rename with a copy+delete fallback across volumes
//! - modification-time carry-over via `filetime`
//! - pruning of directories left empty by a move

use crate::errors::CurateError;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Filesystem primitives behind the destructive commands, so tests can inject failures.
pub trait FileOps {
    fn exists(&self, path: &Path) -> bool;
    fn size(&self, path: &Path) -> io::Result<u64>;
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
    fn remove(&self, path: &Path) -> io::Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StdFileOps;

impl FileOps for StdFileOps {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn size(&self, path: &Path) -> io::Result<u64> {
        fs::metadata(path).map(|m| m.len())
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}

/// Confirm `path` exists and is non-empty; returns its size.
pub fn verify_output_integrity(path: &Path) -> Result<u64, CurateError> {
    let metadata = fs::metadata(path).map_err(|e| CurateError::filesystem("verify", path, e))?;
    if !metadata.is_file() || metadata.len() == 0 {
        return Err(CurateError::filesystem(
            "verify",
            path,
            std::io::Error::new(std::io::ErrorKind::InvalidData, "output is empty or not a file"),
        ));
    }
    Ok(metadata.len())
}

/// Copy `src` to `dst`, creating `dst`'s parent directories.
pub fn copy_file(src: &Path, dst: &Path) -> Result<u64, CurateError> {
    ensure_parent(dst)?;
    let bytes = fs::copy(src, dst).map_err(|e| CurateError::filesystem("copy", src, e))?;
    preserve_mtime(src, dst);
    Ok(bytes)
}

/// Rename `src` to `dst`; across volumes fall back to copy then delete.
pub fn move_file(src: &Path, dst: &Path) -> Result<(), CurateError> {
    ensure_parent(dst)?;
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) => {
            debug!(src = %src.display(), dst = %dst.display(), error = %e, "rename failed, copying instead");
            copy_file(src, dst)?;
            fs::remove_file(src).map_err(|e| CurateError::filesystem("remove", src, e))
        }
    }
}

fn ensure_parent(path: &Path) -> Result<(), CurateError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)
                .map_err(|e| CurateError::filesystem("create_dir", parent, e))?;
        }
    }
    Ok(())
}

/// Copy `src`'s access/modification times onto `dst`. Failure is only a warning.
pub fn preserve_mtime(src: &Path, dst: &Path) -> bool {
    let Ok(m) = fs::metadata(src) else {
        return false;
    };
    let atime = filetime::FileTime::from_last_access_time(&m);
    let mtime = filetime::FileTime::from_last_modification_time(&m);
    apply_times(dst, atime, mtime)
}

/// Capture a file's modification time so it can be re-applied after the file is replaced.
pub fn capture_mtime(path: &Path) -> Option<filetime::FileTime> {
    fs::metadata(path)
        .ok()
        .map(|m| filetime::FileTime::from_last_modification_time(&m))
}

pub fn apply_times(dst: &Path, atime: filetime::FileTime, mtime: filetime::FileTime) -> bool {
    match filetime::set_file_times(dst, atime, mtime) {
        Ok(()) => true,
        Err(e) => {
            warn!(path = %dst.display(), error = %e, "Failed to set file times");
            false
        }
    }
}

/// Remove every directory under `root` (not `root` itself) that holds nothing, deepest first.
pub fn remove_empty_dirs(root: &Path) -> Vec<PathBuf> {
    let mut removed = Vec::new();
    let dirs: Vec<PathBuf> = WalkDir::new(root)
        .min_depth(1)
        .contents_first(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .map(|e| e.path().to_path_buf())
        .collect();

    for dir in dirs {
        let is_empty = fs::read_dir(&dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if is_empty {
            match fs::remove_dir(&dir) {
                Ok(()) => removed.push(dir),
                Err(e) => warn!(path = %dir.display(), error = %e, "Failed to remove empty directory"),
            }
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    #[test]
    fn test_verify_output_integrity() {
        let dir = TempDir::new().unwrap();
        let full = dir.path().join("full.mp4");
        let empty = dir.path().join("empty.mp4");
        fs::write(&full, b"data").unwrap();
        fs::write(&empty, b"").unwrap();

        assert_eq!(verify_output_integrity(&full).unwrap(), 4);
        assert!(verify_output_integrity(&empty).is_err());
        assert!(verify_output_integrity(&dir.path().join("missing.mp4")).is_err());
        assert!(verify_output_integrity(dir.path()).is_err());
    }

    #[test]
    fn test_move_file_creates_parents() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.mp4");
        let dst = dir.path().join("x/y/a.mp4");
        fs::write(&src, b"video").unwrap();

        move_file(&src, &dst).unwrap();
        assert!(!src.exists());
        assert_eq!(fs::read(&dst).unwrap(), b"video");
    }

    #[test]
    fn test_copy_file_keeps_source_and_mtime() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.mp4");
        let dst = dir.path().join("out/a.mp4");
        fs::write(&src, b"video").unwrap();
        let old = filetime::FileTime::from_system_time(SystemTime::now() - Duration::from_secs(86_400));
        filetime::set_file_mtime(&src, old).unwrap();

        copy_file(&src, &dst).unwrap();
        assert!(src.exists());
        let copied = filetime::FileTime::from_last_modification_time(&fs::metadata(&dst).unwrap());
        assert_eq!(copied.unix_seconds(), old.unix_seconds());
    }

    #[test]
    fn test_preserve_mtime_missing_source() {
        let dir = TempDir::new().unwrap();
        let dst = dir.path().join("b.mp4");
        fs::write(&dst, b"x").unwrap();
        assert!(!preserve_mtime(&dir.path().join("nope"), &dst));
    }

    #[test]
    fn test_remove_empty_dirs() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("a/b/c")).unwrap();
        fs::create_dir_all(dir.path().join("keep")).unwrap();
        fs::write(dir.path().join("keep/file.txt"), b"x").unwrap();

        let removed = remove_empty_dirs(dir.path());
        assert_eq!(removed.len(), 3);
        assert!(!dir.path().join("a").exists());
        assert!(dir.path().join("keep/file.txt").exists());
        assert!(dir.path().exists());
    }
}
