//! Batch Processing Module
//!
//! Directory walking with the video-extension allow-list, and per-batch
//! success/failure counters.

use crate::errors::CurateError;
use serde::Serialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extensions considered video files unless configuration says otherwise.
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "avi", "mkv", "mov", "wmv", "flv", "webm", "m4v", "mpg", "mpeg", "3gp", "ogv", "ts",
    "mts", "m2ts", "vob",
];

/// Extension of an incomplete download.
pub const PART_EXTENSION: &str = "part";

pub fn default_video_extensions() -> Vec<String> {
    VIDEO_EXTENSIONS.iter().map(|e| e.to_string()).collect()
}

pub fn has_extension<S: AsRef<str>>(path: &Path, extensions: &[S]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_lowercase();
            extensions.iter().any(|allowed| allowed.as_ref().eq_ignore_ascii_case(&e))
        })
        .unwrap_or(false)
}

pub fn is_part_file(path: &Path) -> bool {
    has_extension(path, &[PART_EXTENSION])
}

/// `.part` never counts as video, even if someone puts it in the allow-list.
pub fn is_video_file<S: AsRef<str>>(path: &Path, extensions: &[S]) -> bool {
    !is_part_file(path) && has_extension(path, extensions)
}

/// Files under `dir` matching `extensions`, in file-name order.
pub fn collect_files<S: AsRef<str>>(dir: &Path, extensions: &[S], recursive: bool) -> Vec<PathBuf> {
    let walker = if recursive {
        WalkDir::new(dir).follow_links(false)
    } else {
        WalkDir::new(dir).max_depth(1)
    };

    walker
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| has_extension(e.path(), extensions))
        .map(|e| e.path().to_path_buf())
        .collect()
}

pub fn collect_videos<S: AsRef<str>>(dir: &Path, extensions: &[S], recursive: bool) -> Vec<PathBuf> {
    collect_files(dir, extensions, recursive)
        .into_iter()
        .filter(|p| !is_part_file(p))
        .collect()
}

/// One sorted snapshot of the video files directly inside `dir`.
pub fn list_video_files<S: AsRef<str>>(dir: &Path, extensions: &[S]) -> Result<Vec<PathBuf>, CurateError> {
    let entries =
        std::fs::read_dir(dir).map_err(|e| CurateError::filesystem("read_dir", dir, e))?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|e| e.path())
        .filter(|p| is_video_file(p, extensions))
        .collect();
    files.sort();
    Ok(files)
}

/// `root` itself plus every directory below it, parents before children.
pub fn walk_directories(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .map(|e| e.path().to_path_buf())
        .collect()
}

pub fn immediate_subdirectories(root: &Path) -> Result<Vec<PathBuf>, CurateError> {
    let entries =
        std::fs::read_dir(root).map_err(|e| CurateError::filesystem("read_dir", root, e))?;

    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|e| e.path())
        .collect();
    dirs.sort();
    Ok(dirs)
}

pub fn require_directory(dir: &Path) -> Result<(), CurateError> {
    if dir.is_dir() {
        Ok(())
    } else {
        Err(CurateError::DirectoryNotFound(dir.to_path_buf()))
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchResult {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: Vec<(PathBuf, String)>,
}

impl BatchResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn success(&mut self) {
        self.total += 1;
        self.succeeded += 1;
    }

    pub fn fail(&mut self, path: PathBuf, error: String) {
        self.total += 1;
        self.failed += 1;
        self.errors.push((path, error));
    }

    pub fn skip(&mut self) {
        self.total += 1;
        self.skipped += 1;
    }

    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.succeeded as f64 / self.total as f64) * 100.0
        }
    }
}
