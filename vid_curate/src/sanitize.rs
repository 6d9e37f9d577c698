//! Name sanitization
//!
//! Strips `#hashtag` tokens and characters that are invalid on common
//! filesystems, then trims surrounding whitespace.

use crate::events::{CurationEvent, ReportSink};
use regex::Regex;
use serde::Serialize;
use shared_utils::batch::require_directory;
use shared_utils::errors::{CurateError, Result};
use shared_utils::safety::check_safe_for_destructive;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info};
use walkdir::WalkDir;

static HASHTAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*#\S+").expect("Invalid hashtag regex"));
static INVALID_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*!]"#).expect("Invalid character regex"));

pub fn sanitize_name(name: &str) -> String {
    let without_tags = HASHTAG.replace_all(name, "");
    INVALID_CHARS
        .replace_all(&without_tags, "")
        .trim()
        .to_string()
}

/// Sanitize the stem of a file name and keep its extension.
///
/// Returns `None` when nothing would be left of the stem.
pub fn sanitize_file_name(file_name: &str) -> Option<String> {
    let path = Path::new(file_name);
    let (stem, ext) = match (path.file_stem(), path.extension()) {
        (Some(stem), Some(ext)) => (stem.to_string_lossy(), Some(ext.to_string_lossy())),
        _ => (file_name.into(), None),
    };

    let clean = sanitize_name(&stem);
    if clean.is_empty() {
        return None;
    }
    Some(match ext {
        Some(ext) => format!("{}.{}", clean, ext),
        None => clean,
    })
}

/// Sanitized form of a directory or file name, if it would change.
pub fn suggested_name(name: &str, is_dir: bool) -> Option<String> {
    let clean = if is_dir {
        Some(sanitize_name(name)).filter(|n| !n.is_empty())
    } else {
        sanitize_file_name(name)
    };
    clean.filter(|n| n != name)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RenameSummary {
    pub renamed: usize,
    /// Target name already taken
    pub conflicts: usize,
    /// Nothing would be left after sanitizing, or the name is not valid UTF-8
    pub skipped: usize,
    pub failed: usize,
    pub errors: Vec<(PathBuf, String)>,
}

/// Sanitize every file and directory name under `root`, children before parents.
///
/// `root` itself is never renamed.
pub fn rename_recursively(root: &Path, dry_run: bool, sink: &mut dyn ReportSink) -> Result<RenameSummary> {
    require_directory(root)?;
    if !dry_run {
        check_safe_for_destructive(root, "rename entries in")?;
    }

    // snapshot first so renames never disturb the walk
    let entries: Vec<(PathBuf, bool)> = WalkDir::new(root)
        .min_depth(1)
        .contents_first(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| (e.path().to_path_buf(), e.file_type().is_dir()))
        .collect();

    let mut summary = RenameSummary::default();

    for (path, is_dir) in entries {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            summary.skipped += 1;
            continue;
        };
        let Some(new_name) = suggested_name(name, is_dir) else {
            let emptied = if is_dir {
                sanitize_name(name).is_empty()
            } else {
                sanitize_file_name(name).is_none()
            };
            if emptied {
                summary.skipped += 1;
            }
            continue;
        };

        let target = path.with_file_name(&new_name);
        if target.exists() {
            debug!(from = %path.display(), to = %target.display(), "Sanitized name already taken");
            summary.conflicts += 1;
            continue;
        }

        if dry_run {
            summary.renamed += 1;
            sink.emit(CurationEvent::Renamed {
                from: path,
                to: target,
                dry_run: true,
            });
            continue;
        }

        match std::fs::rename(&path, &target) {
            Ok(()) => {
                summary.renamed += 1;
                sink.emit(CurationEvent::Renamed {
                    from: path,
                    to: target,
                    dry_run: false,
                });
            }
            Err(e) => {
                let err = CurateError::filesystem("rename", &path, e).to_string();
                summary.failed += 1;
                summary.errors.push((path.clone(), err.clone()));
                sink.emit(CurationEvent::RenameFailed { path, error: err });
            }
        }
    }

    info!(
        root = %root.display(),
        renamed = summary.renamed,
        conflicts = summary.conflicts,
        failed = summary.failed,
        "Sanitize finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingSink;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("Funny cat #cats #viral"), "Funny cat");
        assert_eq!(sanitize_name("What?! A: \"movie\" <1/2>"), "What A movie 12");
        assert_eq!(sanitize_name("  spaced  "), "spaced");
        assert_eq!(sanitize_name("a|b\\c*d"), "abcd");
        assert_eq!(sanitize_name("#onlytag"), "");
        assert_eq!(sanitize_name("clean name"), "clean name");
    }

    #[test]
    fn test_sanitize_file_name_keeps_extension() {
        assert_eq!(
            sanitize_file_name("clip #fyp.mp4").as_deref(),
            Some("clip.mp4")
        );
        assert_eq!(sanitize_file_name("a.b?.mkv").as_deref(), Some("a.b.mkv"));
        assert_eq!(sanitize_file_name("#tag.mp4"), None);
        assert_eq!(sanitize_file_name("noext!").as_deref(), Some("noext"));
    }

    #[test]
    fn test_suggested_name() {
        assert_eq!(suggested_name("clean.mp4", false), None);
        assert_eq!(suggested_name("dir #x", true).as_deref(), Some("dir"));
        // a hashtag in a directory name applies to the whole name
        assert_eq!(suggested_name("v1.0 #x", true).as_deref(), Some("v1.0"));
    }

    #[test]
    fn test_rename_recursively_bottom_up() {
        let dir = TempDir::new().unwrap();
        let pkg = dir.path().join("Show #series");
        fs::create_dir_all(pkg.join("Season? 1")).unwrap();
        fs::write(pkg.join("Season? 1/ep1 #new.mp4"), b"x").unwrap();
        fs::write(pkg.join("poster!.jpg"), b"x").unwrap();
        fs::write(dir.path().join("ok.mp4"), b"x").unwrap();

        let mut sink = CollectingSink::new();
        let summary = rename_recursively(dir.path(), false, &mut sink).unwrap();

        assert_eq!(summary.renamed, 4);
        assert_eq!(summary.failed, 0);
        assert!(dir.path().join("Show/Season 1/ep1.mp4").exists());
        assert!(dir.path().join("Show/poster.jpg").exists());
        assert!(dir.path().join("ok.mp4").exists());
    }

    #[test]
    fn test_rename_skips_conflicts_and_empty_names() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("movie.mp4"), b"keep").unwrap();
        fs::write(dir.path().join("movie #dup.mp4"), b"other").unwrap();
        fs::write(dir.path().join("#only.mp4"), b"x").unwrap();

        let summary = rename_recursively(dir.path(), false, &mut CollectingSink::new()).unwrap();

        assert_eq!(summary.renamed, 0);
        assert_eq!(summary.conflicts, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(fs::read(dir.path().join("movie.mp4")).unwrap(), b"keep");
        assert!(dir.path().join("movie #dup.mp4").exists());
        assert!(dir.path().join("#only.mp4").exists());
    }

    #[test]
    fn test_dry_run_changes_nothing() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a #b.mp4"), b"x").unwrap();

        let mut sink = CollectingSink::new();
        let summary = rename_recursively(dir.path(), true, &mut sink).unwrap();

        assert_eq!(summary.renamed, 1);
        assert!(dir.path().join("a #b.mp4").exists());
        assert!(matches!(
            sink.events[0],
            CurationEvent::Renamed { dry_run: true, .. }
        ));
    }
}
