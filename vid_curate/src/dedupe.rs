//! Intra-folder duplicate resolution
//!
//! Each directory is treated as one package: when it holds more than one
//! video, the best one is kept and every other one is removed. Decisions are
//! computed from one listing snapshot and one probe pass; removals run only
//! after the whole folder has been decided.

use crate::descriptor::{probe_all, MetadataProvider, VideoDescriptor};
use crate::events::{CurationEvent, ReportSink};
use crate::quality::{score_descriptor, select_best};
use serde::Serialize;
use shared_utils::batch::{list_video_files, require_directory, walk_directories};
use shared_utils::errors::{CurateError, Result};
use shared_utils::file_ops::{FileOps, StdFileOps};
use shared_utils::safety::check_safe_for_destructive;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Which indices of a folder's descriptor list to keep and remove.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FolderDecision {
    pub keep: Option<usize>,
    pub remove: Vec<usize>,
}

/// Pure decision over an already-probed folder.
///
/// No removals when the selector declines (fewer than two files) or when no
/// file could be probed at all. Otherwise every index except the best is
/// removed, including files whose probe failed.
pub fn decide_removals(descriptors: &[VideoDescriptor]) -> FolderDecision {
    if !descriptors.iter().any(VideoDescriptor::is_ok) {
        return FolderDecision::default();
    }
    let Some(best) = select_best(descriptors) else {
        return FolderDecision::default();
    };

    FolderDecision {
        keep: Some(best),
        remove: (0..descriptors.len()).filter(|i| *i != best).collect(),
    }
}

#[derive(Debug, Clone)]
pub struct DedupeOptions {
    pub extensions: Vec<String>,
    pub workers: usize,
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct FolderResolution {
    pub directory: PathBuf,
    pub descriptors: Vec<VideoDescriptor>,
    pub decision: FolderDecision,
}

impl FolderResolution {
    pub fn keep_path(&self) -> Option<&Path> {
        self.decision
            .keep
            .map(|i| self.descriptors[i].path.as_path())
    }

    pub fn removals(&self) -> impl Iterator<Item = &VideoDescriptor> {
        self.decision.remove.iter().map(|i| &self.descriptors[*i])
    }
}

/// Probe the videos directly inside `dir` once and decide what to remove.
pub fn resolve_directory<P>(dir: &Path, provider: &P, options: &DedupeOptions) -> Result<FolderResolution>
where
    P: MetadataProvider + ?Sized,
{
    let files = list_video_files(dir, &options.extensions)?;
    if files.len() < 2 {
        return Ok(FolderResolution {
            directory: dir.to_path_buf(),
            descriptors: Vec::new(),
            decision: FolderDecision::default(),
        });
    }

    let descriptors = probe_all(provider, &files, options.workers);
    let decision = decide_removals(&descriptors);
    debug!(
        dir = %dir.display(),
        files = descriptors.len(),
        keep = ?decision.keep,
        remove = decision.remove.len(),
        "Folder resolved"
    );

    Ok(FolderResolution {
        directory: dir.to_path_buf(),
        descriptors,
        decision,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DedupeSummary {
    pub directories_scanned: usize,
    pub directories_with_duplicates: usize,
    pub files_removed: usize,
    pub removal_failures: usize,
    pub probe_failures: usize,
    pub bytes_freed: u64,
}

/// Resolve every directory under `root` (root included) and delete the losers.
pub fn remove_duplicates<P>(
    root: &Path,
    provider: &P,
    options: &DedupeOptions,
    sink: &mut dyn ReportSink,
) -> Result<DedupeSummary>
where
    P: MetadataProvider + ?Sized,
{
    remove_duplicates_with(root, provider, &StdFileOps, options, sink)
}

/// [`remove_duplicates`] with deletions going through `fs`.
///
/// A file that cannot be deleted is reported and counted; the batch goes on.
pub fn remove_duplicates_with<P, F>(
    root: &Path,
    provider: &P,
    fs: &F,
    options: &DedupeOptions,
    sink: &mut dyn ReportSink,
) -> Result<DedupeSummary>
where
    P: MetadataProvider + ?Sized,
    F: FileOps + ?Sized,
{
    require_directory(root)?;
    if !options.dry_run {
        check_safe_for_destructive(root, "delete duplicates in")?;
    }

    let mut summary = DedupeSummary::default();

    for dir in walk_directories(root) {
        summary.directories_scanned += 1;

        let resolution = match resolve_directory(&dir, provider, options) {
            Ok(r) => r,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Skipping unreadable directory");
                continue;
            }
        };

        for d in &resolution.descriptors {
            match score_descriptor(d) {
                Some(score) => sink.emit(CurationEvent::ScoreComputed {
                    path: d.path.clone(),
                    score,
                }),
                None => {
                    summary.probe_failures += 1;
                    sink.emit(CurationEvent::ProbeFailed {
                        path: d.path.clone(),
                        reason: d.failure().unwrap_or_default().to_string(),
                    });
                }
            }
        }

        let Some(keep) = resolution.keep_path().map(Path::to_path_buf) else {
            continue;
        };
        if resolution.decision.remove.is_empty() {
            continue;
        }
        summary.directories_with_duplicates += 1;

        for victim in resolution.removals() {
            sink.emit(CurationEvent::DuplicateFound {
                keep: keep.clone(),
                remove: victim.path.clone(),
            });
            execute_removal(fs, victim, options.dry_run, &mut summary, sink);
        }
    }

    info!(
        root = %root.display(),
        removed = summary.files_removed,
        failed = summary.removal_failures,
        "Duplicate removal finished"
    );
    Ok(summary)
}

fn execute_removal<F: FileOps + ?Sized>(
    fs: &F,
    victim: &VideoDescriptor,
    dry_run: bool,
    summary: &mut DedupeSummary,
    sink: &mut dyn ReportSink,
) {
    let bytes = victim
        .metrics()
        .map(|m| m.size_bytes)
        .or_else(|| fs.size(&victim.path).ok())
        .unwrap_or(0);

    if dry_run {
        summary.files_removed += 1;
        summary.bytes_freed += bytes;
        sink.emit(CurationEvent::FileRemoved {
            path: victim.path.clone(),
            bytes,
            dry_run: true,
        });
        return;
    }

    match fs.remove(&victim.path) {
        Ok(()) => {
            summary.files_removed += 1;
            summary.bytes_freed += bytes;
            sink.emit(CurationEvent::FileRemoved {
                path: victim.path.clone(),
                bytes,
                dry_run: false,
            });
        }
        Err(e) => {
            summary.removal_failures += 1;
            let err = CurateError::filesystem("remove", &victim.path, e);
            sink.emit(CurationEvent::RemovalFailed {
                path: victim.path.clone(),
                error: err.to_string(),
            });
        }
    }
}
