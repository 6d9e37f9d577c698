//! Collection relocation
//!
//! Copies or moves every video under a source tree into a destination tree,
//! keeping relative paths. Non-video files and partial downloads stay behind.

use serde::Serialize;
use shared_utils::batch::{is_part_file, is_video_file, require_directory};
use shared_utils::errors::{CurateError, Result};
use shared_utils::file_ops::{copy_file, move_file, remove_empty_dirs, verify_output_integrity};
use shared_utils::safety::check_safe_for_destructive;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferMode {
    Copy,
    Move,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferSummary {
    pub mode: TransferMode,
    pub transferred: usize,
    pub bytes: u64,
    pub skipped_parts: usize,
    pub skipped_other: usize,
    pub failed: usize,
    pub errors: Vec<(PathBuf, String)>,
    /// Source directories pruned after a move
    pub removed_dirs: Vec<PathBuf>,
}

impl TransferSummary {
    fn new(mode: TransferMode) -> Self {
        Self {
            mode,
            transferred: 0,
            bytes: 0,
            skipped_parts: 0,
            skipped_other: 0,
            failed: 0,
            errors: Vec::new(),
            removed_dirs: Vec::new(),
        }
    }

    pub fn skipped(&self) -> usize {
        self.skipped_parts + self.skipped_other
    }
}

pub fn copy_all_contents(src: &Path, dst: &Path, extensions: &[String]) -> Result<TransferSummary> {
    transfer(src, dst, extensions, TransferMode::Copy)
}

/// Move videos, then remove source directories left completely empty.
pub fn move_all_contents(src: &Path, dst: &Path, extensions: &[String]) -> Result<TransferSummary> {
    check_safe_for_destructive(src, "move videos out of")?;
    transfer(src, dst, extensions, TransferMode::Move)
}

fn transfer(src: &Path, dst: &Path, extensions: &[String], mode: TransferMode) -> Result<TransferSummary> {
    require_directory(src)?;
    if !dst.exists() {
        std::fs::create_dir_all(dst).map_err(|e| CurateError::filesystem("create_dir", dst, e))?;
        info!(dst = %dst.display(), "Created destination directory");
    }

    let src = src
        .canonicalize()
        .map_err(|e| CurateError::filesystem("canonicalize", src, e))?;
    let dst = dst
        .canonicalize()
        .map_err(|e| CurateError::filesystem("canonicalize", dst, e))?;

    // a destination nested inside the source is never walked
    let files: Vec<PathBuf> = WalkDir::new(&src)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !e.path().starts_with(&dst))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
        .collect();

    let mut summary = TransferSummary::new(mode);

    for file in files {
        if !is_video_file(&file, extensions) {
            if is_part_file(&file) {
                debug!(path = %file.display(), "Skipping partial download");
                summary.skipped_parts += 1;
            } else {
                debug!(path = %file.display(), "Skipping non-video file");
                summary.skipped_other += 1;
            }
            continue;
        }

        let Ok(relative) = file.strip_prefix(&src) else {
            continue;
        };
        let target = dst.join(relative);

        match transfer_file(&file, &target, mode) {
            Ok(bytes) => {
                summary.transferred += 1;
                summary.bytes += bytes;
                info!(from = %file.display(), to = %target.display(), ?mode, "Transferred");
            }
            Err(e) => {
                warn!(path = %file.display(), error = %e, "Transfer failed");
                summary.failed += 1;
                summary.errors.push((file, e.to_string()));
            }
        }
    }

    if mode == TransferMode::Move {
        summary.removed_dirs = remove_empty_dirs(&src);
    }

    info!(
        src = %src.display(),
        dst = %dst.display(),
        transferred = summary.transferred,
        skipped = summary.skipped(),
        failed = summary.failed,
        "Transfer finished"
    );
    Ok(summary)
}

fn transfer_file(file: &Path, target: &Path, mode: TransferMode) -> Result<u64> {
    if target.exists() {
        return Err(CurateError::filesystem(
            "transfer",
            target,
            std::io::Error::new(std::io::ErrorKind::AlreadyExists, "destination already exists"),
        ));
    }

    let expected = std::fs::metadata(file)
        .map_err(|e| CurateError::filesystem("stat", file, e))?
        .len();

    match mode {
        TransferMode::Copy => {
            copy_file(file, target)?;
        }
        TransferMode::Move => move_file(file, target)?,
    }

    if expected == 0 {
        return Ok(0);
    }
    let written = verify_output_integrity(target)?;
    if written != expected {
        return Err(CurateError::filesystem(
            "verify",
            target,
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("expected {} bytes, found {}", expected, written),
            ),
        ));
    }
    Ok(written)
}
