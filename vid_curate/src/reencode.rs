//! Transactional re-encoding
//!
//! Order of operations per file:
//! 1. encode to a temporary sibling `<stem>.<target>.<ext>`
//! 2. verify the output exists, is non-empty and strictly smaller
//! 3. move the original aside to `<name>.bak`
//! 4. promote the new file into the original name (restore on failure)
//! 5. drop the aside copy unless backups are kept
//!
//! The original is never removed before the replacement has been verified,
//! and a failure at any step leaves a usable file at the original path.

use crate::codec_decision::{CodecAction, CodecDecision};
use crate::events::{CurationEvent, ReportSink};
use serde::Serialize;
use shared_utils::codecs::{encoder_candidates, normalize_codec, ENCODABLE_CODECS};
use shared_utils::errors::{CurateError, Result};
use shared_utils::ffmpeg_process::{run_with_timeout, ProcessError};
use shared_utils::file_ops::{apply_times, capture_mtime, FileOps};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("no encoder available for {0}")]
    NoEncoder(String),

    #[error("encoder failed: {0}")]
    Failed(String),

    #[error("encoder timed out after {0:?}")]
    Timeout(Duration),

    #[error("could not run encoder: {0}")]
    Process(String),
}

impl From<ProcessError> for EncodeError {
    fn from(e: ProcessError) -> Self {
        match e {
            ProcessError::Timeout { timeout, .. } => EncodeError::Timeout(timeout),
            other => EncodeError::Process(other.to_string()),
        }
    }
}

pub trait EncodeBackend {
    /// Canonical codec name → encoder id, for every codec the backend can produce.
    fn available_encoders(&self) -> std::result::Result<BTreeMap<String, String>, EncodeError>;

    /// Encode `input` into `output`. Must not write to `input`.
    fn encode(
        &self,
        input: &Path,
        output: &Path,
        target_codec: &str,
        preset: &str,
    ) -> std::result::Result<(), EncodeError>;
}

/// Backend driving the `ffmpeg` binary.
pub struct FfmpegBackend {
    timeout: Option<Duration>,
    detect_timeout: Duration,
    encoders: OnceLock<BTreeMap<String, String>>,
}

impl FfmpegBackend {
    /// `timeout` bounds each encode (`None` = unbounded); `detect_timeout`
    /// bounds the one-time `ffmpeg -encoders` query.
    pub fn new(timeout: Option<Duration>, detect_timeout: Duration) -> Self {
        Self {
            timeout,
            detect_timeout,
            encoders: OnceLock::new(),
        }
    }

    fn detect_encoders(&self) -> std::result::Result<BTreeMap<String, String>, EncodeError> {
        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-hide_banner", "-encoders"]);
        let output = run_with_timeout(&mut cmd, Some(self.detect_timeout))?;
        if !output.success() {
            return Err(EncodeError::Failed(output.stderr_tail(3)));
        }
        Ok(map_encoders(&parse_encoder_list(&output.stdout)))
    }

    fn encoder_for(&self, target_codec: &str) -> std::result::Result<String, EncodeError> {
        let encoders = self.available_encoders()?;
        encoders
            .get(&normalize_codec(target_codec))
            .cloned()
            .ok_or_else(|| EncodeError::NoEncoder(target_codec.to_string()))
    }
}

impl EncodeBackend for FfmpegBackend {
    fn available_encoders(&self) -> std::result::Result<BTreeMap<String, String>, EncodeError> {
        if let Some(cached) = self.encoders.get() {
            return Ok(cached.clone());
        }
        let detected = self.detect_encoders()?;
        debug!(encoders = ?detected, "Detected ffmpeg encoders");
        Ok(self.encoders.get_or_init(|| detected).clone())
    }

    fn encode(
        &self,
        input: &Path,
        output: &Path,
        target_codec: &str,
        preset: &str,
    ) -> std::result::Result<(), EncodeError> {
        let encoder = self.encoder_for(target_codec)?;

        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-hide_banner", "-nostdin", "-y", "-i"])
            .arg(input)
            .args(build_encode_args(&encoder, preset))
            .arg(output);

        info!(input = %input.display(), encoder = %encoder, "Encoding");
        let result = run_with_timeout(&mut cmd, self.timeout);

        let failure = match result {
            Ok(out) if out.success() => return Ok(()),
            Ok(out) => EncodeError::Failed(format!(
                "exit code {:?}: {}",
                out.status.code(),
                out.stderr_tail(5)
            )),
            Err(e) => EncodeError::from(e),
        };

        if output.exists() {
            if let Err(e) = std::fs::remove_file(output) {
                warn!(path = %output.display(), error = %e, "Failed to remove partial output");
            }
        }
        Err(failure)
    }
}

/// Encoder names from `ffmpeg -encoders` output (video encoders only).
pub fn parse_encoder_list(stdout: &str) -> HashSet<String> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let flags = parts.next()?;
            let name = parts.next()?;
            (flags.len() == 6 && flags.starts_with('V') && name != "=").then(|| name.to_string())
        })
        .collect()
}

/// Pick the preferred available encoder for each codec that has one.
pub fn map_encoders(present: &HashSet<String>) -> BTreeMap<String, String> {
    ENCODABLE_CODECS
        .iter()
        .filter_map(|codec| {
            encoder_candidates(codec)
                .iter()
                .find(|enc| present.contains(**enc))
                .map(|enc| (codec.to_string(), enc.to_string()))
        })
        .collect()
}

/// ffmpeg arguments after the input for a given encoder.
pub fn build_encode_args(encoder: &str, preset: &str) -> Vec<String> {
    let mut args: Vec<String> = vec!["-c:v".into(), encoder.into()];

    if encoder.contains("nvenc") {
        args.extend(["-preset", "medium", "-cq", "23"].map(String::from));
    } else if encoder == "libx264" || encoder == "libx265" {
        args.extend(["-preset".to_string(), preset.to_string()]);
        args.extend(["-crf", "23"].map(String::from));
    } else if encoder == "libvpx-vp9" {
        args.extend(["-b:v", "0", "-crf", "30"].map(String::from));
    } else {
        args.extend(["-q:v", "3"].map(String::from));
    }

    args.extend(["-c:a", "aac", "-b:a", "128k"].map(String::from));
    args
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    EncodeFailure(String),
    SizeRegression { original_size: u64, new_size: u64 },
    Filesystem(String),
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::EncodeFailure(msg) => write!(f, "encode failed: {}", msg),
            FailureKind::SizeRegression {
                original_size,
                new_size,
            } => write!(
                f,
                "output not smaller ({} >= {} bytes)",
                new_size, original_size
            ),
            FailureKind::Filesystem(msg) => write!(f, "filesystem: {}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReencodeOutcome {
    Succeeded {
        original_size: u64,
        new_size: u64,
        /// Where the original was kept, when backups are enabled
        backup: Option<PathBuf>,
    },
    FailedKeepOriginal(FailureKind),
}

#[derive(Debug, Clone)]
pub struct ReencodeOptions {
    pub target_codec: String,
    pub preset: String,
    pub backup_originals: bool,
    pub preserve_timestamps: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReencodeSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub size_regressions: usize,
    pub bytes_before: u64,
    pub bytes_after: u64,
    pub outcomes: Vec<(PathBuf, ReencodeOutcome)>,
}

impl ReencodeSummary {
    pub fn bytes_saved(&self) -> u64 {
        self.bytes_before.saturating_sub(self.bytes_after)
    }
}

/// Temporary sibling for the encoded output: `movie.avi` → `movie.h265.avi`.
pub fn temp_output_path(original: &Path, target_codec: &str) -> PathBuf {
    let stem = original
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match original.extension() {
        Some(ext) => format!("{}.{}.{}", stem, target_codec, ext.to_string_lossy()),
        None => format!("{}.{}", stem, target_codec),
    };
    original.with_file_name(name)
}

/// Aside copy of the original: `movie.avi` → `movie.avi.bak`.
pub fn backup_path(original: &Path) -> PathBuf {
    let mut name = original
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".bak");
    original.with_file_name(name)
}

pub struct ReencodeOrchestrator<'a, B: EncodeBackend + ?Sized, F: FileOps + ?Sized> {
    backend: &'a B,
    fs: &'a F,
    options: ReencodeOptions,
}

impl<'a, B: EncodeBackend + ?Sized, F: FileOps + ?Sized> ReencodeOrchestrator<'a, B, F> {
    pub fn new(backend: &'a B, fs: &'a F, options: ReencodeOptions) -> Self {
        Self {
            backend,
            fs,
            options,
        }
    }

    /// Check the target codec against the backend. Touches no files.
    pub fn validate_target(&self) -> Result<String> {
        let target = normalize_codec(&self.options.target_codec);
        let encoders =
            self.backend
                .available_encoders()
                .map_err(|e| CurateError::EncodeBackendUnavailable {
                    codec: target.clone(),
                    available: format!("none ({})", e),
                })?;

        encoders
            .get(&target)
            .cloned()
            .ok_or_else(|| CurateError::EncodeBackendUnavailable {
                codec: target.clone(),
                available: if encoders.is_empty() {
                    "none".to_string()
                } else {
                    encoders.keys().cloned().collect::<Vec<_>>().join(", ")
                },
            })
    }

    /// Re-encode every `Reencode` decision, one file at a time.
    ///
    /// Fails only when the target codec is unavailable, before any file is touched.
    pub fn run(&self, decisions: &[CodecDecision], sink: &mut dyn ReportSink) -> Result<ReencodeSummary> {
        let encoder = self.validate_target()?;
        info!(
            target = %self.options.target_codec,
            encoder = %encoder,
            "Target codec available"
        );

        let mut summary = ReencodeSummary::default();
        for decision in decisions.iter().filter(|d| d.action == CodecAction::Reencode) {
            summary.attempted += 1;
            let outcome = self.reencode_file(&decision.path);

            match &outcome {
                ReencodeOutcome::Succeeded {
                    original_size,
                    new_size,
                    ..
                } => {
                    summary.succeeded += 1;
                    summary.bytes_before += original_size;
                    summary.bytes_after += new_size;
                }
                ReencodeOutcome::FailedKeepOriginal(kind) => {
                    summary.failed += 1;
                    if matches!(kind, FailureKind::SizeRegression { .. }) {
                        summary.size_regressions += 1;
                    }
                }
            }

            sink.emit(CurationEvent::ReencodeResult {
                path: decision.path.clone(),
                outcome: outcome.clone(),
            });
            summary.outcomes.push((decision.path.clone(), outcome));
        }

        Ok(summary)
    }

    pub fn reencode_file(&self, original: &Path) -> ReencodeOutcome {
        let target = normalize_codec(&self.options.target_codec);
        let fail = |kind| ReencodeOutcome::FailedKeepOriginal(kind);

        let original_size = match self.fs.size(original) {
            Ok(s) => s,
            Err(e) => return fail(FailureKind::Filesystem(format!("cannot stat original: {}", e))),
        };

        let temp = temp_output_path(original, &target);
        if self.fs.exists(&temp) {
            return fail(FailureKind::Filesystem(format!(
                "temporary path already exists: {}",
                temp.display()
            )));
        }
        let aside = backup_path(original);
        if self.fs.exists(&aside) {
            return fail(FailureKind::Filesystem(format!(
                "backup path already exists: {}",
                aside.display()
            )));
        }

        let mtime = if self.options.preserve_timestamps {
            capture_mtime(original)
        } else {
            None
        };

        if let Err(e) = self
            .backend
            .encode(original, &temp, &target, &self.options.preset)
        {
            self.discard(&temp);
            return fail(FailureKind::EncodeFailure(e.to_string()));
        }

        let new_size = match self.fs.size(&temp) {
            Ok(s) if s > 0 => s,
            Ok(_) => {
                self.discard(&temp);
                return fail(FailureKind::EncodeFailure("encoder produced an empty file".into()));
            }
            Err(e) => {
                return fail(FailureKind::EncodeFailure(format!(
                    "encoder output missing: {}",
                    e
                )))
            }
        };

        if new_size >= original_size {
            self.discard(&temp);
            return fail(FailureKind::SizeRegression {
                original_size,
                new_size,
            });
        }

        if let Err(e) = self.fs.rename(original, &aside) {
            self.discard(&temp);
            return fail(FailureKind::Filesystem(format!(
                "cannot move original aside: {}",
                e
            )));
        }

        if let Err(e) = self.fs.rename(&temp, original) {
            return match self.fs.rename(&aside, original) {
                Ok(()) => {
                    self.discard(&temp);
                    fail(FailureKind::Filesystem(format!(
                        "promotion failed, original restored: {}",
                        e
                    )))
                }
                Err(restore) => {
                    error!(
                        original = %original.display(),
                        kept_at = %aside.display(),
                        new_file = %temp.display(),
                        error = %restore,
                        "Promotion and restore both failed; original is at the backup path"
                    );
                    fail(FailureKind::Filesystem(format!(
                        "promotion failed ({}) and restore failed ({}); original kept at {}",
                        e,
                        restore,
                        aside.display()
                    )))
                }
            };
        }

        let backup = if self.options.backup_originals {
            Some(aside)
        } else {
            match self.fs.remove(&aside) {
                Ok(()) => None,
                Err(e) => {
                    warn!(path = %aside.display(), error = %e, "Failed to delete replaced original");
                    Some(aside)
                }
            }
        };

        if let Some(mtime) = mtime {
            apply_times(original, mtime, mtime);
        }

        ReencodeOutcome::Succeeded {
            original_size,
            new_size,
            backup,
        }
    }

    fn discard(&self, temp: &Path) {
        if self.fs.exists(temp) {
            if let Err(e) = self.fs.remove(temp) {
                warn!(path = %temp.display(), error = %e, "Failed to remove re-encoded artifact");
            }
        }
    }
}
