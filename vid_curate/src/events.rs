//! Curation events and reporting sinks
//!
//! The engine emits structured data; sinks decide how it is presented.

use crate::codec_decision::CodecAction;
use crate::reencode::ReencodeOutcome;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CurationEvent {
    ScoreComputed {
        path: PathBuf,
        score: f64,
    },
    ProbeFailed {
        path: PathBuf,
        reason: String,
    },
    DuplicateFound {
        keep: PathBuf,
        remove: PathBuf,
    },
    FileRemoved {
        path: PathBuf,
        bytes: u64,
        dry_run: bool,
    },
    RemovalFailed {
        path: PathBuf,
        error: String,
    },
    MatchFound {
        first: PathBuf,
        second: PathBuf,
        duration_diff: f64,
        width_diff: f64,
        height_diff: f64,
    },
    ReencodeDecision {
        path: PathBuf,
        current_codec: Option<String>,
        target_codec: String,
        action: CodecAction,
        current_size: u64,
        estimated_size: u64,
    },
    ReencodeResult {
        path: PathBuf,
        outcome: ReencodeOutcome,
    },
    Renamed {
        from: PathBuf,
        to: PathBuf,
        dry_run: bool,
    },
    RenameFailed {
        path: PathBuf,
        error: String,
    },
    IncompleteDownload {
        path: PathBuf,
    },
    NeedsSanitizing {
        path: PathBuf,
        suggested: String,
    },
}

pub trait ReportSink {
    fn emit(&mut self, event: CurationEvent);
}

/// Writes every event to the tracing subscriber with structured fields.
#[derive(Debug, Default)]
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn emit(&mut self, event: CurationEvent) {
        match event {
            CurationEvent::ScoreComputed { path, score } => {
                debug!(path = %path.display(), score = (score * 10.0).round() / 10.0, "Quality score")
            }
            CurationEvent::ProbeFailed { path, reason } => {
                warn!(path = %path.display(), reason = %reason, "Probe failed")
            }
            CurationEvent::DuplicateFound { keep, remove } => info!(
                keep = %keep.display(),
                remove = %remove.display(),
                "Lower-quality duplicate"
            ),
            CurationEvent::FileRemoved { path, bytes, dry_run } => {
                if dry_run {
                    info!(path = %path.display(), bytes, "Would delete");
                } else {
                    info!(path = %path.display(), bytes, "Deleted");
                }
            }
            CurationEvent::RemovalFailed { path, error } => {
                warn!(path = %path.display(), error = %error, "Delete failed")
            }
            CurationEvent::MatchFound {
                first,
                second,
                duration_diff,
                width_diff,
                height_diff,
            } => info!(
                first = %first.display(),
                second = %second.display(),
                duration_diff,
                width_diff,
                height_diff,
                "Possible duplicate across folders"
            ),
            CurationEvent::ReencodeDecision {
                path,
                current_codec,
                target_codec,
                action,
                current_size,
                estimated_size,
            } => debug!(
                path = %path.display(),
                codec = current_codec.as_deref().unwrap_or("unknown"),
                target = %target_codec,
                action = ?action,
                current_size,
                estimated_size,
                "Codec decision"
            ),
            CurationEvent::ReencodeResult { path, outcome } => match outcome {
                ReencodeOutcome::Succeeded {
                    original_size,
                    new_size,
                    backup,
                } => info!(
                    path = %path.display(),
                    original_size,
                    new_size,
                    backup = ?backup,
                    "Re-encoded"
                ),
                ReencodeOutcome::FailedKeepOriginal(kind) => {
                    warn!(path = %path.display(), failure = %kind, "Re-encode failed, original kept")
                }
            },
            CurationEvent::Renamed { from, to, dry_run } => {
                if dry_run {
                    info!(from = %from.display(), to = %to.display(), "Would rename");
                } else {
                    info!(from = %from.display(), to = %to.display(), "Renamed");
                }
            }
            CurationEvent::RenameFailed { path, error } => {
                warn!(path = %path.display(), error = %error, "Rename failed")
            }
            CurationEvent::IncompleteDownload { path } => {
                warn!(path = %path.display(), "Incomplete download")
            }
            CurationEvent::NeedsSanitizing { path, suggested } => {
                info!(path = %path.display(), suggested = %suggested, "Name needs sanitizing")
            }
        }
    }
}

/// Keeps events in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub events: Vec<CurationEvent>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count<F: Fn(&CurationEvent) -> bool>(&self, pred: F) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl ReportSink for CollectingSink {
    fn emit(&mut self, event: CurationEvent) {
        self.events.push(event);
    }
}

/// One JSON object per line.
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ReportSink for JsonLinesSink<W> {
    fn emit(&mut self, event: CurationEvent) {
        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Failed to serialize event");
                return;
            }
        };
        if let Err(e) = writeln!(self.writer, "{}", line).and_then(|_| self.writer.flush()) {
            warn!(error = %e, "Failed to write event");
        }
    }
}
