//! vid-curate - Video Collection Curation
//!
//! Scores downloaded videos from their technical metadata and acts on the result:
//! - keep the best copy in each package folder, remove the rest
//! - report likely duplicates stored in different folders
//! - re-encode files whose codec is less efficient than the target, transactionally
//!
//! ## Duplicate cleanup
//! ```rust,ignore
//! use vid_curate::{remove_duplicates, DedupeOptions, FfprobeProvider, TracingSink};
//! use std::time::Duration;
//!
//! let provider = FfprobeProvider::new(Duration::from_secs(30));
//! let options = DedupeOptions { extensions, workers: 2, dry_run: true };
//! let summary = remove_duplicates(root, &provider, &options, &mut TracingSink)?;
//! ```

pub mod analyze;
pub mod codec_decision;
pub mod config;
pub mod dedupe;
pub mod descriptor;
pub mod events;
pub mod mover;
pub mod parts;
pub mod quality;
pub mod reencode;
pub mod sanitize;
pub mod similarity;


// Re-exports
pub use analyze::{analyze_directory, count_videos, scan_root_directory, AnalysisSummary, AnalyzeOptions};
pub use codec_decision::{scan_directory, CodecAction, CodecDecision, CodecDecisionEngine, CodecScanSummary};
pub use config::{load_config, resolve_root_dir, save_config, CurateConfig};
pub use dedupe::{decide_removals, remove_duplicates, remove_duplicates_with, DedupeOptions, DedupeSummary, FolderDecision};
pub use descriptor::{
    probe_all, FfprobeProvider, MetadataProvider, Metric, MetricError, ProbeStatus, VideoDescriptor,
    VideoMetrics,
};
pub use events::{CollectingSink, CurationEvent, JsonLinesSink, ReportSink, TracingSink};
pub use mover::{copy_all_contents, move_all_contents, TransferSummary};
pub use parts::remove_part_files;
pub use quality::{quality_score, select_best};
pub use reencode::{
    EncodeBackend, FfmpegBackend, ReencodeOptions, ReencodeOrchestrator, ReencodeOutcome,
    ReencodeSummary,
};
pub use sanitize::{rename_recursively, sanitize_name, RenameSummary};
pub use similarity::{find_cross_folder_matches, MatchThresholds, SimilarityMatch};

pub use shared_utils::errors::{CurateError, Result};
pub use shared_utils::file_ops::{FileOps, StdFileOps};
