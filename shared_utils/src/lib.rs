//! Shared utilities for the video curation tools
//!
//! - Typed errors and loud error reporting
//! - tracing-based logging with a rolling log file
//! - External process runner with pipe draining and timeouts
//! - FFprobe wrapper for video analysis
//! - Codec names and the efficiency table
//! - Directory walking, safety checks, file operations
//! - Progress bars and console summary reports

pub mod errors;
pub mod error_handler;
pub mod logging;
pub mod ffmpeg_process;
pub mod ffprobe;
pub mod codecs;
pub mod batch;
pub mod safety;
pub mod file_ops;
pub mod progress;
pub mod report;

pub use errors::{CurateError, Result};
pub use error_handler::{exit_code, report_anyhow, ErrorCategory};
pub use logging::{init_logging, log_external_tool, LogConfig};
pub use ffmpeg_process::{
    is_tool_available, require_tool, run_with_timeout, FfmpegProcess, ProcessError, ProcessOutput,
};
pub use ffprobe::{
    parse_frame_rate, parse_probe_json, probe_video, FFprobeError,
    FFprobeResult, FieldError,
};
pub use codecs::{
    display_name, encoder_candidates, normalize_codec, CodecEfficiencyTable, ENCODABLE_CODECS,
};
pub use batch::{
    collect_files, collect_videos, default_video_extensions, has_extension,
    immediate_subdirectories, is_part_file, is_video_file, list_video_files, require_directory,
    walk_directories, BatchResult, PART_EXTENSION, VIDEO_EXTENSIONS,
};
pub use safety::{check_protected_directory, check_safe_for_destructive};
pub use file_ops::{copy_file, move_file, FileOps, StdFileOps, preserve_mtime, remove_empty_dirs, verify_output_integrity};
pub use progress::{
    create_progress_bar, create_spinner, format_bytes, format_duration, format_timestamp,
    is_quiet_mode, set_quiet_mode,
};
pub use report::{print_batch_summary, print_section, SummaryReport};
