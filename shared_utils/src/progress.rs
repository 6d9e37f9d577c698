//! Progress bars and human-readable formatting
//!
//! Bars draw to stderr and are hidden in quiet mode (JSON output, tests).

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const PROGRESS_CHARS: &str = "█▓░";
const SPINNER_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";
const BATCH_TEMPLATE: &str =
    "{spinner:.green} {prefix:.cyan.bold} ▕{bar:35.green/black}▏ {pos}/{len} ({percent}%) {msg}";
const SPINNER_TEMPLATE: &str = "{spinner:.green} {prefix:.cyan.bold} {msg}";

static QUIET_MODE: AtomicBool = AtomicBool::new(false);

pub fn set_quiet_mode(quiet: bool) {
    QUIET_MODE.store(quiet, Ordering::Relaxed);
}

pub fn is_quiet_mode() -> bool {
    QUIET_MODE.load(Ordering::Relaxed)
}

pub fn create_progress_bar(total: u64, prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);

    if is_quiet_mode() {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    } else {
        if let Ok(style) = ProgressStyle::default_bar().template(BATCH_TEMPLATE) {
            pb.set_style(style.progress_chars(PROGRESS_CHARS).tick_chars(SPINNER_CHARS));
        }
        pb.set_prefix(prefix.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
    }
    pb
}

pub fn create_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();

    if is_quiet_mode() {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    } else {
        if let Ok(style) = ProgressStyle::default_spinner().template(SPINNER_TEMPLATE) {
            pb.set_style(style.tick_chars(SPINNER_CHARS));
        }
        pb.set_prefix(prefix.to_string());
        pb.enable_steady_tick(Duration::from_millis(80));
    }
    pb
}

pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}

/// Video length as `H:MM:SS` or `M:SS`.
pub fn format_timestamp(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "?".to_string();
    }
    let total = seconds.round() as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(500 * 1024 * 1024), "500.00 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(5)), "5s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(65.4), "1:05");
        assert_eq!(format_timestamp(3725.0), "1:02:05");
        assert_eq!(format_timestamp(f64::NAN), "?");
    }

    #[test]
    fn test_quiet_bar_is_hidden() {
        set_quiet_mode(true);
        let pb = create_progress_bar(3, "test");
        assert!(pb.is_hidden());
        pb.inc(3);
        pb.finish_and_clear();
        set_quiet_mode(false);
    }
}
