//! FFprobe wrapper module
//!
//! Runs `ffprobe -show_streams` as JSON and extracts the
//! technical fields the curation engine needs from the first real video
//! stream. Every numeric field goes through its own parse step so a missing
//! or garbled value is visible as a [`FieldError`] instead of being swallowed.

use crate::ffmpeg_process::{run_with_timeout, ProcessError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io;
use std::path::Path;
use std::process::Command;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum FFprobeError {
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("FFprobe failed: {0}")]
    ExecutionFailed(String),

    #[error("FFprobe timed out after {0:?}")]
    Timeout(Duration),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("No video stream found")]
    NoVideoStream,

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

impl From<ProcessError> for FFprobeError {
    fn from(e: ProcessError) -> Self {
        match e {
            ProcessError::ToolNotFound(tool) => FFprobeError::ToolNotFound(tool),
            ProcessError::Timeout { timeout, .. } => FFprobeError::Timeout(timeout),
            other => FFprobeError::ExecutionFailed(other.to_string()),
        }
    }
}

/// Why one field of the probe output could not be used.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldError {
    #[error("field '{0}' is missing")]
    Missing(&'static str),

    #[error("field '{field}' is not numeric: '{value}'")]
    NonNumeric { field: &'static str, value: String },
}

/// Fields extracted from one ffprobe run. Absent or unparsable values are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FFprobeResult {
    /// Lower-cased short codec name of the first video stream
    pub codec_name: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Frames per second, rounded to two decimals
    pub frame_rate: Option<f64>,
    /// Video stream bit rate in bits/second
    pub bit_rate: Option<u64>,
    /// Video stream duration in seconds
    pub duration: Option<f64>,
}

pub fn probe_video(path: &Path, timeout: Option<Duration>) -> Result<FFprobeResult, FFprobeError> {
    if !path.is_file() {
        return Err(FFprobeError::ExecutionFailed(format!(
            "Not a readable file: {}",
            path.display()
        )));
    }

    let mut cmd = Command::new("ffprobe");
    cmd.args([
        "-v",
        "error",
        "-print_format",
        "json",
        "-show_streams",
        "--",
    ])
    .arg(path);

    let output = run_with_timeout(&mut cmd, timeout)?;

    if !output.success() {
        let stderr = output.stderr_tail(3);
        let error_msg = if stderr.is_empty() {
            format!(
                "ffprobe failed to analyze file: {} (exit code: {:?})",
                path.display(),
                output.status.code()
            )
        } else {
            format!("ffprobe error for '{}': {}", path.display(), stderr)
        };
        return Err(FFprobeError::ExecutionFailed(error_msg));
    }

    parse_probe_json(&output.stdout)
}

/// Parse the JSON document printed by ffprobe.
pub fn parse_probe_json(json_str: &str) -> Result<FFprobeResult, FFprobeError> {
    let json: Value =
        serde_json::from_str(json_str).map_err(|e| FFprobeError::ParseError(e.to_string()))?;

    let streams = json["streams"]
        .as_array()
        .ok_or_else(|| FFprobeError::ParseError("No streams found".to_string()))?;

    let video_stream = streams
        .iter()
        .find(|s| s["codec_type"].as_str() == Some("video") && !is_attached_picture(s))
        .ok_or(FFprobeError::NoVideoStream)?;

    Ok(FFprobeResult {
        codec_name: video_stream["codec_name"]
            .as_str()
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase),
        width: usable(numeric_field::<u32>(video_stream, "width")).filter(|w| *w > 0),
        height: usable(numeric_field::<u32>(video_stream, "height")).filter(|h| *h > 0),
        frame_rate: usable(frame_rate_field(video_stream)),
        bit_rate: usable(numeric_field::<u64>(video_stream, "bit_rate")),
        duration: usable(numeric_field::<f64>(video_stream, "duration")),
    })
}

fn is_attached_picture(stream: &Value) -> bool {
    stream["disposition"]["attached_pic"].as_u64() == Some(1)
}

/// Missing fields are normal; garbled ones are worth a debug line.
fn usable<T>(field: Result<T, FieldError>) -> Option<T> {
    match field {
        Ok(v) => Some(v),
        Err(FieldError::Missing(_)) => None,
        Err(e) => {
            debug!("ffprobe: {}", e);
            None
        }
    }
}

/// Read a numeric field that ffprobe may print either as a JSON number or a string.
pub fn numeric_field<T: FromStr>(obj: &Value, field: &'static str) -> Result<T, FieldError> {
    let raw = match &obj[field] {
        Value::Null => return Err(FieldError::Missing(field)),
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    };
    raw.parse::<T>().map_err(|_| FieldError::NonNumeric { field, value: raw })
}

fn frame_rate_field(stream: &Value) -> Result<f64, FieldError> {
    let raw = stream["r_frame_rate"]
        .as_str()
        .ok_or(FieldError::Missing("r_frame_rate"))?;
    parse_frame_rate(raw)
}

/// Reduce an ffprobe rational (`30000/1001`) or plain decimal to fps, rounded to two decimals.
pub fn parse_frame_rate(s: &str) -> Result<f64, FieldError> {
    let invalid = || FieldError::NonNumeric {
        field: "r_frame_rate",
        value: s.to_string(),
    };

    let rate = match s.split_once('/') {
        Some((num, den)) => {
            let num = num.trim().parse::<f64>().map_err(|_| invalid())?;
            let den = den.trim().parse::<f64>().map_err(|_| invalid())?;
            if den <= 0.0 {
                return Err(invalid());
            }
            num / den
        }
        None => s.trim().parse::<f64>().map_err(|_| invalid())?,
    };

    if !rate.is_finite() || rate < 0.0 {
        return Err(invalid());
    }
    Ok((rate * 100.0).round() / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "streams": [
            {"index": 0, "codec_type": "video", "codec_name": "mjpeg", "width": 320, "height": 240,
             "disposition": {"attached_pic": 1}},
            {"index": 1, "codec_type": "video", "codec_name": "H264", "width": 1920, "height": 1080,
             "r_frame_rate": "30000/1001", "bit_rate": "4000000", "duration": "120.500000",
             "disposition": {"attached_pic": 0}},
            {"index": 2, "codec_type": "audio", "codec_name": "aac"}
        ],
        "format": {"format_name": "mov,mp4,m4a,3gp,3g2,mj2", "duration": "120.52", "bit_rate": "4128000"}
    }"#;

    #[test]
    fn test_parse_probe_json_picks_real_video_stream() {
        let result = parse_probe_json(SAMPLE).unwrap();
        assert_eq!(result.codec_name.as_deref(), Some("h264"));
        assert_eq!(result.width, Some(1920));
        assert_eq!(result.height, Some(1080));
        assert_eq!(result.frame_rate, Some(29.97));
        assert_eq!(result.bit_rate, Some(4_000_000));
        assert_eq!(result.duration, Some(120.5));
    }

    #[test]
    fn test_parse_probe_json_missing_fields_are_none() {
        let json = r#"{"streams": [{"codec_type": "video", "codec_name": "vp9",
                        "width": 640, "height": 360, "bit_rate": "N/A"}], "format": {}}"#;
        let result = parse_probe_json(json).unwrap();
        assert_eq!(result.codec_name.as_deref(), Some("vp9"));
        assert_eq!(result.bit_rate, None);
        assert_eq!(result.duration, None);
        assert_eq!(result.frame_rate, None);
    }

    #[test]
    fn test_container_duration_is_not_substituted() {
        // typical mkv: only the container carries a duration
        let json = r#"{"streams": [{"codec_type": "video", "codec_name": "hevc",
                        "width": 1920, "height": 1080, "tags": {"DURATION": "00:10:00.000"}}],
                       "format": {"duration": "600.000", "bit_rate": "3000000"}}"#;
        let result = parse_probe_json(json).unwrap();
        assert_eq!(result.duration, None);
        assert_eq!(result.bit_rate, None);
        assert_eq!(result.width, Some(1920));
    }

    #[test]
    fn test_parse_probe_json_errors() {
        assert!(matches!(
            parse_probe_json("not json"),
            Err(FFprobeError::ParseError(_))
        ));
        assert!(matches!(
            parse_probe_json(r#"{"format": {}}"#),
            Err(FFprobeError::ParseError(_))
        ));
        assert!(matches!(
            parse_probe_json(r#"{"streams": [{"codec_type": "audio"}]}"#),
            Err(FFprobeError::NoVideoStream)
        ));
    }

    #[test]
    fn test_numeric_field_outcomes() {
        let obj: Value = serde_json::json!({"a": 12, "b": "34", "c": "N/A"});
        assert_eq!(numeric_field::<u32>(&obj, "a"), Ok(12));
        assert_eq!(numeric_field::<u32>(&obj, "b"), Ok(34));
        assert_eq!(
            numeric_field::<u32>(&obj, "c"),
            Err(FieldError::NonNumeric {
                field: "c",
                value: "N/A".to_string()
            })
        );
        assert_eq!(numeric_field::<u32>(&obj, "d"), Err(FieldError::Missing("d")));
    }

    #[test]
    fn test_parse_frame_rate() {
        let cases: &[(&str, f64)] = &[
            ("30/1", 30.0),
            ("24/1", 24.0),
            ("60/1", 60.0),
            ("30000/1001", 29.97),
            ("24000/1001", 23.98),
            ("60000/1001", 59.94),
            ("24", 24.0),
            ("29.97", 29.97),
            ("0/1", 0.0),
        ];

        for (input, expected) in cases {
            let result = parse_frame_rate(input).unwrap();
            assert!(
                (result - expected).abs() < 1e-9,
                "parse_frame_rate({:?}): expected {}, got {}",
                input,
                expected,
                result
            );
        }
    }

    #[test]
    fn test_parse_frame_rate_rejects_garbage() {
        for input in ["30/0", "invalid", "", "30/1/extra", "-5"] {
            assert!(parse_frame_rate(input).is_err(), "{:?} should be rejected", input);
        }
    }

    #[test]
    fn test_probe_missing_file() {
        let err = probe_video(Path::new("/definitely/not/here.mp4"), None).unwrap_err();
        assert!(matches!(err, FFprobeError::ExecutionFailed(_)));
    }
}
