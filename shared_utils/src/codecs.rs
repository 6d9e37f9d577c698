//! Codec Information Module
//!
//! Canonical codec names, the relative compression-efficiency table used by
//! re-encode decisions, and the encoder preference order per target codec.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Map an ffprobe codec name (or encoder name) to the canonical key used by
/// the efficiency table. Unrecognized names are returned lower-cased.
pub fn normalize_codec(codec_name: &str) -> String {
    let lower = codec_name.trim().to_lowercase();
    let canonical = match lower.as_str() {
        "hevc" | "h265" | "h.265" | "libx265" | "hevc_nvenc" | "hevc_videotoolbox" => "h265",
        "av1" | "libaom-av1" | "libsvtav1" | "librav1e" | "av1_nvenc" | "libdav1d" => "av1",
        "vp9" | "libvpx-vp9" => "vp9",
        "h264" | "avc" | "h.264" | "libx264" | "h264_nvenc" | "h264_videotoolbox" => "h264",
        "mpeg4" | "libxvid" => "mpeg4",
        "xvid" => "xvid",
        "divx" => "divx",
        "msmpeg4v2" | "msmpeg4v3" | "msmpeg4" => "divx",
        "wmv" | "wmv1" | "wmv2" | "wmv3" => "wmv",
        "mpeg2" | "mpeg2video" => "mpeg2",
        "mpeg1" | "mpeg1video" => "mpeg1",
        _ => return lower,
    };
    canonical.to_string()
}

/// Human-readable label for reports.
pub fn display_name(codec_name: &str) -> String {
    match normalize_codec(codec_name).as_str() {
        "h265" => "H.265/HEVC".to_string(),
        "av1" => "AV1".to_string(),
        "vp9" => "VP9".to_string(),
        "h264" => "H.264/AVC".to_string(),
        "mpeg4" => "MPEG-4".to_string(),
        "xvid" => "Xvid".to_string(),
        "divx" => "DivX".to_string(),
        "wmv" => "WMV".to_string(),
        "mpeg2" => "MPEG-2".to_string(),
        "mpeg1" => "MPEG-1".to_string(),
        other => other.to_string(),
    }
}

/// Relative compression effectiveness per codec (most efficient ≈ 100).
///
/// Keys are canonical names; lookups normalize the queried name first, so
/// `hevc`, `libx265` and `h265` all resolve to the same entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CodecEfficiencyTable {
    scores: BTreeMap<String, u32>,
}

impl Default for CodecEfficiencyTable {
    fn default() -> Self {
        let scores = [
            ("h265", 100),
            ("hevc", 100),
            ("av1", 95),
            ("vp9", 85),
            ("h264", 80),
            ("avc", 80),
            ("mpeg4", 40),
            ("xvid", 35),
            ("divx", 35),
            ("wmv", 30),
            ("mpeg2", 25),
            ("mpeg1", 20),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        Self { scores }
    }
}

impl CodecEfficiencyTable {
    /// Efficiency of `codec`; unknown codecs score 0.
    pub fn efficiency(&self, codec: &str) -> u32 {
        let lower = codec.trim().to_lowercase();
        if let Some(score) = self.scores.get(&lower) {
            return *score;
        }
        self.scores
            .get(&normalize_codec(&lower))
            .copied()
            .unwrap_or(0)
    }
}

/// Encoders that can produce each target codec, most preferred first.
pub fn encoder_candidates(target_codec: &str) -> &'static [&'static str] {
    match normalize_codec(target_codec).as_str() {
        "h264" => &["libx264"],
        "h265" => &["libx265", "hevc_nvenc"],
        "vp9" => &["libvpx-vp9"],
        "av1" => &["libaom-av1", "librav1e", "libsvtav1", "av1_nvenc"],
        "mpeg4" => &["libxvid", "mpeg4"],
        _ => &[],
    }
}

/// Target codecs with a known encoder mapping.
pub const ENCODABLE_CODECS: &[&str] = &["h264", "h265", "vp9", "av1", "mpeg4"];
