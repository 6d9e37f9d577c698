//! Codec efficiency decisions
//!
//! A file is re-encoded only when its codec is known and strictly less
//! efficient than the target. Unknown codecs are always kept.

use crate::descriptor::{probe_all, MetadataProvider, VideoDescriptor};
use crate::events::{CurationEvent, ReportSink};
use serde::{Deserialize, Serialize};
use shared_utils::batch::{collect_videos, require_directory};
use shared_utils::codecs::{normalize_codec, CodecEfficiencyTable};
use shared_utils::errors::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const MAX_REDUCTION: f64 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecAction {
    Keep,
    Reencode,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CodecDecision {
    pub path: PathBuf,
    pub current_codec: Option<String>,
    pub target_codec: String,
    pub action: CodecAction,
    pub current_size: u64,
    pub estimated_new_size: u64,
}

#[derive(Debug, Clone)]
pub struct CodecDecisionEngine {
    table: CodecEfficiencyTable,
    target_codec: String,
}

impl CodecDecisionEngine {
    pub fn new(table: CodecEfficiencyTable, target_codec: &str) -> Self {
        Self {
            table,
            target_codec: normalize_codec(target_codec),
        }
    }

    pub fn target_codec(&self) -> &str {
        &self.target_codec
    }

    pub fn table(&self) -> &CodecEfficiencyTable {
        &self.table
    }

    /// Keep/Reencode for a codec name; `None` or unknown names keep.
    pub fn action_for(&self, current_codec: Option<&str>) -> CodecAction {
        let Some(codec) = current_codec else {
            return CodecAction::Keep;
        };
        let current = self.table.efficiency(codec);
        if current == 0 {
            return CodecAction::Keep;
        }
        if current < self.table.efficiency(&self.target_codec) {
            CodecAction::Reencode
        } else {
            CodecAction::Keep
        }
    }

    /// `size * (1 - min(0.4, (target - current) / 100))`, truncated, when the
    /// target is more efficient, otherwise the original size.
    pub fn estimate_size(&self, size: u64, current_codec: Option<&str>) -> u64 {
        let Some(codec) = current_codec else {
            return size;
        };
        let current = self.table.efficiency(codec);
        let target = self.table.efficiency(&self.target_codec);
        if current == 0 || target <= current {
            return size;
        }
        let reduction = (f64::from(target - current) / 100.0).min(MAX_REDUCTION);
        (size as f64 * (1.0 - reduction)).floor() as u64
    }

    /// Decision for one probed file; failed probes get none.
    pub fn decide(&self, descriptor: &VideoDescriptor) -> Option<CodecDecision> {
        let metrics = descriptor.metrics()?;
        let codec = metrics.codec.as_deref();
        Some(CodecDecision {
            path: descriptor.path.clone(),
            current_codec: metrics.codec.clone(),
            target_codec: self.target_codec.clone(),
            action: self.action_for(codec),
            current_size: metrics.size_bytes,
            estimated_new_size: self.estimate_size(metrics.size_bytes, codec),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CodecCount {
    pub files: usize,
    pub bytes: u64,
    pub action: Option<CodecAction>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CodecScanSummary {
    pub total_files: usize,
    pub probe_failures: usize,
    pub needs_reencode: usize,
    /// Size of the files that would be re-encoded
    pub current_size: u64,
    /// Estimated size of those files after re-encoding
    pub estimated_size: u64,
    /// Keyed by lower-cased codec name, `unknown` when absent
    pub distribution: BTreeMap<String, CodecCount>,
}

impl CodecScanSummary {
    pub fn from_decisions(decisions: &[CodecDecision], probe_failures: usize) -> Self {
        let mut summary = CodecScanSummary {
            total_files: decisions.len() + probe_failures,
            probe_failures,
            ..Default::default()
        };

        for d in decisions {
            let key = d
                .current_codec
                .clone()
                .unwrap_or_else(|| "unknown".to_string());
            let entry = summary.distribution.entry(key).or_default();
            entry.files += 1;
            entry.bytes += d.current_size;
            entry.action = Some(d.action);

            if d.action == CodecAction::Reencode {
                summary.needs_reencode += 1;
                summary.current_size += d.current_size;
                summary.estimated_size += d.estimated_new_size;
            }
        }
        summary
    }

    pub fn estimated_savings(&self) -> u64 {
        self.current_size.saturating_sub(self.estimated_size)
    }

    pub fn savings_percent(&self) -> f64 {
        if self.current_size == 0 {
            0.0
        } else {
            self.estimated_savings() as f64 / self.current_size as f64 * 100.0
        }
    }
}

/// Probe every video under `dir` and decide each one.
pub fn scan_directory<P>(
    dir: &Path,
    recursive: bool,
    extensions: &[String],
    provider: &P,
    engine: &CodecDecisionEngine,
    workers: usize,
    sink: &mut dyn ReportSink,
) -> Result<(Vec<CodecDecision>, CodecScanSummary)>
where
    P: MetadataProvider + ?Sized,
{
    require_directory(dir)?;
    let files = collect_videos(dir, extensions, recursive);
    let descriptors = probe_all(provider, &files, workers);

    let mut decisions = Vec::with_capacity(descriptors.len());
    let mut failures = 0;
    for d in &descriptors {
        match engine.decide(d) {
            Some(decision) => {
                sink.emit(CurationEvent::ReencodeDecision {
                    path: decision.path.clone(),
                    current_codec: decision.current_codec.clone(),
                    target_codec: decision.target_codec.clone(),
                    action: decision.action,
                    current_size: decision.current_size,
                    estimated_size: decision.estimated_new_size,
                });
                decisions.push(decision);
            }
            None => {
                failures += 1;
                sink.emit(CurationEvent::ProbeFailed {
                    path: d.path.clone(),
                    reason: d.failure().unwrap_or_default().to_string(),
                });
            }
        }
    }

    let summary = CodecScanSummary::from_decisions(&decisions, failures);
    Ok((decisions, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::testing::FakeProvider;
    use crate::descriptor::VideoMetrics;
    use crate::events::CollectingSink;
    use shared_utils::batch::default_video_extensions;
    use tempfile::TempDir;

    fn engine(target: &str) -> CodecDecisionEngine {
        CodecDecisionEngine::new(CodecEfficiencyTable::default(), target)
    }

    fn with_codec(path: &str, codec: Option<&str>, size: u64) -> VideoDescriptor {
        VideoDescriptor::ok(
            path,
            VideoMetrics {
                size_bytes: size,
                codec: codec.map(str::to_string),
                ..VideoMetrics::default()
            },
        )
    }

    #[test]
    fn test_mpeg4_to_h265_reencodes() {
        let d = engine("h265")
            .decide(&with_codec("/v/a.avi", Some("mpeg4"), 1000))
            .unwrap();
        assert_eq!(d.action, CodecAction::Reencode);
        // 100 - 40 = 60 points, capped at 40%
        assert_eq!(d.estimated_new_size, 600);
    }

    #[test]
    fn test_h265_with_h264_target_keeps() {
        let d = engine("h264")
            .decide(&with_codec("/v/a.mp4", Some("hevc"), 1000))
            .unwrap();
        assert_eq!(d.action, CodecAction::Keep);
        assert_eq!(d.estimated_new_size, 1000);
    }

    #[test]
    fn test_small_gap_reduction() {
        // av1 (95) vs h265 (100): 5% smaller
        assert_eq!(engine("h265").estimate_size(1000, Some("av1")), 950);
        assert_eq!(
            engine("h265").action_for(Some("av1")),
            CodecAction::Reencode
        );
    }

    #[test]
    fn test_estimate_truncates() {
        // 1001 * 0.6 = 600.6
        assert_eq!(engine("h265").estimate_size(1001, Some("mpeg4")), 600);
        // 999 * 0.8 = 799.2
        assert_eq!(engine("h265").estimate_size(999, Some("h264")), 799);
    }

    #[test]
    fn test_same_codec_keeps() {
        assert_eq!(engine("hevc").action_for(Some("h265")), CodecAction::Keep);
        assert_eq!(engine("h264").action_for(Some("avc")), CodecAction::Keep);
    }

    #[test]
    fn test_unknown_codec_keeps() {
        let e = engine("h265");
        assert_eq!(e.action_for(Some("prores")), CodecAction::Keep);
        assert_eq!(e.action_for(None), CodecAction::Keep);
        assert_eq!(e.estimate_size(1000, Some("prores")), 1000);
        assert_eq!(e.estimate_size(1000, None), 1000);
    }

    #[test]
    fn test_ffprobe_aliases() {
        let e = engine("h265");
        assert_eq!(e.action_for(Some("mpeg2video")), CodecAction::Reencode);
        assert_eq!(e.action_for(Some("wmv3")), CodecAction::Reencode);
        assert_eq!(e.estimate_size(1000, Some("mpeg2video")), 600);
    }

    #[test]
    fn test_failed_probe_has_no_decision() {
        assert!(engine("h265")
            .decide(&VideoDescriptor::failed("/v/a.mp4", "x"))
            .is_none());
    }

    #[test]
    fn test_summary_aggregates() {
        let e = engine("h265");
        let decisions: Vec<CodecDecision> = [
            with_codec("/v/a.avi", Some("mpeg4"), 1000),
            with_codec("/v/b.mp4", Some("h264"), 2000),
            with_codec("/v/c.mkv", Some("hevc"), 500),
            with_codec("/v/d.mkv", None, 300),
        ]
        .iter()
        .filter_map(|d| e.decide(d))
        .collect();

        let summary = CodecScanSummary::from_decisions(&decisions, 2);
        assert_eq!(summary.total_files, 6);
        assert_eq!(summary.probe_failures, 2);
        assert_eq!(summary.needs_reencode, 2);
        assert_eq!(summary.current_size, 3000);
        // mpeg4: 600, h264 (80 -> 100, 20%): 1600
        assert_eq!(summary.estimated_size, 2200);
        assert_eq!(summary.estimated_savings(), 800);
        assert!((summary.savings_percent() - 26.666).abs() < 0.01);
        assert_eq!(summary.distribution["hevc"].action, Some(CodecAction::Keep));
        assert_eq!(summary.distribution["unknown"].files, 1);
    }

    #[test]
    fn test_scan_directory() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.avi");
        let b = dir.path().join("sub/b.mp4");
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        std::fs::write(&a, b"a").unwrap();
        std::fs::write(&b, b"b").unwrap();
        std::fs::write(dir.path().join("c.mp4"), b"c").unwrap();

        let provider = FakeProvider::default()
            .with(a.clone(), with_codec("", Some("mpeg4"), 100).metrics().cloned().unwrap())
            .with(b.clone(), with_codec("", Some("hevc"), 100).metrics().cloned().unwrap());

        let mut sink = CollectingSink::new();
        let (decisions, summary) = scan_directory(
            dir.path(),
            true,
            &default_video_extensions(),
            &provider,
            &engine("h265"),
            2,
            &mut sink,
        )
        .unwrap();

        assert_eq!(decisions.len(), 2);
        assert_eq!(summary.probe_failures, 1);
        assert_eq!(summary.needs_reencode, 1);
        assert_eq!(sink.events.len(), 3);

        let (flat, _) = scan_directory(
            dir.path(),
            false,
            &default_video_extensions(),
            &provider,
            &engine("h265"),
            1,
            &mut CollectingSink::new(),
        )
        .unwrap();
        assert_eq!(flat.len(), 1);
    }
}
