//! Collection analysis
//!
//! Read-only report over a root directory whose immediate sub-directories
//! are packages (one downloaded title each). Every video is probed at most
//! once; the cross-folder matcher reuses the per-folder probe results and
//! only sees the file each directory's duplicate resolution would keep.

use crate::dedupe::decide_removals;
use crate::descriptor::{probe_all, MetadataProvider, Metric, VideoDescriptor};
use crate::events::{CurationEvent, ReportSink};
use crate::quality::{score_descriptor, select_best};
use crate::sanitize::suggested_name;
use crate::similarity::{find_cross_folder_matches, MatchThresholds, SimilarityMatch};
use serde::Serialize;
use shared_utils::batch::{collect_videos, immediate_subdirectories, is_part_file, is_video_file, require_directory};
use shared_utils::errors::Result;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    pub extensions: Vec<String>,
    pub workers: usize,
    pub thresholds: MatchThresholds,
}

#[derive(Debug, Clone, Default)]
pub struct FolderAnalysis {
    pub directory: PathBuf,
    pub videos: Vec<PathBuf>,
    pub part_files: Vec<PathBuf>,
    /// Entry path and its sanitized name
    pub needs_sanitizing: Vec<(PathBuf, String)>,
    /// Filled only when the folder holds more than one video
    pub descriptors: Vec<VideoDescriptor>,
    pub differences: Vec<Metric>,
    pub best: Option<usize>,
}

impl FolderAnalysis {
    pub fn has_duplicates(&self) -> bool {
        self.videos.len() > 1
    }

    pub fn is_incomplete(&self) -> bool {
        !self.part_files.is_empty()
    }

    pub fn needs_attention(&self) -> bool {
        self.has_duplicates() || self.is_incomplete() || !self.needs_sanitizing.is_empty()
    }
}

/// Metrics whose values are not identical across all descriptors.
///
/// A failed probe or a missing metric counts as its own value.
pub fn metric_differences(descriptors: &[VideoDescriptor]) -> Vec<Metric> {
    Metric::ALL
        .iter()
        .copied()
        .filter(|metric| {
            let values: Vec<Option<f64>> = descriptors
                .iter()
                .map(|d| d.metrics().and_then(|m| m.metric(*metric).ok()))
                .collect();
            values.windows(2).any(|w| w[0] != w[1])
        })
        .collect()
}

/// Inventory one package folder, recursively.
pub fn analyze_directory<P>(
    dir: &Path,
    provider: &P,
    options: &AnalyzeOptions,
    sink: &mut dyn ReportSink,
) -> Result<FolderAnalysis>
where
    P: MetadataProvider + ?Sized,
{
    require_directory(dir)?;
    let mut analysis = FolderAnalysis {
        directory: dir.to_path_buf(),
        ..Default::default()
    };

    for entry in WalkDir::new(dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        if is_video_file(path, &options.extensions) {
            analysis.videos.push(path.to_path_buf());
        } else if is_part_file(path) {
            analysis.part_files.push(path.to_path_buf());
        }

        if let Some(suggested) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| suggested_name(n, false))
        {
            analysis.needs_sanitizing.push((path.to_path_buf(), suggested));
        }
    }

    for part in &analysis.part_files {
        sink.emit(CurationEvent::IncompleteDownload { path: part.clone() });
    }
    for (path, suggested) in &analysis.needs_sanitizing {
        sink.emit(CurationEvent::NeedsSanitizing {
            path: path.clone(),
            suggested: suggested.clone(),
        });
    }

    if analysis.has_duplicates() {
        analysis.descriptors = probe_all(provider, &analysis.videos, options.workers);
        emit_scores(&analysis.descriptors, sink);
        analysis.differences = metric_differences(&analysis.descriptors);
        analysis.best = select_best(&analysis.descriptors);
        debug!(
            dir = %dir.display(),
            videos = analysis.videos.len(),
            differences = ?analysis.differences,
            best = ?analysis.best,
            "Folder analyzed"
        );
    }

    Ok(analysis)
}

fn emit_scores(descriptors: &[VideoDescriptor], sink: &mut dyn ReportSink) {
    for d in descriptors {
        match score_descriptor(d) {
            Some(score) => sink.emit(CurationEvent::ScoreComputed {
                path: d.path.clone(),
                score,
            }),
            None => sink.emit(CurationEvent::ProbeFailed {
                path: d.path.clone(),
                reason: d.failure().unwrap_or_default().to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalysisSummary {
    pub folders_analyzed: usize,
    pub total_videos: usize,
    pub folders_with_duplicates: usize,
    pub incomplete_folders: usize,
    pub names_needing_sanitizing: usize,
    pub probe_failures: usize,
    pub similar_across_folders: Vec<SimilarityMatch>,
}

/// Analyze every immediate sub-directory of `root`, then look for likely
/// duplicates across folders.
pub fn scan_root_directory<P>(
    root: &Path,
    provider: &P,
    options: &AnalyzeOptions,
    sink: &mut dyn ReportSink,
) -> Result<AnalysisSummary>
where
    P: MetadataProvider + ?Sized,
{
    require_directory(root)?;
    let mut summary = AnalysisSummary::default();
    let mut pool: Vec<VideoDescriptor> = Vec::new();

    for dir in immediate_subdirectories(root)? {
        let analysis = analyze_directory(&dir, provider, options, sink)?;
        summary.folders_analyzed += 1;
        summary.total_videos += analysis.videos.len();
        summary.names_needing_sanitizing += analysis.needs_sanitizing.len();
        if analysis.has_duplicates() {
            summary.folders_with_duplicates += 1;
        }
        if analysis.is_incomplete() {
            summary.incomplete_folders += 1;
        }

        // single-video folders were not probed yet
        let descriptors = if analysis.descriptors.is_empty() {
            let probed = probe_all(provider, &analysis.videos, options.workers);
            emit_failures(&probed, sink);
            probed
        } else {
            analysis.descriptors
        };

        summary.probe_failures += descriptors.iter().filter(|d| !d.is_ok()).count();
        pool.extend(survivors(descriptors));
    }

    summary.similar_across_folders = find_cross_folder_matches(&pool, &options.thresholds);
    for m in &summary.similar_across_folders {
        sink.emit(CurationEvent::MatchFound {
            first: m.first_path.clone(),
            second: m.second_path.clone(),
            duration_diff: m.duration_diff,
            width_diff: m.width_diff,
            height_diff: m.height_diff,
        });
    }

    info!(
        root = %root.display(),
        videos = summary.total_videos,
        duplicate_folders = summary.folders_with_duplicates,
        incomplete = summary.incomplete_folders,
        similar = summary.similar_across_folders.len(),
        "Analysis finished"
    );
    Ok(summary)
}

/// Probed descriptors that duplicate removal would leave in place.
///
/// Grouped by containing directory, the unit duplicate removal works on.
/// Single files survive; larger groups keep only their best file.
fn survivors(descriptors: Vec<VideoDescriptor>) -> Vec<VideoDescriptor> {
    let mut groups: Vec<(PathBuf, Vec<VideoDescriptor>)> = Vec::new();
    for d in descriptors {
        let folder = d.folder().map(Path::to_path_buf).unwrap_or_default();
        match groups.iter_mut().find(|(f, _)| *f == folder) {
            Some((_, group)) => group.push(d),
            None => groups.push((folder, vec![d])),
        }
    }

    groups
        .into_iter()
        .flat_map(|(_, mut group)| {
            if group.len() < 2 {
                return group;
            }
            match decide_removals(&group).keep {
                Some(keep) => vec![group.swap_remove(keep)],
                None => Vec::new(),
            }
        })
        .filter(VideoDescriptor::is_ok)
        .collect()
}

fn emit_failures(descriptors: &[VideoDescriptor], sink: &mut dyn ReportSink) {
    for d in descriptors.iter().filter(|d| !d.is_ok()) {
        sink.emit(CurationEvent::ProbeFailed {
            path: d.path.clone(),
            reason: d.failure().unwrap_or_default().to_string(),
        });
    }
}

/// Total number of videos in the immediate sub-directories of `root`, recursively.
pub fn count_videos(root: &Path, extensions: &[String]) -> Result<usize> {
    require_directory(root)?;
    Ok(immediate_subdirectories(root)?
        .iter()
        .map(|dir| collect_videos(dir, extensions, true).len())
        .sum())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::testing::{metrics, FakeProvider};
    use crate::descriptor::VideoMetrics;
    use crate::events::CollectingSink;
    use shared_utils::batch::default_video_extensions;
    use std::fs;
    use tempfile::TempDir;

    fn options() -> AnalyzeOptions {
        AnalyzeOptions {
            extensions: default_video_extensions(),
            workers: 1,
            thresholds: MatchThresholds::default(),
        }
    }

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_metric_differences() {
        let a = VideoDescriptor::ok("/v/a.mp4", metrics(1920, 1080, 4_000_000, 100));
        let b = VideoDescriptor::ok("/v/b.mp4", metrics(1280, 720, 4_000_000, 100));
        let diffs = metric_differences(&[a.clone(), b]);
        assert_eq!(diffs, vec![Metric::Width, Metric::Height]);

        assert!(metric_differences(&[a.clone(), a.clone()]).is_empty());

        let failed = VideoDescriptor::failed("/v/c.mp4", "x");
        assert_eq!(metric_differences(&[a, failed]).len(), Metric::ALL.len());
    }

    #[test]
    fn test_analyze_directory_inventory() {
        let root = TempDir::new().unwrap();
        let pkg = root.path().join("pkg");
        touch(&pkg.join("a.mp4"));
        touch(&pkg.join("extras/b #clip.mkv"));
        touch(&pkg.join("c.mp4.part"));
        touch(&pkg.join("readme.txt"));

        let provider = FakeProvider::default()
            .with(pkg.join("a.mp4"), metrics(1920, 1080, 4_000_000, 100))
            .with(pkg.join("extras/b #clip.mkv"), metrics(1280, 720, 2_000_000, 50));

        let mut sink = CollectingSink::new();
        let analysis = analyze_directory(&pkg, &provider, &options(), &mut sink).unwrap();

        assert_eq!(analysis.videos.len(), 2);
        assert_eq!(analysis.part_files.len(), 1);
        assert_eq!(analysis.needs_sanitizing.len(), 1);
        assert_eq!(analysis.needs_sanitizing[0].1, "b.mkv");
        assert_eq!(analysis.best, Some(0));
        assert!(analysis.differences.contains(&Metric::Width));
        assert_eq!(provider.calls(), 2);
        assert_eq!(
            sink.count(|e| matches!(e, CurationEvent::IncompleteDownload { .. })),
            1
        );
        assert_eq!(
            sink.count(|e| matches!(e, CurationEvent::ScoreComputed { .. })),
            2
        );
    }

    #[test]
    fn test_single_video_folder_is_not_probed() {
        let root = TempDir::new().unwrap();
        touch(&root.path().join("pkg/only.mp4"));
        let provider = FakeProvider::default();

        let analysis =
            analyze_directory(&root.path().join("pkg"), &provider, &options(), &mut CollectingSink::new())
                .unwrap();
        assert!(!analysis.needs_attention());
        assert_eq!(provider.calls(), 0);
    }

    #[test]
    fn test_scan_root_probes_once_and_matches_across_folders() {
        let root = TempDir::new().unwrap();
        let a = root.path().join("one/movie.mp4");
        let b1 = root.path().join("two/movie.mkv");
        let b2 = root.path().join("two/trailer.mp4");
        let c = root.path().join("three/other.mp4");
        for p in [&a, &b1, &b2, &c] {
            touch(p);
        }
        touch(&root.path().join("three/partial.mp4.part"));
        touch(&root.path().join("loose.mp4"));

        let clip = |duration: f64, width: u32, height: u32| VideoMetrics {
            duration: Some(duration),
            width: Some(width),
            height: Some(height),
            ..metrics(width, height, 1_000_000, 10)
        };
        let provider = FakeProvider::default()
            .with(a.clone(), clip(3600.0, 1920, 1080))
            .with(b1.clone(), clip(3600.5, 1920, 1080))
            .with(b2.clone(), clip(90.0, 1920, 1080))
            .with(c.clone(), clip(1200.0, 640, 360));

        let mut sink = CollectingSink::new();
        let summary = scan_root_directory(root.path(), &provider, &options(), &mut sink).unwrap();

        assert_eq!(summary.folders_analyzed, 3);
        assert_eq!(summary.total_videos, 4);
        assert_eq!(summary.folders_with_duplicates, 1);
        assert_eq!(summary.incomplete_folders, 1);
        assert_eq!(summary.probe_failures, 0);
        assert_eq!(provider.calls(), 4);
        assert_eq!(summary.similar_across_folders.len(), 1);
        let m = &summary.similar_across_folders[0];
        let pair = [m.first_path.clone(), m.second_path.clone()];
        assert!(pair.contains(&a) && pair.contains(&b1));
        assert_eq!(
            sink.count(|e| matches!(e, CurationEvent::MatchFound { .. })),
            1
        );
    }

    #[test]
    fn test_folder_loser_is_not_matched_across_folders() {
        let root = TempDir::new().unwrap();
        let low = root.path().join("one/a_low.mp4");
        let high = root.path().join("one/b_high.mp4");
        let copy = root.path().join("two/copy.mp4");
        for p in [&low, &high, &copy] {
            touch(p);
        }
        let provider = FakeProvider::default()
            .with(low.clone(), metrics(1280, 720, 2_000_000, 500))
            .with(high.clone(), metrics(1920, 1080, 4_000_000, 1200))
            .with(copy.clone(), metrics(1280, 720, 2_000_000, 500));

        let mut sink = CollectingSink::new();
        let summary = scan_root_directory(root.path(), &provider, &options(), &mut sink).unwrap();

        assert_eq!(provider.calls(), 3);
        assert!(summary.similar_across_folders.is_empty());
        assert_eq!(
            sink.count(|e| matches!(e, CurationEvent::MatchFound { .. })),
            0
        );
    }

    #[test]
    fn test_survivors_per_directory() {
        let group = vec![
            VideoDescriptor::ok("/v/pkg/a.mp4", metrics(1280, 720, 1_000_000, 10)),
            VideoDescriptor::ok("/v/pkg/extras/clip.mp4", metrics(640, 360, 1_000_000, 10)),
            VideoDescriptor::ok("/v/pkg/b.mp4", metrics(1920, 1080, 1_000_000, 10)),
            VideoDescriptor::failed("/v/pkg/extras/broken.mp4", "corrupt"),
        ];
        let kept: Vec<PathBuf> = survivors(group).into_iter().map(|d| d.path).collect();
        assert_eq!(
            kept,
            vec![PathBuf::from("/v/pkg/b.mp4"), PathBuf::from("/v/pkg/extras/clip.mp4")]
        );
    }

    #[test]
    fn test_scan_root_counts_probe_failures() {
        let root = TempDir::new().unwrap();
        touch(&root.path().join("one/a.mp4"));
        touch(&root.path().join("two/b.mp4"));
        touch(&root.path().join("two/c.mp4"));
        let provider = FakeProvider::default();

        let mut sink = CollectingSink::new();
        let summary = scan_root_directory(root.path(), &provider, &options(), &mut sink).unwrap();
        assert_eq!(summary.probe_failures, 3);
        assert!(summary.similar_across_folders.is_empty());
        assert_eq!(
            sink.count(|e| matches!(e, CurationEvent::ProbeFailed { .. })),
            3
        );
    }

    #[test]
    fn test_count_videos() {
        let root = TempDir::new().unwrap();
        touch(&root.path().join("a/1.mp4"));
        touch(&root.path().join("a/deep/2.mkv"));
        touch(&root.path().join("b/3.avi"));
        touch(&root.path().join("b/3.avi.part"));
        touch(&root.path().join("top.mp4"));

        assert_eq!(count_videos(root.path(), &default_video_extensions()).unwrap(), 3);
        assert!(count_videos(&root.path().join("missing"), &default_video_extensions()).is_err());
    }
}
