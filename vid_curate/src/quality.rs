//! Quality scoring and best-of-N selection
//!
//! Weighted additive model over resolution, bit rate, frame rate and file
//! size. Every term is non-negative and non-decreasing in its input.

use crate::descriptor::{VideoDescriptor, VideoMetrics};

const MB: f64 = 1024.0 * 1024.0;
const SIZE_TERM_CAP: f64 = 20.0;

/// `(w * h / 1e6) * 100`; 0 when either dimension is absent.
pub fn resolution_term(metrics: &VideoMetrics) -> f64 {
    match (metrics.width, metrics.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (f64::from(w) * f64::from(h) / 1_000_000.0) * 100.0,
        _ => 0.0,
    }
}

/// `(bits/s / 1e6) * 10`
pub fn bitrate_term(metrics: &VideoMetrics) -> f64 {
    metrics
        .bit_rate
        .map(|b| (b as f64 / 1_000_000.0) * 10.0)
        .unwrap_or(0.0)
}

/// `fps * 0.5`, plus `(fps - 30) * 2` above 30 fps.
pub fn frame_rate_term(metrics: &VideoMetrics) -> f64 {
    match metrics.frame_rate {
        Some(fps) if fps.is_finite() && fps > 0.0 => {
            let mut term = fps * 0.5;
            if fps > 30.0 {
                term += (fps - 30.0) * 2.0;
            }
            term
        }
        _ => 0.0,
    }
}

/// `min(MB / 100, 20)`
pub fn size_term(metrics: &VideoMetrics) -> f64 {
    (metrics.size_bytes as f64 / MB / 100.0).min(SIZE_TERM_CAP)
}

pub fn quality_score(metrics: &VideoMetrics) -> f64 {
    resolution_term(metrics) + bitrate_term(metrics) + frame_rate_term(metrics) + size_term(metrics)
}

/// Score of a probed descriptor; failed descriptors have no score.
pub fn score_descriptor(descriptor: &VideoDescriptor) -> Option<f64> {
    descriptor.metrics().map(quality_score)
}

/// Index of the highest-scoring descriptor.
///
/// - fewer than two descriptors: `None`, a single file is not a duplicate set
/// - failed descriptors are skipped without renumbering
/// - comparison starts from score 0 at index 0, so when nothing scores above
///   zero index 0 is returned even if it failed to probe
/// - ties keep the earlier index
pub fn select_best(descriptors: &[VideoDescriptor]) -> Option<usize> {
    if descriptors.len() < 2 {
        return None;
    }

    let mut best_index = 0;
    let mut best_score = 0.0;
    for (i, descriptor) in descriptors.iter().enumerate() {
        let Some(score) = score_descriptor(descriptor) else {
            continue;
        };
        if score > best_score {
            best_score = score;
            best_index = i;
        }
    }
    Some(best_index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::testing::metrics;
    use proptest::prelude::*;

    fn base() -> VideoMetrics {
        VideoMetrics {
            width: Some(1280),
            height: Some(720),
            frame_rate: Some(25.0),
            bit_rate: Some(2_000_000),
            duration: Some(100.0),
            size_bytes: 100 * 1024 * 1024,
            codec: None,
        }
    }

    #[test]
    fn test_score_terms() {
        let m = base();
        assert!((resolution_term(&m) - 92.16).abs() < 1e-9);
        assert!((bitrate_term(&m) - 20.0).abs() < 1e-9);
        assert!((frame_rate_term(&m) - 12.5).abs() < 1e-9);
        assert!((size_term(&m) - 1.0).abs() < 1e-9);
        assert!((quality_score(&m) - 125.66).abs() < 1e-9);
    }

    #[test]
    fn test_high_frame_rate_bonus() {
        let m = VideoMetrics {
            frame_rate: Some(60.0),
            ..VideoMetrics::default()
        };
        assert!((frame_rate_term(&m) - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_size_term_is_capped() {
        let m = VideoMetrics {
            size_bytes: 50 * 1024 * 1024 * 1024,
            ..VideoMetrics::default()
        };
        assert_eq!(size_term(&m), 20.0);
    }

    #[test]
    fn test_missing_fields_score_zero() {
        assert_eq!(quality_score(&VideoMetrics::default()), 0.0);
        let only_width = VideoMetrics {
            width: Some(1920),
            ..VideoMetrics::default()
        };
        assert_eq!(resolution_term(&only_width), 0.0);
    }

    #[test]
    fn test_select_best_short_lists() {
        assert_eq!(select_best(&[]), None);
        let one = [VideoDescriptor::ok("/v/a.mp4", base())];
        assert_eq!(select_best(&one), None);
    }

    #[test]
    fn test_select_best_single_ok_among_failures() {
        let list = [
            VideoDescriptor::failed("/v/a.mp4", "boom"),
            VideoDescriptor::failed("/v/b.mp4", "boom"),
            VideoDescriptor::ok("/v/c.mp4", base()),
        ];
        assert_eq!(select_best(&list), Some(2));
    }

    #[test]
    fn test_select_best_tie_keeps_first() {
        let list = [
            VideoDescriptor::ok("/v/a.mp4", base()),
            VideoDescriptor::ok("/v/b.mp4", base()),
        ];
        assert_eq!(select_best(&list), Some(0));
    }

    #[test]
    fn test_select_best_zero_scores_default_to_index_zero() {
        let list = [
            VideoDescriptor::failed("/v/a.mp4", "boom"),
            VideoDescriptor::ok("/v/b.mp4", VideoMetrics::default()),
        ];
        assert_eq!(select_best(&list), Some(0));
    }

    #[test]
    fn test_select_best_picks_1080p_over_720p() {
        let list = [
            VideoDescriptor::ok("/v/movie.720p.mp4", metrics(1280, 720, 2_000_000, 500)),
            VideoDescriptor::ok("/v/movie.1080p.mp4", metrics(1920, 1080, 4_000_000, 1200)),
        ];
        assert_eq!(select_best(&list), Some(1));
    }

    proptest! {
        #[test]
        fn prop_score_monotonic_in_pixels(w in 1u32..8000, h in 1u32..8000, dw in 0u32..500) {
            let a = VideoMetrics { width: Some(w), height: Some(h), ..base() };
            let b = VideoMetrics { width: Some(w + dw), height: Some(h), ..base() };
            prop_assert!(quality_score(&b) >= quality_score(&a));
        }

        #[test]
        fn prop_score_monotonic_in_bitrate(br in 0u64..200_000_000, d in 0u64..10_000_000) {
            let a = VideoMetrics { bit_rate: Some(br), ..base() };
            let b = VideoMetrics { bit_rate: Some(br + d), ..base() };
            prop_assert!(quality_score(&b) >= quality_score(&a));
        }

        #[test]
        fn prop_score_monotonic_in_frame_rate(fps in 0.0f64..30.0, d in 0.0f64..30.0) {
            let hi = (fps + d).min(30.0);
            let a = VideoMetrics { frame_rate: Some(fps), ..base() };
            let b = VideoMetrics { frame_rate: Some(hi), ..base() };
            prop_assert!(quality_score(&b) >= quality_score(&a));
        }

        #[test]
        fn prop_score_monotonic_in_size(size in 0u64..(4u64 << 30), d in 0u64..(1u64 << 30)) {
            let a = VideoMetrics { size_bytes: size, ..base() };
            let b = VideoMetrics { size_bytes: size + d, ..base() };
            prop_assert!(quality_score(&b) >= quality_score(&a));
        }

        #[test]
        fn prop_terms_never_negative(w in 0u32..10000, h in 0u32..10000, fps in 0.0f64..240.0, br in 0u64..u32::MAX as u64) {
            let m = VideoMetrics {
                width: Some(w),
                height: Some(h),
                frame_rate: Some(fps),
                bit_rate: Some(br),
                ..VideoMetrics::default()
            };
            prop_assert!(resolution_term(&m) >= 0.0);
            prop_assert!(bitrate_term(&m) >= 0.0);
            prop_assert!(frame_rate_term(&m) >= 0.0);
            prop_assert!(size_term(&m) >= 0.0);
        }
    }
}
