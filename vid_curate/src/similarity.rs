//! Cross-folder similarity matching
//!
//! Pairwise O(n²) scan over the probed videos that survive duplicate
//! resolution in their own folder. A pair matches when duration and both
//! dimensions are within tolerance. Matching is greedy in index order: once a descriptor is part of a match it is
//! never considered again, even if a closer partner appears later.
//!
//! Matches are informational only; nothing here touches the filesystem.

use crate::descriptor::{Metric, MetricError, VideoDescriptor, VideoMetrics};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchThresholds {
    /// Seconds, exclusive
    pub duration: f64,
    /// Pixels, exclusive
    pub width: f64,
    /// Pixels, exclusive
    pub height: f64,
}

impl Default for MatchThresholds {
    fn default() -> Self {
        Self {
            duration: 2.0,
            width: 32.0,
            height: 32.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityMatch {
    /// Index into the matcher input
    pub first: usize,
    pub second: usize,
    pub first_path: PathBuf,
    pub second_path: PathBuf,
    pub duration_diff: f64,
    pub width_diff: f64,
    pub height_diff: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Deltas {
    duration: f64,
    width: f64,
    height: f64,
}

fn deltas(a: &VideoMetrics, b: &VideoMetrics) -> Result<Deltas, MetricError> {
    Ok(Deltas {
        duration: (a.metric(Metric::Duration)? - b.metric(Metric::Duration)?).abs(),
        width: (a.metric(Metric::Width)? - b.metric(Metric::Width)?).abs(),
        height: (a.metric(Metric::Height)? - b.metric(Metric::Height)?).abs(),
    })
}

impl Deltas {
    fn within(&self, t: &MatchThresholds) -> bool {
        self.duration < t.duration && self.width < t.width && self.height < t.height
    }
}

/// Find likely duplicates stored in different folders.
///
/// Failed descriptors, pairs with a missing metric, and pairs in the same
/// folder are skipped without consuming either side.
pub fn find_cross_folder_matches(
    descriptors: &[VideoDescriptor],
    thresholds: &MatchThresholds,
) -> Vec<SimilarityMatch> {
    let matched = vec![false; descriptors.len()];
    greedy_match(descriptors, thresholds, matched)
}

fn greedy_match(
    descriptors: &[VideoDescriptor],
    thresholds: &MatchThresholds,
    mut matched: Vec<bool>,
) -> Vec<SimilarityMatch> {
    let mut matches = Vec::new();

    for i in 0..descriptors.len() {
        if matched[i] {
            continue;
        }
        let Some(a) = descriptors[i].metrics() else {
            continue;
        };

        for j in (i + 1)..descriptors.len() {
            if matched[j] {
                continue;
            }
            let Some(b) = descriptors[j].metrics() else {
                continue;
            };
            if descriptors[i].folder() == descriptors[j].folder() {
                continue;
            }
            let Ok(d) = deltas(a, b) else {
                continue;
            };

            if d.within(thresholds) {
                matched[i] = true;
                matched[j] = true;
                matches.push(SimilarityMatch {
                    first: i,
                    second: j,
                    first_path: descriptors[i].path.clone(),
                    second_path: descriptors[j].path.clone(),
                    duration_diff: d.duration,
                    width_diff: d.width,
                    height_diff: d.height,
                });
                break;
            }
        }
    }

    matches
}
