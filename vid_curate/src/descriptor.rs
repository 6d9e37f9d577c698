//! Video descriptors and the metadata provider seam
//!
//! A [`VideoDescriptor`] is produced once per file by a [`MetadataProvider`]
//! and never mutated afterwards. Scores, decisions and matches are separate
//! values derived from it.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use shared_utils::ffprobe::{probe_video, FFprobeError};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Numeric fields that comparisons read from a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Duration,
    Width,
    Height,
    BitRate,
    FrameRate,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::FrameRate,
        Metric::Width,
        Metric::Height,
        Metric::BitRate,
        Metric::Duration,
    ];
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Metric::Duration => "duration",
            Metric::Width => "width",
            Metric::Height => "height",
            Metric::BitRate => "bit rate",
            Metric::FrameRate => "frame rate",
        };
        f.write_str(label)
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricError {
    #[error("{0} is missing or not numeric")]
    Missing(Metric),
}

/// Technical fields of a successfully probed file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoMetrics {
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Frames per second, rounded to two decimals
    pub frame_rate: Option<f64>,
    /// Bits per second
    pub bit_rate: Option<u64>,
    /// Seconds
    pub duration: Option<f64>,
    pub size_bytes: u64,
    /// Lower-cased short codec name
    pub codec: Option<String>,
}

impl VideoMetrics {
    pub fn metric(&self, metric: Metric) -> Result<f64, MetricError> {
        let value = match metric {
            Metric::Duration => self.duration,
            Metric::Width => self.width.map(f64::from),
            Metric::Height => self.height.map(f64::from),
            Metric::BitRate => self.bit_rate.map(|b| b as f64),
            Metric::FrameRate => self.frame_rate,
        };
        value
            .filter(|v| v.is_finite())
            .ok_or(MetricError::Missing(metric))
    }

    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / (1024.0 * 1024.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum ProbeStatus {
    Ok(VideoMetrics),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoDescriptor {
    pub path: PathBuf,
    pub status: ProbeStatus,
}

impl VideoDescriptor {
    pub fn ok(path: impl Into<PathBuf>, metrics: VideoMetrics) -> Self {
        Self {
            path: path.into(),
            status: ProbeStatus::Ok(metrics),
        }
    }

    pub fn failed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            status: ProbeStatus::Failed(reason.into()),
        }
    }

    pub fn metrics(&self) -> Option<&VideoMetrics> {
        match &self.status {
            ProbeStatus::Ok(m) => Some(m),
            ProbeStatus::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&str> {
        match &self.status {
            ProbeStatus::Ok(_) => None,
            ProbeStatus::Failed(reason) => Some(reason),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.metrics().is_some()
    }

    pub fn folder(&self) -> Option<&Path> {
        self.path.parent()
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Turns a path into a descriptor. Implementations never fail past this
/// boundary: every problem becomes [`ProbeStatus::Failed`].
pub trait MetadataProvider: Send + Sync {
    fn probe(&self, path: &Path) -> VideoDescriptor;
}

/// Provider backed by the `ffprobe` binary.
#[derive(Debug, Clone)]
pub struct FfprobeProvider {
    pub timeout: Duration,
}

impl FfprobeProvider {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl MetadataProvider for FfprobeProvider {
    fn probe(&self, path: &Path) -> VideoDescriptor {
        let size_bytes = match std::fs::metadata(path) {
            Ok(m) => m.len(),
            Err(e) => return VideoDescriptor::failed(path, format!("unreadable file: {}", e)),
        };

        match probe_video(path, Some(self.timeout)) {
            Ok(probe) => {
                debug!(path = %path.display(), codec = ?probe.codec_name, "probed");
                VideoDescriptor::ok(
                    path,
                    VideoMetrics {
                        width: probe.width,
                        height: probe.height,
                        frame_rate: probe.frame_rate,
                        bit_rate: probe.bit_rate,
                        duration: probe.duration,
                        size_bytes,
                        codec: probe.codec_name,
                    },
                )
            }
            Err(e) => {
                let reason = match &e {
                    FFprobeError::Timeout(t) => format!("ffprobe timed out after {}s", t.as_secs()),
                    other => other.to_string(),
                };
                VideoDescriptor::failed(path, reason)
            }
        }
    }
}

/// Probe pools by thread count, built on first use and shared by every later call.
static PROBE_POOLS: OnceLock<Mutex<HashMap<usize, Arc<ThreadPool>>>> = OnceLock::new();

fn probe_pool(workers: usize) -> Option<Arc<ThreadPool>> {
    let mut pools = PROBE_POOLS.get_or_init(Default::default).lock().ok()?;
    if let Some(pool) = pools.get(&workers) {
        return Some(Arc::clone(pool));
    }

    match ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("probe-{}", i))
        .build()
    {
        Ok(pool) => {
            debug!(workers, "Created probe pool");
            let pool = Arc::new(pool);
            pools.insert(workers, Arc::clone(&pool));
            Some(pool)
        }
        Err(e) => {
            warn!(error = %e, "Failed to create probe pool, probing sequentially");
            None
        }
    }
}

/// Probe every path with at most `workers` concurrent probes.
///
/// The result is in input order regardless of completion order.
pub fn probe_all<P>(provider: &P, paths: &[PathBuf], workers: usize) -> Vec<VideoDescriptor>
where
    P: MetadataProvider + ?Sized,
{
    if workers <= 1 || paths.len() <= 1 {
        return paths.iter().map(|p| provider.probe(p)).collect();
    }

    match probe_pool(workers) {
        Some(pool) => pool.install(|| paths.par_iter().map(|p| provider.probe(p)).collect()),
        None => paths.iter().map(|p| provider.probe(p)).collect(),
    }
}

/// Pool size used by the tools when the config does not say: half the cores, 1..=4.
pub fn default_probe_workers() -> usize {
    (num_cpus::get() / 2).clamp(1, 4)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider answering from a fixed table; unknown paths fail.
    #[derive(Default)]
    pub struct FakeProvider {
        pub entries: HashMap<PathBuf, VideoMetrics>,
        pub calls: AtomicUsize,
    }

    impl FakeProvider {
        pub fn with(mut self, path: impl Into<PathBuf>, metrics: VideoMetrics) -> Self {
            self.entries.insert(path.into(), metrics);
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl MetadataProvider for FakeProvider {
        fn probe(&self, path: &Path) -> VideoDescriptor {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.entries.get(path) {
                Some(m) => VideoDescriptor::ok(path, m.clone()),
                None => VideoDescriptor::failed(path, "no probe data"),
            }
        }
    }

    pub fn metrics(width: u32, height: u32, bit_rate: u64, size_mb: u64) -> VideoMetrics {
        VideoMetrics {
            width: Some(width),
            height: Some(height),
            frame_rate: Some(30.0),
            bit_rate: Some(bit_rate),
            duration: Some(600.0),
            size_bytes: size_mb * 1024 * 1024,
            codec: Some("h264".to_string()),
        }
    }
}
