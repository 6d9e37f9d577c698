//! Tool configuration
//!
//! Loaded once by the binary and passed down as a value. A missing file
//! means defaults; unknown keys are ignored so older files keep working.

use crate::descriptor::default_probe_workers;
use crate::similarity::MatchThresholds;
use serde::{Deserialize, Serialize};
use shared_utils::batch::default_video_extensions;
use shared_utils::codecs::CodecEfficiencyTable;
use shared_utils::errors::{CurateError, Result};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurateConfig {
    #[serde(alias = "ROOT_DIR", skip_serializing_if = "Option::is_none")]
    pub root_dir: Option<PathBuf>,
    pub video_extensions: Vec<String>,
    pub probe_timeout_secs: u64,
    pub encode_timeout_secs: u64,
    pub probe_workers: usize,
    pub target_codec: String,
    pub quality_preset: String,
    pub backup_originals: bool,
    pub preserve_timestamps: bool,
    pub match_thresholds: MatchThresholds,
    pub codec_efficiency: CodecEfficiencyTable,
}

impl Default for CurateConfig {
    fn default() -> Self {
        Self {
            root_dir: None,
            video_extensions: default_video_extensions(),
            probe_timeout_secs: 30,
            encode_timeout_secs: 6 * 60 * 60,
            probe_workers: default_probe_workers(),
            target_codec: "h265".to_string(),
            quality_preset: "fast".to_string(),
            backup_originals: false,
            preserve_timestamps: true,
            match_thresholds: MatchThresholds::default(),
            codec_efficiency: CodecEfficiencyTable::default(),
        }
    }
}

impl CurateConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn encode_timeout(&self) -> Duration {
        Duration::from_secs(self.encode_timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.video_extensions.is_empty() {
            return Err(CurateError::Config("video_extensions must not be empty".into()));
        }
        if self.probe_workers == 0 {
            return Err(CurateError::Config("probe_workers must be at least 1".into()));
        }
        if self.probe_timeout_secs == 0 || self.encode_timeout_secs == 0 {
            return Err(CurateError::Config("timeouts must be at least 1 second".into()));
        }
        let t = &self.match_thresholds;
        if !(t.duration > 0.0 && t.width > 0.0 && t.height > 0.0) {
            return Err(CurateError::Config("match_thresholds must be positive".into()));
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<CurateConfig> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(CurateConfig::default());
        }
        Err(e) => return Err(CurateError::filesystem("read", path, e)),
    };

    let config: CurateConfig = serde_json::from_str(&text)
        .map_err(|e| CurateError::Config(format!("{}: {}", path.display(), e)))?;
    config.validate()?;
    Ok(config)
}

pub fn save_config(path: &Path, config: &CurateConfig) -> Result<()> {
    let text = serde_json::to_string_pretty(config)
        .map_err(|e| CurateError::Config(e.to_string()))?;
    std::fs::write(path, text).map_err(|e| CurateError::filesystem("write", path, e))
}

/// Root directory for this run: `--root`, then the config, then the prompt.
///
/// `prompt` returns `None` when no more input is available. A prompted
/// directory is written back to the config file.
pub fn resolve_root_dir<F>(
    cli_root: Option<PathBuf>,
    config: &mut CurateConfig,
    config_path: &Path,
    mut prompt: F,
) -> Result<PathBuf>
where
    F: FnMut() -> io::Result<Option<String>>,
{
    if let Some(root) = cli_root {
        return if root.is_dir() {
            Ok(root)
        } else {
            Err(CurateError::DirectoryNotFound(root))
        };
    }

    if let Some(root) = config.root_dir.as_ref().filter(|r| r.is_dir()) {
        return Ok(root.clone());
    }

    loop {
        let answer = prompt()?
            .ok_or_else(|| CurateError::Config("no root directory given".into()))?;
        let candidate = PathBuf::from(answer.trim());
        if candidate.as_os_str().is_empty() || !candidate.is_dir() {
            warn!(path = %candidate.display(), "Invalid directory, try again");
            continue;
        }

        config.root_dir = Some(candidate.clone());
        save_config(config_path, config)?;
        info!(root = %candidate.display(), config = %config_path.display(), "Saved root directory");
        return Ok(candidate);
    }
}
