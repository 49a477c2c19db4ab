use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::encoding::{DEFAULT_BINARY, DEFAULT_PROBE_BINARY, Encoding, EncodingOptions};
use crate::error::{EncodeError, Result};

/// File looked up in the working directory when no path is given.
pub const DEFAULT_SETTINGS_FILE: &str = "ffencode.toml";

fn default_binary() -> PathBuf {
    PathBuf::from(DEFAULT_BINARY)
}

fn default_probe_binary() -> PathBuf {
    PathBuf::from(DEFAULT_PROBE_BINARY)
}

fn default_max_concurrent_jobs() -> usize {
    2
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Path to the ffmpeg binary
    #[serde(default = "default_binary")]
    pub binary: PathBuf,
    /// Path to the ffprobe binary
    #[serde(default = "default_probe_binary")]
    pub probe_binary: PathBuf,
    /// ffmpeg `-loglevel` for every job
    #[serde(default)]
    pub log_level: Option<String>,
    /// ffmpeg `-threads` for every job
    #[serde(default)]
    pub threads: Option<u32>,
    /// Jobs running at the same time in batch mode
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    /// Output options shared by every job, e.g.
    /// `video_codec = "libx264"` or `args = ["-movflags", "+faststart"]`
    #[serde(default)]
    pub defaults: EncodingOptions,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            probe_binary: default_probe_binary(),
            log_level: None,
            threads: None,
            max_concurrent_jobs: default_max_concurrent_jobs(),
            defaults: EncodingOptions::default(),
        }
    }
}

impl Settings {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            EncodeError::Config(format!(
                "Failed to read settings file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let settings: Settings = toml::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| EncodeError::Config(format!("Failed to serialize settings: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| EncodeError::Config(format!("Failed to write settings file: {}", e)))?;

        Ok(())
    }

    /// `explicit` if given, else `ffencode.toml` in `dir` when present,
    /// else defaults.
    pub fn discover(explicit: Option<&Path>, dir: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        let candidate = dir.join(DEFAULT_SETTINGS_FILE);
        if candidate.exists() {
            Self::from_file(candidate)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_jobs == 0 {
            return Err(EncodeError::Config(
                "max_concurrent_jobs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Fill the gaps of `encoding` with these settings. Values already set
    /// on the encoding win.
    pub fn apply(&self, encoding: &mut Encoding) {
        let mut base = Encoding::new();
        base.set_binary(&self.binary)
            .set_probe_binary(&self.probe_binary);
        if let Some(level) = &self.log_level {
            base.set_log_level(level);
        }
        if let Some(threads) = self.threads {
            base.set_threads(threads);
        }
        base.shared_mut().merge(&self.defaults);

        encoding.rebase(&base);
    }

    /// Template for new jobs.
    pub fn template(&self) -> Encoding {
        let mut encoding = Encoding::new();
        self.apply(&mut encoding);
        encoding
    }
}
