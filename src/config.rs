use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};

/// Optional config file looked up next to the install-location state file
pub const CONFIG_FILE: &str = "installer.toml";

/// Installer configuration (mirrors upstream Ollama defaults).
///
/// Every field is optional in the file; missing ones keep their default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallerConfig {
    /// GitHub `owner/name` publishing the releases
    pub repository: String,
    pub api_base: String,
    /// Local endpoint answering below 400 once the server accepts requests
    pub health_url: String,
    /// Arguments run against the executable once `start` sees it healthy.
    /// Empty skips the post-start command.
    pub post_start: Vec<String>,
    pub version_check_attempts: u32,
    pub retry_interval_secs: u64,
    pub health_poll_interval_secs: u64,
    /// Give up waiting for the health endpoint after this long.
    /// Unset waits forever.
    pub start_timeout_secs: Option<u64>,
    /// Use this asset name instead of the platform's own
    pub asset_name: Option<String>,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            repository: "ollama/ollama".into(),
            api_base: "https://api.github.com".into(),
            health_url: "http://localhost:11434/api/tags".into(),
            post_start: vec!["pull".into(), "tinyllama".into()],
            version_check_attempts: 10,
            retry_interval_secs: 1,
            health_poll_interval_secs: 1,
            start_timeout_secs: None,
            asset_name: None,
        }
    }
}

impl InstallerConfig {
    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, `installer.toml` in
    /// `state_dir` is used when present, and defaults otherwise. The file is
    /// never created.
    pub fn load(explicit: Option<&Path>, state_dir: &Path) -> Result<Self> {
        let path: PathBuf = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let candidate = state_dir.join(CONFIG_FILE);
                if !candidate.is_file() {
                    return Ok(Self::default());
                }
                candidate
            }
        };

        let cfg_str = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg: Self = toml::from_str(&cfg_str)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;

        info!("Using config from: {}", path.display());
        Ok(cfg)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    pub fn health_poll_interval(&self) -> Duration {
        Duration::from_secs(self.health_poll_interval_secs)
    }

    pub fn start_timeout(&self) -> Option<Duration> {
        self.start_timeout_secs.map(Duration::from_secs)
    }
}
