use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

pub const DEFAULT_API_URL: &str = "https://autologout.yiays.com";
const CONFIG_FILE_NAME: &str = "config.toml";
const DATABASE_FILE_NAME: &str = "autologout-sync.db";

/// Runtime configuration. Read from `config.toml` in the platform config
/// directory, then overridden by `AUTOLOGOUT_*` environment variables (a `.env`
/// file in the working directory is honoured).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub data_dir: Option<PathBuf>,
    pub request_timeout_secs: u64,
    /// Accounts synced more recently than this are not refetched at startup
    pub refresh_recency_minutes: u64,
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            data_dir: None,
            request_timeout_secs: 30,
            refresh_recency_minutes: 15,
            log_filter: "autologout_sync=info".to_string(),
        }
    }
}

impl Config {
    /// Load from the default location, or from `path` when given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv::dotenv().ok();

        let path = path.map(Path::to_path_buf).or_else(default_config_path);
        let mut config = match path {
            Some(path) if path.exists() => {
                let config = Self::from_file(&path)?;
                info!("Loaded configuration from {:?}", path);
                config
            }
            _ => {
                debug!("No configuration file, using defaults");
                Self::default()
            }
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.api_url()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("Failed to parse configuration")
    }

    /// Apply overrides from a variable lookup (the process environment in practice).
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("AUTOLOGOUT_API_URL") {
            self.api_base_url = url;
        }
        if let Some(dir) = lookup("AUTOLOGOUT_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(filter) = lookup("AUTOLOGOUT_LOG") {
            self.log_filter = filter;
        }
    }

    pub fn api_url(&self) -> Result<Url> {
        Url::parse(&self.api_base_url)
            .with_context(|| format!("Invalid API base URL: {}", self.api_base_url))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn recency_threshold(&self) -> Duration {
        Duration::from_secs(self.refresh_recency_minutes * 60)
    }

    /// Directory holding the database, falling back to `.autologout-sync`.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .or_else(|| project_dirs().map(|dirs| dirs.data_dir().to_path_buf()))
            .unwrap_or_else(|| PathBuf::from(".autologout-sync"))
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join(DATABASE_FILE_NAME)
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "yiays", "autologout-sync")
}

fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}
