use anyhow::{Context, Result};
use mird_fetch::HttpClientConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "mird.toml";
pub const SAVE_DIR_ENV: &str = "MIRD_SAVE_DIR";
const DEFAULT_SAVE_DIR: &str = "data";

/// The main configuration file structure (mird.toml)
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MirdConfig {
    /// HTTP transport settings
    pub http: HttpSection,

    /// Acquisition defaults
    pub acquire: AcquireSection,
}

/// HTTP transport configuration
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct HttpSection {
    /// Whole-request timeout in seconds
    pub timeout_secs: Option<u64>,

    /// Idle timeout between reads of a response, in seconds
    pub read_timeout_secs: Option<u64>,

    /// Connection timeout in seconds
    pub connect_timeout_secs: Option<u64>,

    /// Retries for server errors (0 disables retrying)
    pub max_retries: Option<u32>,

    /// Base delay between retries in milliseconds
    pub retry_delay_ms: Option<u64>,

    pub user_agent: Option<String>,

    pub proxy: Option<String>,
}

/// Acquisition defaults, overridden by command-line flags
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AcquireSection {
    /// Directory datasets are saved to
    pub save_dir: Option<PathBuf>,

    /// Concurrent transfers
    pub jobs: Option<usize>,

    /// Remove archives after extraction
    pub cleanup: bool,

    /// Re-download existing files
    pub force_overwrite: bool,
}

impl MirdConfig {
    /// Load configuration from mird.toml, searching upward from the given directory
    pub fn load(start_dir: &Path) -> Result<Option<Self>> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE);

            if config_path.exists() {
                return Self::load_file(&config_path).map(Some);
            }

            if !current.pop() {
                return Ok(None);
            }
        }
    }

    /// Load an explicit configuration file
    pub fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: MirdConfig =
            toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Explicit file if given, else search upward from the working directory
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load_file(path),
            None => {
                let cwd = std::env::current_dir()?;
                Ok(Self::load(&cwd)?.unwrap_or_default())
            }
        }
    }

    pub fn http_config(&self) -> HttpClientConfig {
        let mut config = HttpClientConfig::new();
        if let Some(secs) = self.http.timeout_secs {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = self.http.read_timeout_secs {
            config = config.with_read_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = self.http.connect_timeout_secs {
            config = config.with_connect_timeout(Duration::from_secs(secs));
        }
        if let Some(retries) = self.http.max_retries {
            config = config.with_max_retries(retries);
        }
        if let Some(ms) = self.http.retry_delay_ms {
            config = config.with_retry_delay(Duration::from_millis(ms));
        }
        if let Some(user_agent) = &self.http.user_agent {
            config = config.with_user_agent(user_agent.clone());
        }
        if let Some(proxy) = &self.http.proxy {
            config = config.with_proxy(proxy.clone());
        }
        config
    }

    /// Flag, then environment, then config file, then the default.
    pub fn save_dir(&self, flag: Option<&Path>, env: Option<String>) -> PathBuf {
        flag.map(Path::to_path_buf)
            .or_else(|| env.filter(|v| !v.is_empty()).map(PathBuf::from))
            .or_else(|| self.acquire.save_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SAVE_DIR))
    }
}
