use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::{RetryPolicy, RetryScope};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub retry: RetryConfig,
  #[serde(default)]
  pub export: ExportConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// API origin, e.g. http://localhost:8080/api/v1
  #[serde(default = "default_api_url")]
  pub url: String,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      url: default_api_url(),
      timeout_secs: default_timeout_secs(),
    }
  }
}

fn default_api_url() -> String {
  "http://localhost:8080/api/v1".to_string()
}

fn default_timeout_secs() -> u64 {
  30
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// How long a read result is served from memory
  #[serde(default = "default_cache_timeout_ms")]
  pub timeout_ms: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      timeout_ms: default_cache_timeout_ms(),
    }
  }
}

fn default_true() -> bool {
  true
}

fn default_cache_timeout_ms() -> u64 {
  5 * 60 * 1000
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
  /// Extra attempts after the first failure
  #[serde(default = "default_retry_attempts")]
  pub attempts: u32,
  #[serde(default)]
  pub scope: RetryScope,
  #[serde(default)]
  pub delay_ms: u64,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      attempts: default_retry_attempts(),
      scope: RetryScope::default(),
      delay_ms: 0,
    }
  }
}

fn default_retry_attempts() -> u32 {
  3
}

impl RetryConfig {
  pub fn policy(&self) -> RetryPolicy {
    RetryPolicy::new(self.attempts)
      .with_scope(self.scope)
      .with_delay(Duration::from_millis(self.delay_ms))
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
  #[serde(default = "default_poll_interval_ms")]
  pub poll_interval_ms: u64,
  /// Maximum time a job may stay pending/processing before it is reported as timed out
  #[serde(default = "default_watchdog_ms")]
  pub watchdog_ms: u64,
  /// Extra attempts for a failed status poll (0 = fail on first error)
  #[serde(default)]
  pub poll_retry_attempts: u32,
}

impl Default for ExportConfig {
  fn default() -> Self {
    Self {
      poll_interval_ms: default_poll_interval_ms(),
      watchdog_ms: default_watchdog_ms(),
      poll_retry_attempts: 0,
    }
  }
}

fn default_poll_interval_ms() -> u64 {
  2000
}

fn default_watchdog_ms() -> u64 {
  5 * 60 * 1000
}

impl ExportConfig {
  pub fn poll_interval(&self) -> Duration {
    Duration::from_millis(self.poll_interval_ms)
  }

  pub fn watchdog_timeout(&self) -> Duration {
    Duration::from_millis(self.watchdog_ms)
  }

  pub fn poll_retry(&self) -> RetryPolicy {
    RetryPolicy::new(self.poll_retry_attempts)
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./stockline.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/stockline/config.yaml
  ///
  /// Without a file every setting takes its default. `STOCKLINE_API_URL`
  /// overrides the API origin either way.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };

    if let Ok(url) = std::env::var("STOCKLINE_API_URL") {
      config.api.url = url;
    }

    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("stockline.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("stockline").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    url::Url::parse(&self.api.url)
      .map_err(|e| eyre!("Invalid API url '{}': {}", self.api.url, e))?;

    if self.export.poll_interval_ms == 0 {
      return Err(eyre!("export.poll_interval_ms must be greater than zero"));
    }

    Ok(())
  }

  /// Get the API bearer token from environment variables.
  ///
  /// Checks STOCKLINE_API_TOKEN first, then STOCKLINE_TOKEN as fallback.
  /// Requests are sent unauthenticated when neither is set.
  pub fn get_api_token() -> Option<String> {
    std::env::var("STOCKLINE_API_TOKEN")
      .or_else(|_| std::env::var("STOCKLINE_TOKEN"))
      .ok()
      .filter(|token| !token.is_empty())
  }

  /// Directory for log files.
  pub fn log_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("stockline").join("logs"))
  }
}
