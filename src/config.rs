use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_LOG_PATH: &str = "followers.txt";
pub const DEFAULT_COUNTER_PATH: &str = "follower_counter.txt";
/// GitHub caps list endpoints at 100 entries per page
pub const MAX_PER_PAGE: u32 = 100;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitHubConfig {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub token: String,
    pub api_url: Option<String>,
    pub per_page: Option<u32>,
    pub timeout_secs: Option<u64>,
}

impl GitHubConfig {
    pub fn api_url(&self) -> &str {
        self.api_url.as_deref().unwrap_or(DEFAULT_API_URL)
    }

    pub fn per_page(&self) -> u32 {
        self.per_page.unwrap_or(MAX_PER_PAGE)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(30))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    pub log_path: Option<PathBuf>,
    pub counter_path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn log_path(&self) -> PathBuf {
        self.log_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_PATH))
    }

    pub fn counter_path(&self) -> PathBuf {
        self.counter_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_COUNTER_PATH))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
}

impl RetryConfig {
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.unwrap_or(3)
    }

    pub fn base_delay_ms(&self) -> u64 {
        self.base_delay_ms.unwrap_or(1000)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: Option<String>,
}

impl Config {
    /// Load configuration from an optional TOML file, then apply environment variable overrides
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config_file = match config_path {
            Some(path) => Some(path),
            None => Self::find_config_file(),
        };

        let mut config = match config_file {
            Some(path) if path.exists() => {
                tracing::debug!("Loading config from: {}", path.display());
                let content = std::fs::read_to_string(&path)?;
                toml::from_str::<Config>(&content)?
            }
            _ => {
                tracing::debug!("No config file found, using environment variables only");
                Config::default()
            }
        };

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// `./followback.toml`, then `$XDG_CONFIG_HOME/followback/followback.toml`
    /// (or `~/.config/followback/followback.toml`)
    fn find_config_file() -> Option<PathBuf> {
        let current_dir_config = PathBuf::from("followback.toml");
        if current_dir_config.exists() {
            return Some(current_dir_config);
        }

        let config_home = env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|_| env::var("HOME").map(|home| PathBuf::from(home).join(".config")))
            .ok()?;

        let xdg_config = config_home.join("followback").join("followback.toml");
        xdg_config.exists().then_some(xdg_config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(user) = env::var("GITHUB_USER") {
            self.github.user = user;
        }
        if let Ok(token) = env::var("PERSONAL_GITHUB_TOKEN") {
            self.github.token = token;
        }
        if let Ok(api_url) = env::var("FOLLOWBACK_API_URL") {
            self.github.api_url = Some(api_url);
        }
        if let Ok(per_page) = env::var("FOLLOWBACK_PER_PAGE") {
            self.github.per_page = Some(per_page.parse().map_err(|_| {
                ConfigError::InvalidValue("FOLLOWBACK_PER_PAGE must be a valid number".to_string())
            })?);
        }
        if let Ok(timeout) = env::var("FOLLOWBACK_TIMEOUT_SECS") {
            self.github.timeout_secs = Some(timeout.parse().map_err(|_| {
                ConfigError::InvalidValue(
                    "FOLLOWBACK_TIMEOUT_SECS must be a valid number".to_string(),
                )
            })?);
        }

        if let Ok(log_path) = env::var("FOLLOWBACK_LOG_FILE") {
            self.storage.log_path = Some(PathBuf::from(log_path));
        }
        if let Ok(counter_path) = env::var("FOLLOWBACK_COUNTER_FILE") {
            self.storage.counter_path = Some(PathBuf::from(counter_path));
        }

        if let Ok(max_attempts) = env::var("FOLLOWBACK_RETRY_MAX_ATTEMPTS") {
            self.retry.max_attempts = Some(max_attempts.parse().map_err(|_| {
                ConfigError::InvalidValue(
                    "FOLLOWBACK_RETRY_MAX_ATTEMPTS must be a valid number".to_string(),
                )
            })?);
        }
        if let Ok(base_delay) = env::var("FOLLOWBACK_RETRY_BASE_DELAY_MS") {
            self.retry.base_delay_ms = Some(base_delay.parse().map_err(|_| {
                ConfigError::InvalidValue(
                    "FOLLOWBACK_RETRY_BASE_DELAY_MS must be a valid number".to_string(),
                )
            })?);
        }

        if let Ok(level) = env::var("FOLLOWBACK_LOG_LEVEL") {
            self.logging.level = Some(level);
        }

        Ok(())
    }

    /// Credentials must be present before any network call is attempted
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.github.user.trim().is_empty() {
            return Err(ConfigError::MissingRequired(
                "github.user or GITHUB_USER".to_string(),
            ));
        }

        if self.github.token.trim().is_empty() {
            return Err(ConfigError::MissingRequired(
                "github.token or PERSONAL_GITHUB_TOKEN".to_string(),
            ));
        }

        let api_url = Url::parse(self.github.api_url())
            .map_err(|e| ConfigError::InvalidValue(format!("github.api_url: {e}")))?;
        if !matches!(api_url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidValue(
                "github.api_url must be an http(s) URL".to_string(),
            ));
        }

        let per_page = self.github.per_page();
        if per_page == 0 || per_page > MAX_PER_PAGE {
            return Err(ConfigError::InvalidValue(format!(
                "github.per_page must be between 1 and {MAX_PER_PAGE}"
            )));
        }

        if self.retry.max_attempts() == 0 {
            return Err(ConfigError::InvalidValue(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
