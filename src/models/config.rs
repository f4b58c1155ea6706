//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Fetch pacing and retry behavior
    #[serde(default)]
    pub fetcher: FetcherConfig,

    /// Catalog walk behavior
    #[serde(default)]
    pub walker: WalkerConfig,

    /// Upstream endpoint locations and request headers
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// State file locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.fetcher.max_retries == 0 {
            return Err(AppError::validation("fetcher.max_retries must be > 0"));
        }
        if self.fetcher.timeout_secs == 0 {
            return Err(AppError::validation("fetcher.timeout_secs must be > 0"));
        }
        if self.walker.max_concurrent == 0 {
            return Err(AppError::validation("walker.max_concurrent must be > 0"));
        }
        if self.upstream.base_url.trim().is_empty() {
            return Err(AppError::validation("upstream.base_url is empty"));
        }
        if self.upstream.user_agent.trim().is_empty() {
            return Err(AppError::validation("upstream.user_agent is empty"));
        }
        Ok(())
    }
}

/// Fetch pacing and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// Minimum delay between consecutive upstream requests in milliseconds
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,

    /// Maximum attempts per request (first try included)
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// Base backoff delay in milliseconds; attempt n waits base * 2^(n-1)
    #[serde(default = "defaults::base_backoff")]
    pub base_backoff_ms: u64,

    /// Per-request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            request_delay_ms: defaults::request_delay(),
            max_retries: defaults::max_retries(),
            base_backoff_ms: defaults::base_backoff(),
            timeout_secs: defaults::timeout(),
        }
    }
}

/// Catalog walk settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkerConfig {
    /// Maximum concurrent edge fetches. The Fetcher's pacing still
    /// serializes the actual requests; this bounds in-flight work.
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: defaults::max_concurrent(),
        }
    }
}

/// Upstream catalog endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// API root, e.g. `https://booking.roadsurfer.com/api`
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// Booking-flow root used to build deep links
    #[serde(default = "defaults::booking_url")]
    pub booking_url: String,

    /// User-Agent header for all requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Currency parameter for offer search and booking links
    #[serde(default = "defaults::currency")]
    pub currency: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            booking_url: defaults::booking_url(),
            user_agent: defaults::user_agent(),
            currency: defaults::currency(),
        }
    }
}

/// State file locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding all persisted state files
    #[serde(default = "defaults::state_dir")]
    pub state_dir: PathBuf,

    /// Directory for cached vehicle images
    #[serde(default = "defaults::image_dir")]
    pub image_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state_dir: defaults::state_dir(),
            image_dir: defaults::image_dir(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

/// Default values for configuration fields.
mod defaults {
    use std::path::PathBuf;

    pub fn request_delay() -> u64 {
        100
    }

    pub fn max_retries() -> u32 {
        3
    }

    pub fn base_backoff() -> u64 {
        1_000
    }

    pub fn timeout() -> u64 {
        30
    }

    pub fn max_concurrent() -> usize {
        4
    }

    pub fn base_url() -> String {
        "https://booking.roadsurfer.com/api".to_string()
    }

    pub fn booking_url() -> String {
        "https://booking.roadsurfer.com/en/rally/pick".to_string()
    }

    pub fn user_agent() -> String {
        "rally-scout/0.1".to_string()
    }

    pub fn currency() -> String {
        "EUR".to_string()
    }

    pub fn state_dir() -> PathBuf {
        PathBuf::from("state")
    }

    pub fn image_dir() -> PathBuf {
        PathBuf::from("assets")
    }

    pub fn log_level() -> String {
        "info".to_string()
    }
}
