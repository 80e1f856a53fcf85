//! Configuration file parser for ~/.config/catchup/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are silently ignored by serde, though we log a warning when
//! the file contains potential typos.
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid feed URL: {0}")]
    InvalidFeedUrl(String),

    #[error("Invalid refresh interval: {0}")]
    InvalidRefreshInterval(String),
}

// ============================================================================
// Configuration Struct
// ============================================================================

/// Default feed when neither config nor CLI names one.
pub const DEFAULT_FEED_URL: &str = "https://blog.rust-lang.org/feed.xml";

/// Rolling window default: two years.
pub const DEFAULT_CUTOFF_DAYS: u64 = 730;

/// Upper bound on the auto-refresh interval (one week). Keeps the
/// seconds conversion far away from u64 overflow.
pub const MAX_REFRESH_INTERVAL_MINUTES: u64 = 60 * 24 * 7;

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be
/// specified. Missing keys fall back to `Default::default()`.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The feed to follow.
    pub feed_url: String,

    /// Rolling retention window in days; items published earlier than
    /// now-minus-this never appear in the list and are pruned from the store.
    pub cutoff_days: u64,

    /// Refresh interval in minutes. 0 = manual refresh only.
    pub refresh_interval_minutes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed_url: DEFAULT_FEED_URL.to_string(),
            cutoff_days: DEFAULT_CUTOFF_DAYS,
            refresh_interval_minutes: 0,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → silently accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading so a corrupted file cannot exhaust
        // memory.
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        // Parse as a raw table first to warn about unknown keys
        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = ["feed_url", "cutoff_days", "refresh_interval_minutes"];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        tracing::info!(path = %path.display(), feed = %config.feed_url, "Loaded configuration");
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.feed_url)
            .map_err(|e| ConfigError::InvalidFeedUrl(format!("{}: {}", self.feed_url, e)))?;
        if self.refresh_interval_minutes > MAX_REFRESH_INTERVAL_MINUTES {
            return Err(ConfigError::InvalidRefreshInterval(format!(
                "{} minutes (max {})",
                self.refresh_interval_minutes, MAX_REFRESH_INTERVAL_MINUTES
            )));
        }
        Ok(())
    }

    /// Epoch-seconds cutoff for the rolling window, relative to now.
    pub fn cutoff_timestamp(&self) -> i64 {
        let window = chrono::Duration::days(self.cutoff_days as i64);
        (chrono::Utc::now() - window).timestamp()
    }
}

// ============================================================================
// Tests
// ============================================================================
