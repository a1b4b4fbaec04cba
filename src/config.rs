//! Configuration file parser for `friendlink.toml`.
//!
//! The config file is optional and a missing file yields `Config::default()`.
//! Unknown keys are accepted but logged, since they are usually typos.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::status::DEFAULT_STATUS_API;

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
}

// ============================================================================
// Configuration Struct
// ============================================================================

/// Settings for status checks and feed reading.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Site root that `friends_dir` is resolved against.
    pub content_root: PathBuf,

    /// Directory of friend documents, relative to `content_root` unless absolute.
    pub friends_dir: PathBuf,

    /// Third-party status lookup endpoint, queried with `?url=<site>`.
    pub status_api_url: String,

    /// User-Agent sent with every outgoing request.
    pub user_agent: String,

    pub lookup_timeout_secs: u64,
    pub direct_timeout_secs: u64,

    /// Pause after each probed friend, in milliseconds. 0 disables pacing.
    pub pace_millis: u64,

    pub feed_timeout_secs: u64,

    /// Maximum number of feeds fetched at once.
    pub feed_concurrency: usize,

    /// Default number of entries shown by `friendlink feeds`.
    pub recent_feed_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            content_root: PathBuf::from("."),
            friends_dir: PathBuf::from("src/content/friends"),
            status_api_url: DEFAULT_STATUS_API.to_string(),
            user_agent: "Mozilla/5.0 (compatible; FriendLinkChecker/1.0)".to_string(),
            lookup_timeout_secs: 5,
            direct_timeout_secs: 10,
            pace_millis: 1000,
            feed_timeout_secs: 30,
            feed_concurrency: 10,
            recent_feed_limit: 10,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 10] = [
        "content_root",
        "friends_dir",
        "status_api_url",
        "user_agent",
        "lookup_timeout_secs",
        "direct_timeout_secs",
        "pace_millis",
        "feed_timeout_secs",
        "feed_concurrency",
        "recent_feed_limit",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
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
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        Self::from_toml_str(&content, path)
    }

    fn from_toml_str(content: &str, path: &Path) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        tracing::info!(
            path = %path.display(),
            friends_dir = %config.friends_path().display(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Friends directory resolved against the content root.
    pub fn friends_path(&self) -> PathBuf {
        self.content_root.join(&self.friends_dir)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.lookup_timeout_secs)
    }

    pub fn direct_timeout(&self) -> Duration {
        Duration::from_secs(self.direct_timeout_secs)
    }

    pub fn pace(&self) -> Duration {
        Duration::from_millis(self.pace_millis)
    }

    pub fn feed_timeout(&self) -> Duration {
        Duration::from_secs(self.feed_timeout_secs)
    }
}

// ============================================================================
// Tests
// ============================================================================
