//! Configuration file parser for ~/.config/feedboard/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde but logged as warnings, since they are
//! usually typos.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

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

    #[error("Invalid relay_url '{url}': {reason}")]
    InvalidRelayUrl { url: String, reason: String },
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Relay endpoint; targets are passed as `?url=<encoded target>`.
    pub relay_url: String,

    /// Image shown for articles with no embedded or discoverable image.
    pub placeholder_image: String,

    /// Per-request timeout for relay fetches, in seconds.
    pub request_timeout_secs: u64,

    /// Largest relay response body accepted, in bytes.
    pub max_response_bytes: usize,

    /// Concurrent feed fetches and image lookups per aggregation pass.
    pub max_concurrent_fetches: usize,

    /// Number of article pages whose discovered image is remembered.
    pub image_cache_capacity: usize,

    /// CSV file used to seed the column store on first run.
    pub seed_csv: Option<PathBuf>,

    /// Relay prefixes found on legacy stored feed URLs. Stripped on add/import.
    pub legacy_relay_prefixes: Vec<String>,

    /// Settings for `feedboard relay`.
    pub relay: RelayServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayServerConfig {
    /// Socket address the relay listens on.
    pub bind: String,

    /// Allow relaying to loopback/private hosts. Off by default.
    pub allow_private_targets: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            relay_url: "http://127.0.0.1:8787/api/cors".to_string(),
            placeholder_image: "https://via.placeholder.com/150".to_string(),
            request_timeout_secs: 30,
            max_response_bytes: 10 * 1024 * 1024,
            max_concurrent_fetches: 8,
            image_cache_capacity: 512,
            seed_csv: None,
            legacy_relay_prefixes: vec!["https://cors-anywhere.herokuapp.com/".to_string()],
            relay: RelayServerConfig::default(),
        }
    }
}

impl Default for RelayServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8787".to_string(),
            allow_private_targets: false,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 9] = [
        "relay_url",
        "placeholder_image",
        "request_timeout_secs",
        "max_response_bytes",
        "max_concurrent_fetches",
        "image_cache_capacity",
        "seed_csv",
        "legacy_relay_prefixes",
        "relay",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)`
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

        let config: Config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), relay = %config.relay_url, "Loaded configuration");
        Ok(config)
    }

    /// Applies environment overrides. `FEEDBOARD_RELAY_URL` wins over the file.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(relay) = std::env::var("FEEDBOARD_RELAY_URL") {
            if !relay.trim().is_empty() {
                self.relay_url = relay.trim().to_string();
            }
        }
        self
    }

    /// The relay endpoint as a parsed URL.
    pub fn relay_base(&self) -> Result<Url, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidRelayUrl {
            url: self.relay_url.clone(),
            reason,
        };
        let url = Url::parse(&self.relay_url).map_err(|e| invalid(e.to_string()))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(invalid(format!("unsupported scheme '{other}'"))),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Concurrency window, never zero.
    pub fn concurrency(&self) -> usize {
        self.max_concurrent_fetches.max(1)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.relay_url, "http://127.0.0.1:8787/api/cors");
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.max_concurrent_fetches, 8);
        assert!(config.seed_csv.is_none());
        assert_eq!(config.relay.bind, "127.0.0.1:8787");
        assert!(!config.relay.allow_private_targets);
    }

    #[test]
    fn test_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.placeholder_image, "https://via.placeholder.com/150");
    }

    #[test]
    fn test_whitespace_only_file_returns_default() {
        let (_dir, path) = write_config("   \n  \n");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.max_concurrent_fetches, 8);
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let (_dir, path) = write_config("relay_url = \"https://relay.example.com/api/cors\"\n");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.relay_url, "https://relay.example.com/api/cors");
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.relay.bind, "127.0.0.1:8787");
    }

    #[test]
    fn test_full_config() {
        let (_dir, path) = write_config(
            r#"
relay_url = "https://relay.example.com/api/cors"
placeholder_image = "https://img.example.com/none.png"
request_timeout_secs = 5
max_response_bytes = 1024
max_concurrent_fetches = 2
image_cache_capacity = 16
seed_csv = "/srv/feeds.csv"
legacy_relay_prefixes = ["https://old-relay.example.com/"]

[relay]
bind = "0.0.0.0:9000"
allow_private_targets = true
"#,
        );
        let config = Config::load(&path).unwrap();
        assert_eq!(config.placeholder_image, "https://img.example.com/none.png");
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.max_response_bytes, 1024);
        assert_eq!(config.concurrency(), 2);
        assert_eq!(config.image_cache_capacity, 16);
        assert_eq!(config.seed_csv, Some(PathBuf::from("/srv/feeds.csv")));
        assert_eq!(
            config.legacy_relay_prefixes,
            vec!["https://old-relay.example.com/".to_string()]
        );
        assert_eq!(config.relay.bind, "0.0.0.0:9000");
        assert!(config.relay.allow_private_targets);
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let (_dir, path) = write_config("this is not [valid toml");
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
    }

    #[test]
    fn test_wrong_type_returns_error() {
        let (_dir, path) = write_config("request_timeout_secs = \"soon\"\n");
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let (_dir, path) = write_config("relay_url = \"http://r.example.com/\"\ntheme = \"dark\"\n");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.relay_url, "http://r.example.com/");
    }

    #[test]
    fn test_too_large_file_rejected() {
        let (_dir, path) = write_config(&"a".repeat(1_048_577));
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
    }

    #[test]
    fn test_relay_base_validation() {
        let mut config = Config::default();
        assert!(config.relay_base().is_ok());

        config.relay_url = "not a url".to_string();
        assert!(matches!(
            config.relay_base(),
            Err(ConfigError::InvalidRelayUrl { .. })
        ));

        config.relay_url = "ftp://relay.example.com/".to_string();
        assert!(config.relay_base().is_err());
    }

    #[test]
    fn test_zero_concurrency_clamped() {
        let config = Config {
            max_concurrent_fetches: 0,
            ..Config::default()
        };
        assert_eq!(config.concurrency(), 1);
    }
}
