//! Application configuration.
//!
//! Stored as JSON at `$XDG_CONFIG_HOME/cliprelay/config.json`. Secrets are
//! usually supplied through the environment rather than the file; see
//! [`AppConfig::apply_env_overrides`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{RelayError, RelayResult};

/// Environment variable holding the asset-store API key.
pub const ENV_API_KEY: &str = "CLIPRELAY_API_KEY";

/// Environment variable overriding the asset-store endpoint.
pub const ENV_STORE_ENDPOINT: &str = "CLIPRELAY_STORE_ENDPOINT";

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Remote asset store used by the publisher.
    pub store: StoreConfig,

    /// Segment extraction settings.
    pub extraction: ExtractionConfig,

    /// Source locator settings.
    pub locator: LocatorConfig,

    /// Directory where fallback segments are spooled when uploads fail.
    pub spool_dir: PathBuf,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Remote asset store parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// API base URL (e.g. `https://sandbox.api.video`).
    pub endpoint: String,

    /// Bearer key. `None` disables uploading; every segment falls back.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Prefix of public playback URLs; the asset id is appended to it.
    pub playback_base: String,

    /// Container path component of playback URLs.
    pub container: String,

    /// Upper bound for one upload attempt, in seconds.
    pub upload_timeout_secs: u64,
}

/// How segments are cut out of their source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    /// Re-encode so the segment starts exactly at the in point.
    #[default]
    Exact,
    /// Stream copy from the preceding keyframe; leading bleed is reported
    /// as the segment's adjustment.
    Fast,
}

/// Segment extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Extraction strategy.
    pub mode: ExtractionMode,

    /// ffmpeg binary name or path.
    pub ffmpeg_path: PathBuf,

    /// ffprobe binary name or path.
    pub ffprobe_path: PathBuf,

    /// Video codec used by exact extraction.
    pub video_codec: String,

    /// Audio codec used by exact extraction.
    pub audio_codec: String,

    /// x264 preset used by exact extraction.
    pub preset: String,
}

/// Source locator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    /// Local content cache directory.
    pub cache_dir: Option<PathBuf>,

    /// Origin used to resolve `/relative` references.
    pub base_url: Option<String>,

    /// Upper bound for one source fetch, in seconds.
    pub fetch_timeout_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "cliprelay_pipeline=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            extraction: ExtractionConfig::default(),
            locator: LocatorConfig::default(),
            spool_dir: std::env::temp_dir().join("cliprelay").join("spool"),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://sandbox.api.video".to_string(),
            api_key: None,
            playback_base: "https://vod.api.video/vod".to_string(),
            container: "mp4".to_string(),
            upload_timeout_secs: 120,
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            mode: ExtractionMode::Exact,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            preset: "veryfast".to_string(),
        }
    }
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            base_url: None,
            fetch_timeout_secs: 60,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl StoreConfig {
    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs.max(1))
    }
}

impl LocatorConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        let mut config = if config_path.exists() {
            match Self::load_from(&config_path) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to load config at {:?}: {}", config_path, e);
                    Self::default()
                }
            }
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        config
    }

    /// Load config from an explicit path. Missing fields take defaults.
    pub fn load_from(path: &Path) -> RelayResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RelayError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| RelayError::config(format!("cannot parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `CLIPRELAY_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(ENV_API_KEY).filter(|k| !k.trim().is_empty()) {
            self.store.api_key = Some(key);
        }
        if let Some(endpoint) = lookup(ENV_STORE_ENDPOINT).filter(|e| !e.trim().is_empty()) {
            self.store.endpoint = endpoint;
        }
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> RelayResult<()> {
        for (label, url) in [
            ("store.endpoint", &self.store.endpoint),
            ("store.playback_base", &self.store.playback_base),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(RelayError::config(format!(
                    "{label} must be an http(s) URL, got {url:?}"
                )));
            }
        }
        if self.store.container.is_empty() || self.store.container.contains('/') {
            return Err(RelayError::config(
                "store.container must be a single path segment",
            ));
        }
        Ok(())
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("cliprelay").join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_point_at_api_video() {
        let config = AppConfig::default();
        assert_eq!(config.store.playback_base, "https://vod.api.video/vod");
        assert_eq!(config.store.container, "mp4");
        assert_eq!(config.extraction.mode, ExtractionMode::Exact);
        assert!(config.store.api_key.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_file_takes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"extraction":{"mode":"fast"},"store":{"upload_timeout_secs":5}}"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.extraction.mode, ExtractionMode::Fast);
        assert_eq!(config.extraction.ffmpeg_path, PathBuf::from("ffmpeg"));
        assert_eq!(config.store.upload_timeout(), Duration::from_secs(5));
        assert_eq!(config.store.endpoint, "https://sandbox.api.video");
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let mut config = AppConfig::default();
        config.store.endpoint = "ftp://example.com".to_string();
        assert!(matches!(
            config.validate(),
            Err(RelayError::Config { .. })
        ));
    }

    #[test]
    fn test_env_overrides_ignore_blank_values() {
        let mut config = AppConfig::default();
        config.apply_overrides(|name| match name {
            ENV_API_KEY => Some("  ".to_string()),
            ENV_STORE_ENDPOINT => Some("https://ws.api.video".to_string()),
            _ => None,
        });
        assert!(config.store.api_key.is_none());
        assert_eq!(config.store.endpoint, "https://ws.api.video");

        config.apply_overrides(|name| (name == ENV_API_KEY).then(|| "secret".to_string()));
        assert_eq!(config.store.api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn test_zero_timeout_clamped() {
        let mut config = AppConfig::default();
        config.store.upload_timeout_secs = 0;
        assert_eq!(config.store.upload_timeout(), Duration::from_secs(1));
    }
}
