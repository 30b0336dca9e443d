use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub streaming: StreamingConfig,
    pub signaling: SignalingConfig,
    pub cdn: CdnConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub http_port: u16,
    /// Public base URL used to build shareable links and playlist URLs
    pub base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            http_port: 8080,
            base_url: "http://localhost:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Empty URL selects the in-memory session store
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 20,
            min_connections: 2,
            connect_timeout_seconds: 10,
            idle_timeout_seconds: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    /// Append to this file instead of stdout
    pub file_path: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            file_path: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

/// Segmented-pull (HLS) and recording retention settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Directory holding one sub-directory per recorded stream
    pub hls_root: PathBuf,
    /// Nominal duration of every uploaded segment
    pub segment_duration_seconds: f64,
    /// Number of most recent segments listed in the live playlist
    pub playlist_window: usize,
    /// Time-to-live of a recording that was never saved permanently
    pub retention_hours: u64,
    pub sweep_interval_seconds: u64,
    pub max_segment_bytes: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            hls_root: PathBuf::from("./data/hls"),
            segment_duration_seconds: 2.0,
            playlist_window: 10,
            retention_hours: 24,
            sweep_interval_seconds: 300,
            max_segment_bytes: 16 * 1024 * 1024,
        }
    }
}

impl StreamingConfig {
    #[must_use]
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::try_from(self.retention_hours).unwrap_or(i64::MAX / 3600))
    }

    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingConfig {
    /// Largest accepted WebSocket frame
    pub max_message_bytes: usize,
    /// Per-connection outbound queue; messages beyond it are dropped
    pub outbound_buffer: usize,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            max_message_bytes: 64 * 1024,
            outbound_buffer: 256,
        }
    }
}

/// Third-party CDN relay; only the publish endpoint is tracked
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CdnConfig {
    pub publish_endpoint: String,
}

impl Default for CdnConfig {
    fn default() -> Self {
        Self {
            publish_endpoint: "rtmps://live.cloudflare.com:443/live".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // LIVECAST_SERVER__HTTP_PORT, LIVECAST_STREAMING__HLS_ROOT, ...
        builder = builder.add_source(
            Environment::with_prefix("LIVECAST")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from environment variables only (for Docker/K8s)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// Check for values that would make the server misbehave at runtime
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.server.http_port == 0 {
            errors.push("server.http_port must be non-zero".to_string());
        }
        if self.server.base_url.trim().is_empty() {
            errors.push("server.base_url must be set".to_string());
        }
        if !(self.streaming.segment_duration_seconds > 0.0) {
            errors.push("streaming.segment_duration_seconds must be positive".to_string());
        }
        if self.streaming.playlist_window == 0 {
            errors.push("streaming.playlist_window must be non-zero".to_string());
        }
        if self.streaming.retention_hours == 0 {
            errors.push("streaming.retention_hours must be non-zero".to_string());
        }
        if self.streaming.sweep_interval_seconds == 0 {
            errors.push("streaming.sweep_interval_seconds must be non-zero".to_string());
        }
        if self.signaling.outbound_buffer == 0 {
            errors.push("signaling.outbound_buffer must be non-zero".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    #[must_use]
    pub fn use_database(&self) -> bool {
        !self.database.url.trim().is_empty()
    }

    /// Base URL without a trailing slash
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.server.base_url.trim_end_matches('/')
    }

    /// Get HTTP address
    #[must_use]
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.http_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(!config.use_database());
        assert_eq!(config.streaming.playlist_window, 10);
        assert_eq!(config.streaming.retention_hours, 24);
    }

    #[test]
    fn test_http_address() {
        let config = Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                http_port: 9000,
                base_url: "https://live.example.com/".to_string(),
            },
            ..Config::default()
        };

        assert_eq!(config.http_address(), "127.0.0.1:9000");
        assert_eq!(config.base_url(), "https://live.example.com");
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let mut config = Config::default();
        config.server.http_port = 0;
        config.streaming.segment_duration_seconds = 0.0;
        config.streaming.playlist_window = 0;

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_logging_format_from_settings() {
        let logging: LoggingConfig = serde_json::from_str(r#"{"format":"json"}"#).unwrap();
        assert_eq!(logging.format, LogFormat::Json);
        assert_eq!(logging.level, "info");
        assert!(serde_json::from_str::<LoggingConfig>(r#"{"format":"xml"}"#).is_err());
    }

    #[test]
    fn test_retention_duration() {
        let config = StreamingConfig::default();
        assert_eq!(config.retention(), chrono::Duration::hours(24));
    }
}
