//! Application settings and configuration management

use crate::error::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Consumer-facing listener configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    57800
}

/// Upstream backend connection configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_upstream_port")]
    pub port: u16,
    /// Fixed interval between feed reconnect attempts. No backoff growth:
    /// the backend is a local, trusted service.
    #[serde(default = "default_retry_interval")]
    pub retry_interval_ms: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// Per-subscriber delivery buffer; frames are dropped for a subscriber
    /// that falls this far behind.
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_upstream_port(),
            retry_interval_ms: default_retry_interval(),
            connect_timeout_ms: default_connect_timeout(),
            subscriber_buffer: default_subscriber_buffer(),
        }
    }
}

impl UpstreamConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

fn default_upstream_port() -> u16 {
    58090
}

fn default_retry_interval() -> u64 {
    1000
}

fn default_connect_timeout() -> u64 {
    10000
}

fn default_subscriber_buffer() -> usize {
    64
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Settings {
    /// Load settings from configuration files and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/default.toml")
    }

    /// Load settings from a specific configuration file path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 57800)?
            .set_default("upstream.retry_interval_ms", 1000)?
            // Load from configuration file
            .add_source(
                File::with_name(path.as_ref().to_str().unwrap_or("config/default"))
                    .required(false),
            )
            // Override with environment variables (prefixed with TMTC_HUB__)
            .add_source(
                Environment::with_prefix("TMTC_HUB")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_sane() {
        let settings = Settings::default();

        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 57800);
        assert_eq!(settings.upstream.retry_interval_ms, 1000);
        assert_eq!(settings.upstream.subscriber_buffer, 64);
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            "[upstream]\nhost = \"10.0.0.7\"\nport = 4242\nretry_interval_ms = 250"
        )
        .unwrap();

        let settings = Settings::load_from_path(file.path()).unwrap();

        assert_eq!(settings.upstream.addr(), "10.0.0.7:4242");
        assert_eq!(settings.upstream.retry_interval(), Duration::from_millis(250));
        // Untouched sections keep their defaults
        assert_eq!(settings.server.port, 57800);
    }
}
