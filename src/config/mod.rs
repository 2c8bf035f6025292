use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use config::builder::DefaultState;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub address: String,
    pub workers: u32,
    pub static_dir: PathBuf,
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub min_version: String,
}

/// Tuning for the broadcast core.
#[derive(Debug, Deserialize, Clone)]
pub struct RelayConfig {
    /// Bound of the distribution channel. Readers suspend while it is full.
    pub channel_capacity: usize,
    /// Per-connection broadcast write deadline, 0 disables it.
    pub write_timeout_secs: u64,
    /// Close a connection that sends nothing for this long, 0 disables it.
    pub idle_timeout_secs: u64,
    pub max_frame_size: usize,
}

impl RelayConfig {
    pub fn write_timeout(&self) -> Option<Duration> {
        (self.write_timeout_secs > 0).then(|| Duration::from_secs(self.write_timeout_secs))
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
            write_timeout_secs: 10,
            idle_timeout_secs: 0,
            max_frame_size: 64 * 1024,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub environment: String,
    pub server: ServerConfig,
    pub tls: TlsConfig,
    pub relay: RelayConfig,
}

fn with_defaults(
    builder: ConfigBuilder<DefaultState>,
    environment: &str,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let relay = RelayConfig::default();
    builder
        .set_default("environment", environment)?
        .set_default("server.address", "127.0.0.1:8443")?
        .set_default("server.workers", num_cpus::get() as i64)?
        .set_default("server.static_dir", "./static")?
        .set_default("server.shutdown_timeout_secs", 30)?
        .set_default("tls.cert_path", "certs/cert.pem")?
        .set_default("tls.key_path", "certs/key.pem")?
        .set_default("tls.min_version", "1.3")?
        .set_default("relay.channel_capacity", relay.channel_capacity as i64)?
        .set_default("relay.write_timeout_secs", relay.write_timeout_secs as i64)?
        .set_default("relay.idle_timeout_secs", relay.idle_timeout_secs as i64)?
        .set_default("relay.max_frame_size", relay.max_frame_size as i64)
}

impl Settings {
    /// Layers defaults, `config/default`, `config/{RUN_MODE}`, the file named
    /// by `CONFIG_PATH` and `APP_`-prefixed environment variables, in that order.
    pub fn new() -> Result<Self, AppError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let mut builder = with_defaults(Config::builder(), "development")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false));

        if let Ok(path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&path).required(true));
        }

        // E.g., `APP_SERVER__ADDRESS=0.0.0.0:443` would set `Settings.server.address`
        let settings: Settings = builder
            .add_source(
                Environment::with_prefix("app")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Defaults plus environment overrides, without touching config files.
    pub fn new_for_test() -> Result<Self, AppError> {
        let settings: Settings = with_defaults(Config::builder(), "test")?
            .set_default("server.workers", 1)?
            .set_default("tls.cert_path", "tests/fixtures/cert.pem")?
            .set_default("tls.key_path", "tests/fixtures/key.pem")?
            .set_default("server.address", "127.0.0.1:0")?
            .set_default("server.shutdown_timeout_secs", 1)?
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.server.workers == 0 {
            return Err(AppError::ConfigError("server.workers must be at least 1".into()));
        }
        if self.relay.channel_capacity == 0 {
            return Err(AppError::ConfigError("relay.channel_capacity must be at least 1".into()));
        }
        if self.relay.max_frame_size == 0 {
            return Err(AppError::ConfigError("relay.max_frame_size must be at least 1".into()));
        }
        crate::tls::MinVersion::parse(&self.tls.min_version)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::new_for_test().expect("Failed to load settings");
        assert_eq!(settings.environment, "test");
        assert_eq!(settings.server.address, "127.0.0.1:0");
        assert_eq!(settings.server.workers, 1);
        assert_eq!(settings.server.static_dir, PathBuf::from("./static"));
        assert_eq!(settings.tls.min_version, "1.3");
        assert_eq!(settings.relay.channel_capacity, 64);
        assert_eq!(settings.relay.write_timeout(), Some(Duration::from_secs(10)));
        assert_eq!(settings.relay.idle_timeout(), None);
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut settings = Settings::new_for_test().unwrap();
        settings.relay.channel_capacity = 0;
        let err = settings.validate().unwrap_err();
        assert!(matches!(err, AppError::ConfigError(ref m) if m.contains("channel_capacity")));
    }

    #[test]
    fn test_validate_rejects_unknown_tls_version() {
        let mut settings = Settings::new_for_test().unwrap();
        settings.tls.min_version = "1.1".to_string();
        assert!(settings.validate().is_err());

        settings.tls.min_version = "1.2".to_string();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_timeouts_disabled_by_zero() {
        let relay = RelayConfig {
            write_timeout_secs: 0,
            idle_timeout_secs: 5,
            ..RelayConfig::default()
        };
        assert_eq!(relay.write_timeout(), None);
        assert_eq!(relay.idle_timeout(), Some(Duration::from_secs(5)));
    }
}
