//! Application configuration.
//!
//! Loaded from a TOML file (`flightdeck.toml` by default, overridable via
//! `--config` or the `FLIGHTDECK_CONFIG` environment variable). Every
//! section has serde defaults so a missing file yields a runnable local
//! configuration.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation("server.port must be > 0".into()));
        }
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(ConfigError::Validation(format!(
                "logging.level must be one of {valid_levels:?}"
            )));
        }
        if self.auth.secret.is_empty() {
            return Err(ConfigError::Validation("auth.secret must not be empty".into()));
        }
        if self.auth.token_expiry_secs == 0 {
            return Err(ConfigError::Validation(
                "auth.token_expiry_secs must be > 0".into(),
            ));
        }
        if self.broker.enabled {
            if self.broker.topic.is_empty() {
                return Err(ConfigError::Validation("broker.topic must not be empty".into()));
            }
            if self.broker.group.is_empty() {
                return Err(ConfigError::Validation("broker.group must not be empty".into()));
            }
            if self.broker.connect_attempts == 0 {
                return Err(ConfigError::Validation(
                    "broker.connect_attempts must be > 0".into(),
                ));
            }
        }
        if self.scheduler.enabled
            && (self.scheduler.creation_interval_secs == 0
                || self.scheduler.update_interval_secs == 0)
        {
            return Err(ConfigError::Validation(
                "scheduler intervals must be > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Origins allowed by CORS. Empty means same-origin only.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_redis_url")]
    pub url: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_redis_url(),
            pool_size: default_pool_size(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_redis_url")]
    pub url: String,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_group")]
    pub group: String,
    /// Advisory: a stream is a single partition.
    #[serde(default = "default_one")]
    pub partitions: u32,
    #[serde(default = "default_one")]
    pub replication: u32,
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_redis_url(),
            topic: default_topic(),
            group: default_group(),
            partitions: 1,
            replication: 1,
            connect_attempts: default_connect_attempts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_creation_interval")]
    pub creation_interval_secs: u64,
    #[serde(default = "default_update_interval")]
    pub update_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            creation_interval_secs: default_creation_interval(),
            update_interval_secs: default_update_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_secret")]
    pub secret: String,
    #[serde(default = "default_token_expiry")]
    pub token_expiry_secs: u64,
    /// TTL for identity cache entries. Defaults to 24 hours.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: default_secret(),
            token_expiry_secs: default_token_expiry(),
            cache_ttl_secs: default_cache_ttl(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapConfig {
    #[serde(default = "default_true")]
    pub seed_users: bool,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self { seed_users: true }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3001
}
fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}
fn default_pool_size() -> usize {
    16
}
fn default_timeout_ms() -> u64 {
    5000
}
fn default_topic() -> String {
    "flight-status-updates".to_string()
}
fn default_group() -> String {
    "websocket-group".to_string()
}
fn default_one() -> u32 {
    1
}
fn default_connect_attempts() -> u32 {
    8
}
fn default_creation_interval() -> u64 {
    60
}
fn default_update_interval() -> u64 {
    30
}
fn default_secret() -> String {
    "change-me".to_string()
}
fn default_token_expiry() -> u64 {
    86400
}
fn default_cache_ttl() -> u64 {
    86400
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}

/// Load configuration from an optional TOML file.
///
/// A missing file is not an error; defaults apply. A present but invalid
/// file is.
pub fn load_config(path: Option<&str>) -> Result<AppConfig, ConfigError> {
    let cfg = match path {
        Some(p) if Path::new(p).exists() => {
            let raw = std::fs::read_to_string(p)?;
            toml::from_str(&raw)?
        }
        _ => AppConfig::default(),
    };
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.server.port, 3001);
        assert_eq!(cfg.broker.topic, "flight-status-updates");
        assert_eq!(cfg.broker.group, "websocket-group");
        assert_eq!(cfg.auth.cache_ttl_secs, 86400);
        assert!(!cfg.redis.enabled);
        assert!(cfg.scheduler.enabled);
    }

    #[test]
    fn test_parse_partial_toml() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [server]
            port = 8080

            [broker]
            enabled = true
            topic = "flights"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.server.port, 8080);
        assert!(cfg.broker.enabled);
        assert_eq!(cfg.broker.topic, "flights");
        // Untouched sections keep defaults.
        assert_eq!(cfg.scheduler.update_interval_secs, 30);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_port() {
        let mut cfg = AppConfig::default();
        cfg.server.port = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_empty_broker_topic() {
        let mut cfg = AppConfig::default();
        cfg.broker.enabled = true;
        cfg.broker.topic = String::new();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_log_level() {
        let mut cfg = AppConfig::default();
        cfg.logging.level = "verbose".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_addr() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.addr().port(), 3001);
    }
}
