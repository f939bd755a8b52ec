//! Application configuration module
//! Handles environment variable loading, configuration validation, and application settings

use std::env;

use crate::webhook::allowlist::DEFAULT_ALLOWED_CIDRS;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
    pub webhook: WebhookConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: u64,   // seconds
    pub idle_timeout: Option<u64>, // seconds
}

/// Replay-cache configuration. Redis is optional; without it the replay
/// guard degrades to the event ledger alone.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub redis_url: Option<String>,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone)]
pub enum LogFormat {
    Json,
    Plain,
}

/// Webhook ingestion guard configuration
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Secrets accepted for signature verification, newest first. Keeping
    /// the previous secret in the list makes rotation non-disruptive.
    pub secrets: Vec<String>,
    /// Signed-timestamp freshness window, milliseconds.
    pub signature_window_ms: i64,
    /// Replay-dedup retention, milliseconds.
    pub replay_ttl_ms: u64,
    /// CIDR allowlist for webhook source addresses.
    pub ip_allowlist: Vec<String>,
}

const DEFAULT_SIGNATURE_WINDOW_MS: i64 = 5 * 60 * 1000;
const MAX_SIGNATURE_WINDOW_MS: i64 = 30 * 60 * 1000;
const DEFAULT_REPLAY_TTL_MS: u64 = 24 * 60 * 60 * 1000;
const MIN_REPLAY_TTL_MS: u64 = 60_000;
const MAX_REPLAY_TTL_MS: u64 = 7 * 24 * 60 * 60 * 1000;

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenv::dotenv().ok();

        Ok(AppConfig {
            server: ServerConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
            cache: CacheConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
            webhook: WebhookConfig::from_env()?,
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.database.validate()?;
        self.logging.validate()?;
        self.webhook.validate()?;

        Ok(())
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ServerConfig {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".to_string()))?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue(
                "SERVER_PORT cannot be 0".to_string(),
            ));
        }

        if self.host.is_empty() {
            return Err(ConfigError::InvalidValue(
                "SERVER_HOST cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(DatabaseConfig {
            url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::MissingVariable("DATABASE_URL".to_string()))?,
            max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()))?,
            min_connections: env::var("DB_MIN_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_MIN_CONNECTIONS".to_string()))?,
            connection_timeout: env::var("DB_CONNECTION_TIMEOUT")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_CONNECTION_TIMEOUT".to_string()))?,
            idle_timeout: env::var("DB_IDLE_TIMEOUT")
                .ok()
                .and_then(|val| val.parse().ok()),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::InvalidValue("DATABASE_URL".to_string()));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()));
        }

        if self.min_connections > self.max_connections {
            return Err(ConfigError::InvalidValue(
                "DB_MIN_CONNECTIONS must be <= DB_MAX_CONNECTIONS".to_string(),
            ));
        }

        Ok(())
    }
}

impl CacheConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(CacheConfig {
            redis_url: env::var("REDIS_URL").ok().filter(|v| !v.trim().is_empty()),
            max_connections: env::var("CACHE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("CACHE_MAX_CONNECTIONS".to_string()))?,
        })
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "plain".to_string())
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Plain,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if !valid_levels.contains(&self.level.to_uppercase().as_str()) {
            return Err(ConfigError::InvalidValue("LOG_LEVEL".to_string()));
        }

        Ok(())
    }
}

impl WebhookConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut secrets: Vec<String> = env::var("MP_WEBHOOK_SECRETS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        // Single-secret deployments configure the fallback variable only.
        if let Ok(fallback) = env::var("MP_WEBHOOK_SECRET") {
            let fallback = fallback.trim().to_string();
            if !fallback.is_empty() && !secrets.contains(&fallback) {
                secrets.push(fallback);
            }
        }

        let allowlist: Vec<String> = env::var("MP_WEBHOOK_IP_ALLOWLIST")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let ip_allowlist = if allowlist.is_empty() {
            DEFAULT_ALLOWED_CIDRS.iter().map(|s| s.to_string()).collect()
        } else {
            allowlist
        };

        Ok(WebhookConfig {
            secrets,
            signature_window_ms: bounded_i64(
                env::var("MP_WEBHOOK_SIGNATURE_WINDOW_MS").ok(),
                DEFAULT_SIGNATURE_WINDOW_MS,
                1,
                MAX_SIGNATURE_WINDOW_MS,
            ),
            replay_ttl_ms: bounded_u64(
                env::var("MP_WEBHOOK_REPLAY_TTL_MS").ok(),
                DEFAULT_REPLAY_TTL_MS,
                MIN_REPLAY_TTL_MS,
                MAX_REPLAY_TTL_MS,
            ),
            ip_allowlist,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secrets.is_empty() {
            return Err(ConfigError::MissingVariable(
                "MP_WEBHOOK_SECRET or MP_WEBHOOK_SECRETS".to_string(),
            ));
        }
        Ok(())
    }
}

fn bounded_i64(value: Option<String>, fallback: i64, min: i64, max: i64) -> i64 {
    value
        .and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|v| *v > 0)
        .map(|v| v.clamp(min, max))
        .unwrap_or(fallback)
}

fn bounded_u64(value: Option<String>, fallback: u64, min: u64, max: u64) -> u64 {
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| *v > 0)
        .map(|v| v.clamp(min, max))
        .unwrap_or(fallback)
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_validation() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8000,
        };

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_port_validation() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_host_validation() {
        let config = ServerConfig {
            host: "".to_string(),
            port: 8000,
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn signature_window_is_clamped_to_thirty_minutes() {
        assert_eq!(
            bounded_i64(Some("3600000".to_string()), DEFAULT_SIGNATURE_WINDOW_MS, 1, MAX_SIGNATURE_WINDOW_MS),
            MAX_SIGNATURE_WINDOW_MS
        );
        assert_eq!(
            bounded_i64(Some("60000".to_string()), DEFAULT_SIGNATURE_WINDOW_MS, 1, MAX_SIGNATURE_WINDOW_MS),
            60_000
        );
    }

    #[test]
    fn replay_ttl_falls_back_on_garbage_and_clamps() {
        assert_eq!(
            bounded_u64(Some("bogus".to_string()), DEFAULT_REPLAY_TTL_MS, MIN_REPLAY_TTL_MS, MAX_REPLAY_TTL_MS),
            DEFAULT_REPLAY_TTL_MS
        );
        assert_eq!(
            bounded_u64(Some("10".to_string()), DEFAULT_REPLAY_TTL_MS, MIN_REPLAY_TTL_MS, MAX_REPLAY_TTL_MS),
            MIN_REPLAY_TTL_MS
        );
        assert_eq!(
            bounded_u64(Some("999999999999".to_string()), DEFAULT_REPLAY_TTL_MS, MIN_REPLAY_TTL_MS, MAX_REPLAY_TTL_MS),
            MAX_REPLAY_TTL_MS
        );
    }

    #[test]
    fn webhook_config_requires_at_least_one_secret() {
        let config = WebhookConfig {
            secrets: vec![],
            signature_window_ms: DEFAULT_SIGNATURE_WINDOW_MS,
            replay_ttl_ms: DEFAULT_REPLAY_TTL_MS,
            ip_allowlist: vec![],
        };
        assert!(config.validate().is_err());
    }
}
