//! ABOUTME: Layered seatdesk settings: defaults, seatdesk.toml, SEATDESK_* variables
//! ABOUTME: Validates server, database and session settings before anything starts

use config::{Config as ConfigBuilder, Environment, File};
use sd_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

/// Config file picked up from the working directory when present
pub const DEFAULT_CONFIG_FILE: &str = "seatdesk.toml";

/// Main configuration struct
#[derive(Debug, Clone, Deserialize, Serialize, Validate, Default)]
#[serde(default)]
pub struct Config {
    /// `production` switches logging to JSON
    pub environment: String,
    #[validate(nested)]
    pub server: ServerConfig,
    #[validate(nested)]
    pub database: DatabaseConfig,
    #[validate(nested)]
    pub security: SecurityConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1, max = 65535))]
    pub port: u16,
    #[validate(range(min = 1, max = 65535))]
    pub obs_port: u16,
    /// Directory holding the built admin dashboard
    pub static_dir: String,
    /// Maximum accepted JSON body in bytes
    #[validate(range(min = 1024, max = 10485760))]
    pub json_limit: usize,
    #[validate(nested)]
    pub rate_limit: RateLimitConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            obs_port: 9000,
            static_dir: "./dashboard/dist".to_string(),
            json_limit: 65536,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Login rate limiting configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Maximum requests per client IP per window
    #[validate(range(min = 1, max = 10000))]
    pub requests_per_minute: u32,
    #[validate(range(min = 1, max = 3600))]
    pub window_seconds: u64,
    /// Peers whose X-Forwarded-For / X-Real-IP headers are believed
    pub trusted_proxies: Vec<String>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 30,
            window_seconds: 60,
            trusted_proxies: vec!["127.0.0.1".to_string(), "::1".to_string()],
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct DatabaseConfig {
    #[validate(length(min = 1))]
    pub path: String,
    #[validate(range(min = 1, max = 100))]
    pub pool_size: u32,
    pub sqlite_wal: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "seatdesk.db".to_string(),
            pool_size: 10,
            sqlite_wal: true,
        }
    }
}

/// Session security configuration with secret redaction
#[derive(Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct SecurityConfig {
    #[validate(length(min = 32))]
    pub session_secret: String,
    #[validate(range(min = 1, max = 720))]
    pub session_ttl_hours: u64,
    /// Mark the session cookie `Secure` (requires HTTPS)
    pub secure_cookies: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            session_secret: insecure_session_secret(),
            session_ttl_hours: 24,
            secure_cookies: false,
        }
    }
}

impl fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("session_secret", &"[REDACTED]")
            .field("session_ttl_hours", &self.session_ttl_hours)
            .field("secure_cookies", &self.secure_cookies)
            .finish()
    }
}

fn insecure_session_secret() -> String {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("INSECURE-RANDOM-{}-CHANGE-IN-PRODUCTION", timestamp)
}

impl Config {
    /// Load configuration from defaults, `seatdesk.toml` and `SEATDESK_*` variables
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration, reading `path` instead of the default config file
    pub fn load_from(path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder()
            .set_default("environment", "development")?
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.obs_port", 9000)?
            .set_default("server.static_dir", "./dashboard/dist")?
            .set_default("server.json_limit", 65536)?
            .set_default("server.rate_limit.requests_per_minute", 30)?
            .set_default("server.rate_limit.window_seconds", 60)?
            .set_default("database.path", "seatdesk.db")?
            .set_default("database.pool_size", 10)?
            .set_default("database.sqlite_wal", true)?
            .set_default("security.session_secret", insecure_session_secret())?
            .set_default("security.session_ttl_hours", 24)?
            .set_default("security.secure_cookies", false)?;

        match path {
            Some(path) => {
                builder = builder.add_source(File::with_name(path).required(true));
            }
            None => {
                if std::path::Path::new(DEFAULT_CONFIG_FILE).exists() {
                    builder = builder.add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false));
                }
            }
        }

        // SEATDESK_SERVER__PORT -> server.port
        builder = builder.add_source(
            Environment::with_prefix("SEATDESK")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| Error::Config(format!("Failed to build config: {}", e)))?;

        let parsed: Config = config
            .try_deserialize()
            .map_err(|e| Error::Config(format!("Failed to deserialize config: {}", e)))?;

        parsed
            .validate()
            .map_err(|e| Error::Config(format!("Config validation failed: {}", e)))?;

        Ok(parsed)
    }

    /// Whether the service runs with production defaults (JSON logs)
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}
