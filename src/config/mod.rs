//! Configuration management
//!
//! Configuration is read from a YAML file (`config.yml` by default) and then
//! overridden by `CONDUIT_*` environment variables. Missing values fall back
//! to defaults so an empty or absent file still yields a runnable server.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Access token configuration
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin for the web client
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
    /// Upper bound on pooled connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_database_url() -> String {
    "data/conduit.db".to_string()
}

fn default_max_connections() -> u32 {
    10
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// Access token configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret used to sign access tokens.
    ///
    /// Left empty, a random secret is generated at startup and every token
    /// becomes invalid on restart.
    #[serde(default)]
    pub jwt_secret: String,
    /// Token lifetime in hours
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_hours: default_token_ttl_hours(),
        }
    }
}

fn default_token_ttl_hours() -> i64 {
    24 * 30
}

/// Longest accepted token lifetime, one hundred years
pub const MAX_TOKEN_TTL_HOURS: i64 = 24 * 365 * 100;

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError {
        path: String,
        message: String,
    },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist or is empty, returns the default configuration.
    /// If the file exists but is invalid YAML, returns an error with the
    /// location of the problem.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            message: format_yaml_error(&e),
        })
    }

    /// Load configuration from file, apply environment overrides and validate.
    ///
    /// Recognized variables:
    /// - CONDUIT_SERVER_HOST
    /// - CONDUIT_SERVER_PORT
    /// - CONDUIT_SERVER_CORS_ORIGIN
    /// - CONDUIT_DATABASE_DRIVER
    /// - CONDUIT_DATABASE_URL
    /// - CONDUIT_DATABASE_MAX_CONNECTIONS
    /// - CONDUIT_AUTH_JWT_SECRET
    /// - CONDUIT_AUTH_TOKEN_TTL_HOURS
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would only fail later at runtime
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server.port must be greater than 0".to_string(),
            ));
        }
        if self.auth.token_ttl_hours <= 0 {
            return Err(ConfigError::ValidationError(
                "auth.token_ttl_hours must be positive".to_string(),
            ));
        }
        if self.auth.token_ttl_hours > MAX_TOKEN_TTL_HOURS {
            return Err(ConfigError::ValidationError(format!(
                "auth.token_ttl_hours must be at most {}",
                MAX_TOKEN_TTL_HOURS
            )));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "database.max_connections must be greater than 0".to_string(),
            ));
        }
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "database.url must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("CONDUIT_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("CONDUIT_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(cors_origin) = std::env::var("CONDUIT_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = cors_origin;
        }

        if let Ok(driver) = std::env::var("CONDUIT_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {}
            }
        }
        if let Ok(url) = std::env::var("CONDUIT_DATABASE_URL") {
            self.database.url = url;
        }
        if let Ok(max) = std::env::var("CONDUIT_DATABASE_MAX_CONNECTIONS") {
            if let Ok(max) = max.parse::<u32>() {
                self.database.max_connections = max;
            }
        }

        if let Ok(secret) = std::env::var("CONDUIT_AUTH_JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Ok(ttl) = std::env::var("CONDUIT_AUTH_TOKEN_TTL_HOURS") {
            if let Ok(ttl) = ttl.parse::<i64>() {
                self.auth.token_ttl_hours = ttl;
            }
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    match e.location() {
        Some(location) => format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        ),
        None => e.to_string(),
    }
}

// Environment variables are process-global; every test that touches them
// takes this lock.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
const ENV_KEYS: &[&str] = &[
    "CONDUIT_SERVER_HOST",
    "CONDUIT_SERVER_PORT",
    "CONDUIT_SERVER_CORS_ORIGIN",
    "CONDUIT_DATABASE_DRIVER",
    "CONDUIT_DATABASE_URL",
    "CONDUIT_DATABASE_MAX_CONNECTIONS",
    "CONDUIT_AUTH_JWT_SECRET",
    "CONDUIT_AUTH_TOKEN_TTL_HOURS",
];

#[cfg(test)]
fn clear_env() {
    for key in ENV_KEYS {
        std::env::remove_var(key);
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn valid_config_strategy() -> impl Strategy<Value = Config> {
        (
            prop_oneof![
                Just("localhost".to_string()),
                Just("0.0.0.0".to_string()),
                "[a-z][a-z0-9]{0,10}",
            ],
            1u16..=65535,
            prop_oneof![Just(DatabaseDriver::Sqlite), Just(DatabaseDriver::Mysql)],
            "[a-z][a-z0-9_/]{0,20}\\.db",
            1u32..=64,
            "[a-zA-Z0-9]{0,32}",
            1i64..10_000,
        )
            .prop_map(|(host, port, driver, url, max_connections, jwt_secret, token_ttl_hours)| Config {
                server: ServerConfig {
                    host,
                    port,
                    cors_origin: default_cors_origin(),
                },
                database: DatabaseConfig {
                    driver,
                    url,
                    max_connections,
                },
                auth: AuthConfig {
                    jwt_secret,
                    token_ttl_hours,
                },
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        /// Serializing a config to YAML and loading it back preserves every field.
        #[test]
        fn config_yaml_roundtrip(config in valid_config_strategy()) {
            let yaml = serde_yaml::to_string(&config).expect("Failed to serialize config");

            let mut file = NamedTempFile::new().expect("Failed to create temp file");
            write!(file, "{}", yaml).expect("Failed to write config");

            let parsed = Config::load(file.path()).expect("Failed to parse config");

            prop_assert_eq!(config.server.host, parsed.server.host);
            prop_assert_eq!(config.server.port, parsed.server.port);
            prop_assert_eq!(config.database.driver, parsed.database.driver);
            prop_assert_eq!(config.database.url, parsed.database.url);
            prop_assert_eq!(config.database.max_connections, parsed.database.max_connections);
            prop_assert_eq!(config.auth.jwt_secret, parsed.auth.jwt_secret);
            prop_assert_eq!(config.auth.token_ttl_hours, parsed.auth.token_ttl_hours);
        }
    }
}
