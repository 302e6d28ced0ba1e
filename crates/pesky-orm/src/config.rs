//! Connection configuration.
//!
//! Plain data validated at construction. A config can be deserialized (for
//! example from a JSON or TOML settings file), read from the environment
//! with [`ConnectionConfig::from_env`], or built in code.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::dialect::Dialect;
use crate::{OrmError, Result};

/// Retry configuration for connection establishment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = no retries)
    pub max_retries: u32,
    /// Initial delay between retries in milliseconds
    pub initial_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff (e.g., 2.0 doubles delay each retry)
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 100,
            max_delay_ms: 5000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Creates a retry config with no retries (immediate failure).
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            backoff_multiplier: 1.0,
        }
    }

    /// Calculates the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::from_millis(self.initial_delay_ms);
        }

        let delay_ms = (self.initial_delay_ms as f64) * self.backoff_multiplier.powi(attempt as i32);

        Duration::from_millis((delay_ms as u64).min(self.max_delay_ms))
    }
}

/// Connection pool configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Minimum number of connections in the pool.
    pub min_connections: u32,
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// Connection timeout in seconds.
    pub connect_timeout: u64,
    /// Maximum lifetime of a connection in seconds.
    pub max_lifetime: Option<u64>,
    /// Idle timeout in seconds.
    pub idle_timeout: Option<u64>,
    /// Retry configuration for connection establishment.
    pub retry: RetryConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: 1,
            max_connections: 10,
            connect_timeout: 30,
            max_lifetime: Some(1800), // 30 minutes
            idle_timeout: Some(600),  // 10 minutes
            retry: RetryConfig::default(),
        }
    }
}

/// Statement execution settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Threshold for slow statement logging in milliseconds
    pub slow_query_threshold_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            slow_query_threshold_ms: 1000, // 1 second
        }
    }
}

impl ExecutorConfig {
    pub fn slow_query_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_query_threshold_ms)
    }
}

/// Database connection parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(alias = "dialect")]
    pub driver: Dialect,
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    pub database: String,
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub charset: Option<String>,
    /// Session time zone (`UTC`, `+02:00`, `Europe/Paris`)
    #[serde(default)]
    pub timezone: Option<String>,
    /// Postgres search path
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
}

impl ConnectionConfig {
    pub fn new(
        driver: Dialect,
        host: impl Into<String>,
        database: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self {
            driver,
            host: host.into(),
            port: None,
            database: database.into(),
            user: user.into(),
            password: None,
            charset: None,
            timezone: None,
            schema: None,
            pool: PoolConfig::default(),
            executor: ExecutorConfig::default(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Port, falling back to the driver default.
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(match self.driver {
            Dialect::Postgres => 5432,
            Dialect::MySql => 3306,
        })
    }

    /// Checks required fields and the values that end up in session
    /// statements.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [("host", &self.host), ("database", &self.database), ("user", &self.user)] {
            if value.trim().is_empty() {
                return Err(OrmError::Configuration(format!("Connection {} cannot be empty", field)));
            }
        }
        if self.port == Some(0) {
            return Err(OrmError::Configuration("Connection port must be in 1..=65535".to_string()));
        }
        if let Some(charset) = &self.charset {
            if charset.is_empty() || !charset.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(OrmError::Configuration(format!("Invalid charset '{}'", charset)));
            }
        }
        if let Some(timezone) = &self.timezone {
            let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '/' | '+' | '-' | ':');
            if timezone.is_empty() || !timezone.chars().all(allowed) {
                return Err(OrmError::Configuration(format!("Invalid timezone '{}'", timezone)));
            }
        }
        if let Some(schema) = &self.schema {
            self.driver.validate_identifier_part(schema)?;
        }
        if self.pool.max_connections == 0 || self.pool.min_connections > self.pool.max_connections {
            return Err(OrmError::Configuration(format!(
                "Invalid pool size {}..{}",
                self.pool.min_connections, self.pool.max_connections
            )));
        }
        Ok(())
    }

    /// Connection URL with percent-encoded credentials.
    pub fn to_url(&self) -> Result<Url> {
        self.validate()?;
        let scheme = match self.driver {
            Dialect::Postgres => "postgres",
            Dialect::MySql => "mysql",
        };
        let mut url = Url::parse(&format!("{}://localhost", scheme))
            .map_err(|e| OrmError::Configuration(format!("Invalid connection URL: {}", e)))?;
        let invalid = |what: &str| OrmError::Configuration(format!("Invalid connection {}", what));

        url.set_host(Some(self.host.trim())).map_err(|_| invalid("host"))?;
        url.set_port(Some(self.port())).map_err(|_| invalid("port"))?;
        url.set_username(&self.user).map_err(|_| invalid("user"))?;
        url.set_password(self.password.as_deref()).map_err(|_| invalid("password"))?;
        url.path_segments_mut()
            .map_err(|_| invalid("database"))?
            .push(&self.database);
        if let (Dialect::MySql, Some(charset)) = (self.driver, &self.charset) {
            url.query_pairs_mut().append_pair("charset", charset);
        }
        Ok(url)
    }

    /// Reads `<PREFIX>_DRIVER`, `_HOST`, `_PORT`, `_DATABASE`, `_USER`,
    /// `_PASSWORD`, `_CHARSET`, `_TIMEZONE` and `_SCHEMA`.
    pub fn from_env(prefix: &str) -> Result<Self> {
        let read = |name: &str| env::var(format!("{}_{}", prefix, name)).ok().filter(|v| !v.is_empty());
        let require = |name: &str| {
            read(name).ok_or_else(|| {
                OrmError::Configuration(format!("Environment variable {}_{} is not set", prefix, name))
            })
        };

        let driver = require("DRIVER")?.parse::<Dialect>()?;
        let mut config = Self::new(driver, require("HOST")?, require("DATABASE")?, require("USER")?);
        if let Some(port) = read("PORT") {
            config.port = Some(
                port.parse::<u16>()
                    .map_err(|_| OrmError::Configuration(format!("Invalid port '{}'", port)))?,
            );
        }
        config.password = read("PASSWORD");
        config.charset = read("CHARSET");
        config.timezone = read("TIMEZONE");
        config.schema = read("SCHEMA");
        config.validate()?;
        Ok(config)
    }
}
