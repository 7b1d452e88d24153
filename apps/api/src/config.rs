//! Configuration for the Duka API.
//!
//! Everything comes from environment variables (a `.env` file is loaded
//! first when present). Gateway credentials are not here: they are
//! per-organization and read from the database on every call.
//!
//! | Variable                     | Default     |
//! |------------------------------|-------------|
//! | `HTTP_PORT`                  | `8080`      |
//! | `DATABASE_PATH`              | `./duka.db` |
//! | `DB_MAX_CONNECTIONS`         | `5`         |
//! | `MPESA_ENVIRONMENT`          | `sandbox`   |
//! | `MPESA_BASE_URL`             | per environment |
//! | `MPESA_TIMEOUT_SECS`         | `30`        |
//! | `TRANSACTION_ID_PREFIX`      | `DK`        |
//! | `RECONCILE_INTERVAL_SECS`    | `60` (`0` disables) |
//! | `RECONCILE_STALE_AFTER_SECS` | `120`       |
//! | `RECONCILE_BATCH_SIZE`       | `50`        |

use std::env;
use std::str::FromStr;
use std::time::Duration;

use duka_core::DEFAULT_TRANSACTION_PREFIX;
use duka_mpesa::{DarajaConfig, MpesaEnvironment};

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// HTTP listen port
    pub http_port: u16,

    /// SQLite database file
    pub database_path: String,

    /// Pool size
    pub db_max_connections: u32,

    /// Daraja deployment
    pub mpesa_environment: MpesaEnvironment,

    /// Overrides the environment's base URL (proxies, local stand-ins)
    pub mpesa_base_url: Option<String>,

    /// Timeout for every gateway HTTP call
    pub mpesa_timeout: Duration,

    /// Prefix of generated mobile-money transaction ids
    pub transaction_id_prefix: String,

    /// Period of the stale-PENDING sweep; zero disables it
    pub reconcile_interval: Duration,

    /// Age after which a PENDING transaction is queried
    pub reconcile_stale_after: Duration,

    /// Transactions queried per sweep
    pub reconcile_batch_size: u32,
}

impl ApiConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = ApiConfig {
            http_port: parse_or(&lookup, "HTTP_PORT", 8080)?,

            database_path: lookup("DATABASE_PATH").unwrap_or_else(|| "./duka.db".to_string()),

            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 5)?,

            mpesa_environment: match lookup("MPESA_ENVIRONMENT") {
                Some(raw) => MpesaEnvironment::from_str(&raw)
                    .map_err(|_| ConfigError::InvalidValue("MPESA_ENVIRONMENT".to_string()))?,
                None => MpesaEnvironment::Sandbox,
            },

            mpesa_base_url: lookup("MPESA_BASE_URL").filter(|url| !url.trim().is_empty()),

            mpesa_timeout: Duration::from_secs(parse_or(&lookup, "MPESA_TIMEOUT_SECS", 30)?),

            transaction_id_prefix: lookup("TRANSACTION_ID_PREFIX")
                .unwrap_or_else(|| DEFAULT_TRANSACTION_PREFIX.to_string()),

            reconcile_interval: Duration::from_secs(parse_or(
                &lookup,
                "RECONCILE_INTERVAL_SECS",
                60,
            )?),

            reconcile_stale_after: Duration::from_secs(parse_or(
                &lookup,
                "RECONCILE_STALE_AFTER_SECS",
                120,
            )?),

            reconcile_batch_size: parse_or(&lookup, "RECONCILE_BATCH_SIZE", 50)?,
        };

        if config.db_max_connections == 0 {
            return Err(ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()));
        }

        if config.mpesa_timeout.is_zero() {
            return Err(ConfigError::InvalidValue("MPESA_TIMEOUT_SECS".to_string()));
        }

        let prefix = config.transaction_id_prefix.trim();
        if prefix.is_empty() || prefix.contains('-') {
            return Err(ConfigError::InvalidValue("TRANSACTION_ID_PREFIX".to_string()));
        }

        Ok(config)
    }

    /// Gateway client settings derived from this configuration.
    pub fn daraja_config(&self) -> DarajaConfig {
        let config = DarajaConfig::new(self.mpesa_environment).with_timeout(self.mpesa_timeout);
        match &self.mpesa_base_url {
            Some(url) => config.with_base_url(url.clone()),
            None => config,
        }
    }

    /// Whether the background sweep should run.
    pub fn reconcile_enabled(&self) -> bool {
        !self.reconcile_interval.is_zero()
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            http_port: 8080,
            database_path: "./duka.db".to_string(),
            db_max_connections: 5,
            mpesa_environment: MpesaEnvironment::Sandbox,
            mpesa_base_url: None,
            mpesa_timeout: Duration::from_secs(30),
            transaction_id_prefix: DEFAULT_TRANSACTION_PREFIX.to_string(),
            reconcile_interval: Duration::from_secs(60),
            reconcile_stale_after: Duration::from_secs(120),
            reconcile_batch_size: 50,
        }
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name.to_string())),
        None => Ok(default),
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),
}
