//! Daemon configuration.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::error::{DaemonError, DaemonResult};
use std::env;
use std::str::FromStr;
use std::time::Duration;

// =============================================================================
// Configuration
// =============================================================================

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// Reconciliation loop configuration
    pub reconcile: ReconcileConfig,

    /// Exchange credentials
    pub exchange: ExchangeConfig,

    /// Persistence configuration
    pub store: StoreConfig,

    /// Environment (test, development, production)
    pub environment: Environment,
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
}

/// Reconciliation loop configuration.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Time between pass starts
    pub interval: Duration,
    /// Upper bound on concurrent status queries within a pass
    pub max_concurrency: usize,
    /// Deadline per status query
    pub query_timeout: Duration,
    /// Deadline per cancel request
    pub cancel_timeout: Duration,
    /// How long a NEW order may be unknown to the exchange before it is
    /// written FAILED
    pub not_found_grace: Duration,
}

/// Exchange credentials.
#[derive(Clone, Default)]
pub struct ExchangeConfig {
    /// Binance API key
    pub api_key: Option<String>,
    /// Binance API secret
    pub api_secret: Option<String>,
    /// Use the futures testnet
    pub testnet: bool,
}

impl std::fmt::Debug for ExchangeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("api_secret", &self.api_secret.as_ref().map(|_| "***"))
            .field("testnet", &self.testnet)
            .finish()
    }
}

impl ExchangeConfig {
    /// Both key and secret are set.
    pub fn has_credentials(&self) -> bool {
        self.api_key.is_some() && self.api_secret.is_some()
    }
}

/// Persistence configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// PostgreSQL URL (`DATABASE_URL`); in-memory store when unset
    pub database_url: Option<String>,
    /// Pool size
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: 5,
        }
    }
}

/// Environment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Test environment (uses stubs)
    Test,
    /// Development environment
    Development,
    /// Production environment
    Production,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> DaemonResult<Self> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        let environment = Self::load_environment()?;
        let api = Self::load_api_config()?;
        let reconcile = Self::load_reconcile_config()?;
        let exchange = Self::load_exchange_config()?;
        let store = Self::load_store_config()?;

        Ok(Self {
            api,
            reconcile,
            exchange,
            store,
            environment,
        })
    }

    /// Create test configuration.
    pub fn test() -> Self {
        Self {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
            },
            reconcile: ReconcileConfig {
                interval: Duration::from_millis(100),
                max_concurrency: 4,
                query_timeout: Duration::from_millis(500),
                cancel_timeout: Duration::from_millis(500),
                not_found_grace: Duration::ZERO,
            },
            exchange: ExchangeConfig::default(),
            store: StoreConfig::default(),
            environment: Environment::Test,
        }
    }

    fn load_environment() -> DaemonResult<Environment> {
        let env_str = env::var("BRACKET_ENV").unwrap_or_else(|_| "development".to_string());

        match env_str.to_lowercase().as_str() {
            "test" => Ok(Environment::Test),
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(DaemonError::Config(format!(
                "Invalid BRACKET_ENV: {}. Expected: test, development, production",
                other
            ))),
        }
    }

    fn load_api_config() -> DaemonResult<ApiConfig> {
        let host = env::var("BRACKET_API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = Self::load_parsed_env("BRACKET_API_PORT", 8080u16)?;

        Ok(ApiConfig { host, port })
    }

    fn load_reconcile_config() -> DaemonResult<ReconcileConfig> {
        let defaults = ReconcileConfig::default();

        let interval_ms = Self::load_parsed_env(
            "BRACKET_RECONCILE_INTERVAL_MS",
            defaults.interval.as_millis() as u64,
        )?;
        if interval_ms == 0 {
            return Err(DaemonError::Config(
                "BRACKET_RECONCILE_INTERVAL_MS must be greater than 0".to_string(),
            ));
        }

        let max_concurrency =
            Self::load_parsed_env("BRACKET_MAX_CONCURRENCY", defaults.max_concurrency)?;
        if max_concurrency == 0 {
            return Err(DaemonError::Config(
                "BRACKET_MAX_CONCURRENCY must be greater than 0".to_string(),
            ));
        }

        let query_timeout_ms = Self::load_parsed_env(
            "BRACKET_QUERY_TIMEOUT_MS",
            defaults.query_timeout.as_millis() as u64,
        )?;
        let cancel_timeout_ms = Self::load_parsed_env(
            "BRACKET_CANCEL_TIMEOUT_MS",
            defaults.cancel_timeout.as_millis() as u64,
        )?;
        let grace_secs = Self::load_parsed_env(
            "BRACKET_NOT_FOUND_GRACE_SECS",
            defaults.not_found_grace.as_secs(),
        )?;

        Ok(ReconcileConfig {
            interval: Duration::from_millis(interval_ms),
            max_concurrency,
            query_timeout: Duration::from_millis(query_timeout_ms),
            cancel_timeout: Duration::from_millis(cancel_timeout_ms),
            not_found_grace: Duration::from_secs(grace_secs),
        })
    }

    fn load_exchange_config() -> DaemonResult<ExchangeConfig> {
        let api_key = env::var("BINANCE_API_KEY").ok().filter(|v| !v.is_empty());
        let api_secret = env::var("BINANCE_API_SECRET").ok().filter(|v| !v.is_empty());
        let testnet = Self::load_parsed_env("BINANCE_TESTNET", false)?;

        Ok(ExchangeConfig {
            api_key,
            api_secret,
            testnet,
        })
    }

    fn load_store_config() -> DaemonResult<StoreConfig> {
        let database_url = env::var("DATABASE_URL").ok().filter(|v| !v.is_empty());
        let max_connections = Self::load_parsed_env("BRACKET_DB_MAX_CONNECTIONS", 5u32)?;

        Ok(StoreConfig {
            database_url,
            max_connections,
        })
    }

    fn load_parsed_env<T: FromStr>(key: &str, default: T) -> DaemonResult<T> {
        match env::var(key) {
            Ok(val) => val
                .trim()
                .parse::<T>()
                .map_err(|_| DaemonError::Config(format!("Invalid {} value: {}", key, val))),
            Err(_) => Ok(default),
        }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_concurrency: 8,
            query_timeout: Duration::from_secs(5),
            cancel_timeout: Duration::from_secs(5),
            not_found_grace: Duration::from_secs(60),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            reconcile: ReconcileConfig::default(),
            exchange: ExchangeConfig::default(),
            store: StoreConfig::default(),
            environment: Environment::Development,
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Test => write!(f, "test"),
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
