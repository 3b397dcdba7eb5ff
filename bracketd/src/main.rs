//! Bracket Reconciliation Daemon
//!
//! Polls the exchange for the status of every open order, applies
//! one-cancels-other rules to take-profit / stop-loss brackets, and serves a
//! read-only status API.
//!
//! # Usage
//!
//! ```bash
//! # Start with default configuration
//! cargo run -p bracketd
//!
//! # Start with custom environment
//! BRACKET_ENV=test BRACKET_API_PORT=8081 cargo run -p bracketd
//! ```
//!
//! # Environment Variables
//!
//! - `BRACKET_ENV`: Environment (test, development, production)
//! - `BRACKET_API_HOST`: API host (default: 0.0.0.0)
//! - `BRACKET_API_PORT`: API port (default: 8080)
//! - `BRACKET_RECONCILE_INTERVAL_MS`: Pass interval (default: 5000)
//! - `BRACKET_MAX_CONCURRENCY`: Concurrent status queries (default: 8)
//! - `BRACKET_QUERY_TIMEOUT_MS` / `BRACKET_CANCEL_TIMEOUT_MS`: Call deadlines (default: 5000)
//! - `BRACKET_NOT_FOUND_GRACE_SECS`: Grace before an unknown NEW order is failed (default: 60)
//! - `BRACKET_LOG_JSON`: Emit JSON logs when `1` or `true`
//! - `BINANCE_API_KEY` / `BINANCE_API_SECRET` / `BINANCE_TESTNET`
//! - `DATABASE_URL`: PostgreSQL (requires the `postgres` feature)

use bracketd::{Config, Daemon};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before reading BRACKET_LOG_JSON
    let _ = dotenvy::dotenv();

    // Initialize tracing
    let filter = EnvFilter::from_default_env().add_directive("bracketd=info".parse()?);
    let json = std::env::var("BRACKET_LOG_JSON")
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry().with(fmt::layer().json()).with(filter).init();
    } else {
        tracing_subscriber::registry().with(fmt::layer()).with(filter).init();
    }

    // Load configuration
    let config = Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        api_host = %config.api.host,
        api_port = config.api.port,
        interval_ms = config.reconcile.interval.as_millis() as u64,
        "Bracket daemon"
    );

    // Create and run daemon
    let daemon = Daemon::from_config(config).await?;
    daemon.run().await?;

    Ok(())
}
