//! Daemon error types.

use bracket_connectors::BinanceRestError;
use bracket_domain::DomainError;
use bracket_engine::EngineError;
use bracket_exec::FacadeError;
use bracket_store::StoreError;
use thiserror::Error;
use uuid::Uuid;

/// Daemon-level errors.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Domain error
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Engine error
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Exchange facade error
    #[error("Exchange error: {0}")]
    Facade(#[from] FacadeError),

    /// Binance client error
    #[error("Binance error: {0}")]
    Binance(#[from] BinanceRestError),

    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Order not found
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// Bracket not found
    #[error("Bracket not found: {0}")]
    BracketNotFound(Uuid),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Shutdown requested
    #[error("Shutdown requested")]
    Shutdown,
}

/// Result type for daemon operations.
pub type DaemonResult<T> = Result<T, DaemonError>;
