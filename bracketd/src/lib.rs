//! Bracket Daemon Library
//!
//! Runtime for take-profit / stop-loss bracket reconciliation.
//!
//! # Architecture
//!
//! ```text
//! Reconciliation Loop ──query──→ Order Facade → Gateway → Exchange
//!        │                            ↑
//!        │ leg terminated             │ cancel
//!        ↓                            │
//! Closure Coordinator ────────────────┘
//!        │
//!        ↓
//!   Order Store / Bracket Registry / Audit log  ←── API (read-only)
//! ```
//!
//! # Components
//!
//! - **Daemon**: Main runtime orchestrator
//! - **Reconciliation Loop**: Periodic status polling, sole writer of status
//! - **Closure Coordinator**: One-cancels-other handling and bracket closing
//! - **Gateway**: Binance adapter for the exchange facade
//! - **API**: Read-only HTTP endpoints
//! - **Config**: Environment-based configuration
//!
//! # Example
//!
//! ```rust,ignore
//! use bracketd::{Config, Daemon};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("Failed to load config");
//!     let daemon = Daemon::new_stub(config);
//!     daemon.run().await.expect("Daemon error");
//! }
//! ```

#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod coordinator;
pub mod daemon;
pub mod error;
pub mod gateway;
pub mod reconciler;

// Re-exports for convenience
pub use config::{ApiConfig, Config, Environment, ExchangeConfig, ReconcileConfig, StoreConfig};
pub use coordinator::{ClosureCoordinator, CoordinatorReport};
pub use daemon::Daemon;
pub use error::{DaemonError, DaemonResult};
pub use gateway::BinanceGateway;
pub use reconciler::{LoopStats, PassOutcome, PassReport, ReconciliationLoop};
