//! Daemon: Main runtime orchestrator.
//!
//! The Daemon ties together all components:
//! - Order store (memory or PostgreSQL)
//! - Exchange Order Facade over a gateway (Binance or stub)
//! - Reconciliation Loop (with the Closure Coordinator)
//! - API Server (read-only HTTP endpoints)
//!
//! # Lifecycle
//!
//! 1. Load configuration
//! 2. Initialize components
//! 3. Start API server
//! 4. Start reconciliation loop
//! 5. Graceful shutdown on SIGINT

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use bracket_connectors::BinanceFuturesClient;
use bracket_exec::{FacadeConfig, OrderFacade, OrderGateway, StubGateway};
use bracket_store::{MemoryStore, Store};

use crate::api::{create_router, ApiState};
use crate::config::{Config, Environment};
use crate::error::{DaemonError, DaemonResult};
use crate::gateway::BinanceGateway;
use crate::reconciler::ReconciliationLoop;

// =============================================================================
// Daemon
// =============================================================================

/// The main bracket daemon.
pub struct Daemon {
    /// Configuration
    config: Config,
    /// Store
    store: Arc<dyn Store>,
    /// Reconciliation loop
    reconciler: Arc<ReconciliationLoop>,
    /// Shutdown signal for background tasks
    shutdown: CancellationToken,
}

impl Daemon {
    /// Create a daemon with stub components (for testing/development).
    pub fn new_stub(config: Config) -> Self {
        Self::new(config, Arc::new(MemoryStore::new()), Arc::new(StubGateway::new()))
    }

    /// Create a daemon with provided components.
    pub fn new(config: Config, store: Arc<dyn Store>, gateway: Arc<dyn OrderGateway>) -> Self {
        let facade = OrderFacade::new(
            gateway,
            FacadeConfig {
                query_timeout: config.reconcile.query_timeout,
                cancel_timeout: config.reconcile.cancel_timeout,
            },
        );
        let reconciler = Arc::new(ReconciliationLoop::new(
            store.clone(),
            facade,
            config.reconcile.clone(),
        ));

        Self {
            config,
            store,
            reconciler,
            shutdown: CancellationToken::new(),
        }
    }

    /// Build the daemon the configuration asks for.
    ///
    /// Binance credentials select the real gateway; without them only the
    /// test and development environments fall back to the stub.
    pub async fn from_config(config: Config) -> DaemonResult<Self> {
        let gateway: Arc<dyn OrderGateway> = match (
            &config.exchange.api_key,
            &config.exchange.api_secret,
        ) {
            (Some(key), Some(secret)) => {
                let client = if config.exchange.testnet {
                    BinanceFuturesClient::testnet(key.clone(), secret.clone())
                } else {
                    BinanceFuturesClient::new(key.clone(), secret.clone())
                };
                client.ping().await?;
                info!(base_url = %client.base_url(), "Binance connectivity OK");
                Arc::new(BinanceGateway::new(Arc::new(client)))
            },
            _ if config.environment == Environment::Production => {
                return Err(DaemonError::Config(
                    "BINANCE_API_KEY and BINANCE_API_SECRET are required in production".to_string(),
                ));
            },
            _ => {
                warn!("No Binance credentials; using stub gateway");
                Arc::new(StubGateway::new())
            },
        };

        let store = Self::open_store(&config).await?;
        Ok(Self::new(config, store, gateway))
    }

    #[cfg(feature = "postgres")]
    async fn open_store(config: &Config) -> DaemonResult<Arc<dyn Store>> {
        match &config.store.database_url {
            Some(url) => {
                let store =
                    bracket_store::PgStore::connect(url, config.store.max_connections).await?;
                info!("Connected to PostgreSQL");
                Ok(Arc::new(store))
            },
            None => Self::memory_store(config),
        }
    }

    #[cfg(not(feature = "postgres"))]
    async fn open_store(config: &Config) -> DaemonResult<Arc<dyn Store>> {
        if config.store.database_url.is_some() {
            warn!("DATABASE_URL set but built without the postgres feature; ignoring");
        }
        Self::memory_store(config)
    }

    fn memory_store(config: &Config) -> DaemonResult<Arc<dyn Store>> {
        if config.environment == Environment::Production {
            return Err(DaemonError::Config(
                "production requires a persistent store (DATABASE_URL)".to_string(),
            ));
        }
        warn!("Using in-memory store; state is lost on restart");
        Ok(Arc::new(MemoryStore::new()))
    }

    /// Shared store.
    pub fn store(&self) -> Arc<dyn Store> {
        self.store.clone()
    }

    /// Reconciliation loop.
    pub fn reconciler(&self) -> Arc<ReconciliationLoop> {
        self.reconciler.clone()
    }

    /// Token that stops the daemon when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run the daemon.
    ///
    /// This method blocks until shutdown is requested (SIGINT or the
    /// shutdown token).
    pub async fn run(self) -> DaemonResult<()> {
        info!(
            version = env!("CARGO_PKG_VERSION"),
            environment = %self.config.environment,
            "Starting bracket daemon"
        );

        // 1. Report what is left from the previous run
        self.report_pending().await?;

        // 2. Start API server
        let api_addr = self.start_api_server().await?;
        info!(%api_addr, "API server started");

        // 3. Start reconciliation loop
        let loop_handle = tokio::spawn(self.reconciler.clone().run(self.shutdown.clone()));

        // 4. Wait for shutdown
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                self.shutdown.cancel();
            }
            _ = self.shutdown.cancelled() => {
                info!("Shutdown requested");
            }
        }

        // 5. Graceful shutdown: let the pass in flight finish
        if let Err(e) = loop_handle.await {
            error!(error = %e, "Reconciliation loop task failed");
        }
        let stats = self.reconciler.stats().await;
        info!(
            passes_completed = stats.passes_completed,
            passes_skipped = stats.passes_skipped,
            "Shutdown complete"
        );

        Ok(())
    }

    /// Log the work restored from the store.
    async fn report_pending(&self) -> DaemonResult<()> {
        let orders = self.store.orders().find_non_terminal().await?;
        let brackets = self.store.brackets().find_active().await?;

        if orders.is_empty() && brackets.is_empty() {
            info!("No pending orders or active brackets");
        } else {
            info!(
                open_orders = orders.len(),
                active_brackets = brackets.len(),
                "Resuming reconciliation from stored state"
            );
        }

        Ok(())
    }

    /// Start the API server.
    async fn start_api_server(&self) -> DaemonResult<SocketAddr> {
        let state = Arc::new(ApiState {
            store: self.store.clone(),
            reconciler: self.reconciler.clone(),
        });

        let router = create_router(state);
        let addr = format!("{}:{}", self.config.api.host, self.config.api.port);

        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            DaemonError::Config(format!("Failed to bind to {}: {}", addr, e))
        })?;

        let local_addr = listener.local_addr().map_err(|e| {
            DaemonError::Config(format!("Failed to get local address: {}", e))
        })?;

        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let server = axum::serve(listener, router)
                .with_graceful_shutdown(async move { shutdown.cancelled().await });
            if let Err(e) = server.await {
                error!(error = %e, "API server error");
            }
        });

        Ok(local_addr)
    }
}

// =============================================================================
// Tests
// =============================================================================
