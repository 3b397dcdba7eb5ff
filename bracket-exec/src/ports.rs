//! Execution layer port definitions.
//!
//! The gateway port is the raw exchange transport: two sub-APIs, each with a
//! query and a cancel, all keyed by `(symbol, client_order_id)`. Adapters
//! implement it for a specific venue (Binance REST, stub).

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bracket_domain::Symbol;

use crate::error::GatewayError;

/// Order state as the exchange reports it, vocabulary untranslated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawOrderState {
    /// Native status literal (`status` or `algoStatus`)
    pub status: String,
    /// Executed quantity
    pub executed_qty: Decimal,
    /// Exchange-assigned id (`orderId` / `algoId`)
    pub exchange_order_id: Option<String>,
    /// Full response body
    pub raw: serde_json::Value,
}

impl RawOrderState {
    /// State with no execution and no raw body.
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            executed_qty: Decimal::ZERO,
            exchange_order_id: None,
            raw: serde_json::Value::Null,
        }
    }
}

/// Port for the exchange's order endpoints.
///
/// Implementations:
/// - `StubGateway` - For testing (scripted states and failures)
/// - `BinanceGateway` - Binance USD-M futures (in `bracketd`)
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Query a standard order.
    async fn query_standard(
        &self,
        symbol: &Symbol,
        client_order_id: &str,
    ) -> Result<RawOrderState, GatewayError>;

    /// Query a conditional (algo) order.
    async fn query_conditional(
        &self,
        symbol: &Symbol,
        client_order_id: &str,
    ) -> Result<RawOrderState, GatewayError>;

    /// Cancel a standard order. Returns the post-cancel state.
    async fn cancel_standard(
        &self,
        symbol: &Symbol,
        client_order_id: &str,
    ) -> Result<RawOrderState, GatewayError>;

    /// Cancel a conditional (algo) order. Returns the post-cancel state.
    async fn cancel_conditional(
        &self,
        symbol: &Symbol,
        client_order_id: &str,
    ) -> Result<RawOrderState, GatewayError>;
}
