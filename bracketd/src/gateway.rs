//! Binance gateway: the `OrderGateway` port over the futures REST client.
//!
//! Standard orders go through `/fapi/v1/order`, conditional legs through the
//! algo order service. Errors are mapped onto `GatewayError` unchanged in
//! meaning; classification happens in the facade.

use std::sync::Arc;

use async_trait::async_trait;
use bracket_connectors::{BinanceFuturesClient, BinanceRestError};
use bracket_domain::Symbol;
use bracket_exec::{GatewayError, OrderGateway, RawOrderState};
use tracing::debug;

/// Native literal recorded for an accepted algo cancel (the acknowledgement
/// carries no status field).
const ALGO_CANCELED: &str = "CANCELED";

/// `OrderGateway` backed by Binance USD-M futures.
pub struct BinanceGateway {
    client: Arc<BinanceFuturesClient>,
}

impl BinanceGateway {
    /// Wrap a client.
    pub fn new(client: Arc<BinanceFuturesClient>) -> Self {
        Self { client }
    }
}

/// Map a client error onto the gateway taxonomy.
pub fn map_rest_error(err: BinanceRestError) -> GatewayError {
    match err {
        BinanceRestError::Timeout => GatewayError::Timeout("binance request timed out".to_string()),
        BinanceRestError::RequestFailed(msg) => GatewayError::Transport(msg),
        // Signing happens before anything is sent
        BinanceRestError::SignatureError(msg) => GatewayError::Transport(msg),
        BinanceRestError::RateLimited { status, body } => {
            GatewayError::RateLimited(format!("HTTP {}: {}", status, body))
        },
        BinanceRestError::ServerError { status, body } => {
            GatewayError::ServerUnknown { status, body }
        },
        BinanceRestError::ApiError { code, msg } => GatewayError::Api { code, msg },
        BinanceRestError::ParseError(msg) => GatewayError::Parse(msg),
    }
}

#[async_trait]
impl OrderGateway for BinanceGateway {
    async fn query_standard(
        &self,
        symbol: &Symbol,
        client_order_id: &str,
    ) -> Result<RawOrderState, GatewayError> {
        let response = self
            .client
            .query_order(symbol, client_order_id)
            .await
            .map_err(map_rest_error)?;

        debug!(client_order_id, status = %response.data.status, "Binance: standard order");
        Ok(RawOrderState {
            status: response.data.status,
            executed_qty: response.data.executed_qty,
            exchange_order_id: Some(response.data.order_id.to_string()),
            raw: response.raw,
        })
    }

    async fn query_conditional(
        &self,
        symbol: &Symbol,
        client_order_id: &str,
    ) -> Result<RawOrderState, GatewayError> {
        let response = self
            .client
            .query_algo_order(symbol, client_order_id)
            .await
            .map_err(map_rest_error)?;

        debug!(client_order_id, status = %response.data.algo_status, "Binance: algo order");
        let executed_qty = response.data.filled_quantity();
        Ok(RawOrderState {
            status: response.data.algo_status,
            executed_qty,
            exchange_order_id: Some(response.data.algo_id.to_string()),
            raw: response.raw,
        })
    }

    async fn cancel_standard(
        &self,
        symbol: &Symbol,
        client_order_id: &str,
    ) -> Result<RawOrderState, GatewayError> {
        let response = self
            .client
            .cancel_order(symbol, client_order_id)
            .await
            .map_err(map_rest_error)?;

        Ok(RawOrderState {
            status: response.data.status,
            executed_qty: response.data.executed_qty,
            exchange_order_id: Some(response.data.order_id.to_string()),
            raw: response.raw,
        })
    }

    async fn cancel_conditional(
        &self,
        symbol: &Symbol,
        client_order_id: &str,
    ) -> Result<RawOrderState, GatewayError> {
        let response = self
            .client
            .cancel_algo_order(symbol, client_order_id)
            .await
            .map_err(map_rest_error)?;

        let mut state = RawOrderState::new(ALGO_CANCELED);
        state.exchange_order_id = response.data.algo_id.map(|id| id.to_string());
        state.raw = response.raw;
        Ok(state)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use bracket_domain::OrderClass;
    use bracket_exec::{classify, translate_status, FacadeError};

    #[test]
    fn test_not_found_codes_survive_mapping() {
        let err = map_rest_error(BinanceRestError::ApiError {
            code: -2013,
            msg: "Order does not exist.".to_string(),
        });
        assert!(matches!(classify(&err), FacadeError::NotFound(_)));
    }

    #[test]
    fn test_server_error_is_ambiguous() {
        let err = map_rest_error(BinanceRestError::ServerError {
            status: 503,
            body: "Service Unavailable".to_string(),
        });
        assert_eq!(err, GatewayError::ServerUnknown { status: 503, body: "Service Unavailable".to_string() });
        assert!(matches!(classify(&err), FacadeError::Ambiguous(_)));
    }

    #[test]
    fn test_transport_failures_are_transient() {
        for err in [
            BinanceRestError::Timeout,
            BinanceRestError::RequestFailed("connection reset".to_string()),
            BinanceRestError::RateLimited { status: 429, body: "".to_string() },
        ] {
            let mapped = map_rest_error(err);
            assert!(matches!(classify(&mapped), FacadeError::Transient(_)), "{:?}", mapped);
        }
    }

    #[test]
    fn test_parse_error_is_ambiguous() {
        let err = map_rest_error(BinanceRestError::ParseError("eof".to_string()));
        assert!(matches!(classify(&err), FacadeError::Ambiguous(_)));
    }

    #[test]
    fn test_algo_cancel_literal_translates() {
        assert_eq!(
            translate_status(OrderClass::Conditional, ALGO_CANCELED),
            Some(bracket_domain::OrderStatus::Cancelled)
        );
    }
}
