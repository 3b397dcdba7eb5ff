//! Binance USD-M Futures REST Client
//!
//! Provides REST API integration for:
//! - Querying and cancelling standard orders (`/fapi/v1/order`)
//! - Querying and cancelling conditional algo orders (`/fapi/v1/algoOrder`)
//! - Authentication via HMAC SHA256 signatures
//!
//! Both sub-APIs are keyed by the caller-assigned client order id
//! (`origClientOrderId` for standard orders, `clientAlgoId` for algo
//! orders), the only identifier known before the exchange acknowledges.
//!
//! # Authentication
//!
//! Binance uses API key + secret with HMAC SHA256 signatures.
//! All signed requests require:
//! - `X-MBX-APIKEY` header
//! - `signature` query parameter (HMAC SHA256 of query string)
//! - `timestamp` query parameter

use chrono::Utc;
use reqwest::{Client, Method, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::debug;

use bracket_domain::Symbol;

// =============================================================================
// Constants
// =============================================================================

/// Binance USD-M futures REST base URL
const BINANCE_FUTURES_URL: &str = "https://fapi.binance.com";

/// Binance USD-M futures testnet base URL
const BINANCE_FUTURES_TESTNET_URL: &str = "https://testnet.binancefuture.com";

/// Request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Signed request validity window in milliseconds
const RECV_WINDOW_MS: u64 = 5000;

// =============================================================================
// Errors
// =============================================================================

/// Errors that can occur in the Binance REST client.
#[derive(Debug, Clone, Error)]
pub enum BinanceRestError {
    /// Failed to build request signature
    #[error("Failed to build signature: {0}")]
    SignatureError(String),

    /// HTTP request failed before a response arrived
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    /// API returned error
    #[error("Binance API error: {code} - {msg}")]
    ApiError {
        /// Binance error code
        code: i64,
        /// Binance error message
        msg: String,
    },

    /// HTTP 429 (too many requests) or 418 (IP banned)
    #[error("Rate limited (HTTP {status}): {body}")]
    RateLimited {
        /// HTTP status
        status: u16,
        /// Response body
        body: String,
    },

    /// 5xx: the request reached Binance but its outcome is unknown
    #[error("Server error (HTTP {status}): {body}")]
    ServerError {
        /// HTTP status
        status: u16,
        /// Response body
        body: String,
    },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Request timed out
    #[error("Request timed out")]
    Timeout,
}

/// Map a non-success HTTP response onto an error.
fn error_from_response(status: StatusCode, body: &str) -> BinanceRestError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
        return BinanceRestError::RateLimited {
            status: status.as_u16(),
            body: body.to_string(),
        };
    }
    if status.is_server_error() {
        return BinanceRestError::ServerError {
            status: status.as_u16(),
            body: body.to_string(),
        };
    }
    // Try to parse Binance error response
    if let Ok(err) = serde_json::from_str::<BinanceErrorResponse>(body) {
        return BinanceRestError::ApiError { code: err.code, msg: err.msg };
    }
    BinanceRestError::RequestFailed(format!("HTTP {}: {}", status, body))
}

// =============================================================================
// Binance Futures Client
// =============================================================================

/// A decoded response together with the body it came from (kept for audit).
#[derive(Debug, Clone)]
pub struct BinanceResponse<T> {
    /// Typed payload
    pub data: T,
    /// Raw JSON body
    pub raw: serde_json::Value,
}

/// Binance USD-M futures REST client.
pub struct BinanceFuturesClient {
    /// HTTP client
    client: Client,
    /// API key
    api_key: String,
    /// API secret
    api_secret: String,
    /// REST base URL
    base_url: String,
    /// Per-request timeout
    request_timeout: Duration,
}

impl BinanceFuturesClient {
    /// Create a new Binance futures client.
    ///
    /// # Arguments
    ///
    /// * `api_key` - Binance API key
    /// * `api_secret` - Binance API secret
    pub fn new(api_key: String, api_secret: String) -> Self {
        Self::with_base_url(api_key, api_secret, BINANCE_FUTURES_URL.to_string())
    }

    /// Create a client for testnet (for testing).
    pub fn testnet(api_key: String, api_secret: String) -> Self {
        Self::with_base_url(api_key, api_secret, BINANCE_FUTURES_TESTNET_URL.to_string())
    }

    /// Create a client against an explicit base URL.
    pub fn with_base_url(api_key: String, api_secret: String, base_url: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            api_secret,
            base_url,
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
        }
    }

    /// Override the per-request timeout.
    pub fn with_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Get the base URL for API requests.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build query string with signature for signed requests.
    ///
    /// Binance requires:
    /// 1. All parameters in query string
    /// 2. HMAC SHA256 signature of query string
    /// 3. signature and timestamp as query parameters
    fn build_signed_query(&self, mut params: Vec<(&str, String)>) -> Result<String, BinanceRestError> {
        let timestamp = Utc::now().timestamp_millis().to_string();
        params.push(("timestamp", timestamp));
        params.push(("recvWindow", RECV_WINDOW_MS.to_string()));

        // Sort parameters for a stable signature
        params.sort_by(|a, b| a.0.cmp(b.0));

        let query_string: String = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        use hmac::{Hmac, Mac};
        use sha2::Sha256;

        type HmacSha256 = Hmac<Sha256>;

        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .map_err(|e| BinanceRestError::SignatureError(format!("HMAC error: {}", e)))?;

        mac.update(query_string.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        Ok(format!("{}&signature={}", query_string, signature))
    }

    /// Send a request and return the raw body of a successful response.
    async fn send(
        &self,
        method: Method,
        endpoint: &str,
        query: Option<String>,
        signed: bool,
    ) -> Result<String, BinanceRestError> {
        let url = match query {
            Some(q) if !q.is_empty() => format!("{}{}?{}", self.base_url, endpoint, q),
            _ => format!("{}{}", self.base_url, endpoint),
        };

        let mut request = self.client.request(method.clone(), &url);
        if signed {
            request = request.header("X-MBX-APIKEY", &self.api_key);
        }

        let response = timeout(self.request_timeout, request.send())
            .await
            .map_err(|_| BinanceRestError::Timeout)?
            .map_err(|e| {
                if e.is_timeout() {
                    BinanceRestError::Timeout
                } else {
                    BinanceRestError::RequestFailed(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| BinanceRestError::ParseError(e.to_string()))?;

        debug!(%method, endpoint, status = status.as_u16(), "Binance response");

        if !status.is_success() {
            return Err(error_from_response(status, &body));
        }

        Ok(body)
    }

    /// Send a signed request and decode the body.
    async fn signed<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        params: Vec<(&str, String)>,
    ) -> Result<BinanceResponse<T>, BinanceRestError> {
        let query = self.build_signed_query(params)?;
        let body = self.send(method, endpoint, Some(query), true).await?;
        decode(&body)
    }

    // =========================================================================
    // Standard Order API
    // =========================================================================

    /// Query a standard order by client order id.
    ///
    /// # Endpoint
    ///
    /// `GET /fapi/v1/order`
    pub async fn query_order(
        &self,
        symbol: &Symbol,
        client_order_id: &str,
    ) -> Result<BinanceResponse<FuturesOrderResponse>, BinanceRestError> {
        let params = vec![
            ("symbol", symbol.as_pair()),
            ("origClientOrderId", client_order_id.to_string()),
        ];
        self.signed(Method::GET, "/fapi/v1/order", params).await
    }

    /// Cancel a standard order by client order id.
    ///
    /// # Endpoint
    ///
    /// `DELETE /fapi/v1/order`
    pub async fn cancel_order(
        &self,
        symbol: &Symbol,
        client_order_id: &str,
    ) -> Result<BinanceResponse<FuturesOrderResponse>, BinanceRestError> {
        let params = vec![
            ("symbol", symbol.as_pair()),
            ("origClientOrderId", client_order_id.to_string()),
        ];
        self.signed(Method::DELETE, "/fapi/v1/order", params).await
    }

    // =========================================================================
    // Algo (Conditional) Order API
    // =========================================================================

    /// Query a conditional algo order by client algo id.
    ///
    /// # Endpoint
    ///
    /// `GET /fapi/v1/algoOrder`
    pub async fn query_algo_order(
        &self,
        symbol: &Symbol,
        client_algo_id: &str,
    ) -> Result<BinanceResponse<AlgoOrderResponse>, BinanceRestError> {
        let params = vec![
            ("symbol", symbol.as_pair()),
            ("clientAlgoId", client_algo_id.to_string()),
        ];
        self.signed(Method::GET, "/fapi/v1/algoOrder", params).await
    }

    /// Cancel a conditional algo order by client algo id.
    ///
    /// # Endpoint
    ///
    /// `DELETE /fapi/v1/algoOrder`
    pub async fn cancel_algo_order(
        &self,
        symbol: &Symbol,
        client_algo_id: &str,
    ) -> Result<BinanceResponse<AlgoCancelResponse>, BinanceRestError> {
        let params = vec![
            ("symbol", symbol.as_pair()),
            ("clientAlgoId", client_algo_id.to_string()),
        ];
        let response: BinanceResponse<AlgoCancelResponse> =
            self.signed(Method::DELETE, "/fapi/v1/algoOrder", params).await?;

        // The algo service reports some failures inside a 200 body
        if !response.data.is_success() {
            return Err(BinanceRestError::ApiError {
                code: response.data.code_number().unwrap_or(-1),
                msg: response.data.msg.clone().unwrap_or_default(),
            });
        }
        Ok(response)
    }

    /// Ping Binance API to check connectivity.
    ///
    /// Uses public endpoint, no authentication required.
    pub async fn ping(&self) -> Result<(), BinanceRestError> {
        let body = self.send(Method::GET, "/fapi/v1/ping", None, false).await?;

        // Ping returns empty JSON object {}
        if body.trim() == "{}" {
            Ok(())
        } else {
            Err(BinanceRestError::ParseError(format!("Unexpected ping response: {}", body)))
        }
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<BinanceResponse<T>, BinanceRestError> {
    let raw: serde_json::Value =
        serde_json::from_str(body).map_err(|e| BinanceRestError::ParseError(e.to_string()))?;
    let data = serde_json::from_value(raw.clone())
        .map_err(|e| BinanceRestError::ParseError(format!("{}: {}", e, body)))?;
    Ok(BinanceResponse { data, raw })
}

// =============================================================================
// Binance Types (from API responses)
// =============================================================================

/// Binance error response.
#[derive(Debug, Deserialize)]
struct BinanceErrorResponse {
    code: i64,
    msg: String,
}

/// Standard futures order.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FuturesOrderResponse {
    /// Symbol
    pub symbol: String,
    /// Order ID
    pub order_id: u64,
    /// Client order ID
    pub client_order_id: String,
    /// Status (NEW, PARTIALLY_FILLED, FILLED, CANCELED, EXPIRED, ...)
    pub status: String,
    /// Original quantity
    pub orig_qty: Decimal,
    /// Executed quantity
    pub executed_qty: Decimal,
    /// Side
    pub side: String,
    /// Type
    #[serde(rename = "type")]
    pub order_type: String,
    /// Last update time
    #[serde(default)]
    pub update_time: Option<i64>,
}

/// Conditional algo order.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlgoOrderResponse {
    /// Algo order ID
    pub algo_id: u64,
    /// Client algo ID
    pub client_algo_id: String,
    /// Symbol
    pub symbol: String,
    /// Algo status (NEW, WORKING, TRIGGERED, FINISHED, CANCELED, EXPIRED, ...)
    pub algo_status: String,
    /// Underlying order type (STOP_MARKET, TAKE_PROFIT_MARKET, ...)
    #[serde(default)]
    pub order_type: Option<String>,
    /// Side
    #[serde(default)]
    pub side: Option<String>,
    /// Order quantity
    #[serde(default)]
    pub quantity: Option<Decimal>,
    /// Executed quantity, when reported
    #[serde(default)]
    pub executed_qty: Option<Decimal>,
    /// Trigger price
    #[serde(default)]
    pub trigger_price: Option<Decimal>,
}

impl AlgoOrderResponse {
    /// Executed quantity, falling back to the order quantity once finished.
    pub fn filled_quantity(&self) -> Decimal {
        if let Some(qty) = self.executed_qty {
            return qty;
        }
        match self.algo_status.as_str() {
            "FINISHED" | "EXECUTED" => self.quantity.unwrap_or(Decimal::ZERO),
            _ => Decimal::ZERO,
        }
    }
}

/// Algo order cancel acknowledgement.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlgoCancelResponse {
    /// Algo order ID
    #[serde(default)]
    pub algo_id: Option<u64>,
    /// Client algo ID
    #[serde(default)]
    pub client_algo_id: Option<String>,
    /// Result code ("200" on success)
    #[serde(default)]
    pub code: Option<serde_json::Value>,
    /// Result message
    #[serde(default)]
    pub msg: Option<String>,
}

impl AlgoCancelResponse {
    /// Result code as a number, whether sent as string or integer.
    pub fn code_number(&self) -> Option<i64> {
        match self.code.as_ref()? {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// True when no code was sent or the code is 200.
    pub fn is_success(&self) -> bool {
        self.code.is_none() || self.code_number() == Some(200)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_build_signed_query() {
        let client = BinanceFuturesClient::new("test_key".to_string(), "test_secret".to_string());

        let params = vec![("symbol", "BTCUSDT".to_string())];
        let query = client.build_signed_query(params).unwrap();

        assert!(query.contains("timestamp="));
        assert!(query.contains("recvWindow=5000"));
        assert!(query.contains("signature="));
        assert!(query.contains("symbol=BTCUSDT"));
    }

    #[test]
    fn test_build_signed_query_sorts_params() {
        let client = BinanceFuturesClient::new("test_key".to_string(), "test_secret".to_string());

        let params = vec![
            ("symbol", "BTCUSDT".to_string()),
            ("origClientOrderId", "tp-1".to_string()),
        ];
        let query = client.build_signed_query(params).unwrap();

        let orig_idx = query.find("origClientOrderId=").unwrap();
        let symbol_idx = query.find("symbol=").unwrap();
        assert!(orig_idx < symbol_idx);
        assert!(query.contains("&signature="));
    }

    #[test]
    fn test_testnet_base_url() {
        let client = BinanceFuturesClient::testnet("k".to_string(), "s".to_string());
        assert_eq!(client.base_url(), BINANCE_FUTURES_TESTNET_URL);
    }

    #[test]
    fn test_error_mapping() {
        let err = error_from_response(StatusCode::BAD_REQUEST, r#"{"code":-2013,"msg":"Order does not exist."}"#);
        assert!(matches!(err, BinanceRestError::ApiError { code: -2013, .. }));

        let err = error_from_response(StatusCode::TOO_MANY_REQUESTS, "");
        assert!(matches!(err, BinanceRestError::RateLimited { status: 429, .. }));

        let err = error_from_response(StatusCode::from_u16(418).unwrap(), "banned");
        assert!(matches!(err, BinanceRestError::RateLimited { status: 418, .. }));

        let err = error_from_response(StatusCode::BAD_GATEWAY, "<html>");
        assert!(matches!(err, BinanceRestError::ServerError { status: 502, .. }));

        let err = error_from_response(StatusCode::FORBIDDEN, "WAF");
        assert!(matches!(err, BinanceRestError::RequestFailed(_)));
    }

    #[test]
    fn test_decode_standard_order() {
        let body = r#"{
            "avgPrice": "0.00000",
            "clientOrderId": "e-1",
            "cumQuote": "0",
            "executedQty": "0.010",
            "orderId": 1917641,
            "origQty": "0.010",
            "price": "0",
            "side": "BUY",
            "status": "FILLED",
            "symbol": "BTCUSDT",
            "type": "MARKET",
            "updateTime": 1579276756075
        }"#;

        let response: BinanceResponse<FuturesOrderResponse> = decode(body).unwrap();
        assert_eq!(response.data.status, "FILLED");
        assert_eq!(response.data.executed_qty, dec!(0.010));
        assert_eq!(response.data.order_id, 1917641);
        assert_eq!(response.raw["avgPrice"], "0.00000");
    }

    #[test]
    fn test_decode_algo_order() {
        let body = r#"{
            "algoId": 2146760,
            "clientAlgoId": "sl-1",
            "algoType": "CONDITIONAL",
            "orderType": "STOP_MARKET",
            "symbol": "BTCUSDT",
            "side": "SELL",
            "quantity": "0.010",
            "algoStatus": "FINISHED",
            "triggerPrice": "92000.00"
        }"#;

        let response: BinanceResponse<AlgoOrderResponse> = decode(body).unwrap();
        assert_eq!(response.data.algo_status, "FINISHED");
        assert_eq!(response.data.filled_quantity(), dec!(0.010));
        assert_eq!(response.data.trigger_price, Some(dec!(92000.00)));
    }

    #[test]
    fn test_algo_cancel_result_code() {
        let ok: AlgoCancelResponse =
            serde_json::from_str(r#"{"algoId":1,"clientAlgoId":"sl-1","code":"200","msg":"success"}"#)
                .unwrap();
        assert!(ok.is_success());

        let failed: AlgoCancelResponse =
            serde_json::from_str(r#"{"code":-2011,"msg":"Unknown order sent."}"#).unwrap();
        assert!(!failed.is_success());
        assert_eq!(failed.code_number(), Some(-2011));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let result: Result<BinanceResponse<FuturesOrderResponse>, _> = decode("not json");
        assert!(matches!(result, Err(BinanceRestError::ParseError(_))));
    }
}
