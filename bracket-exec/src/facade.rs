//! Exchange Order Facade.
//!
//! One query/cancel contract regardless of order class. Native status
//! vocabularies are translated here and nowhere else, every call runs under
//! its own deadline, and "order not found"-shaped answers are never trusted
//! without one confirmatory query.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, warn};

use bracket_domain::{OrderClass, OrderStatus, Symbol};

use crate::error::{FacadeError, FacadeResult, GatewayError};
use crate::ports::{OrderGateway, RawOrderState};

// =============================================================================
// Vocabulary
// =============================================================================

/// Placeholder the conditional sub-API reports before assigning a native
/// status to a freshly accepted algo order.
pub const CONDITIONAL_PLACEHOLDER: &str = "ACCEPTED";

/// Translate a native status literal into the internal vocabulary.
///
/// Returns `None` for literals outside the known vocabulary of that class.
pub fn translate_status(class: OrderClass, native: &str) -> Option<OrderStatus> {
    let status = match class {
        OrderClass::Standard => match native {
            "NEW" | "PARTIALLY_FILLED" => OrderStatus::Live,
            "FILLED" => OrderStatus::Filled,
            "CANCELED" | "EXPIRED" | "EXPIRED_IN_MATCH" => OrderStatus::Cancelled,
            "REJECTED" => OrderStatus::Failed,
            _ => return None,
        },
        OrderClass::Conditional => match native {
            "NEW" | "WORKING" | "TRIGGERING" | "TRIGGERED" => OrderStatus::Live,
            CONDITIONAL_PLACEHOLDER => OrderStatus::Live,
            "EXECUTED" | "FINISHED" => OrderStatus::Filled,
            "CANCELED" | "EXPIRED" => OrderStatus::Cancelled,
            "REJECTED" => OrderStatus::Failed,
            _ => return None,
        },
    };
    Some(status)
}

// =============================================================================
// Error classification
// =============================================================================

/// Map a transport failure onto the facade taxonomy.
pub fn classify(err: &GatewayError) -> FacadeError {
    let detail = err.to_string();
    match err {
        GatewayError::Timeout(_) | GatewayError::RateLimited(_) | GatewayError::Transport(_) => {
            FacadeError::Transient(detail)
        },
        GatewayError::ServerUnknown { .. } | GatewayError::Parse(_) => {
            FacadeError::Ambiguous(detail)
        },
        GatewayError::Api { code, msg } => match code {
            // Unknown order sent / Order does not exist
            -2011 | -2013 => FacadeError::NotFound(detail),
            // Too many requests, rate limit, timeout waiting for backend, clock skew
            -1003 | -1015 | -1001 | -1021 => FacadeError::Transient(detail),
            // Unknown error, unexpected response, execution status unknown
            -1000 | -1006 | -1007 => FacadeError::Ambiguous(detail),
            _ if looks_not_found(msg) => FacadeError::NotFound(detail),
            _ => FacadeError::Rejected(detail),
        },
    }
}

fn looks_not_found(msg: &str) -> bool {
    let msg = msg.to_ascii_lowercase();
    msg.contains("does not exist") || msg.contains("unknown order")
}

// =============================================================================
// Results
// =============================================================================

/// Translated order state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    /// Internal status
    pub status: OrderStatus,
    /// Executed quantity
    pub executed_qty: Decimal,
    /// Exchange-assigned id, when reported
    pub exchange_order_id: Option<String>,
    /// Native literal the status was translated from
    pub native_status: String,
    /// Full response body
    pub raw: serde_json::Value,
}

/// Outcome of a query with the confirmatory protocol applied.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryVerdict {
    /// First query answered
    Observed(StatusReport),
    /// First query was inconclusive, confirmation answered
    Confirmed(StatusReport),
    /// Exchange reported "not found" on both queries
    Vanished {
        /// Detail of the confirming answer
        detail: String,
    },
    /// No trustworthy answer this pass; leave state unchanged
    Unresolved(FacadeError),
    /// Exchange refused the query for good
    Rejected(String),
}

/// Outcome of a cancel request.
#[derive(Debug, Clone, PartialEq)]
pub enum CancelOutcome {
    /// Exchange accepted the cancel
    Cancelled(StatusReport),
    /// Order had already reached a terminal status (confirmed by query)
    AlreadyTerminal(StatusReport),
    /// Cancel was refused as "not found" but the order is still working
    Ambiguous(StatusReport),
    /// Cancel said "not found" and the confirmation failed too
    CancelledUnconfirmed {
        /// Why the confirmation failed
        reason: String,
    },
}

// =============================================================================
// Facade
// =============================================================================

/// Deadlines for facade calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FacadeConfig {
    /// Deadline per status query
    pub query_timeout: Duration,
    /// Deadline per cancel request
    pub cancel_timeout: Duration,
}

impl Default for FacadeConfig {
    fn default() -> Self {
        Self {
            query_timeout: Duration::from_secs(5),
            cancel_timeout: Duration::from_secs(5),
        }
    }
}

/// Exchange Order Facade over an [`OrderGateway`].
#[derive(Clone)]
pub struct OrderFacade {
    gateway: Arc<dyn OrderGateway>,
    config: FacadeConfig,
}

impl OrderFacade {
    /// Create a facade over a gateway.
    pub fn new(gateway: Arc<dyn OrderGateway>, config: FacadeConfig) -> Self {
        Self { gateway, config }
    }

    /// Deadlines in use.
    pub fn config(&self) -> FacadeConfig {
        self.config
    }

    /// Query an order's status, translated, under the query deadline.
    pub async fn query_status(
        &self,
        symbol: &Symbol,
        client_order_id: &str,
        class: OrderClass,
    ) -> FacadeResult<StatusReport> {
        let call = async {
            match class {
                OrderClass::Standard => self.gateway.query_standard(symbol, client_order_id).await,
                OrderClass::Conditional => {
                    self.gateway.query_conditional(symbol, client_order_id).await
                },
            }
        };

        let raw = match timeout(self.config.query_timeout, call).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => return Err(classify(&e)),
            Err(_) => {
                return Err(FacadeError::Transient(format!(
                    "query deadline of {:?} elapsed",
                    self.config.query_timeout
                )))
            },
        };

        let report = to_report(class, raw)?;
        debug!(
            client_order_id,
            symbol = %symbol,
            class = %class,
            native = %report.native_status,
            status = %report.status,
            "Order status queried"
        );
        Ok(report)
    }

    /// Query with the confirmatory protocol: an inconclusive first answer is
    /// followed by exactly one more query, whose answer is authoritative.
    pub async fn query_confirmed(
        &self,
        symbol: &Symbol,
        client_order_id: &str,
        class: OrderClass,
    ) -> QueryVerdict {
        let first = match self.query_status(symbol, client_order_id, class).await {
            Ok(report) => return QueryVerdict::Observed(report),
            Err(FacadeError::Rejected(detail)) => return QueryVerdict::Rejected(detail),
            Err(e @ FacadeError::Transient(_)) => return QueryVerdict::Unresolved(e),
            Err(e) => e,
        };

        debug!(client_order_id, symbol = %symbol, error = %first, "Confirming inconclusive query");

        match self.query_status(symbol, client_order_id, class).await {
            Ok(report) => QueryVerdict::Confirmed(report),
            Err(FacadeError::NotFound(detail)) if matches!(first, FacadeError::NotFound(_)) => {
                QueryVerdict::Vanished { detail }
            },
            Err(FacadeError::Rejected(detail)) => QueryVerdict::Rejected(detail),
            Err(e) => QueryVerdict::Unresolved(e),
        }
    }

    /// Cancel an order under the cancel deadline.
    ///
    /// A "not found" answer triggers exactly one confirmatory query. An
    /// ambiguous answer is confirmed the same way, but if that confirmation
    /// fails the cancel is reported transient rather than unconfirmed.
    pub async fn cancel(
        &self,
        symbol: &Symbol,
        client_order_id: &str,
        class: OrderClass,
    ) -> FacadeResult<CancelOutcome> {
        let call = async {
            match class {
                OrderClass::Standard => self.gateway.cancel_standard(symbol, client_order_id).await,
                OrderClass::Conditional => {
                    self.gateway.cancel_conditional(symbol, client_order_id).await
                },
            }
        };

        let err = match timeout(self.config.cancel_timeout, call).await {
            Ok(Ok(raw)) => return Ok(cancel_accepted(class, raw)),
            Ok(Err(e)) => classify(&e),
            Err(_) => {
                return Err(FacadeError::Transient(format!(
                    "cancel deadline of {:?} elapsed",
                    self.config.cancel_timeout
                )))
            },
        };

        if !err.needs_confirmation() {
            return Err(err);
        }

        debug!(client_order_id, symbol = %symbol, error = %err, "Confirming inconclusive cancel");

        match self.query_status(symbol, client_order_id, class).await {
            Ok(report) if report.status.is_terminal() => Ok(CancelOutcome::AlreadyTerminal(report)),
            Ok(report) => Ok(CancelOutcome::Ambiguous(report)),
            Err(confirm_err) => match &err {
                FacadeError::NotFound(_) => {
                    warn!(
                        client_order_id,
                        symbol = %symbol,
                        cancel_error = %err,
                        confirm_error = %confirm_err,
                        "Cancel not found and confirmation failed"
                    );
                    Ok(CancelOutcome::CancelledUnconfirmed {
                        reason: format!("{}; confirmation: {}", err, confirm_err),
                    })
                },
                _ => Err(FacadeError::Transient(format!(
                    "{}; confirmation: {}",
                    err, confirm_err
                ))),
            },
        }
    }
}

fn to_report(class: OrderClass, raw: RawOrderState) -> FacadeResult<StatusReport> {
    let status = translate_status(class, &raw.status).ok_or_else(|| {
        FacadeError::Ambiguous(format!("unknown {} status {:?}", class, raw.status))
    })?;
    Ok(StatusReport {
        status,
        executed_qty: raw.executed_qty,
        exchange_order_id: raw.exchange_order_id,
        native_status: raw.status,
        raw: raw.raw,
    })
}

/// A successful cancel response; anything but another terminal status counts
/// as the cancel having landed.
fn cancel_accepted(class: OrderClass, raw: RawOrderState) -> CancelOutcome {
    let translated = translate_status(class, &raw.status);
    let report = StatusReport {
        status: OrderStatus::Cancelled,
        executed_qty: raw.executed_qty,
        exchange_order_id: raw.exchange_order_id,
        native_status: raw.status,
        raw: raw.raw,
    };
    match translated {
        Some(status) if status.is_terminal() && status != OrderStatus::Cancelled => {
            CancelOutcome::AlreadyTerminal(StatusReport { status, ..report })
        },
        _ => CancelOutcome::Cancelled(report),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::StubGateway;
    use rust_decimal_macros::dec;

    fn symbol() -> Symbol {
        Symbol::from_pair("BTCUSDT").unwrap()
    }

    fn facade(gateway: Arc<StubGateway>) -> OrderFacade {
        OrderFacade::new(gateway, FacadeConfig::default())
    }

    #[test]
    fn test_standard_vocabulary() {
        let t = |s| translate_status(OrderClass::Standard, s);
        assert_eq!(t("NEW"), Some(OrderStatus::Live));
        assert_eq!(t("PARTIALLY_FILLED"), Some(OrderStatus::Live));
        assert_eq!(t("FILLED"), Some(OrderStatus::Filled));
        assert_eq!(t("CANCELED"), Some(OrderStatus::Cancelled));
        assert_eq!(t("EXPIRED"), Some(OrderStatus::Cancelled));
        assert_eq!(t("REJECTED"), Some(OrderStatus::Failed));
        assert_eq!(t("WORKING"), None);
    }

    #[test]
    fn test_conditional_vocabulary() {
        let t = |s| translate_status(OrderClass::Conditional, s);
        assert_eq!(t("NEW"), Some(OrderStatus::Live));
        assert_eq!(t("WORKING"), Some(OrderStatus::Live));
        assert_eq!(t(CONDITIONAL_PLACEHOLDER), Some(OrderStatus::Live));
        assert_eq!(t("EXECUTED"), Some(OrderStatus::Filled));
        assert_eq!(t("FINISHED"), Some(OrderStatus::Filled));
        assert_eq!(t("CANCELED"), Some(OrderStatus::Cancelled));
        assert_eq!(t("EXPIRED"), Some(OrderStatus::Cancelled));
        assert_eq!(t("PARTIALLY_FILLED"), None);
    }

    #[test]
    fn test_classify() {
        let api = |code, msg: &str| GatewayError::Api { code, msg: msg.to_string() };

        assert!(matches!(classify(&api(-2011, "Unknown order sent.")), FacadeError::NotFound(_)));
        assert!(matches!(classify(&api(-2013, "Order does not exist.")), FacadeError::NotFound(_)));
        assert!(matches!(classify(&api(-1003, "Too many requests")), FacadeError::Transient(_)));
        assert!(matches!(classify(&api(-1007, "Timeout waiting")), FacadeError::Ambiguous(_)));
        assert!(matches!(classify(&api(-4164, "Notional too small")), FacadeError::Rejected(_)));
        assert!(matches!(classify(&api(-5000, "Algo order does not exist")), FacadeError::NotFound(_)));
        assert!(matches!(
            classify(&GatewayError::ServerUnknown { status: 503, body: String::new() }),
            FacadeError::Ambiguous(_)
        ));
        assert!(matches!(
            classify(&GatewayError::RateLimited("429".into())),
            FacadeError::Transient(_)
        ));
    }

    #[tokio::test]
    async fn test_query_translates_conditional_state() {
        let gateway = Arc::new(StubGateway::new());
        gateway.set_state("tp-1", "FINISHED", dec!(0.5));

        let report = facade(gateway)
            .query_status(&symbol(), "tp-1", OrderClass::Conditional)
            .await
            .unwrap();

        assert_eq!(report.status, OrderStatus::Filled);
        assert_eq!(report.executed_qty, dec!(0.5));
        assert_eq!(report.native_status, "FINISHED");
    }

    #[tokio::test]
    async fn test_query_unknown_vocabulary_is_ambiguous() {
        let gateway = Arc::new(StubGateway::new());
        gateway.set_state("e-1", "PENDING_NEW", dec!(0));

        let result = facade(gateway).query_status(&symbol(), "e-1", OrderClass::Standard).await;
        assert!(matches!(result, Err(FacadeError::Ambiguous(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_deadline_is_transient() {
        let gateway = Arc::new(StubGateway::new());
        gateway.set_state("e-1", "NEW", dec!(0));
        gateway.set_delay("e-1", Duration::from_secs(60));

        let result = facade(gateway).query_status(&symbol(), "e-1", OrderClass::Standard).await;
        assert!(matches!(result, Err(FacadeError::Transient(_))));
    }

    #[tokio::test]
    async fn test_query_confirmed_resolves_ambiguous_answer() {
        let gateway = Arc::new(StubGateway::new());
        gateway.set_state("sl-1", "CANCELED", dec!(0));
        gateway.fail_next_query(
            "sl-1",
            GatewayError::ServerUnknown { status: 502, body: "Bad Gateway".into() },
        );

        let verdict =
            facade(gateway.clone()).query_confirmed(&symbol(), "sl-1", OrderClass::Conditional).await;

        match verdict {
            QueryVerdict::Confirmed(report) => assert_eq!(report.status, OrderStatus::Cancelled),
            other => panic!("Expected Confirmed, got {:?}", other),
        }
        assert_eq!(gateway.query_calls("sl-1"), 2);
    }

    #[tokio::test]
    async fn test_query_confirmed_vanished() {
        let gateway = Arc::new(StubGateway::new());

        let verdict =
            facade(gateway.clone()).query_confirmed(&symbol(), "ghost", OrderClass::Standard).await;

        assert!(matches!(verdict, QueryVerdict::Vanished { .. }));
        assert_eq!(gateway.query_calls("ghost"), 2);
    }

    #[tokio::test]
    async fn test_query_confirmed_transient_is_not_retried() {
        let gateway = Arc::new(StubGateway::new());
        gateway.set_state("e-1", "NEW", dec!(0));
        gateway.fail_next_query("e-1", GatewayError::Timeout("read timed out".into()));

        let verdict =
            facade(gateway.clone()).query_confirmed(&symbol(), "e-1", OrderClass::Standard).await;

        assert!(matches!(verdict, QueryVerdict::Unresolved(FacadeError::Transient(_))));
        assert_eq!(gateway.query_calls("e-1"), 1);
    }

    #[tokio::test]
    async fn test_cancel_live_order() {
        let gateway = Arc::new(StubGateway::new());
        gateway.set_state("sl-1", "NEW", dec!(0));

        let outcome =
            facade(gateway.clone()).cancel(&symbol(), "sl-1", OrderClass::Conditional).await.unwrap();

        assert!(matches!(outcome, CancelOutcome::Cancelled(_)));
        assert_eq!(gateway.cancel_calls("sl-1"), 1);
        assert_eq!(gateway.query_calls("sl-1"), 0);
    }

    #[tokio::test]
    async fn test_cancel_not_found_confirms_fill() {
        let gateway = Arc::new(StubGateway::new());
        gateway.set_state("tp-1", "FINISHED", dec!(0.5));

        let outcome =
            facade(gateway.clone()).cancel(&symbol(), "tp-1", OrderClass::Conditional).await.unwrap();

        match outcome {
            CancelOutcome::AlreadyTerminal(report) => assert_eq!(report.status, OrderStatus::Filled),
            other => panic!("Expected AlreadyTerminal, got {:?}", other),
        }
        assert_eq!(gateway.query_calls("tp-1"), 1);
    }

    #[tokio::test]
    async fn test_cancel_not_found_but_still_live() {
        let gateway = Arc::new(StubGateway::new());
        gateway.set_state("tp-1", "NEW", dec!(0));
        gateway.fail_next_cancel(
            "tp-1",
            GatewayError::Api { code: -2011, msg: "Unknown order sent.".into() },
        );

        let outcome =
            facade(gateway).cancel(&symbol(), "tp-1", OrderClass::Standard).await.unwrap();
        assert!(matches!(outcome, CancelOutcome::Ambiguous(_)));
    }

    #[tokio::test]
    async fn test_cancel_not_found_confirmation_failed() {
        let gateway = Arc::new(StubGateway::new());
        gateway.set_state("tp-1", "NEW", dec!(0));
        gateway.fail_next_cancel(
            "tp-1",
            GatewayError::Api { code: -2011, msg: "Unknown order sent.".into() },
        );
        gateway.fail_next_query("tp-1", GatewayError::Transport("connection reset".into()));

        let outcome =
            facade(gateway).cancel(&symbol(), "tp-1", OrderClass::Standard).await.unwrap();
        assert!(matches!(outcome, CancelOutcome::CancelledUnconfirmed { .. }));
    }

    #[tokio::test]
    async fn test_cancel_ambiguous_with_failed_confirmation_is_transient() {
        let gateway = Arc::new(StubGateway::new());
        gateway.set_state("tp-1", "NEW", dec!(0));
        gateway.fail_next_cancel("tp-1", GatewayError::ServerUnknown { status: 500, body: "".into() });
        gateway.fail_next_query("tp-1", GatewayError::Timeout("read timed out".into()));

        let result = facade(gateway).cancel(&symbol(), "tp-1", OrderClass::Standard).await;
        assert!(matches!(result, Err(FacadeError::Transient(_))));
    }

    #[tokio::test]
    async fn test_cancel_rejected_is_not_confirmed() {
        let gateway = Arc::new(StubGateway::new());
        gateway.set_state("tp-1", "NEW", dec!(0));
        gateway.fail_next_cancel("tp-1", GatewayError::Api { code: -1102, msg: "Mandatory parameter".into() });

        let result = facade(gateway.clone()).cancel(&symbol(), "tp-1", OrderClass::Standard).await;
        assert!(matches!(result, Err(FacadeError::Rejected(_))));
        assert_eq!(gateway.query_calls("tp-1"), 0);
    }
}
