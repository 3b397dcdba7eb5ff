//! Stub gateway for testing.
//!
//! Simulates the exchange's order endpoints without making real API calls.
//! Order states are scripted per client order id; failures, delays and
//! panics can be injected per call.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use bracket_domain::Symbol;

use crate::error::GatewayError;
use crate::ports::{OrderGateway, RawOrderState};

/// Native literals after which an order can no longer be cancelled.
const TERMINAL_NATIVE: &[&str] =
    &["FILLED", "CANCELED", "EXPIRED", "EXPIRED_IN_MATCH", "REJECTED", "EXECUTED", "FINISHED"];

#[derive(Default)]
struct StubState {
    orders: HashMap<String, RawOrderState>,
    query_failures: HashMap<String, VecDeque<GatewayError>>,
    cancel_failures: HashMap<String, VecDeque<GatewayError>>,
    /// State to switch to right after the next cancel call returns
    after_cancel: HashMap<String, RawOrderState>,
    delays: HashMap<String, Duration>,
    panics: HashMap<String, bool>,
    query_calls: HashMap<String, usize>,
    cancel_calls: HashMap<String, usize>,
}

/// Stub gateway for testing.
///
/// Unknown client order ids answer with the exchange's "does not exist"
/// error. Cancelling a terminal order answers "unknown order", like the
/// real venue.
#[derive(Default)]
pub struct StubGateway {
    state: Mutex<StubState>,
}

impl StubGateway {
    /// Create an empty stub.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StubState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Script the native status of an order.
    pub fn set_state(&self, client_order_id: &str, status: &str, executed_qty: Decimal) {
        let mut raw = RawOrderState::new(status);
        raw.executed_qty = executed_qty;
        raw.raw = serde_json::json!({
            "clientOrderId": client_order_id,
            "status": status,
            "executedQty": executed_qty.to_string(),
        });
        self.lock().orders.insert(client_order_id.to_string(), raw);
    }

    /// Script a full raw state (exchange id, body).
    pub fn set_raw_state(&self, client_order_id: &str, raw: RawOrderState) {
        self.lock().orders.insert(client_order_id.to_string(), raw);
    }

    /// Forget an order, so it answers "does not exist".
    pub fn remove(&self, client_order_id: &str) {
        self.lock().orders.remove(client_order_id);
    }

    /// Fail the next query of this order with `err`. Calls queue up.
    pub fn fail_next_query(&self, client_order_id: &str, err: GatewayError) {
        self.lock()
            .query_failures
            .entry(client_order_id.to_string())
            .or_default()
            .push_back(err);
    }

    /// Fail the next cancel of this order with `err`. Calls queue up.
    pub fn fail_next_cancel(&self, client_order_id: &str, err: GatewayError) {
        self.lock()
            .cancel_failures
            .entry(client_order_id.to_string())
            .or_default()
            .push_back(err);
    }

    /// Move the order to `status` right after the next cancel call,
    /// whatever that call returned (the exchange acted in between).
    pub fn after_next_cancel(&self, client_order_id: &str, status: &str) {
        self.lock()
            .after_cancel
            .insert(client_order_id.to_string(), RawOrderState::new(status));
    }

    /// Delay every query of this order.
    pub fn set_delay(&self, client_order_id: &str, delay: Duration) {
        self.lock().delays.insert(client_order_id.to_string(), delay);
    }

    /// Panic on every query of this order.
    pub fn panic_on_query(&self, client_order_id: &str) {
        self.lock().panics.insert(client_order_id.to_string(), true);
    }

    /// Number of queries made for an order.
    pub fn query_calls(&self, client_order_id: &str) -> usize {
        self.lock().query_calls.get(client_order_id).copied().unwrap_or(0)
    }

    /// Number of cancels made for an order.
    pub fn cancel_calls(&self, client_order_id: &str) -> usize {
        self.lock().cancel_calls.get(client_order_id).copied().unwrap_or(0)
    }

    /// Total cancels across all orders.
    pub fn total_cancel_calls(&self) -> usize {
        self.lock().cancel_calls.values().sum()
    }

    async fn query(&self, client_order_id: &str) -> Result<RawOrderState, GatewayError> {
        let (delay, panics) = {
            let mut state = self.lock();
            *state.query_calls.entry(client_order_id.to_string()).or_default() += 1;
            (
                state.delays.get(client_order_id).copied(),
                state.panics.get(client_order_id).copied().unwrap_or(false),
            )
        };

        if panics {
            panic!("stub gateway panic for {}", client_order_id);
        }
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        if let Some(err) = state.query_failures.get_mut(client_order_id).and_then(|q| q.pop_front()) {
            return Err(err);
        }
        state.orders.get(client_order_id).cloned().ok_or_else(|| GatewayError::Api {
            code: -2013,
            msg: "Order does not exist.".to_string(),
        })
    }

    async fn cancel(&self, client_order_id: &str) -> Result<RawOrderState, GatewayError> {
        let mut state = self.lock();
        *state.cancel_calls.entry(client_order_id.to_string()).or_default() += 1;

        let result = if let Some(err) =
            state.cancel_failures.get_mut(client_order_id).and_then(|q| q.pop_front())
        {
            Err(err)
        } else {
            match state.orders.get_mut(client_order_id) {
                Some(raw) if !TERMINAL_NATIVE.contains(&raw.status.as_str()) => {
                    raw.status = "CANCELED".to_string();
                    raw.raw = serde_json::json!({
                        "clientOrderId": client_order_id,
                        "status": "CANCELED",
                    });
                    Ok(raw.clone())
                },
                _ => Err(GatewayError::Api {
                    code: -2011,
                    msg: "Unknown order sent.".to_string(),
                }),
            }
        };

        if let Some(next) = state.after_cancel.remove(client_order_id) {
            state.orders.insert(client_order_id.to_string(), next);
        }

        tracing::debug!(client_order_id, ok = result.is_ok(), "Stub: cancel");
        result
    }
}

#[async_trait]
impl OrderGateway for StubGateway {
    async fn query_standard(
        &self,
        _symbol: &Symbol,
        client_order_id: &str,
    ) -> Result<RawOrderState, GatewayError> {
        self.query(client_order_id).await
    }

    async fn query_conditional(
        &self,
        _symbol: &Symbol,
        client_order_id: &str,
    ) -> Result<RawOrderState, GatewayError> {
        self.query(client_order_id).await
    }

    async fn cancel_standard(
        &self,
        _symbol: &Symbol,
        client_order_id: &str,
    ) -> Result<RawOrderState, GatewayError> {
        self.cancel(client_order_id).await
    }

    async fn cancel_conditional(
        &self,
        _symbol: &Symbol,
        client_order_id: &str,
    ) -> Result<RawOrderState, GatewayError> {
        self.cancel(client_order_id).await
    }
}

// =============================================================================
// Tests
// =============================================================================
