//! HTTP API for the bracket daemon.
//!
//! Read-only endpoints for the order-placement path and operators:
//! - Health check
//! - Status (loop statistics, open orders, active brackets)
//! - Order by client order id
//! - Bracket with its legs
//! - Bracket audit trail

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use bracket_domain::{AuditLogEntry, Bracket, Order};
use bracket_store::Store;

use crate::error::DaemonError;
use crate::reconciler::{LoopStats, ReconciliationLoop};

// =============================================================================
// API State
// =============================================================================

/// Shared state for API handlers.
pub struct ApiState {
    pub store: Arc<dyn Store>,
    pub reconciler: Arc<ReconciliationLoop>,
}

// =============================================================================
// Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Status response.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub open_orders: usize,
    pub active_brackets: usize,
    pub passes_completed: u64,
    pub passes_skipped: u64,
    pub passes_failed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_pass_at: Option<DateTime<Utc>>,
}

/// Summary of an order.
#[derive(Debug, Serialize, Deserialize)]
pub struct OrderSummary {
    pub client_order_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exchange_order_id: Option<String>,
    pub symbol: String,
    pub kind: String,
    pub class: String,
    pub status: String,
    pub executed_qty: Decimal,
    pub updated_at: DateTime<Utc>,
}

/// A bracket with its three legs.
#[derive(Debug, Serialize, Deserialize)]
pub struct BracketResponse {
    pub group_id: Uuid,
    pub symbol: String,
    pub status: String,
    pub unwinding: bool,
    pub needs_review: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    pub entry: Option<OrderSummary>,
    pub take_profit: Option<OrderSummary>,
    pub stop_loss: Option<OrderSummary>,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

// =============================================================================
// Router
// =============================================================================

/// Create the API router.
pub fn create_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/orders/:client_order_id", get(get_order_handler))
        .route("/brackets/:group_id", get(get_bracket_handler))
        .route("/brackets/:group_id/audit", get(bracket_audit_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint.
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Loop statistics and open work.
async fn status_handler(State(state): State<Arc<ApiState>>) -> ApiResult<StatusResponse> {
    let open_orders = state
        .store
        .orders()
        .find_non_terminal()
        .await
        .map_err(|e| to_error_response(e.into()))?
        .len();
    let active_brackets = state
        .store
        .brackets()
        .find_active()
        .await
        .map_err(|e| to_error_response(e.into()))?
        .len();

    let LoopStats {
        passes_completed,
        passes_skipped,
        passes_failed,
        last_pass_at,
        ..
    } = state.reconciler.stats().await;

    Ok(Json(StatusResponse {
        open_orders,
        active_brackets,
        passes_completed,
        passes_skipped,
        passes_failed,
        last_pass_at,
    }))
}

/// Get one order.
async fn get_order_handler(
    State(state): State<Arc<ApiState>>,
    Path(client_order_id): Path<String>,
) -> ApiResult<OrderSummary> {
    let order = state
        .store
        .orders()
        .find_by_client_id(&client_order_id)
        .await
        .map_err(|e| to_error_response(e.into()))?
        .ok_or_else(|| to_error_response(DaemonError::OrderNotFound(client_order_id)))?;

    Ok(Json(order_to_summary(&order)))
}

/// Get a bracket and its legs.
async fn get_bracket_handler(
    State(state): State<Arc<ApiState>>,
    Path(group_id): Path<Uuid>,
) -> ApiResult<BracketResponse> {
    let bracket = find_bracket(&state, group_id).await?;

    let orders = state.store.orders();
    let mut legs = Vec::with_capacity(3);
    for client_id in [&bracket.entry_client_id, &bracket.tp_client_id, &bracket.sl_client_id] {
        let leg = orders
            .find_by_client_id(client_id)
            .await
            .map_err(|e| to_error_response(e.into()))?;
        legs.push(leg.as_ref().map(order_to_summary));
    }
    let mut legs = legs.into_iter();

    Ok(Json(BracketResponse {
        group_id: bracket.group_id,
        symbol: bracket.symbol.as_pair(),
        status: bracket.status.to_string(),
        unwinding: bracket.unwinding,
        needs_review: bracket.needs_review,
        closed_at: bracket.closed_at,
        entry: legs.next().flatten(),
        take_profit: legs.next().flatten(),
        stop_loss: legs.next().flatten(),
    }))
}

/// Every audit entry correlated with a bracket, oldest first.
async fn bracket_audit_handler(
    State(state): State<Arc<ApiState>>,
    Path(group_id): Path<Uuid>,
) -> ApiResult<Vec<AuditLogEntry>> {
    let bracket = find_bracket(&state, group_id).await?;
    let entries = state
        .store
        .audit()
        .find_by_bracket(bracket.group_id)
        .await
        .map_err(|e| to_error_response(e.into()))?;

    Ok(Json(entries))
}

// =============================================================================
// Helpers
// =============================================================================

async fn find_bracket(
    state: &ApiState,
    group_id: Uuid,
) -> Result<Bracket, (StatusCode, Json<ErrorResponse>)> {
    state
        .store
        .brackets()
        .find_by_id(group_id)
        .await
        .map_err(|e| to_error_response(e.into()))?
        .ok_or_else(|| to_error_response(DaemonError::BracketNotFound(group_id)))
}

fn to_error_response(error: DaemonError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &error {
        DaemonError::OrderNotFound(_) | DaemonError::BracketNotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

fn order_to_summary(order: &Order) -> OrderSummary {
    OrderSummary {
        client_order_id: order.client_order_id.clone(),
        exchange_order_id: order.exchange_order_id.clone(),
        symbol: order.symbol.as_pair(),
        kind: order.kind.to_string(),
        class: order.class.to_string(),
        status: order.status.to_string(),
        executed_qty: order.executed_qty,
        updated_at: order.updated_at,
    }
}

// =============================================================================
// Tests
// =============================================================================
