//! Repository trait definitions (Ports)
//!
//! These traits define the storage interface for orders, brackets and the
//! audit log. Implementations can be PostgreSQL or in-memory.

use crate::error::StoreError;
use async_trait::async_trait;
use bracket_domain::{
    AuditLogEntry, Bracket, BracketId, EntityType, Order, OrderStatus, StatusChange,
};
use rust_decimal::Decimal;

/// Repository for Order entities
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Insert a new order. Fails with `Duplicate` if the client order id exists.
    async fn insert(&self, order: &Order) -> Result<(), StoreError>;

    /// Find order by client order ID
    async fn find_by_client_id(&self, client_id: &str) -> Result<Option<Order>, StoreError>;

    /// Find orders whose status is one of `statuses`, oldest first
    async fn find_by_status(&self, statuses: &[OrderStatus]) -> Result<Vec<Order>, StoreError>;

    /// Orders the reconciliation loop still has to poll
    async fn find_non_terminal(&self) -> Result<Vec<Order>, StoreError> {
        self.find_by_status(&OrderStatus::NON_TERMINAL).await
    }

    /// Apply an observed status, enforcing monotonic transitions.
    ///
    /// `executed_qty` and `raw` are recorded whenever the status moves, or
    /// when a still-working order reports progress at the same status.
    async fn apply_status(
        &self,
        client_id: &str,
        status: OrderStatus,
        executed_qty: Decimal,
        raw: Option<serde_json::Value>,
    ) -> Result<StatusChange, StoreError>;

    /// Record the exchange-assigned id once it is known
    async fn set_exchange_order_id(
        &self,
        client_id: &str,
        exchange_order_id: &str,
    ) -> Result<(), StoreError>;
}

/// Repository for Bracket entities
#[async_trait]
pub trait BracketRepository: Send + Sync {
    /// Insert a new bracket. Fails with `Duplicate` if any leg is already
    /// part of another bracket.
    async fn insert(&self, bracket: &Bracket) -> Result<(), StoreError>;

    /// Find a bracket by group id
    async fn find_by_id(&self, group_id: BracketId) -> Result<Option<Bracket>, StoreError>;

    /// Find the bracket a client order id belongs to
    async fn find_by_leg(&self, client_id: &str) -> Result<Option<Bracket>, StoreError>;

    /// All ACTIVE brackets, oldest first
    async fn find_active(&self) -> Result<Vec<Bracket>, StoreError>;

    /// Persist the unwinding marker. Returns `true` if it was newly set.
    async fn mark_unwinding(&self, group_id: BracketId) -> Result<bool, StoreError>;

    /// Flag an ACTIVE bracket for manual resolution. Returns `true` if it
    /// was newly set.
    async fn mark_needs_review(&self, group_id: BracketId) -> Result<bool, StoreError>;

    /// Compare-and-set ACTIVE → CLOSED.
    ///
    /// Returns `true` for exactly one caller; `false` if already closed.
    async fn close_if_active(&self, group_id: BracketId) -> Result<bool, StoreError>;
}

/// Repository for audit entries (append-only)
#[async_trait]
pub trait AuditRepository: Send + Sync {
    /// Append an entry, returning its sequence number
    async fn append(&self, entry: &AuditLogEntry) -> Result<i64, StoreError>;

    /// Entries about one entity, in sequence order
    async fn find_by_entity(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<Vec<AuditLogEntry>, StoreError>;

    /// Every entry correlated with a bracket, in sequence order
    async fn find_by_bracket(&self, group_id: BracketId) -> Result<Vec<AuditLogEntry>, StoreError>;
}

/// Combined store interface
pub trait Store: Send + Sync {
    /// Get order repository
    fn orders(&self) -> &dyn OrderRepository;

    /// Get bracket repository
    fn brackets(&self) -> &dyn BracketRepository;

    /// Get audit repository
    fn audit(&self) -> &dyn AuditRepository;
}

/// Shared write rule behind `OrderRepository::apply_status`.
pub(crate) fn apply_observation(
    order: &mut Order,
    status: OrderStatus,
    executed_qty: Decimal,
    raw: Option<serde_json::Value>,
) -> Result<StatusChange, StoreError> {
    let change = order.apply_status(status)?;

    let progressed = change == StatusChange::Unchanged
        && order.status == status
        && !order.is_terminal()
        && executed_qty != order.executed_qty;

    if matches!(change, StatusChange::Applied { .. }) || progressed {
        order.executed_qty = executed_qty;
        if raw.is_some() {
            order.raw_result = raw;
        }
        order.updated_at = chrono::Utc::now();
    }

    Ok(change)
}
