//! In-memory store implementation
//!
//! Used for testing and development without a database.
//! Thread-safe using RwLock for concurrent access.

use crate::error::StoreError;
use crate::repository::{
    apply_observation, AuditRepository, BracketRepository, OrderRepository, Store,
};
use async_trait::async_trait;
use bracket_domain::{
    AuditLogEntry, Bracket, BracketId, BracketStatus, EntityType, Order, OrderStatus,
    StatusChange,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// In-memory store for testing
pub struct MemoryStore {
    /// Keyed by client order id
    orders: RwLock<HashMap<String, Order>>,
    brackets: RwLock<HashMap<BracketId, Bracket>>,
    audit: RwLock<Vec<AuditLogEntry>>,
    audit_seq: AtomicI64,
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>, StoreError> {
    lock.read().map_err(|e| StoreError::Unavailable(e.to_string()))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>, StoreError> {
    lock.write().map_err(|e| StoreError::Unavailable(e.to_string()))
}

impl MemoryStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self {
            orders: RwLock::new(HashMap::new()),
            brackets: RwLock::new(HashMap::new()),
            audit: RwLock::new(Vec::new()),
            audit_seq: AtomicI64::new(0),
        }
    }

    /// Get the number of orders
    pub fn order_count(&self) -> usize {
        self.orders.read().map(|o| o.len()).unwrap_or(0)
    }

    /// Get the number of brackets
    pub fn bracket_count(&self) -> usize {
        self.brackets.read().map(|b| b.len()).unwrap_or(0)
    }

    /// Get the number of audit entries
    pub fn audit_count(&self) -> usize {
        self.audit.read().map(|a| a.len()).unwrap_or(0)
    }

    /// Snapshot of the whole audit log (useful for assertions)
    pub fn audit_entries(&self) -> Vec<AuditLogEntry> {
        self.audit.read().map(|a| a.clone()).unwrap_or_default()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Order Repository Implementation
// =============================================================================

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn insert(&self, order: &Order) -> Result<(), StoreError> {
        let mut orders = write(&self.orders)?;
        if orders.contains_key(&order.client_order_id) {
            return Err(StoreError::duplicate("order", order.client_order_id.clone()));
        }
        orders.insert(order.client_order_id.clone(), order.clone());
        Ok(())
    }

    async fn find_by_client_id(&self, client_id: &str) -> Result<Option<Order>, StoreError> {
        let orders = read(&self.orders)?;
        Ok(orders.get(client_id).cloned())
    }

    async fn find_by_status(&self, statuses: &[OrderStatus]) -> Result<Vec<Order>, StoreError> {
        let orders = read(&self.orders)?;
        let mut found: Vec<Order> =
            orders.values().filter(|o| statuses.contains(&o.status)).cloned().collect();
        found.sort_by_key(|o| o.created_at);
        Ok(found)
    }

    async fn apply_status(
        &self,
        client_id: &str,
        status: OrderStatus,
        executed_qty: Decimal,
        raw: Option<serde_json::Value>,
    ) -> Result<StatusChange, StoreError> {
        let mut orders = write(&self.orders)?;
        let order = orders
            .get_mut(client_id)
            .ok_or_else(|| StoreError::not_found("order", client_id))?;
        apply_observation(order, status, executed_qty, raw)
    }

    async fn set_exchange_order_id(
        &self,
        client_id: &str,
        exchange_order_id: &str,
    ) -> Result<(), StoreError> {
        let mut orders = write(&self.orders)?;
        let order = orders
            .get_mut(client_id)
            .ok_or_else(|| StoreError::not_found("order", client_id))?;

        match order.exchange_order_id.as_deref() {
            Some(existing) if existing == exchange_order_id => Ok(()),
            Some(existing) => Err(StoreError::invalid_state(format!(
                "order {} already has exchange id {}",
                client_id, existing
            ))),
            None => {
                order.exchange_order_id = Some(exchange_order_id.to_string());
                order.updated_at = chrono::Utc::now();
                Ok(())
            },
        }
    }
}

// =============================================================================
// Bracket Repository Implementation
// =============================================================================

#[async_trait]
impl BracketRepository for MemoryStore {
    async fn insert(&self, bracket: &Bracket) -> Result<(), StoreError> {
        let mut brackets = write(&self.brackets)?;
        if brackets.contains_key(&bracket.group_id) {
            return Err(StoreError::duplicate("bracket", bracket.group_id.to_string()));
        }

        let legs = [&bracket.entry_client_id, &bracket.tp_client_id, &bracket.sl_client_id];
        for leg in legs {
            if brackets.values().any(|b| b.role_of(leg).is_some()) {
                return Err(StoreError::duplicate("bracket leg", leg.clone()));
            }
        }

        brackets.insert(bracket.group_id, bracket.clone());
        Ok(())
    }

    async fn find_by_id(&self, group_id: BracketId) -> Result<Option<Bracket>, StoreError> {
        let brackets = read(&self.brackets)?;
        Ok(brackets.get(&group_id).cloned())
    }

    async fn find_by_leg(&self, client_id: &str) -> Result<Option<Bracket>, StoreError> {
        let brackets = read(&self.brackets)?;
        Ok(brackets.values().find(|b| b.role_of(client_id).is_some()).cloned())
    }

    async fn find_active(&self) -> Result<Vec<Bracket>, StoreError> {
        let brackets = read(&self.brackets)?;
        let mut active: Vec<Bracket> = brackets.values().filter(|b| b.is_active()).cloned().collect();
        active.sort_by_key(|b| b.created_at);
        Ok(active)
    }

    async fn mark_unwinding(&self, group_id: BracketId) -> Result<bool, StoreError> {
        let mut brackets = write(&self.brackets)?;
        let bracket = brackets
            .get_mut(&group_id)
            .ok_or_else(|| StoreError::not_found("bracket", group_id.to_string()))?;

        if bracket.unwinding || bracket.status != BracketStatus::Active {
            return Ok(false);
        }
        bracket.unwinding = true;
        bracket.updated_at = chrono::Utc::now();
        Ok(true)
    }

    async fn mark_needs_review(&self, group_id: BracketId) -> Result<bool, StoreError> {
        let mut brackets = write(&self.brackets)?;
        let bracket = brackets
            .get_mut(&group_id)
            .ok_or_else(|| StoreError::not_found("bracket", group_id.to_string()))?;

        if bracket.needs_review || bracket.status != BracketStatus::Active {
            return Ok(false);
        }
        bracket.needs_review = true;
        bracket.updated_at = chrono::Utc::now();
        Ok(true)
    }

    async fn close_if_active(&self, group_id: BracketId) -> Result<bool, StoreError> {
        let mut brackets = write(&self.brackets)?;
        let bracket = brackets
            .get_mut(&group_id)
            .ok_or_else(|| StoreError::not_found("bracket", group_id.to_string()))?;

        if !bracket.is_active() {
            return Ok(false);
        }
        bracket.close()?;
        Ok(true)
    }
}

// =============================================================================
// Audit Repository Implementation
// =============================================================================

#[async_trait]
impl AuditRepository for MemoryStore {
    async fn append(&self, entry: &AuditLogEntry) -> Result<i64, StoreError> {
        let mut audit = write(&self.audit)?;
        let seq = self.audit_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let mut stored = entry.clone();
        stored.seq = seq;
        audit.push(stored);
        Ok(seq)
    }

    async fn find_by_entity(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<Vec<AuditLogEntry>, StoreError> {
        let audit = read(&self.audit)?;
        Ok(audit
            .iter()
            .filter(|e| e.entity_type == entity_type && e.entity_id == entity_id)
            .cloned()
            .collect())
    }

    async fn find_by_bracket(&self, group_id: BracketId) -> Result<Vec<AuditLogEntry>, StoreError> {
        let audit = read(&self.audit)?;
        Ok(audit.iter().filter(|e| e.bracket_id == Some(group_id)).cloned().collect())
    }
}

// =============================================================================
// Store Implementation
// =============================================================================

impl Store for MemoryStore {
    fn orders(&self) -> &dyn OrderRepository {
        self
    }

    fn brackets(&self) -> &dyn BracketRepository {
        self
    }

    fn audit(&self) -> &dyn AuditRepository {
        self
    }
}

// =============================================================================
// Tests
// =============================================================================
