//! Domain Events for bracket reconciliation
//!
//! Events carry observed exchange transitions from the reconciliation loop
//! to the closure coordinator.

use crate::entities::{OrderKind, OrderStatus};
use crate::value_objects::Symbol;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A leg moved into a terminal status on this pass.
///
/// Emitted exactly when the stored status of an order is written terminal,
/// never for observations that left the store unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegTerminated {
    /// Client order id of the terminated leg
    pub client_order_id: String,
    /// Trading pair
    pub symbol: Symbol,
    /// Role of the order
    pub kind: OrderKind,
    /// Terminal status that was written
    pub status: OrderStatus,
    /// Whether the status came from an authoritative exchange answer
    /// (false for "vanished" orders written CANCELLED without confirmation)
    pub confirmed: bool,
    /// When the transition was observed
    pub observed_at: DateTime<Utc>,
}

impl LegTerminated {
    /// Create a confirmed event observed now.
    pub fn new(
        client_order_id: impl Into<String>,
        symbol: Symbol,
        kind: OrderKind,
        status: OrderStatus,
    ) -> Self {
        Self {
            client_order_id: client_order_id.into(),
            symbol,
            kind,
            status,
            confirmed: true,
            observed_at: Utc::now(),
        }
    }

    /// Mark the event as unconfirmed.
    pub fn unconfirmed(mut self) -> Self {
        self.confirmed = false;
        self
    }

    /// True for the entry-fill trigger (cancel both protective legs).
    pub fn is_entry_fill(&self) -> bool {
        self.kind == OrderKind::Entry && self.status == OrderStatus::Filled
    }
}
