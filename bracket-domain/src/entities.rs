//! Domain Entities for bracket reconciliation
//!
//! Orders and the bracket triplets that link them.
//! All entities have identity and monotonic state transitions.

use crate::value_objects::{validate_client_order_id, DomainError, Symbol};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// =============================================================================
// Identifiers
// =============================================================================

/// Unique identifier for an Order row
pub type OrderId = Uuid;

/// Unique identifier for a Bracket (the group id shared by its legs)
pub type BracketId = Uuid;

// =============================================================================
// Order Kind / Class
// =============================================================================

/// Role an order plays within its position
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderKind {
    /// Opens the position
    Entry,
    /// Protective leg closing the position at profit
    TakeProfit,
    /// Protective leg closing the position at loss
    StopLoss,
}

impl OrderKind {
    /// Persisted literal
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderKind::Entry => "ENTRY",
            OrderKind::TakeProfit => "TAKE_PROFIT",
            OrderKind::StopLoss => "STOP_LOSS",
        }
    }
}

impl FromStr for OrderKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ENTRY" => Ok(OrderKind::Entry),
            "TAKE_PROFIT" => Ok(OrderKind::TakeProfit),
            "STOP_LOSS" => Ok(OrderKind::StopLoss),
            other => Err(DomainError::InvalidValue(format!("order kind {}", other))),
        }
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which exchange sub-API owns the order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderClass {
    /// Plain order book order (`/fapi/v1/order`)
    Standard,
    /// Trigger-based algo order (`/fapi/v1/algoOrder`)
    Conditional,
}

impl OrderClass {
    /// Persisted literal
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderClass::Standard => "STANDARD",
            OrderClass::Conditional => "CONDITIONAL",
        }
    }
}

impl FromStr for OrderClass {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STANDARD" => Ok(OrderClass::Standard),
            "CONDITIONAL" => Ok(OrderClass::Conditional),
            other => Err(DomainError::InvalidValue(format!("order class {}", other))),
        }
    }
}

impl fmt::Display for OrderClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Order Status
// =============================================================================

/// Internal order status vocabulary
///
/// Both exchange sub-APIs are translated into this set exactly once, in the
/// exchange facade.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Row created by the placement path, not yet sent
    New,
    /// Sent, acknowledgment pending
    Processing,
    /// Resting on the exchange
    Live,
    /// Completely executed
    Filled,
    /// Cancelled or expired
    Cancelled,
    /// Rejected or never reached the exchange
    Failed,
}

impl OrderStatus {
    /// Statuses the reconciliation loop keeps polling.
    pub const NON_TERMINAL: [OrderStatus; 3] =
        [OrderStatus::New, OrderStatus::Processing, OrderStatus::Live];

    /// Terminal statuses have no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Failed)
    }

    /// Position in the lifecycle; all terminal statuses share the last rank.
    pub fn rank(&self) -> u8 {
        match self {
            OrderStatus::New => 0,
            OrderStatus::Processing => 1,
            OrderStatus::Live => 2,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Failed => 3,
        }
    }

    /// Check whether moving to `next` is a forward transition.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }

    /// Persisted literal
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Live => "LIVE",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Failed => "FAILED",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(OrderStatus::New),
            "PROCESSING" => Ok(OrderStatus::Processing),
            "LIVE" => Ok(OrderStatus::Live),
            "FILLED" => Ok(OrderStatus::Filled),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            "FAILED" => Ok(OrderStatus::Failed),
            other => Err(DomainError::InvalidValue(format!("order status {}", other))),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of applying an observed status to an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    /// Status moved forward
    Applied {
        /// Status before the write
        from: OrderStatus,
        /// Status after the write
        to: OrderStatus,
    },
    /// Observation matched (or trailed) the stored state; nothing written
    Unchanged,
}

impl StatusChange {
    /// True when the change moved the order into a terminal status.
    pub fn is_terminal_transition(&self) -> bool {
        matches!(self, StatusChange::Applied { to, .. } if to.is_terminal())
    }
}

// =============================================================================
// Order
// =============================================================================

/// Order represents one leg sent (or about to be sent) to the exchange
///
/// Created by the placement path in `New`; afterwards only the
/// reconciliation loop writes its status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    /// Caller-assigned, globally unique correlation key
    pub client_order_id: String,
    /// Exchange-assigned id, absent until acknowledged
    pub exchange_order_id: Option<String>,

    pub symbol: Symbol,
    pub kind: OrderKind,
    pub class: OrderClass,
    pub status: OrderStatus,

    /// Last executed quantity reported by the exchange
    pub executed_qty: Decimal,
    /// Last raw exchange payload (audit)
    pub raw_result: Option<serde_json::Value>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Create a new order row in `New`.
    pub fn new(
        client_order_id: impl Into<String>,
        symbol: Symbol,
        kind: OrderKind,
        class: OrderClass,
    ) -> Result<Self, DomainError> {
        let client_order_id = client_order_id.into();
        validate_client_order_id(&client_order_id)?;

        let now = Utc::now();
        Ok(Self {
            id: Uuid::now_v7(),
            client_order_id,
            exchange_order_id: None,
            symbol,
            kind,
            class,
            status: OrderStatus::New,
            executed_qty: Decimal::ZERO,
            raw_result: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Whether the exchange has ever acknowledged this order.
    pub fn is_acknowledged(&self) -> bool {
        self.exchange_order_id.is_some()
            || matches!(self.status, OrderStatus::Processing | OrderStatus::Live)
    }

    /// Check if order is in a terminal status
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply an observed status.
    ///
    /// Forward moves are applied. Observations that trail the stored state
    /// (e.g. a lagging `Live` after `Filled` was already written, or the same
    /// terminal status observed twice) are `Unchanged`. Moving one terminal
    /// status to a different terminal status is rejected.
    pub fn apply_status(&mut self, next: OrderStatus) -> Result<StatusChange, DomainError> {
        let current = self.status;

        if current == next {
            return Ok(StatusChange::Unchanged);
        }

        if current.is_terminal() {
            if next.is_terminal() {
                return Err(DomainError::InvalidStateTransition(format!(
                    "order {} is {} and cannot become {}",
                    self.client_order_id, current, next
                )));
            }
            return Ok(StatusChange::Unchanged);
        }

        if !current.can_transition_to(next) {
            return Ok(StatusChange::Unchanged);
        }

        self.status = next;
        self.updated_at = Utc::now();
        Ok(StatusChange::Applied { from: current, to: next })
    }
}

// =============================================================================
// Bracket
// =============================================================================

/// Bracket lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BracketStatus {
    /// Protective legs may still be working
    Active,
    /// Both protective legs terminal; never reopens
    Closed,
}

impl BracketStatus {
    /// Persisted literal
    pub fn as_str(&self) -> &'static str {
        match self {
            BracketStatus::Active => "ACTIVE",
            BracketStatus::Closed => "CLOSED",
        }
    }
}

impl FromStr for BracketStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(BracketStatus::Active),
            "CLOSED" => Ok(BracketStatus::Closed),
            other => Err(DomainError::InvalidValue(format!("bracket status {}", other))),
        }
    }
}

impl fmt::Display for BracketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position of an order inside a bracket
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum LegRole {
    /// Entry leg
    Entry,
    /// Take-profit leg
    TakeProfit,
    /// Stop-loss leg
    StopLoss,
}

impl LegRole {
    /// The opposite protective leg, if this is one.
    pub fn sibling(&self) -> Option<LegRole> {
        match self {
            LegRole::Entry => None,
            LegRole::TakeProfit => Some(LegRole::StopLoss),
            LegRole::StopLoss => Some(LegRole::TakeProfit),
        }
    }
}

impl fmt::Display for LegRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LegRole::Entry => write!(f, "entry"),
            LegRole::TakeProfit => write!(f, "take_profit"),
            LegRole::StopLoss => write!(f, "stop_loss"),
        }
    }
}

/// Bracket links an entry with its take-profit / stop-loss pair (OCO)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bracket {
    pub group_id: BracketId,
    pub symbol: Symbol,
    pub entry_client_id: String,
    pub tp_client_id: String,
    pub sl_client_id: String,
    pub status: BracketStatus,
    /// Set once the entry fill was observed: both protective legs are to be
    /// cancelled, and stay so across restarts
    pub unwinding: bool,
    /// The entry was already FILLED when the bracket was registered, so its
    /// fill is not a trigger for this bracket
    pub entry_prefilled: bool,
    /// Flagged for manual resolution (both protective legs filled, or a
    /// protective leg recorded FAILED). Set once.
    pub needs_review: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Bracket {
    /// Create an active bracket over three orders.
    pub fn new(entry: &Order, take_profit: &Order, stop_loss: &Order) -> Result<Self, DomainError> {
        let legs = [
            (entry, OrderKind::Entry),
            (take_profit, OrderKind::TakeProfit),
            (stop_loss, OrderKind::StopLoss),
        ];
        for (order, expected) in legs {
            if order.kind != expected {
                return Err(DomainError::InvalidBracket(format!(
                    "{} is {} but was given as {}",
                    order.client_order_id, order.kind, expected
                )));
            }
            if order.symbol != entry.symbol {
                return Err(DomainError::InvalidBracket(format!(
                    "{} trades {} while the entry trades {}",
                    order.client_order_id, order.symbol, entry.symbol
                )));
            }
        }

        if entry.client_order_id == take_profit.client_order_id
            || entry.client_order_id == stop_loss.client_order_id
            || take_profit.client_order_id == stop_loss.client_order_id
        {
            return Err(DomainError::InvalidBracket(
                "legs must have distinct client order ids".to_string(),
            ));
        }

        let now = Utc::now();
        Ok(Self {
            group_id: Uuid::now_v7(),
            symbol: entry.symbol.clone(),
            entry_client_id: entry.client_order_id.clone(),
            tp_client_id: take_profit.client_order_id.clone(),
            sl_client_id: stop_loss.client_order_id.clone(),
            status: BracketStatus::Active,
            unwinding: false,
            entry_prefilled: entry.status == OrderStatus::Filled,
            needs_review: false,
            created_at: now,
            updated_at: now,
            closed_at: None,
        })
    }

    /// Which leg a client order id is, if any.
    pub fn role_of(&self, client_order_id: &str) -> Option<LegRole> {
        if client_order_id == self.entry_client_id {
            Some(LegRole::Entry)
        } else if client_order_id == self.tp_client_id {
            Some(LegRole::TakeProfit)
        } else if client_order_id == self.sl_client_id {
            Some(LegRole::StopLoss)
        } else {
            None
        }
    }

    /// Client order id of a given leg.
    pub fn client_id_of(&self, role: LegRole) -> &str {
        match role {
            LegRole::Entry => &self.entry_client_id,
            LegRole::TakeProfit => &self.tp_client_id,
            LegRole::StopLoss => &self.sl_client_id,
        }
    }

    /// Whether a stored entry status means the entry filled after
    /// registration.
    pub fn entry_fill_observed(&self, entry: &Order) -> bool {
        entry.client_order_id == self.entry_client_id
            && entry.status == OrderStatus::Filled
            && !self.entry_prefilled
    }

    /// Check if bracket is still active
    pub fn is_active(&self) -> bool {
        self.status == BracketStatus::Active
    }

    /// Transition ACTIVE → CLOSED. Fails if already closed.
    pub fn close(&mut self) -> Result<(), DomainError> {
        if self.status == BracketStatus::Closed {
            return Err(DomainError::InvalidStateTransition(format!(
                "bracket {} is already closed",
                self.group_id
            )));
        }
        let now = Utc::now();
        self.status = BracketStatus::Closed;
        self.closed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
