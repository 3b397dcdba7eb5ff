//! Bracket Domain Layer
//!
//! Pure domain types with zero I/O dependencies.
//! Contains orders, brackets, audit entries and their transition rules.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod audit;
pub mod entities;
pub mod events;
pub mod value_objects;

// Re-export commonly used types
pub use audit::{AuditLevel, AuditLogEntry, EntityType};
pub use entities::{
    Bracket, BracketId, BracketStatus, LegRole, Order, OrderClass, OrderId, OrderKind,
    OrderStatus, StatusChange,
};
pub use events::LegTerminated;
pub use value_objects::{validate_client_order_id, DomainError, Symbol, MAX_CLIENT_ORDER_ID_LEN};
