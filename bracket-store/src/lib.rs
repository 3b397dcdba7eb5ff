//! Bracket Storage Layer
//!
//! Order Store, Bracket Registry and the append-only audit log.
//!
//! # Architecture
//!
//! - **Repository traits**: Define the storage interface (ports)
//! - **In-memory store**: Fast implementation for testing
//! - **PostgreSQL store**: Production implementation (feature `postgres`)
//!
//! # Usage
//!
//! ```rust
//! use bracket_store::{register_bracket, MemoryStore, Store};
//! use bracket_domain::{Order, OrderClass, OrderKind, Symbol};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = MemoryStore::new();
//!     let symbol = Symbol::from_pair("BTCUSDT").unwrap();
//!
//!     let entry = Order::new("e-1", symbol.clone(), OrderKind::Entry, OrderClass::Standard).unwrap();
//!     let tp = Order::new("tp-1", symbol.clone(), OrderKind::TakeProfit, OrderClass::Conditional).unwrap();
//!     let sl = Order::new("sl-1", symbol, OrderKind::StopLoss, OrderClass::Conditional).unwrap();
//!
//!     let bracket = register_bracket(&store, &entry, &tp, &sl).await.unwrap();
//!
//!     let pending = store.orders().find_non_terminal().await.unwrap();
//!     println!("Bracket {} with {} pending legs", bracket.group_id, pending.len());
//! }
//! ```

#![warn(clippy::all)]

// Modules
mod error;
mod memory;
#[cfg(feature = "postgres")]
mod postgres;
mod registry;
mod repository;

// Re-exports
pub use error::StoreError;
pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::{PgStore, SCHEMA};
pub use registry::register_bracket;
pub use repository::{AuditRepository, BracketRepository, OrderRepository, Store};
