//! Bracket Execution Layer
//!
//! Exchange Order Facade: one query/cancel contract over the exchange's
//! standard and conditional (algo) order sub-APIs.
//!
//! # Architecture
//!
//! ```text
//! Reconciler / Coordinator → OrderFacade → OrderGateway → Exchange
//! ```
//!
//! # Components
//!
//! - **Ports**: `OrderGateway`, the raw transport trait
//! - **Facade**: vocabulary translation, error classification, deadlines,
//!   confirmatory re-query
//! - **Stub**: Scriptable gateway for tests
//!
//! # Example
//!
//! ```rust,ignore
//! use bracket_exec::{FacadeConfig, OrderFacade, StubGateway};
//! use std::sync::Arc;
//!
//! let gateway = Arc::new(StubGateway::new());
//! gateway.set_state("tp-1", "WORKING", dec!(0));
//!
//! let facade = OrderFacade::new(gateway, FacadeConfig::default());
//! let report = facade.query_status(&symbol, "tp-1", OrderClass::Conditional).await?;
//! assert_eq!(report.status, OrderStatus::Live);
//! ```

#![warn(clippy::all)]

pub mod error;
pub mod facade;
pub mod ports;
pub mod stub;

// Re-exports for convenience
pub use error::{FacadeError, FacadeResult, GatewayError};
pub use facade::{
    classify, translate_status, CancelOutcome, FacadeConfig, OrderFacade, QueryVerdict,
    StatusReport, CONDITIONAL_PLACEHOLDER,
};
pub use ports::{OrderGateway, RawOrderState};
pub use stub::StubGateway;
