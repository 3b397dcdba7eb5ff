//! Bracket Exchange Connectors
//!
//! Adapters for exchange APIs.
//! Binance USD-M futures REST: standard and algo (conditional) orders.

#![warn(clippy::all)]

// Public modules
pub mod binance_futures;

// Re-exports
pub use binance_futures::{
    AlgoCancelResponse, AlgoOrderResponse, BinanceFuturesClient, BinanceResponse,
    BinanceRestError, FuturesOrderResponse,
};
