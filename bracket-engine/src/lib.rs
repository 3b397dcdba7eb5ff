//! Bracket Engine Layer
//!
//! Pure OCO decision logic, deterministic, no I/O.
//! Takes a bracket and its stored legs → Returns actions to execute.

#![warn(clippy::all)]

pub mod closure;
pub mod error;

pub use closure::{
    CancelReason, CloseDecision, ClosureAction, ClosureEngine, ClosureOutcome, ClosurePlan,
};
pub use error::EngineError;
