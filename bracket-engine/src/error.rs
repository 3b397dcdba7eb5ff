//! Engine error types.

use thiserror::Error;

/// Errors raised while planning a bracket closure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// An order handed to the planner is not the leg the bracket names
    #[error("Leg mismatch on bracket {group_id}: expected {expected}, got {actual}")]
    LegMismatch {
        /// Bracket group id
        group_id: String,
        /// Client order id the bracket records for the leg
        expected: String,
        /// Client order id that was supplied
        actual: String,
    },
}
