//! Execution layer error types.
//!
//! `GatewayError` is what a transport reports. `FacadeError` is the only
//! taxonomy the rest of the system sees; the mapping between the two lives in
//! [`crate::facade::classify`].

use thiserror::Error;

/// Raw failure of one exchange call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// No response before the transport deadline
    #[error("Timeout: {0}")]
    Timeout(String),

    /// HTTP 429 / 418
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Connection refused, reset, DNS...
    #[error("Transport error: {0}")]
    Transport(String),

    /// 5xx: the request may or may not have been executed
    #[error("Server error {status}: execution status unknown ({body})")]
    ServerUnknown {
        /// HTTP status
        status: u16,
        /// Response body
        body: String,
    },

    /// Structured exchange error `{code, msg}`
    #[error("API error {code}: {msg}")]
    Api {
        /// Exchange error code
        code: i64,
        /// Exchange message
        msg: String,
    },

    /// Response could not be decoded
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Classified failure of a facade operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FacadeError {
    /// "Order not found"-shaped answer; never conclusive on its own
    #[error("Not found: {0}")]
    NotFound(String),

    /// Retry next pass, no state change
    #[error("Transient: {0}")]
    Transient(String),

    /// Outcome unknown; needs a confirmatory query before any write
    #[error("Ambiguous: {0}")]
    Ambiguous(String),

    /// Exchange refused the request for good
    #[error("Rejected: {0}")]
    Rejected(String),
}

impl FacadeError {
    /// NotFound and Ambiguous both require confirmation.
    pub fn needs_confirmation(&self) -> bool {
        matches!(self, FacadeError::NotFound(_) | FacadeError::Ambiguous(_))
    }
}

/// Result type for facade operations.
pub type FacadeResult<T> = Result<T, FacadeError>;
