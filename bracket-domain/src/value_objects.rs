//! Value Objects for the bracket domain
//!
//! Immutable, validated domain primitives.
//! All value objects enforce invariants at construction time.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Domain errors for value object and entity validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// Symbol must be valid trading pair
    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    /// Client order id must be non-empty and bounded
    #[error("Invalid client order id: {0}")]
    InvalidClientOrderId(String),

    /// Bracket legs are inconsistent (kinds, symbols, duplicate ids)
    #[error("Invalid bracket: {0}")]
    InvalidBracket(String),

    /// Unrecognised status or enum literal
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Invalid state transition
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),
}

// =============================================================================
// Symbol
// =============================================================================

/// Symbol represents a perpetual futures trading pair (e.g., BTCUSDT)
///
/// # Invariants
/// - Must be valid format (base + quote)
/// - Base and quote must be non-empty
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol {
    base: String,
    quote: String,
}

impl Symbol {
    /// Create a Symbol from a trading pair string
    ///
    /// # Examples
    /// ```
    /// # use bracket_domain::value_objects::Symbol;
    /// let symbol = Symbol::from_pair("ETHUSDC").unwrap();
    /// assert_eq!(symbol.base(), "ETH");
    /// assert_eq!(symbol.quote(), "USDC");
    /// ```
    ///
    /// # Errors
    /// Returns `DomainError::InvalidSymbol` if format is invalid
    pub fn from_pair(pair: &str) -> Result<Self, DomainError> {
        // Margin assets accepted on the USD-M futures venue
        const QUOTE_CURRENCIES: &[&str] = &["USDT", "USDC", "BUSD", "BTC", "ETH", "BNB"];

        let pair = pair.trim().to_uppercase();
        for quote in QUOTE_CURRENCIES {
            if let Some(base) = pair.strip_suffix(quote) {
                if !base.is_empty() {
                    return Ok(Self {
                        base: base.to_string(),
                        quote: quote.to_string(),
                    });
                }
            }
        }

        Err(DomainError::InvalidSymbol(format!("Cannot parse trading pair: {}", pair)))
    }

    /// Create a Symbol from explicit base and quote
    pub fn new(base: String, quote: String) -> Result<Self, DomainError> {
        if base.is_empty() || quote.is_empty() {
            return Err(DomainError::InvalidSymbol("Base and quote must be non-empty".to_string()));
        }
        Ok(Self { base, quote })
    }

    /// Get the base currency
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Get the quote currency
    pub fn quote(&self) -> &str {
        &self.quote
    }

    /// Get the trading pair as string (e.g., "BTCUSDT")
    pub fn as_pair(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_pair())
    }
}

// =============================================================================
// Client Order ID
// =============================================================================

/// Exchange limit on client order id length (`newClientOrderId` / `clientAlgoId`).
pub const MAX_CLIENT_ORDER_ID_LEN: usize = 36;

/// Validate a caller-assigned client order id.
///
/// The id is the only correlation key before the exchange acknowledges an
/// order, so it must be usable verbatim on both sub-APIs.
pub fn validate_client_order_id(id: &str) -> Result<(), DomainError> {
    if id.is_empty() {
        return Err(DomainError::InvalidClientOrderId("must be non-empty".to_string()));
    }
    if id.len() > MAX_CLIENT_ORDER_ID_LEN {
        return Err(DomainError::InvalidClientOrderId(format!(
            "{} exceeds {} characters",
            id, MAX_CLIENT_ORDER_ID_LEN
        )));
    }
    if !id.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | ':' | '/' | '_' | '-')) {
        return Err(DomainError::InvalidClientOrderId(format!(
            "{} contains characters rejected by the exchange",
            id
        )));
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
