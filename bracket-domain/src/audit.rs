//! Audit log entries.
//!
//! Append-only records of every reconciliation and closure decision.
//! Entries are never mutated once written.

use crate::entities::BracketId;
use crate::value_objects::DomainError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of entity an entry is about
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    /// Entity id is a client order id
    Order,
    /// Entity id is a bracket group id
    Bracket,
}

impl EntityType {
    /// Persisted literal
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Order => "ORDER",
            EntityType::Bracket => "BRACKET",
        }
    }
}

impl FromStr for EntityType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ORDER" => Ok(EntityType::Order),
            "BRACKET" => Ok(EntityType::Bracket),
            other => Err(DomainError::InvalidValue(format!("entity type {}", other))),
        }
    }
}

/// Severity of an audit entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditLevel {
    /// Normal decision
    Info,
    /// Decision taken on incomplete evidence
    Warn,
    /// Needs operator attention
    Error,
}

impl AuditLevel {
    /// Persisted literal
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditLevel::Info => "INFO",
            AuditLevel::Warn => "WARN",
            AuditLevel::Error => "ERROR",
        }
    }
}

impl FromStr for AuditLevel {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INFO" => Ok(AuditLevel::Info),
            "WARN" => Ok(AuditLevel::Warn),
            "ERROR" => Ok(AuditLevel::Error),
            other => Err(DomainError::InvalidValue(format!("audit level {}", other))),
        }
    }
}

impl fmt::Display for AuditLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    /// Sequence assigned by the store on append (0 before append)
    pub seq: i64,
    pub entity_type: EntityType,
    pub entity_id: String,
    /// Bracket the entity belongs to, for per-bracket replay
    pub bracket_id: Option<BracketId>,
    pub level: AuditLevel,
    pub message: String,
    /// clientOrderId, symbol, raw exchange response and decision inputs
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    /// Entry about an order.
    pub fn order(
        client_order_id: impl Into<String>,
        level: AuditLevel,
        message: impl Into<String>,
    ) -> Self {
        Self::build(EntityType::Order, client_order_id.into(), level, message.into())
    }

    /// Entry about a bracket.
    pub fn bracket(group_id: BracketId, level: AuditLevel, message: impl Into<String>) -> Self {
        let mut entry = Self::build(EntityType::Bracket, group_id.to_string(), level, message.into());
        entry.bracket_id = Some(group_id);
        entry
    }

    fn build(entity_type: EntityType, entity_id: String, level: AuditLevel, message: String) -> Self {
        Self {
            seq: 0,
            entity_type,
            entity_id,
            bracket_id: None,
            level,
            message,
            details: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    /// Attach the owning bracket.
    pub fn in_bracket(mut self, group_id: Option<BracketId>) -> Self {
        if group_id.is_some() {
            self.bracket_id = group_id;
        }
        self
    }

    /// Attach forensic details.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_order_entry_builder() {
        let group_id = Uuid::now_v7();
        let entry = AuditLogEntry::order("tp-1", AuditLevel::Warn, "cancelled (unconfirmed)")
            .in_bracket(Some(group_id))
            .with_details(serde_json::json!({ "confirmed": false }));

        assert_eq!(entry.entity_type, EntityType::Order);
        assert_eq!(entry.entity_id, "tp-1");
        assert_eq!(entry.bracket_id, Some(group_id));
        assert_eq!(entry.details["confirmed"], false);
    }

    #[test]
    fn test_bracket_entry_is_self_correlated() {
        let group_id = Uuid::now_v7();
        let entry = AuditLogEntry::bracket(group_id, AuditLevel::Info, "closed").in_bracket(None);

        assert_eq!(entry.entity_type, EntityType::Bracket);
        assert_eq!(entry.bracket_id, Some(group_id));
        assert_eq!(entry.entity_id, group_id.to_string());
    }

    #[test]
    fn test_levels_order_by_severity() {
        assert!(AuditLevel::Error > AuditLevel::Warn);
        assert_eq!("WARN".parse::<AuditLevel>().unwrap(), AuditLevel::Warn);
    }
}
