//! PostgreSQL store.
//!
//! This module uses dynamic queries (sqlx::query) instead of compile-time
//! checked macros (sqlx::query!) to allow compilation without DATABASE_URL.
//!
//! # Schema
//!
//! Migrations are managed outside this crate. The store expects:
//!
//! ```sql
//! CREATE TABLE bracket_orders (
//!     id                UUID PRIMARY KEY,
//!     client_order_id   TEXT NOT NULL UNIQUE,
//!     exchange_order_id TEXT,
//!     symbol            TEXT NOT NULL,
//!     kind              TEXT NOT NULL,   -- ENTRY | TAKE_PROFIT | STOP_LOSS
//!     class             TEXT NOT NULL,   -- STANDARD | CONDITIONAL
//!     status            TEXT NOT NULL,   -- NEW | PROCESSING | LIVE | FILLED | CANCELLED | FAILED
//!     executed_qty      NUMERIC NOT NULL DEFAULT 0,
//!     raw_result        JSONB,
//!     created_at        TIMESTAMPTZ NOT NULL,
//!     updated_at        TIMESTAMPTZ NOT NULL
//! );
//!
//! CREATE TABLE brackets (
//!     group_id        UUID PRIMARY KEY,
//!     symbol          TEXT NOT NULL,
//!     entry_client_id TEXT NOT NULL UNIQUE,
//!     tp_client_id    TEXT NOT NULL UNIQUE,
//!     sl_client_id    TEXT NOT NULL UNIQUE,
//!     status          TEXT NOT NULL,     -- ACTIVE | CLOSED
//!     unwinding       BOOLEAN NOT NULL DEFAULT FALSE,
//!     entry_prefilled BOOLEAN NOT NULL DEFAULT FALSE,
//!     needs_review    BOOLEAN NOT NULL DEFAULT FALSE,
//!     created_at      TIMESTAMPTZ NOT NULL,
//!     updated_at      TIMESTAMPTZ NOT NULL,
//!     closed_at       TIMESTAMPTZ
//! );
//!
//! CREATE TABLE bracket_audit_log (
//!     seq         BIGSERIAL PRIMARY KEY,
//!     entity_type TEXT NOT NULL,         -- ORDER | BRACKET
//!     entity_id   TEXT NOT NULL,
//!     bracket_id  UUID,
//!     level       TEXT NOT NULL,         -- INFO | WARN | ERROR
//!     message     TEXT NOT NULL,
//!     details     JSONB NOT NULL,
//!     created_at  TIMESTAMPTZ NOT NULL
//! );
//! ```

use crate::error::StoreError;
use crate::repository::{
    apply_observation, AuditRepository, BracketRepository, OrderRepository, Store,
};
use async_trait::async_trait;
use bracket_domain::{
    AuditLogEntry, Bracket, BracketId, EntityType, Order, OrderStatus, StatusChange, Symbol,
};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::debug;

/// Schema expected by `PgStore`, for tests and bootstrap tooling.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS bracket_orders (
    id UUID PRIMARY KEY,
    client_order_id TEXT NOT NULL UNIQUE,
    exchange_order_id TEXT,
    symbol TEXT NOT NULL,
    kind TEXT NOT NULL,
    class TEXT NOT NULL,
    status TEXT NOT NULL,
    executed_qty NUMERIC NOT NULL DEFAULT 0,
    raw_result JSONB,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);
CREATE TABLE IF NOT EXISTS brackets (
    group_id UUID PRIMARY KEY,
    symbol TEXT NOT NULL,
    entry_client_id TEXT NOT NULL UNIQUE,
    tp_client_id TEXT NOT NULL UNIQUE,
    sl_client_id TEXT NOT NULL UNIQUE,
    status TEXT NOT NULL,
    unwinding BOOLEAN NOT NULL DEFAULT FALSE,
    entry_prefilled BOOLEAN NOT NULL DEFAULT FALSE,
    needs_review BOOLEAN NOT NULL DEFAULT FALSE,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    closed_at TIMESTAMPTZ
);
CREATE TABLE IF NOT EXISTS bracket_audit_log (
    seq BIGSERIAL PRIMARY KEY,
    entity_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    bracket_id UUID,
    level TEXT NOT NULL,
    message TEXT NOT NULL,
    details JSONB NOT NULL,
    created_at TIMESTAMPTZ NOT NULL
);
"#;

const ORDER_COLUMNS: &str = "id, client_order_id, exchange_order_id, symbol, kind, class, status, \
                             executed_qty, raw_result, created_at, updated_at";

const BRACKET_COLUMNS: &str = "group_id, symbol, entry_client_id, tp_client_id, sl_client_id, \
                               status, unwinding, entry_prefilled, needs_review, \
                               created_at, updated_at, closed_at";

const AUDIT_COLUMNS: &str =
    "seq, entity_type, entity_id, bracket_id, level, message, details, created_at";

/// PostgreSQL-backed store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `database_url` with a small pool.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Get a reference to the underlying pool (for testing).
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Liveness check
    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// =============================================================================
// Row parsing
// =============================================================================

fn parse<T: std::str::FromStr<Err = bracket_domain::DomainError>>(
    value: &str,
) -> Result<T, StoreError> {
    value.parse::<T>().map_err(|e| StoreError::Deserialization(e.to_string()))
}

fn parse_symbol(value: &str) -> Result<Symbol, StoreError> {
    Symbol::from_pair(value)
        .map_err(|e| StoreError::Deserialization(format!("Invalid symbol {}: {}", value, e)))
}

fn parse_order_row(row: &PgRow) -> Result<Order, StoreError> {
    let symbol: String = row.try_get("symbol")?;
    let kind: String = row.try_get("kind")?;
    let class: String = row.try_get("class")?;
    let status: String = row.try_get("status")?;

    Ok(Order {
        id: row.try_get("id")?,
        client_order_id: row.try_get("client_order_id")?,
        exchange_order_id: row.try_get("exchange_order_id")?,
        symbol: parse_symbol(&symbol)?,
        kind: parse(&kind)?,
        class: parse(&class)?,
        status: parse(&status)?,
        executed_qty: row.try_get::<Decimal, _>("executed_qty")?,
        raw_result: row.try_get("raw_result")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn parse_bracket_row(row: &PgRow) -> Result<Bracket, StoreError> {
    let symbol: String = row.try_get("symbol")?;
    let status: String = row.try_get("status")?;

    Ok(Bracket {
        group_id: row.try_get("group_id")?,
        symbol: parse_symbol(&symbol)?,
        entry_client_id: row.try_get("entry_client_id")?,
        tp_client_id: row.try_get("tp_client_id")?,
        sl_client_id: row.try_get("sl_client_id")?,
        status: parse(&status)?,
        unwinding: row.try_get("unwinding")?,
        entry_prefilled: row.try_get("entry_prefilled")?,
        needs_review: row.try_get("needs_review")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        closed_at: row.try_get("closed_at")?,
    })
}

fn parse_audit_row(row: &PgRow) -> Result<AuditLogEntry, StoreError> {
    let entity_type: String = row.try_get("entity_type")?;
    let level: String = row.try_get("level")?;

    Ok(AuditLogEntry {
        seq: row.try_get("seq")?,
        entity_type: parse(&entity_type)?,
        entity_id: row.try_get("entity_id")?,
        bracket_id: row.try_get("bracket_id")?,
        level: parse(&level)?,
        message: row.try_get("message")?,
        details: row.try_get("details")?,
        created_at: row.try_get("created_at")?,
    })
}

// =============================================================================
// Order Repository Implementation
// =============================================================================

#[async_trait]
impl OrderRepository for PgStore {
    async fn insert(&self, order: &Order) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO bracket_orders
                (id, client_order_id, exchange_order_id, symbol, kind, class, status,
                 executed_qty, raw_result, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(order.id)
        .bind(&order.client_order_id)
        .bind(&order.exchange_order_id)
        .bind(order.symbol.as_pair())
        .bind(order.kind.as_str())
        .bind(order.class.as_str())
        .bind(order.status.as_str())
        .bind(order.executed_qty)
        .bind(&order.raw_result)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match StoreError::from(e) {
            StoreError::Duplicate { .. } => {
                StoreError::duplicate("order", order.client_order_id.clone())
            },
            other => other,
        })?;
        Ok(())
    }

    async fn find_by_client_id(&self, client_id: &str) -> Result<Option<Order>, StoreError> {
        let sql = format!("SELECT {} FROM bracket_orders WHERE client_order_id = $1", ORDER_COLUMNS);
        let row = sqlx::query(&sql).bind(client_id).fetch_optional(&self.pool).await?;
        row.as_ref().map(parse_order_row).transpose()
    }

    async fn find_by_status(&self, statuses: &[OrderStatus]) -> Result<Vec<Order>, StoreError> {
        let literals: Vec<&str> = statuses.iter().map(|s| s.as_str()).collect();
        let sql = format!(
            "SELECT {} FROM bracket_orders WHERE status = ANY($1) ORDER BY created_at ASC",
            ORDER_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(literals).fetch_all(&self.pool).await?;
        rows.iter().map(parse_order_row).collect()
    }

    async fn apply_status(
        &self,
        client_id: &str,
        status: OrderStatus,
        executed_qty: Decimal,
        raw: Option<serde_json::Value>,
    ) -> Result<StatusChange, StoreError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "SELECT {} FROM bracket_orders WHERE client_order_id = $1 FOR UPDATE",
            ORDER_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(client_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::not_found("order", client_id))?;
        let mut order = parse_order_row(&row)?;
        let before = order.updated_at;

        let change = apply_observation(&mut order, status, executed_qty, raw)?;

        if order.updated_at != before {
            sqlx::query(
                r#"
                UPDATE bracket_orders
                SET status = $2, executed_qty = $3, raw_result = $4, updated_at = $5
                WHERE client_order_id = $1
                "#,
            )
            .bind(client_id)
            .bind(order.status.as_str())
            .bind(order.executed_qty)
            .bind(&order.raw_result)
            .bind(order.updated_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(client_order_id = %client_id, ?change, "Order status applied");
        Ok(change)
    }

    async fn set_exchange_order_id(
        &self,
        client_id: &str,
        exchange_order_id: &str,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE bracket_orders
            SET exchange_order_id = $2, updated_at = NOW()
            WHERE client_order_id = $1
              AND (exchange_order_id IS NULL OR exchange_order_id = $2)
            "#,
        )
        .bind(client_id)
        .bind(exchange_order_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.find_by_client_id(client_id).await? {
                None => Err(StoreError::not_found("order", client_id)),
                Some(order) => Err(StoreError::invalid_state(format!(
                    "order {} already has exchange id {}",
                    client_id,
                    order.exchange_order_id.unwrap_or_default()
                ))),
            };
        }
        Ok(())
    }
}

// =============================================================================
// Bracket Repository Implementation
// =============================================================================

#[async_trait]
impl BracketRepository for PgStore {
    async fn insert(&self, bracket: &Bracket) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO brackets
                (group_id, symbol, entry_client_id, tp_client_id, sl_client_id,
                 status, unwinding, entry_prefilled, needs_review,
                 created_at, updated_at, closed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(bracket.group_id)
        .bind(bracket.symbol.as_pair())
        .bind(&bracket.entry_client_id)
        .bind(&bracket.tp_client_id)
        .bind(&bracket.sl_client_id)
        .bind(bracket.status.as_str())
        .bind(bracket.unwinding)
        .bind(bracket.entry_prefilled)
        .bind(bracket.needs_review)
        .bind(bracket.created_at)
        .bind(bracket.updated_at)
        .bind(bracket.closed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, group_id: BracketId) -> Result<Option<Bracket>, StoreError> {
        let sql = format!("SELECT {} FROM brackets WHERE group_id = $1", BRACKET_COLUMNS);
        let row = sqlx::query(&sql).bind(group_id).fetch_optional(&self.pool).await?;
        row.as_ref().map(parse_bracket_row).transpose()
    }

    async fn find_by_leg(&self, client_id: &str) -> Result<Option<Bracket>, StoreError> {
        let sql = format!(
            "SELECT {} FROM brackets \
             WHERE entry_client_id = $1 OR tp_client_id = $1 OR sl_client_id = $1",
            BRACKET_COLUMNS
        );
        let row = sqlx::query(&sql).bind(client_id).fetch_optional(&self.pool).await?;
        row.as_ref().map(parse_bracket_row).transpose()
    }

    async fn find_active(&self) -> Result<Vec<Bracket>, StoreError> {
        let sql = format!(
            "SELECT {} FROM brackets WHERE status = 'ACTIVE' ORDER BY created_at ASC",
            BRACKET_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(parse_bracket_row).collect()
    }

    async fn mark_unwinding(&self, group_id: BracketId) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE brackets
            SET unwinding = TRUE, updated_at = NOW()
            WHERE group_id = $1 AND status = 'ACTIVE' AND unwinding = FALSE
            "#,
        )
        .bind(group_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_needs_review(&self, group_id: BracketId) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE brackets
            SET needs_review = TRUE, updated_at = NOW()
            WHERE group_id = $1 AND status = 'ACTIVE' AND needs_review = FALSE
            "#,
        )
        .bind(group_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn close_if_active(&self, group_id: BracketId) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE brackets
            SET status = 'CLOSED', closed_at = NOW(), updated_at = NOW()
            WHERE group_id = $1 AND status = 'ACTIVE'
            "#,
        )
        .bind(group_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

// =============================================================================
// Audit Repository Implementation
// =============================================================================

#[async_trait]
impl AuditRepository for PgStore {
    async fn append(&self, entry: &AuditLogEntry) -> Result<i64, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO bracket_audit_log
                (entity_type, entity_id, bracket_id, level, message, details, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING seq
            "#,
        )
        .bind(entry.entity_type.as_str())
        .bind(&entry.entity_id)
        .bind(entry.bracket_id)
        .bind(entry.level.as_str())
        .bind(&entry.message)
        .bind(&entry.details)
        .bind(entry.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("seq")?)
    }

    async fn find_by_entity(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<Vec<AuditLogEntry>, StoreError> {
        let sql = format!(
            "SELECT {} FROM bracket_audit_log \
             WHERE entity_type = $1 AND entity_id = $2 ORDER BY seq ASC",
            AUDIT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(entity_type.as_str())
            .bind(entity_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(parse_audit_row).collect()
    }

    async fn find_by_bracket(&self, group_id: BracketId) -> Result<Vec<AuditLogEntry>, StoreError> {
        let sql = format!(
            "SELECT {} FROM bracket_audit_log WHERE bracket_id = $1 ORDER BY seq ASC",
            AUDIT_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(group_id).fetch_all(&self.pool).await?;
        rows.iter().map(parse_audit_row).collect()
    }
}

impl Store for PgStore {
    fn orders(&self) -> &dyn OrderRepository {
        self
    }

    fn brackets(&self) -> &dyn BracketRepository {
        self
    }

    fn audit(&self) -> &dyn AuditRepository {
        self
    }
}

// =============================================================================
// Tests
// =============================================================================
