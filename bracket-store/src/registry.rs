//! Bracket registration: the write contract of the order-placement path.

use crate::error::StoreError;
use crate::repository::Store;
use bracket_domain::{AuditLevel, AuditLogEntry, Bracket, Order, OrderKind, OrderStatus};
use serde_json::json;
use tracing::info;

/// Register an entry with its take-profit / stop-loss pair.
///
/// Legs not yet in the store are inserted as given (normally `New`); legs
/// already stored (typically the entry, written when it was placed) are
/// reused. An entry already FILLED at this point opened the position the
/// bracket protects; only a fill observed later unwinds it. A protective leg that already FAILED never reached the exchange,
/// so no ACTIVE bracket is created for it.
pub async fn register_bracket(
    store: &dyn Store,
    entry: &Order,
    take_profit: &Order,
    stop_loss: &Order,
) -> Result<Bracket, StoreError> {
    let mut bracket = Bracket::new(entry, take_profit, stop_loss)?;

    for leg in [take_profit, stop_loss] {
        if leg.status == OrderStatus::Failed {
            return Err(StoreError::invalid_state(format!(
                "protective leg {} failed before acknowledgment",
                leg.client_order_id
            )));
        }
    }

    for leg in [entry, take_profit, stop_loss] {
        if let Some(existing) = store.brackets().find_by_leg(&leg.client_order_id).await? {
            return Err(StoreError::duplicate(
                "bracket leg",
                format!("{} (bracket {})", leg.client_order_id, existing.group_id),
            ));
        }
    }

    for leg in [entry, take_profit, stop_loss] {
        match store.orders().find_by_client_id(&leg.client_order_id).await? {
            Some(stored) if stored.kind != leg.kind || stored.symbol != leg.symbol => {
                return Err(StoreError::invalid_state(format!(
                    "stored order {} is {} {} but was given as {} {}",
                    stored.client_order_id, stored.symbol, stored.kind, leg.symbol, leg.kind
                )));
            },
            Some(stored) => {
                if stored.kind == OrderKind::Entry {
                    bracket.entry_prefilled = stored.status == OrderStatus::Filled;
                }
            },
            None => store.orders().insert(leg).await?,
        }
    }

    store.brackets().insert(&bracket).await?;

    let entry_log = AuditLogEntry::bracket(bracket.group_id, AuditLevel::Info, "bracket registered")
        .with_details(json!({
            "symbol": bracket.symbol.as_pair(),
            "entry": bracket.entry_client_id,
            "take_profit": bracket.tp_client_id,
            "stop_loss": bracket.sl_client_id,
            "entry_prefilled": bracket.entry_prefilled,
        }));
    store.audit().append(&entry_log).await?;

    info!(
        group_id = %bracket.group_id,
        symbol = %bracket.symbol,
        entry = %bracket.entry_client_id,
        take_profit = %bracket.tp_client_id,
        stop_loss = %bracket.sl_client_id,
        "Bracket registered"
    );

    Ok(bracket)
}
