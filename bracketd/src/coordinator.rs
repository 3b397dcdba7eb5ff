//! Bracket Closure Coordinator.
//!
//! Reacts to leg-terminated events (and to the per-pass sweep of ACTIVE
//! brackets) by issuing the sibling cancels the closure planner asks for,
//! recording their outcome, and closing the bracket once both protective
//! legs are FILLED or CANCELLED. A double fill or a FAILED protective leg
//! flags the bracket for manual resolution instead.
//!
//! All decisions are derived from stored state, so handling the same event
//! twice issues no second cancel, and a cancel that failed transiently is
//! simply planned again on the next pass.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, error, info, warn};

use bracket_domain::{
    AuditLevel, AuditLogEntry, Bracket, LegRole, LegTerminated, Order, OrderStatus,
    StatusChange,
};
use bracket_engine::{CancelReason, CloseDecision, ClosureAction, ClosureEngine, ClosureOutcome};
use bracket_exec::{CancelOutcome, FacadeError, OrderFacade};
use bracket_store::Store;

use crate::error::{DaemonError, DaemonResult};

/// Audit message for the both-legs-filled condition (written once).
const DOUBLE_FILL_MESSAGE: &str = "both protective legs filled; bracket left active";

/// Audit message for a protective leg recorded FAILED (written once).
const LEG_FAILED_MESSAGE: &str = "protective leg failed; bracket left active";

/// What one coordinator invocation did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinatorReport {
    /// Cancel requests sent to the exchange
    pub cancels_issued: usize,
    /// Brackets moved ACTIVE → CLOSED
    pub brackets_closed: usize,
}

impl CoordinatorReport {
    /// Add another report into this one.
    pub fn absorb(&mut self, other: CoordinatorReport) {
        self.cancels_issued += other.cancels_issued;
        self.brackets_closed += other.brackets_closed;
    }
}

/// Applies one-cancels-other rules to brackets.
pub struct ClosureCoordinator {
    store: Arc<dyn Store>,
    facade: OrderFacade,
    engine: ClosureEngine,
}

impl ClosureCoordinator {
    /// Create a coordinator.
    pub fn new(store: Arc<dyn Store>, facade: OrderFacade) -> Self {
        Self {
            store,
            facade,
            engine: ClosureEngine::new(),
        }
    }

    /// Handle a leg reaching a terminal status.
    ///
    /// Orders outside any bracket are ignored.
    pub async fn on_leg_terminated(&self, event: &LegTerminated) -> DaemonResult<CoordinatorReport> {
        let bracket = match self.store.brackets().find_by_leg(&event.client_order_id).await? {
            Some(bracket) => bracket,
            None => {
                debug!(client_order_id = %event.client_order_id, "Terminated order has no bracket");
                return Ok(CoordinatorReport::default());
            },
        };

        debug!(
            group_id = %bracket.group_id,
            client_order_id = %event.client_order_id,
            status = %event.status,
            confirmed = event.confirmed,
            entry_fill = event.is_entry_fill(),
            "Leg terminated"
        );

        self.resolve(&bracket).await
    }

    /// Re-evaluate an ACTIVE bracket from stored state alone.
    pub async fn sweep(&self, bracket: &Bracket) -> DaemonResult<CoordinatorReport> {
        self.resolve(bracket).await
    }

    async fn resolve(&self, bracket: &Bracket) -> DaemonResult<CoordinatorReport> {
        let mut report = CoordinatorReport::default();
        if !bracket.is_active() {
            return Ok(report);
        }

        let entry = self.load_order(&bracket.entry_client_id).await?;
        let (take_profit, stop_loss) = self.load_legs(bracket).await?;
        let plan = self.engine.plan(bracket, &entry, &take_profit, &stop_loss)?;

        for action in plan.actions {
            match action {
                ClosureAction::MarkUnwinding => {
                    if self.store.brackets().mark_unwinding(bracket.group_id).await? {
                        let log = AuditLogEntry::bracket(
                            bracket.group_id,
                            AuditLevel::Info,
                            "entry filled; cancelling both protective legs",
                        )
                        .with_details(json!({
                            "entry": bracket.entry_client_id,
                            "symbol": bracket.symbol.as_pair(),
                            "executed_qty": entry.executed_qty,
                        }));
                        self.store.audit().append(&log).await?;
                        info!(group_id = %bracket.group_id, "Bracket unwinding");
                    }
                },
                ClosureAction::CancelLeg { role, reason, .. } => {
                    let leg = match role {
                        LegRole::TakeProfit => &take_profit,
                        _ => &stop_loss,
                    };
                    report.cancels_issued += 1;
                    self.cancel_leg(bracket, role, leg, reason).await?;
                },
            }
        }

        // Cancels may have moved the legs
        let (take_profit, stop_loss) = self.load_legs(bracket).await?;
        match self.engine.evaluate_close(take_profit.status, stop_loss.status) {
            CloseDecision::Pending => {},
            CloseDecision::DoubleFill => {
                self.flag_for_review(
                    bracket,
                    DOUBLE_FILL_MESSAGE,
                    json!({
                        "take_profit": bracket.tp_client_id,
                        "stop_loss": bracket.sl_client_id,
                    }),
                )
                .await?
            },
            CloseDecision::LegFailed(role) => {
                let failed = match role {
                    LegRole::TakeProfit => &take_profit,
                    _ => &stop_loss,
                };
                self.flag_for_review(
                    bracket,
                    LEG_FAILED_MESSAGE,
                    json!({
                        "role": role.to_string(),
                        "client_order_id": failed.client_order_id,
                        "symbol": failed.symbol.as_pair(),
                        "take_profit_status": take_profit.status,
                        "stop_loss_status": stop_loss.status,
                    }),
                )
                .await?
            },
            CloseDecision::Close(outcome) => {
                if self.close(bracket, outcome, &take_profit, &stop_loss).await? {
                    report.brackets_closed += 1;
                }
            },
        }

        Ok(report)
    }

    async fn load_legs(&self, bracket: &Bracket) -> DaemonResult<(Order, Order)> {
        let take_profit = self.load_order(&bracket.tp_client_id).await?;
        let stop_loss = self.load_order(&bracket.sl_client_id).await?;
        Ok((take_profit, stop_loss))
    }

    async fn load_order(&self, client_order_id: &str) -> DaemonResult<Order> {
        self.store
            .orders()
            .find_by_client_id(client_order_id)
            .await?
            .ok_or_else(|| DaemonError::OrderNotFound(client_order_id.to_string()))
    }

    /// Cancel one protective leg and record what the exchange said.
    async fn cancel_leg(
        &self,
        bracket: &Bracket,
        role: LegRole,
        leg: &Order,
        reason: CancelReason,
    ) -> DaemonResult<()> {
        let client_order_id = leg.client_order_id.as_str();
        let symbol = &bracket.symbol;
        let reason = reason_label(reason);

        info!(
            group_id = %bracket.group_id,
            client_order_id,
            symbol = %symbol,
            role = %role,
            reason = %reason,
            "Cancelling protective leg"
        );

        let outcome = match self.facade.cancel(symbol, client_order_id, leg.class).await {
            Ok(outcome) => outcome,
            Err(FacadeError::Rejected(detail)) => {
                error!(client_order_id, symbol = %symbol, error = %detail, "Cancel rejected");
                self.audit_leg(
                    bracket,
                    leg,
                    AuditLevel::Error,
                    "cancel rejected; bracket stays active",
                    json!({ "role": role.to_string(), "reason": reason, "error": detail }),
                )
                .await?;
                return Ok(());
            },
            Err(err) => {
                // Transient: nothing written, the next pass plans the cancel again
                warn!(client_order_id, symbol = %symbol, error = %err, "Cancel not completed; retrying next pass");
                return Ok(());
            },
        };

        match outcome {
            CancelOutcome::Cancelled(report) => {
                self.store
                    .orders()
                    .apply_status(
                        client_order_id,
                        OrderStatus::Cancelled,
                        report.executed_qty,
                        Some(report.raw.clone()),
                    )
                    .await?;
                self.audit_leg(
                    bracket,
                    leg,
                    AuditLevel::Info,
                    "cancelled",
                    json!({
                        "role": role.to_string(),
                        "reason": reason,
                        "native_status": report.native_status,
                        "raw": report.raw,
                    }),
                )
                .await?;
            },
            CancelOutcome::AlreadyTerminal(report) => {
                self.store
                    .orders()
                    .apply_status(
                        client_order_id,
                        report.status,
                        report.executed_qty,
                        Some(report.raw.clone()),
                    )
                    .await?;
                self.audit_leg(
                    bracket,
                    leg,
                    AuditLevel::Info,
                    format!("cancel not needed; leg already {}", report.status),
                    json!({
                        "role": role.to_string(),
                        "reason": reason,
                        "native_status": report.native_status,
                        "raw": report.raw,
                    }),
                )
                .await?;
            },
            CancelOutcome::Ambiguous(report) => {
                // Confirmed still working: record that, cancel again next pass
                let change = self
                    .store
                    .orders()
                    .apply_status(
                        client_order_id,
                        report.status,
                        report.executed_qty,
                        Some(report.raw.clone()),
                    )
                    .await?;
                warn!(
                    client_order_id,
                    symbol = %symbol,
                    status = %report.status,
                    "Cancel reported not found but leg is still working"
                );
                self.audit_leg(
                    bracket,
                    leg,
                    AuditLevel::Warn,
                    "cancel not found but leg still working; retrying next pass",
                    json!({
                        "role": role.to_string(),
                        "reason": reason,
                        "native_status": report.native_status,
                        "status_written": change != StatusChange::Unchanged,
                        "raw": report.raw,
                    }),
                )
                .await?;
            },
            CancelOutcome::CancelledUnconfirmed { reason: detail } => {
                self.store
                    .orders()
                    .apply_status(client_order_id, OrderStatus::Cancelled, leg.executed_qty, None)
                    .await?;
                self.audit_leg(
                    bracket,
                    leg,
                    AuditLevel::Warn,
                    "cancelled (unconfirmed)",
                    json!({
                        "role": role.to_string(),
                        "reason": reason,
                        "confirmed": false,
                        "error": detail,
                    }),
                )
                .await?;
            },
        }

        Ok(())
    }

    async fn close(
        &self,
        bracket: &Bracket,
        outcome: ClosureOutcome,
        take_profit: &Order,
        stop_loss: &Order,
    ) -> DaemonResult<bool> {
        if !self.store.brackets().close_if_active(bracket.group_id).await? {
            debug!(group_id = %bracket.group_id, "Bracket already closed");
            return Ok(false);
        }

        let entry = AuditLogEntry::bracket(bracket.group_id, AuditLevel::Info, "bracket closed")
            .with_details(json!({
                "outcome": outcome,
                "take_profit": { "client_order_id": take_profit.client_order_id, "status": take_profit.status },
                "stop_loss": { "client_order_id": stop_loss.client_order_id, "status": stop_loss.status },
            }));
        self.store.audit().append(&entry).await?;

        info!(
            group_id = %bracket.group_id,
            symbol = %bracket.symbol,
            outcome = ?outcome,
            "Bracket closed"
        );
        Ok(true)
    }

    /// Leave the bracket ACTIVE and raise one ERROR audit entry for it.
    async fn flag_for_review(
        &self,
        bracket: &Bracket,
        message: &str,
        details: serde_json::Value,
    ) -> DaemonResult<()> {
        if bracket.needs_review || !self.store.brackets().mark_needs_review(bracket.group_id).await? {
            return Ok(());
        }

        error!(
            group_id = %bracket.group_id,
            symbol = %bracket.symbol,
            reason = message,
            "Bracket needs manual resolution"
        );
        let entry = AuditLogEntry::bracket(bracket.group_id, AuditLevel::Error, message)
            .with_details(details);
        self.store.audit().append(&entry).await?;
        Ok(())
    }

    async fn audit_leg(
        &self,
        bracket: &Bracket,
        leg: &Order,
        level: AuditLevel,
        message: impl Into<String>,
        mut details: serde_json::Value,
    ) -> DaemonResult<()> {
        if let Some(map) = details.as_object_mut() {
            map.insert("client_order_id".into(), json!(leg.client_order_id));
            map.insert("symbol".into(), json!(leg.symbol.as_pair()));
        }
        let entry = AuditLogEntry::order(&leg.client_order_id, level, message)
            .in_bracket(Some(bracket.group_id))
            .with_details(details);
        self.store.audit().append(&entry).await?;
        Ok(())
    }
}

fn reason_label(reason: CancelReason) -> String {
    match reason {
        CancelReason::EntryFilled => "entry_filled".to_string(),
        CancelReason::Unwinding => "unwinding".to_string(),
        CancelReason::SiblingFilled(role) => format!("{}_filled", role),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use bracket_domain::{BracketStatus, OrderClass, OrderKind, Symbol};
    use bracket_exec::{FacadeConfig, GatewayError, StubGateway};
    use bracket_store::{register_bracket, MemoryStore};
    use rust_decimal_macros::dec;

    struct Fixture {
        store: Arc<MemoryStore>,
        gateway: Arc<StubGateway>,
        coordinator: ClosureCoordinator,
        bracket: Bracket,
    }

    fn symbol() -> Symbol {
        Symbol::from_pair("BTCUSDT").unwrap()
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(StubGateway::new());
        let facade = OrderFacade::new(gateway.clone(), FacadeConfig::default());
        let coordinator = ClosureCoordinator::new(store.clone(), facade);

        let mut entry = Order::new("e-1", symbol(), OrderKind::Entry, OrderClass::Standard).unwrap();
        entry.status = OrderStatus::Filled;
        let tp = Order::new("tp-1", symbol(), OrderKind::TakeProfit, OrderClass::Conditional).unwrap();
        let sl = Order::new("sl-1", symbol(), OrderKind::StopLoss, OrderClass::Conditional).unwrap();
        let bracket = register_bracket(store.as_ref(), &entry, &tp, &sl).await.unwrap();

        gateway.set_state("tp-1", "NEW", dec!(0));
        gateway.set_state("sl-1", "NEW", dec!(0));

        Fixture { store, gateway, coordinator, bracket }
    }

    async fn set_stored(store: &MemoryStore, client_id: &str, status: OrderStatus) {
        store.orders().apply_status(client_id, status, dec!(0), None).await.unwrap();
    }

    async fn stored(store: &MemoryStore, client_id: &str) -> OrderStatus {
        store.orders().find_by_client_id(client_id).await.unwrap().unwrap().status
    }

    fn tp_filled() -> LegTerminated {
        LegTerminated::new("tp-1", symbol(), OrderKind::TakeProfit, OrderStatus::Filled)
    }

    #[tokio::test]
    async fn test_take_profit_fill_cancels_stop_loss_and_closes() {
        let f = fixture().await;
        set_stored(&f.store, "tp-1", OrderStatus::Filled).await;

        let report = f.coordinator.on_leg_terminated(&tp_filled()).await.unwrap();

        assert_eq!(report, CoordinatorReport { cancels_issued: 1, brackets_closed: 1 });
        assert_eq!(stored(&f.store, "sl-1").await, OrderStatus::Cancelled);
        assert_eq!(f.gateway.cancel_calls("sl-1"), 1);
        assert_eq!(f.gateway.cancel_calls("tp-1"), 0);

        let bracket = f.store.brackets().find_by_id(f.bracket.group_id).await.unwrap().unwrap();
        assert_eq!(bracket.status, BracketStatus::Closed);
    }

    #[tokio::test]
    async fn test_same_event_twice_issues_no_duplicate_cancel() {
        let f = fixture().await;
        set_stored(&f.store, "tp-1", OrderStatus::Filled).await;

        f.coordinator.on_leg_terminated(&tp_filled()).await.unwrap();
        let second = f.coordinator.on_leg_terminated(&tp_filled()).await.unwrap();

        assert_eq!(second, CoordinatorReport::default());
        assert_eq!(f.gateway.total_cancel_calls(), 1);

        let closes = f
            .store
            .audit_entries()
            .iter()
            .filter(|e| e.message == "bracket closed")
            .count();
        assert_eq!(closes, 1);
    }

    #[tokio::test]
    async fn test_transient_cancel_leaves_state_untouched() {
        let f = fixture().await;
        set_stored(&f.store, "sl-1", OrderStatus::Filled).await;
        f.gateway.fail_next_cancel("tp-1", GatewayError::Timeout("slow".into()));

        let event = LegTerminated::new("sl-1", symbol(), OrderKind::StopLoss, OrderStatus::Filled);
        let report = f.coordinator.on_leg_terminated(&event).await.unwrap();

        assert_eq!(report.brackets_closed, 0);
        assert_eq!(stored(&f.store, "tp-1").await, OrderStatus::New);
        let bracket = f.store.brackets().find_by_id(f.bracket.group_id).await.unwrap().unwrap();
        assert!(bracket.is_active());

        // Retried from stored state
        let retry = f.coordinator.sweep(&bracket).await.unwrap();
        assert_eq!(retry, CoordinatorReport { cancels_issued: 1, brackets_closed: 1 });
        assert_eq!(stored(&f.store, "tp-1").await, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_not_found_then_filled_records_filled() {
        let f = fixture().await;
        set_stored(&f.store, "tp-1", OrderStatus::Filled).await;
        f.gateway.fail_next_cancel(
            "sl-1",
            GatewayError::Api { code: -2011, msg: "Unknown order sent.".into() },
        );
        f.gateway.set_state("sl-1", "FINISHED", dec!(0.5));

        let report = f.coordinator.on_leg_terminated(&tp_filled()).await.unwrap();

        assert_eq!(stored(&f.store, "sl-1").await, OrderStatus::Filled);
        assert_eq!(report.brackets_closed, 0);

        let flagged = f
            .store
            .audit_entries()
            .iter()
            .filter(|e| e.message == DOUBLE_FILL_MESSAGE && e.level == AuditLevel::Error)
            .count();
        assert_eq!(flagged, 1);

        // Flag is written once
        let bracket = f.store.brackets().find_by_id(f.bracket.group_id).await.unwrap().unwrap();
        f.coordinator.sweep(&bracket).await.unwrap();
        let flagged_again = f
            .store
            .audit_entries()
            .iter()
            .filter(|e| e.message == DOUBLE_FILL_MESSAGE)
            .count();
        assert_eq!(flagged_again, 1);
        let bracket = f.store.brackets().find_by_id(f.bracket.group_id).await.unwrap().unwrap();
        assert!(bracket.is_active());
    }

    #[tokio::test]
    async fn test_cancel_not_found_unconfirmed_is_flagged() {
        let f = fixture().await;
        set_stored(&f.store, "tp-1", OrderStatus::Filled).await;
        f.gateway.fail_next_cancel(
            "sl-1",
            GatewayError::Api { code: -2011, msg: "Unknown order sent.".into() },
        );
        f.gateway.fail_next_query("sl-1", GatewayError::Timeout("slow".into()));

        let report = f.coordinator.on_leg_terminated(&tp_filled()).await.unwrap();

        assert_eq!(report.brackets_closed, 1);
        assert_eq!(stored(&f.store, "sl-1").await, OrderStatus::Cancelled);

        let entries = f.store.audit().find_by_bracket(f.bracket.group_id).await.unwrap();
        let unconfirmed = entries
            .iter()
            .find(|e| e.message == "cancelled (unconfirmed)")
            .expect("unconfirmed audit entry");
        assert_eq!(unconfirmed.level, AuditLevel::Warn);
        assert_eq!(unconfirmed.details["confirmed"], json!(false));
        assert_eq!(unconfirmed.details["client_order_id"], json!("sl-1"));
    }

    #[tokio::test]
    async fn test_entry_fill_cancels_both_legs() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(StubGateway::new());
        let facade = OrderFacade::new(gateway.clone(), FacadeConfig::default());
        let coordinator = ClosureCoordinator::new(store.clone(), facade);

        let entry = Order::new("e-2", symbol(), OrderKind::Entry, OrderClass::Standard).unwrap();
        let tp = Order::new("tp-2", symbol(), OrderKind::TakeProfit, OrderClass::Conditional).unwrap();
        let sl = Order::new("sl-2", symbol(), OrderKind::StopLoss, OrderClass::Conditional).unwrap();
        let bracket = register_bracket(store.as_ref(), &entry, &tp, &sl).await.unwrap();
        gateway.set_state("tp-2", "NEW", dec!(0));
        gateway.set_state("sl-2", "NEW", dec!(0));
        store.orders().apply_status("e-2", OrderStatus::Filled, dec!(1), None).await.unwrap();

        let event = LegTerminated::new("e-2", symbol(), OrderKind::Entry, OrderStatus::Filled);
        let report = coordinator.on_leg_terminated(&event).await.unwrap();

        assert_eq!(report, CoordinatorReport { cancels_issued: 2, brackets_closed: 1 });
        let closed = store.brackets().find_by_id(bracket.group_id).await.unwrap().unwrap();
        assert!(closed.unwinding);
        assert_eq!(closed.status, BracketStatus::Closed);
    }

    #[tokio::test]
    async fn test_sweep_unwinds_entry_filled_in_earlier_pass() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(StubGateway::new());
        let facade = OrderFacade::new(gateway.clone(), FacadeConfig::default());
        let coordinator = ClosureCoordinator::new(store.clone(), facade);

        let entry = Order::new("e-3", symbol(), OrderKind::Entry, OrderClass::Standard).unwrap();
        let tp = Order::new("tp-3", symbol(), OrderKind::TakeProfit, OrderClass::Conditional).unwrap();
        let sl = Order::new("sl-3", symbol(), OrderKind::StopLoss, OrderClass::Conditional).unwrap();
        let bracket = register_bracket(store.as_ref(), &entry, &tp, &sl).await.unwrap();
        gateway.set_state("tp-3", "NEW", dec!(0));
        gateway.set_state("sl-3", "NEW", dec!(0));

        // Fill written, no event ever delivered
        store.orders().apply_status("e-3", OrderStatus::Filled, dec!(1), None).await.unwrap();

        let report = coordinator.sweep(&bracket).await.unwrap();

        assert_eq!(report, CoordinatorReport { cancels_issued: 2, brackets_closed: 1 });
        assert_eq!(gateway.cancel_calls("tp-3"), 1);
        assert_eq!(gateway.cancel_calls("sl-3"), 1);
        let closed = store.brackets().find_by_id(bracket.group_id).await.unwrap().unwrap();
        assert!(closed.unwinding);
    }

    #[tokio::test]
    async fn test_failed_protective_leg_is_flagged_not_closed() {
        let f = fixture().await;
        set_stored(&f.store, "tp-1", OrderStatus::Filled).await;
        set_stored(&f.store, "sl-1", OrderStatus::Failed).await;

        let report = f.coordinator.on_leg_terminated(&tp_filled()).await.unwrap();
        assert_eq!(report, CoordinatorReport::default());

        let bracket = f.store.brackets().find_by_id(f.bracket.group_id).await.unwrap().unwrap();
        assert!(bracket.is_active());
        assert!(bracket.needs_review);

        f.coordinator.sweep(&bracket).await.unwrap();
        let flagged: Vec<_> = f
            .store
            .audit_entries()
            .into_iter()
            .filter(|e| e.message == LEG_FAILED_MESSAGE)
            .collect();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].level, AuditLevel::Error);
        assert_eq!(flagged[0].details["client_order_id"], json!("sl-1"));
        assert_eq!(f.gateway.total_cancel_calls(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_leg_does_not_counter_cancel() {
        let f = fixture().await;
        set_stored(&f.store, "tp-1", OrderStatus::Cancelled).await;

        let event = LegTerminated::new("tp-1", symbol(), OrderKind::TakeProfit, OrderStatus::Cancelled);
        let report = f.coordinator.on_leg_terminated(&event).await.unwrap();

        assert_eq!(report, CoordinatorReport::default());
        assert_eq!(f.gateway.total_cancel_calls(), 0);
        assert_eq!(stored(&f.store, "sl-1").await, OrderStatus::New);
    }

    #[tokio::test]
    async fn test_order_outside_bracket_is_ignored() {
        let f = fixture().await;
        let event = LegTerminated::new("loose-1", symbol(), OrderKind::Entry, OrderStatus::Filled);

        let report = f.coordinator.on_leg_terminated(&event).await.unwrap();
        assert_eq!(report, CoordinatorReport::default());
    }

    #[test]
    fn test_reason_labels() {
        assert_eq!(reason_label(CancelReason::EntryFilled), "entry_filled");
        assert_eq!(reason_label(CancelReason::SiblingFilled(LegRole::StopLoss)), "stop_loss_filled");
    }
}
