//! Closure planning: one-cancels-other rules for a bracket.
//!
//! The planner never talks to the exchange. It reads the stored status of
//! each leg and decides which siblings to cancel and whether the bracket may
//! close. Because it only looks at persisted state, running it twice over the
//! same state yields the same plan, and a sibling that is already terminal is
//! never targeted again.
//!
//! # Rules
//!
//! | Trigger                     | Action                          |
//! |-----------------------------|---------------------------------|
//! | entry FILLED after register | mark unwinding, cancel TP + SL  |
//! | bracket already unwinding   | cancel TP + SL                  |
//! | TP FILLED                   | cancel SL                       |
//! | SL FILLED                   | cancel TP                       |
//! | TP / SL CANCELLED or FAILED | nothing                         |
//!
//! A bracket closes once both protective legs are FILLED or CANCELLED,
//! unless both are FILLED. That case, and a protective leg recorded FAILED,
//! leave the bracket active and flagged.

use bracket_domain::{Bracket, LegRole, Order, OrderClass, OrderStatus};
use serde::Serialize;
use tracing::debug;

use crate::error::EngineError;

// =============================================================================
// Plan types
// =============================================================================

/// Why a sibling is being cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CancelReason {
    /// Entry filled after registration
    EntryFilled,
    /// Bracket was marked unwinding on an earlier pass
    Unwinding,
    /// The opposite protective leg filled
    SiblingFilled(LegRole),
}

/// A single step of a closure plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClosureAction {
    /// Persist the unwinding marker on the bracket
    MarkUnwinding,
    /// Cancel a protective leg that is still working
    CancelLeg {
        /// Which leg
        role: LegRole,
        /// Its client order id
        client_order_id: String,
        /// Which sub-API to cancel through
        class: OrderClass,
        /// Why
        reason: CancelReason,
    },
}

/// Ordered list of actions for one bracket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClosurePlan {
    /// Actions in execution order
    pub actions: Vec<ClosureAction>,
}

impl ClosurePlan {
    /// No action needed.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Whether the plan persists the unwinding marker.
    pub fn marks_unwinding(&self) -> bool {
        self.actions.iter().any(|a| matches!(a, ClosureAction::MarkUnwinding))
    }

    /// Number of cancels in the plan.
    pub fn cancel_count(&self) -> usize {
        self.actions
            .iter()
            .filter(|a| matches!(a, ClosureAction::CancelLeg { .. }))
            .count()
    }

    fn push_cancel(&mut self, leg: &Order, role: LegRole, reason: CancelReason) {
        if leg.status.is_terminal() {
            return;
        }
        let already = self.actions.iter().any(
            |a| matches!(a, ClosureAction::CancelLeg { role: r, .. } if *r == role),
        );
        if already {
            return;
        }
        self.actions.push(ClosureAction::CancelLeg {
            role,
            client_order_id: leg.client_order_id.clone(),
            class: leg.class,
            reason,
        });
    }
}

/// How a bracket ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ClosureOutcome {
    /// Take-profit filled, stop-loss cancelled
    TakeProfitHit,
    /// Stop-loss filled, take-profit cancelled
    StopLossHit,
    /// Neither leg filled (cancelled or expired)
    NoFill,
}

/// Whether a bracket may be closed now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDecision {
    /// Both protective legs terminal; close with this outcome
    Close(ClosureOutcome),
    /// Both protective legs filled; must not close
    DoubleFill,
    /// A protective leg was recorded FAILED; must not close
    LegFailed(LegRole),
    /// At least one protective leg still working
    Pending,
}

// =============================================================================
// Engine
// =============================================================================

/// Stateless OCO planner.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClosureEngine;

impl ClosureEngine {
    /// Create a new engine.
    pub fn new() -> Self {
        Self
    }

    /// Plan the cancels a bracket needs given its stored legs.
    ///
    /// Every rule is derived from stored status alone, so a pass that
    /// crashed or failed halfway is redone by the next one without extra
    /// bookkeeping. An entry fill counts only when it happened after the
    /// bracket was registered.
    pub fn plan(
        &self,
        bracket: &Bracket,
        entry: &Order,
        take_profit: &Order,
        stop_loss: &Order,
    ) -> Result<ClosurePlan, EngineError> {
        check_leg(bracket, LegRole::Entry, entry)?;
        check_leg(bracket, LegRole::TakeProfit, take_profit)?;
        check_leg(bracket, LegRole::StopLoss, stop_loss)?;

        let mut plan = ClosurePlan::default();
        if !bracket.is_active() {
            return Ok(plan);
        }

        let entry_fill = bracket.entry_fill_observed(entry);

        if entry_fill && !bracket.unwinding {
            plan.actions.push(ClosureAction::MarkUnwinding);
        }

        if entry_fill || bracket.unwinding {
            let reason =
                if bracket.unwinding { CancelReason::Unwinding } else { CancelReason::EntryFilled };
            plan.push_cancel(take_profit, LegRole::TakeProfit, reason);
            plan.push_cancel(stop_loss, LegRole::StopLoss, reason);
        }

        if take_profit.status == OrderStatus::Filled {
            plan.push_cancel(
                stop_loss,
                LegRole::StopLoss,
                CancelReason::SiblingFilled(LegRole::TakeProfit),
            );
        }

        if stop_loss.status == OrderStatus::Filled {
            plan.push_cancel(
                take_profit,
                LegRole::TakeProfit,
                CancelReason::SiblingFilled(LegRole::StopLoss),
            );
        }

        debug!(
            group_id = %bracket.group_id,
            entry_status = %entry.status,
            tp_status = %take_profit.status,
            sl_status = %stop_loss.status,
            entry_fill,
            actions = plan.actions.len(),
            "Closure planned"
        );

        Ok(plan)
    }

    /// Decide whether the bracket can close from its protective legs' status.
    ///
    /// Only FILLED and CANCELLED legs close a bracket. A FAILED protective
    /// leg in an ACTIVE bracket is reported even while its sibling works.
    pub fn evaluate_close(&self, take_profit: OrderStatus, stop_loss: OrderStatus) -> CloseDecision {
        if take_profit == OrderStatus::Failed {
            return CloseDecision::LegFailed(LegRole::TakeProfit);
        }
        if stop_loss == OrderStatus::Failed {
            return CloseDecision::LegFailed(LegRole::StopLoss);
        }
        if !take_profit.is_terminal() || !stop_loss.is_terminal() {
            return CloseDecision::Pending;
        }

        match (take_profit, stop_loss) {
            (OrderStatus::Filled, OrderStatus::Filled) => CloseDecision::DoubleFill,
            (OrderStatus::Filled, _) => CloseDecision::Close(ClosureOutcome::TakeProfitHit),
            (_, OrderStatus::Filled) => CloseDecision::Close(ClosureOutcome::StopLossHit),
            _ => CloseDecision::Close(ClosureOutcome::NoFill),
        }
    }
}

fn check_leg(bracket: &Bracket, role: LegRole, order: &Order) -> Result<(), EngineError> {
    let expected = bracket.client_id_of(role);
    if order.client_order_id != expected {
        return Err(EngineError::LegMismatch {
            group_id: bracket.group_id.to_string(),
            expected: expected.to_string(),
            actual: order.client_order_id.clone(),
        });
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use bracket_domain::{OrderKind, Symbol};

    struct Legs {
        bracket: Bracket,
        entry: Order,
        tp: Order,
        sl: Order,
    }

    impl Legs {
        fn plan(&self) -> ClosurePlan {
            ClosureEngine::new().plan(&self.bracket, &self.entry, &self.tp, &self.sl).unwrap()
        }
    }

    fn symbol() -> Symbol {
        Symbol::from_pair("BTCUSDT").unwrap()
    }

    fn leg(id: &str, kind: OrderKind, status: OrderStatus) -> Order {
        let class = if kind == OrderKind::Entry { OrderClass::Standard } else { OrderClass::Conditional };
        let mut order = Order::new(id, symbol(), kind, class).unwrap();
        order.status = status;
        order
    }

    /// Bracket registered over an already-filled entry.
    fn setup(tp: OrderStatus, sl: OrderStatus) -> Legs {
        let entry = leg("e-1", OrderKind::Entry, OrderStatus::Filled);
        let tp = leg("tp-1", OrderKind::TakeProfit, tp);
        let sl = leg("sl-1", OrderKind::StopLoss, sl);
        let bracket = Bracket::new(&entry, &tp, &sl).unwrap();
        Legs { bracket, entry, tp, sl }
    }

    /// Bracket registered while the entry was still working.
    fn setup_working_entry(tp: OrderStatus, sl: OrderStatus) -> Legs {
        let mut entry = leg("e-1", OrderKind::Entry, OrderStatus::Live);
        let tp = leg("tp-1", OrderKind::TakeProfit, tp);
        let sl = leg("sl-1", OrderKind::StopLoss, sl);
        let bracket = Bracket::new(&entry, &tp, &sl).unwrap();
        entry.status = OrderStatus::Filled;
        Legs { bracket, entry, tp, sl }
    }

    fn cancelled_roles(plan: &ClosurePlan) -> Vec<LegRole> {
        plan.actions
            .iter()
            .filter_map(|a| match a {
                ClosureAction::CancelLeg { role, .. } => Some(*role),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_both_live_is_noop() {
        let legs = setup(OrderStatus::Live, OrderStatus::Live);
        assert!(legs.plan().is_empty());
    }

    #[test]
    fn test_take_profit_fill_cancels_stop_loss() {
        let plan = setup(OrderStatus::Filled, OrderStatus::Live).plan();

        assert_eq!(cancelled_roles(&plan), vec![LegRole::StopLoss]);
        match &plan.actions[0] {
            ClosureAction::CancelLeg { client_order_id, class, reason, .. } => {
                assert_eq!(client_order_id, "sl-1");
                assert_eq!(*class, OrderClass::Conditional);
                assert_eq!(*reason, CancelReason::SiblingFilled(LegRole::TakeProfit));
            },
            other => panic!("Expected CancelLeg, got {:?}", other),
        }
    }

    #[test]
    fn test_stop_loss_fill_cancels_take_profit() {
        let plan = setup(OrderStatus::Live, OrderStatus::Filled).plan();
        assert_eq!(cancelled_roles(&plan), vec![LegRole::TakeProfit]);
    }

    #[test]
    fn test_terminal_sibling_is_not_cancelled_again() {
        let plan = setup(OrderStatus::Filled, OrderStatus::Cancelled).plan();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_cancelled_leg_triggers_no_counter_cancel() {
        assert!(setup(OrderStatus::Cancelled, OrderStatus::Live).plan().is_empty());
        assert!(setup(OrderStatus::Live, OrderStatus::Failed).plan().is_empty());
    }

    #[test]
    fn test_entry_fill_cancels_both_and_marks_unwinding() {
        let plan = setup_working_entry(OrderStatus::Live, OrderStatus::New).plan();

        assert!(plan.marks_unwinding());
        assert_eq!(cancelled_roles(&plan), vec![LegRole::TakeProfit, LegRole::StopLoss]);
        assert_eq!(plan.cancel_count(), 2);
    }

    #[test]
    fn test_entry_fill_is_read_from_stored_state() {
        // Same stored state planned twice, as after a restart
        let legs = setup_working_entry(OrderStatus::Live, OrderStatus::Live);
        let engine = ClosureEngine::new();

        let first = engine.plan(&legs.bracket, &legs.entry, &legs.tp, &legs.sl).unwrap();
        let again = engine.plan(&legs.bracket, &legs.entry, &legs.tp, &legs.sl).unwrap();
        assert_eq!(first, again);
        assert_eq!(again.cancel_count(), 2);
    }

    #[test]
    fn test_prefilled_entry_does_not_unwind() {
        let legs = setup(OrderStatus::Live, OrderStatus::Live);
        assert!(legs.bracket.entry_prefilled);
        assert!(legs.plan().is_empty());
    }

    #[test]
    fn test_unwinding_bracket_retries_remaining_cancel() {
        let mut legs = setup_working_entry(OrderStatus::Cancelled, OrderStatus::Live);
        legs.bracket.unwinding = true;

        let plan = legs.plan();

        assert!(!plan.marks_unwinding());
        assert_eq!(cancelled_roles(&plan), vec![LegRole::StopLoss]);
        match &plan.actions[0] {
            ClosureAction::CancelLeg { reason, .. } => assert_eq!(*reason, CancelReason::Unwinding),
            other => panic!("Expected CancelLeg, got {:?}", other),
        }
    }

    #[test]
    fn test_closed_bracket_plans_nothing() {
        let mut legs = setup(OrderStatus::Filled, OrderStatus::Live);
        legs.bracket.close().unwrap();
        assert!(legs.plan().is_empty());
    }

    #[test]
    fn test_plan_is_idempotent() {
        let legs = setup(OrderStatus::Live, OrderStatus::Filled);
        assert_eq!(legs.plan(), legs.plan());
    }

    #[test]
    fn test_leg_mismatch_is_rejected() {
        let legs = setup(OrderStatus::Live, OrderStatus::Live);
        let result = ClosureEngine::new().plan(&legs.bracket, &legs.entry, &legs.sl, &legs.tp);
        assert!(matches!(result, Err(EngineError::LegMismatch { .. })));

        let result = ClosureEngine::new().plan(&legs.bracket, &legs.tp, &legs.tp, &legs.sl);
        assert!(matches!(result, Err(EngineError::LegMismatch { .. })));
    }

    #[test]
    fn test_evaluate_close() {
        let engine = ClosureEngine::new();

        assert_eq!(
            engine.evaluate_close(OrderStatus::Filled, OrderStatus::Cancelled),
            CloseDecision::Close(ClosureOutcome::TakeProfitHit)
        );
        assert_eq!(
            engine.evaluate_close(OrderStatus::Cancelled, OrderStatus::Filled),
            CloseDecision::Close(ClosureOutcome::StopLossHit)
        );
        assert_eq!(
            engine.evaluate_close(OrderStatus::Cancelled, OrderStatus::Cancelled),
            CloseDecision::Close(ClosureOutcome::NoFill)
        );
        assert_eq!(
            engine.evaluate_close(OrderStatus::Filled, OrderStatus::Live),
            CloseDecision::Pending
        );
        assert_eq!(
            engine.evaluate_close(OrderStatus::Filled, OrderStatus::Filled),
            CloseDecision::DoubleFill
        );
    }

    #[test]
    fn test_failed_protective_leg_never_closes() {
        let engine = ClosureEngine::new();

        assert_eq!(
            engine.evaluate_close(OrderStatus::Filled, OrderStatus::Failed),
            CloseDecision::LegFailed(LegRole::StopLoss)
        );
        assert_eq!(
            engine.evaluate_close(OrderStatus::Failed, OrderStatus::Cancelled),
            CloseDecision::LegFailed(LegRole::TakeProfit)
        );
        assert_eq!(
            engine.evaluate_close(OrderStatus::Live, OrderStatus::Failed),
            CloseDecision::LegFailed(LegRole::StopLoss)
        );
    }
}
