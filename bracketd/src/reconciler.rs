//! Reconciliation Loop.
//!
//! The only writer of order status. Each pass:
//!
//! 1. loads every NEW / PROCESSING / LIVE order,
//! 2. queries them concurrently (bounded pool, one deadline per call, a
//!    panicking or timed-out query counts as transient),
//! 3. writes observed transitions one by one and collects leg-terminated
//!    events,
//! 4. hands each event to the closure coordinator, then sweeps the remaining
//!    ACTIVE brackets so failed counter-cancels are retried from stored state.
//!
//! Passes never overlap: a tick that finds a pass in flight is skipped.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::json;
use tokio::sync::{Mutex, RwLock};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use bracket_domain::{AuditLevel, AuditLogEntry, LegTerminated, Order, OrderStatus, StatusChange};
use bracket_exec::{FacadeError, OrderFacade, QueryVerdict, StatusReport};
use bracket_store::Store;

use crate::config::ReconcileConfig;
use crate::coordinator::{ClosureCoordinator, CoordinatorReport};
use crate::error::DaemonResult;

// =============================================================================
// Reports
// =============================================================================

/// Counters for one completed pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    /// Non-terminal orders loaded
    pub examined: usize,
    /// Status writes that moved an order forward
    pub transitioned: usize,
    /// Queries that failed transiently (timeout, rate limit, task fault)
    pub transient: usize,
    /// Queries with no trustworthy answer after confirmation
    pub unresolved: usize,
    /// Cancel requests issued by the coordinator
    pub cancels_issued: usize,
    /// Brackets closed
    pub brackets_closed: usize,
}

/// Result of asking for a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// The pass ran
    Completed(PassReport),
    /// Another pass was still running
    Skipped,
}

/// Loop statistics for the status endpoint.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoopStats {
    /// Passes that ran to the end
    pub passes_completed: u64,
    /// Ticks dropped because a pass was still running
    pub passes_skipped: u64,
    /// Passes aborted by a store error
    pub passes_failed: u64,
    /// When the last completed pass finished
    pub last_pass_at: Option<DateTime<Utc>>,
    /// Counters of the last completed pass
    pub last_report: Option<PassReport>,
}

// =============================================================================
// Loop
// =============================================================================

/// Periodic reconciliation of stored orders against the exchange.
pub struct ReconciliationLoop {
    store: Arc<dyn Store>,
    facade: OrderFacade,
    coordinator: ClosureCoordinator,
    config: ReconcileConfig,
    /// Held for the duration of a pass
    pass_guard: Mutex<()>,
    stats: RwLock<LoopStats>,
}

impl ReconciliationLoop {
    /// Create a loop over a store and facade.
    pub fn new(store: Arc<dyn Store>, facade: OrderFacade, config: ReconcileConfig) -> Self {
        let coordinator = ClosureCoordinator::new(store.clone(), facade.clone());
        Self {
            store,
            facade,
            coordinator,
            config,
            pass_guard: Mutex::new(()),
            stats: RwLock::new(LoopStats::default()),
        }
    }

    /// Snapshot of the loop statistics.
    pub async fn stats(&self) -> LoopStats {
        self.stats.read().await.clone()
    }

    /// Run until `shutdown` fires.
    ///
    /// A pass that outlasts the interval causes the missed ticks to be
    /// dropped, not queued.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            max_concurrency = self.config.max_concurrency,
            "Reconciliation loop started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Reconciliation loop stopped");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "Reconciliation pass failed");
                    }
                }
            }
        }
    }

    /// Run one pass unless one is already in flight.
    pub async fn tick(&self) -> DaemonResult<PassOutcome> {
        let _guard = match self.pass_guard.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("Pass still running; tick skipped");
                self.stats.write().await.passes_skipped += 1;
                return Ok(PassOutcome::Skipped);
            },
        };

        match self.pass().await {
            Ok(report) => {
                let mut stats = self.stats.write().await;
                stats.passes_completed += 1;
                stats.last_pass_at = Some(Utc::now());
                stats.last_report = Some(report);
                Ok(PassOutcome::Completed(report))
            },
            Err(e) => {
                self.stats.write().await.passes_failed += 1;
                Err(e)
            },
        }
    }

    async fn pass(&self) -> DaemonResult<PassReport> {
        let orders = self.store.orders().find_non_terminal().await?;
        let mut report = PassReport {
            examined: orders.len(),
            ..PassReport::default()
        };

        // Phase 1: query
        let mut observations = self.query_all(orders).await;
        observations.sort_by(|(a, _), (b, _)| {
            a.created_at.cmp(&b.created_at).then_with(|| a.client_order_id.cmp(&b.client_order_id))
        });

        // Phase 2: write
        let mut events = Vec::new();
        for (order, verdict) in observations {
            match self.apply_verdict(&order, verdict, &mut report).await {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {},
                Err(e) => {
                    error!(
                        client_order_id = %order.client_order_id,
                        symbol = %order.symbol,
                        error = %e,
                        "Failed to record observation"
                    );
                    report.unresolved += 1;
                },
            }
        }

        // Phase 3: close
        let mut closure = CoordinatorReport::default();
        let mut handled = HashSet::new();
        for event in &events {
            match self.coordinator.on_leg_terminated(event).await {
                Ok(r) => closure.absorb(r),
                Err(e) => {
                    // Left unhandled so the sweep below retries it
                    error!(
                        client_order_id = %event.client_order_id,
                        error = %e,
                        "Closure coordination failed"
                    );
                    continue;
                },
            }
            match self.store.brackets().find_by_leg(&event.client_order_id).await {
                Ok(Some(bracket)) => {
                    handled.insert(bracket.group_id);
                },
                Ok(None) => {},
                Err(e) => warn!(
                    client_order_id = %event.client_order_id,
                    error = %e,
                    "Bracket lookup failed; sweeping it again"
                ),
            }
        }

        for bracket in self.store.brackets().find_active().await? {
            if handled.contains(&bracket.group_id) {
                continue;
            }
            match self.coordinator.sweep(&bracket).await {
                Ok(r) => closure.absorb(r),
                Err(e) => error!(group_id = %bracket.group_id, error = %e, "Bracket sweep failed"),
            }
        }

        report.cancels_issued = closure.cancels_issued;
        report.brackets_closed = closure.brackets_closed;

        info!(
            examined = report.examined,
            transitioned = report.transitioned,
            transient = report.transient,
            unresolved = report.unresolved,
            cancels_issued = report.cancels_issued,
            brackets_closed = report.brackets_closed,
            "Reconciliation pass complete"
        );

        Ok(report)
    }

    /// Query every order, each in its own task.
    async fn query_all(&self, orders: Vec<Order>) -> Vec<(Order, QueryVerdict)> {
        let facade = self.facade.clone();

        stream::iter(orders)
            .map(|order| {
                let facade = facade.clone();
                async move {
                    let symbol = order.symbol.clone();
                    let client_order_id = order.client_order_id.clone();
                    let class = order.class;
                    let task = tokio::spawn(async move {
                        facade.query_confirmed(&symbol, &client_order_id, class).await
                    });

                    let verdict = match task.await {
                        Ok(verdict) => verdict,
                        Err(e) => {
                            warn!(
                                client_order_id = %order.client_order_id,
                                error = %e,
                                "Status query task failed"
                            );
                            QueryVerdict::Unresolved(FacadeError::Transient(format!(
                                "query task failed: {}",
                                e
                            )))
                        },
                    };
                    (order, verdict)
                }
            })
            .buffer_unordered(self.config.max_concurrency.max(1))
            .collect()
            .await
    }

    /// Record one query verdict. Returns the event to hand to the
    /// coordinator when the order became terminal.
    async fn apply_verdict(
        &self,
        order: &Order,
        verdict: QueryVerdict,
        report: &mut PassReport,
    ) -> DaemonResult<Option<LegTerminated>> {
        let client_order_id = order.client_order_id.as_str();

        match verdict {
            QueryVerdict::Observed(status) => self.record(order, status, false, report).await,
            QueryVerdict::Confirmed(status) => self.record(order, status, true, report).await,

            QueryVerdict::Vanished { detail } => {
                if order.is_acknowledged() {
                    warn!(
                        client_order_id,
                        symbol = %order.symbol,
                        detail = %detail,
                        "Acknowledged order no longer known to the exchange"
                    );
                    self.write_without_confirmation(
                        order,
                        OrderStatus::Cancelled,
                        "order vanished from the exchange; recorded CANCELLED (unconfirmed)",
                        &detail,
                        report,
                    )
                    .await
                } else if self.past_grace(order) {
                    warn!(
                        client_order_id,
                        symbol = %order.symbol,
                        detail = %detail,
                        "Order never acknowledged by the exchange"
                    );
                    self.write_without_confirmation(
                        order,
                        OrderStatus::Failed,
                        "order never reached the exchange; recorded FAILED",
                        &detail,
                        report,
                    )
                    .await
                } else {
                    debug!(client_order_id, "Unacknowledged order not found yet; within grace");
                    report.unresolved += 1;
                    Ok(None)
                }
            },

            QueryVerdict::Unresolved(err) => {
                match &err {
                    FacadeError::Transient(_) => report.transient += 1,
                    _ => report.unresolved += 1,
                }
                warn!(
                    client_order_id,
                    symbol = %order.symbol,
                    error = %err,
                    "Status unresolved; retrying next pass"
                );
                Ok(None)
            },

            QueryVerdict::Rejected(detail) => {
                error!(
                    client_order_id,
                    symbol = %order.symbol,
                    error = %detail,
                    "Status query rejected"
                );
                let change = self
                    .store
                    .orders()
                    .apply_status(client_order_id, OrderStatus::Failed, order.executed_qty, None)
                    .await?;
                if !change.is_terminal_transition() {
                    return Ok(None);
                }
                report.transitioned += 1;
                self.audit(
                    order,
                    AuditLevel::Error,
                    "exchange rejected the order; recorded FAILED",
                    json!({ "error": detail }),
                )
                .await?;
                Ok(Some(LegTerminated::new(
                    client_order_id,
                    order.symbol.clone(),
                    order.kind,
                    OrderStatus::Failed,
                )))
            },
        }
    }

    /// Write an authoritative observation.
    async fn record(
        &self,
        order: &Order,
        status: StatusReport,
        after_confirmation: bool,
        report: &mut PassReport,
    ) -> DaemonResult<Option<LegTerminated>> {
        let client_order_id = order.client_order_id.as_str();

        if let Some(exchange_id) = &status.exchange_order_id {
            if order.exchange_order_id.as_ref() != Some(exchange_id) {
                if let Err(e) =
                    self.store.orders().set_exchange_order_id(client_order_id, exchange_id).await
                {
                    warn!(client_order_id, exchange_order_id = %exchange_id, error = %e, "Exchange id not recorded");
                }
            }
        }

        let change = self
            .store
            .orders()
            .apply_status(
                client_order_id,
                status.status,
                status.executed_qty,
                Some(status.raw.clone()),
            )
            .await?;

        let (from, to) = match change {
            StatusChange::Applied { from, to } => (from, to),
            StatusChange::Unchanged => return Ok(None),
        };
        report.transitioned += 1;

        info!(
            client_order_id,
            symbol = %order.symbol,
            from = %from,
            to = %to,
            native = %status.native_status,
            "Order status changed"
        );

        if !to.is_terminal() {
            return Ok(None);
        }

        self.audit(
            order,
            AuditLevel::Info,
            format!("order {}", to),
            json!({
                "from": from,
                "to": to,
                "native_status": status.native_status,
                "executed_qty": status.executed_qty,
                "after_confirmation": after_confirmation,
                "raw": status.raw,
            }),
        )
        .await?;

        Ok(Some(LegTerminated::new(client_order_id, order.symbol.clone(), order.kind, to)))
    }

    async fn write_without_confirmation(
        &self,
        order: &Order,
        status: OrderStatus,
        message: &str,
        detail: &str,
        report: &mut PassReport,
    ) -> DaemonResult<Option<LegTerminated>> {
        let change = self
            .store
            .orders()
            .apply_status(&order.client_order_id, status, order.executed_qty, None)
            .await?;
        if !change.is_terminal_transition() {
            return Ok(None);
        }
        report.transitioned += 1;

        self.audit(order, AuditLevel::Warn, message, json!({ "confirmed": false, "detail": detail }))
            .await?;

        Ok(Some(
            LegTerminated::new(order.client_order_id.clone(), order.symbol.clone(), order.kind, status)
                .unconfirmed(),
        ))
    }

    fn past_grace(&self, order: &Order) -> bool {
        let age = (Utc::now() - order.created_at).to_std().unwrap_or_default();
        age >= self.config.not_found_grace
    }

    async fn audit(
        &self,
        order: &Order,
        level: AuditLevel,
        message: impl Into<String>,
        mut details: serde_json::Value,
    ) -> DaemonResult<()> {
        if let Some(map) = details.as_object_mut() {
            map.insert("client_order_id".into(), json!(order.client_order_id));
            map.insert("symbol".into(), json!(order.symbol.as_pair()));
        }
        let bracket_id = self
            .store
            .brackets()
            .find_by_leg(&order.client_order_id)
            .await?
            .map(|b| b.group_id);

        let entry = AuditLogEntry::order(&order.client_order_id, level, message)
            .in_bracket(bracket_id)
            .with_details(details);
        self.store.audit().append(&entry).await?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use bracket_domain::{OrderClass, OrderKind, Symbol};
    use bracket_exec::{FacadeConfig, GatewayError, StubGateway};
    use bracket_domain::{Bracket, BracketId};
    use bracket_store::{
        register_bracket, AuditRepository, BracketRepository, MemoryStore, OrderRepository,
        StoreError,
    };
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn symbol() -> Symbol {
        Symbol::from_pair("BTCUSDT").unwrap()
    }

    fn setup(config: ReconcileConfig) -> (Arc<MemoryStore>, Arc<StubGateway>, ReconciliationLoop) {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(StubGateway::new());
        let facade = OrderFacade::new(
            gateway.clone(),
            FacadeConfig {
                query_timeout: config.query_timeout,
                cancel_timeout: config.cancel_timeout,
            },
        );
        let reconciler = ReconciliationLoop::new(store.clone(), facade, config);
        (store, gateway, reconciler)
    }

    fn config() -> ReconcileConfig {
        crate::config::Config::test().reconcile
    }

    async fn insert(store: &MemoryStore, id: &str, kind: OrderKind, class: OrderClass) {
        let order = Order::new(id, symbol(), kind, class).unwrap();
        store.orders().insert(&order).await.unwrap();
    }

    async fn stored(store: &MemoryStore, id: &str) -> Order {
        store.orders().find_by_client_id(id).await.unwrap().unwrap()
    }

    fn completed(outcome: PassOutcome) -> PassReport {
        match outcome {
            PassOutcome::Completed(report) => report,
            PassOutcome::Skipped => panic!("pass was skipped"),
        }
    }

    #[tokio::test]
    async fn test_live_order_is_recorded() {
        let (store, gateway, reconciler) = setup(config());
        insert(&store, "e-1", OrderKind::Entry, OrderClass::Standard).await;
        let mut raw = bracket_exec::RawOrderState::new("PARTIALLY_FILLED");
        raw.executed_qty = dec!(0.4);
        raw.exchange_order_id = Some("8886774".to_string());
        gateway.set_raw_state("e-1", raw);

        let report = completed(reconciler.tick().await.unwrap());

        assert_eq!(report.examined, 1);
        assert_eq!(report.transitioned, 1);
        let order = stored(&store, "e-1").await;
        assert_eq!(order.status, OrderStatus::Live);
        assert_eq!(order.executed_qty, dec!(0.4));
        assert_eq!(order.exchange_order_id.as_deref(), Some("8886774"));
    }

    #[tokio::test]
    async fn test_timeout_does_not_change_status() {
        let (store, gateway, reconciler) = setup(config());
        insert(&store, "e-1", OrderKind::Entry, OrderClass::Standard).await;
        gateway.set_state("e-1", "FILLED", dec!(1));
        gateway.fail_next_query("e-1", GatewayError::Timeout("deadline".into()));

        let report = completed(reconciler.tick().await.unwrap());

        assert_eq!(report.transient, 1);
        assert_eq!(report.transitioned, 0);
        assert_eq!(stored(&store, "e-1").await.status, OrderStatus::New);
        assert_eq!(store.audit_count(), 0);

        // Next pass picks it up
        let report = completed(reconciler.tick().await.unwrap());
        assert_eq!(report.transitioned, 1);
        assert_eq!(stored(&store, "e-1").await.status, OrderStatus::Filled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_query_hits_deadline() {
        let (store, gateway, reconciler) = setup(config());
        insert(&store, "e-1", OrderKind::Entry, OrderClass::Standard).await;
        insert(&store, "e-2", OrderKind::Entry, OrderClass::Standard).await;
        gateway.set_state("e-1", "FILLED", dec!(1));
        gateway.set_state("e-2", "FILLED", dec!(1));
        gateway.set_delay("e-1", Duration::from_secs(30));

        let report = completed(reconciler.tick().await.unwrap());

        assert_eq!(report.transient, 1);
        assert_eq!(stored(&store, "e-1").await.status, OrderStatus::New);
        assert_eq!(stored(&store, "e-2").await.status, OrderStatus::Filled);
    }

    #[tokio::test]
    async fn test_panicking_query_is_contained() {
        let (store, gateway, reconciler) = setup(config());
        insert(&store, "e-1", OrderKind::Entry, OrderClass::Standard).await;
        insert(&store, "e-2", OrderKind::Entry, OrderClass::Standard).await;
        gateway.panic_on_query("e-1");
        gateway.set_state("e-2", "NEW", dec!(0));

        let report = completed(reconciler.tick().await.unwrap());

        assert_eq!(report.transient, 1);
        assert_eq!(stored(&store, "e-1").await.status, OrderStatus::New);
        assert_eq!(stored(&store, "e-2").await.status, OrderStatus::Live);
    }

    #[tokio::test]
    async fn test_vanished_unacknowledged_order_fails_after_grace() {
        let mut cfg = config();
        cfg.not_found_grace = Duration::from_secs(3600);
        let (store, _gateway, reconciler) = setup(cfg);
        insert(&store, "e-1", OrderKind::Entry, OrderClass::Standard).await;

        let report = completed(reconciler.tick().await.unwrap());
        assert_eq!(report.unresolved, 1);
        assert_eq!(stored(&store, "e-1").await.status, OrderStatus::New);

        let (store, _gateway, reconciler) = setup(config());
        insert(&store, "e-1", OrderKind::Entry, OrderClass::Standard).await;

        completed(reconciler.tick().await.unwrap());
        assert_eq!(stored(&store, "e-1").await.status, OrderStatus::Failed);
    }

    #[tokio::test]
    async fn test_vanished_acknowledged_order_is_cancelled_unconfirmed() {
        let (store, gateway, reconciler) = setup(config());
        insert(&store, "tp-1", OrderKind::TakeProfit, OrderClass::Conditional).await;
        gateway.set_state("tp-1", "WORKING", dec!(0));
        completed(reconciler.tick().await.unwrap());
        assert_eq!(stored(&store, "tp-1").await.status, OrderStatus::Live);

        gateway.remove("tp-1");
        completed(reconciler.tick().await.unwrap());

        assert_eq!(stored(&store, "tp-1").await.status, OrderStatus::Cancelled);
        let entries = store.audit().find_by_entity(bracket_domain::EntityType::Order, "tp-1").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, AuditLevel::Warn);
        assert_eq!(entries[0].details["confirmed"], json!(false));
    }

    #[tokio::test]
    async fn test_ambiguous_then_observed_is_written() {
        let (store, gateway, reconciler) = setup(config());
        insert(&store, "sl-1", OrderKind::StopLoss, OrderClass::Conditional).await;
        gateway.set_state("sl-1", "FINISHED", dec!(1));
        gateway.fail_next_query("sl-1", GatewayError::ServerUnknown { status: 502, body: "".into() });

        completed(reconciler.tick().await.unwrap());

        assert_eq!(stored(&store, "sl-1").await.status, OrderStatus::Filled);
        assert_eq!(gateway.query_calls("sl-1"), 2);
        let entries = store.audit().find_by_entity(bracket_domain::EntityType::Order, "sl-1").await.unwrap();
        assert_eq!(entries[0].details["after_confirmation"], json!(true));
    }

    #[tokio::test]
    async fn test_rejected_query_writes_failed() {
        let (store, gateway, reconciler) = setup(config());
        insert(&store, "e-1", OrderKind::Entry, OrderClass::Standard).await;
        gateway.fail_next_query("e-1", GatewayError::Api { code: -1121, msg: "Invalid symbol.".into() });

        completed(reconciler.tick().await.unwrap());

        assert_eq!(stored(&store, "e-1").await.status, OrderStatus::Failed);
    }

    /// Store whose bracket lookup for one leg breaks after its first use.
    struct BrokenLookupStore {
        inner: Arc<MemoryStore>,
        brackets: BrokenLookup,
    }

    struct BrokenLookup {
        inner: Arc<MemoryStore>,
        leg: String,
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl BracketRepository for BrokenLookup {
        async fn insert(&self, bracket: &Bracket) -> Result<(), StoreError> {
            self.inner.brackets().insert(bracket).await
        }

        async fn find_by_id(&self, group_id: BracketId) -> Result<Option<Bracket>, StoreError> {
            self.inner.brackets().find_by_id(group_id).await
        }

        async fn find_by_leg(&self, client_id: &str) -> Result<Option<Bracket>, StoreError> {
            if client_id == self.leg
                && self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) > 0
            {
                return Err(StoreError::Database("connection reset".into()));
            }
            self.inner.brackets().find_by_leg(client_id).await
        }

        async fn find_active(&self) -> Result<Vec<Bracket>, StoreError> {
            self.inner.brackets().find_active().await
        }

        async fn mark_unwinding(&self, group_id: BracketId) -> Result<bool, StoreError> {
            self.inner.brackets().mark_unwinding(group_id).await
        }

        async fn mark_needs_review(&self, group_id: BracketId) -> Result<bool, StoreError> {
            self.inner.brackets().mark_needs_review(group_id).await
        }

        async fn close_if_active(&self, group_id: BracketId) -> Result<bool, StoreError> {
            self.inner.brackets().close_if_active(group_id).await
        }
    }

    impl Store for BrokenLookupStore {
        fn orders(&self) -> &dyn OrderRepository {
            self.inner.orders()
        }

        fn brackets(&self) -> &dyn BracketRepository {
            &self.brackets
        }

        fn audit(&self) -> &dyn AuditRepository {
            self.inner.audit()
        }
    }

    #[tokio::test]
    async fn test_bracket_lookup_failure_does_not_block_other_brackets() {
        let memory = Arc::new(MemoryStore::new());
        let gateway = Arc::new(StubGateway::new());
        for tag in ["a", "b"] {
            let mut entry =
                Order::new(format!("e-{tag}"), symbol(), OrderKind::Entry, OrderClass::Standard).unwrap();
            entry.status = OrderStatus::Filled;
            let tp = Order::new(format!("tp-{tag}"), symbol(), OrderKind::TakeProfit, OrderClass::Conditional)
                .unwrap();
            let sl = Order::new(format!("sl-{tag}"), symbol(), OrderKind::StopLoss, OrderClass::Conditional)
                .unwrap();
            register_bracket(memory.as_ref(), &entry, &tp, &sl).await.unwrap();
            gateway.set_state(&format!("tp-{tag}"), "FINISHED", dec!(1));
            gateway.set_state(&format!("sl-{tag}"), "NEW", dec!(0));
        }

        let store = Arc::new(BrokenLookupStore {
            inner: memory.clone(),
            brackets: BrokenLookup {
                inner: memory.clone(),
                leg: "tp-a".to_string(),
                calls: Default::default(),
            },
        });
        let config = config();
        let facade = OrderFacade::new(
            gateway.clone(),
            FacadeConfig { query_timeout: config.query_timeout, cancel_timeout: config.cancel_timeout },
        );
        let reconciler = ReconciliationLoop::new(store, facade, config);

        let report = completed(reconciler.tick().await.unwrap());

        assert_eq!(report.brackets_closed, 2);
        assert_eq!(gateway.cancel_calls("sl-a"), 1);
        assert_eq!(gateway.cancel_calls("sl-b"), 1);
        assert!(memory.brackets().find_active().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_overlapping_tick_is_skipped() {
        let (_store, _gateway, reconciler) = setup(config());
        let guard = reconciler.pass_guard.lock().await;

        assert_eq!(reconciler.tick().await.unwrap(), PassOutcome::Skipped);
        drop(guard);

        assert!(matches!(reconciler.tick().await.unwrap(), PassOutcome::Completed(_)));
        let stats = reconciler.stats().await;
        assert_eq!(stats.passes_skipped, 1);
        assert_eq!(stats.passes_completed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let (_store, _gateway, reconciler) = setup(config());
        let reconciler = Arc::new(reconciler);
        let token = CancellationToken::new();

        let handle = tokio::spawn(reconciler.clone().run(token.clone()));
        tokio::time::sleep(Duration::from_millis(350)).await;
        token.cancel();
        handle.await.unwrap();

        assert!(reconciler.stats().await.passes_completed >= 3);
    }
}
