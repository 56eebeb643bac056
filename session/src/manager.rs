use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use hft_core::{
    order::{EventSource, OrderEvent, OrderIntent, OrderMetaIndex, OrderRefMeta},
    query_scheduler::{QueryExecutor, QueryPriority, QueryScheduler, QueryTask},
    session::{FrontPair, MarketSessionState, SessionConfig, TraderSessionState},
};
use hft_store::{LedgerRecord, LedgerStore};
use hft_transport::{BrokerTransport, QueryKind, TransportEvent};
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};

use crate::error::SessionError;

/// Owns the broker session lifecycle: connect/disconnect, subscription
/// replay, the order-meta index, and the reconnect worker. Generic over
/// [`BrokerTransport`] so the simulated and live transports are
/// interchangeable without this type changing.
///
/// Always constructed behind an `Arc` (`SessionManager::spawn`) because the
/// reconnect worker and the transport event pump hold a clone of it.
pub struct SessionManager {
    transport: Arc<dyn BrokerTransport>,
    query_scheduler: QueryScheduler,
    config: Mutex<Option<SessionConfig>>,
    trader_state: Mutex<TraderSessionState>,
    market_state: Mutex<MarketSessionState>,
    subscriptions: Mutex<HashSet<String>>,
    order_meta: Mutex<OrderMetaIndex>,
    /// `client_order_id -> ack-wait deadline` of its most recent cancel
    /// attempt, recorded by the execution engine via
    /// [`Self::note_cancel_ack_deadline`]. Consulted when a terminal
    /// [`OrderEvent`] arrives so a late terminal transition (one observed
    /// after the owning `cancelOrder` call already gave up waiting) can be
    /// logged instead of silently reconciled.
    cancel_ack_deadlines: Mutex<HashMap<String, Instant>>,
    order_ref_seq: AtomicU64,
    request_id_seq: AtomicI64,
    last_diagnostic: Mutex<String>,
    state_notify: Notify,
    reconnect_notify: Notify,
    reconnect_stop: AtomicBool,
    outbound: mpsc::UnboundedSender<TransportEvent>,
    /// Forensic order-event ledger. Every `OrderEvent` the transport
    /// delivers is appended here regardless of whether its status/fill
    /// transition was accepted -- the raw broker callback is the record of
    /// what happened, independent of this process's own bookkeeping.
    ledger: Option<Arc<dyn LedgerStore>>,
}

impl SessionManager {
    /// Builds the manager and starts its background query-drain loop.
    /// `outbound` receives every normalised order/market event for the
    /// dispatcher to fan out; `query_qps` bounds the query scheduler;
    /// `ledger` is optional so tests and demos can run without a store.
    pub fn spawn(
        transport: Arc<dyn BrokerTransport>,
        query_qps: f64,
        outbound: mpsc::UnboundedSender<TransportEvent>,
        ledger: Option<Arc<dyn LedgerStore>>,
    ) -> Arc<Self> {
        let manager = Arc::new(Self {
            transport,
            query_scheduler: QueryScheduler::new(query_qps),
            config: Mutex::new(None),
            trader_state: Mutex::new(TraderSessionState::Disconnected),
            market_state: Mutex::new(MarketSessionState::Disconnected),
            subscriptions: Mutex::new(HashSet::new()),
            order_meta: Mutex::new(OrderMetaIndex::new()),
            cancel_ack_deadlines: Mutex::new(HashMap::new()),
            order_ref_seq: AtomicU64::new(0),
            request_id_seq: AtomicI64::new(0),
            last_diagnostic: Mutex::new(String::new()),
            state_notify: Notify::new(),
            reconnect_notify: Notify::new(),
            reconnect_stop: AtomicBool::new(false),
            outbound,
            ledger,
        });

        let drain_handle = manager.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_millis(10));
            loop {
                interval.tick().await;
                drain_handle.query_scheduler.drain_once();
            }
        });

        let reconnect_handle = manager.clone();
        tokio::spawn(async move {
            reconnect_handle.reconnect_worker_loop().await;
        });

        manager
    }

    pub fn trader_state(&self) -> TraderSessionState {
        *self.trader_state.lock()
    }

    pub fn market_state(&self) -> MarketSessionState {
        *self.market_state.lock()
    }

    pub fn last_connect_diagnostic(&self) -> String {
        self.last_diagnostic.lock().clone()
    }

    /// Tries each of `config.fronts` in order (a single implicit attempt on
    /// the bare config when `fronts` is empty), opening the transport and
    /// blocking up to `config.connect_timeout` per candidate for both
    /// sessions to reach `LoggedIn`. The first front pair to get there wins;
    /// the rest are abandoned. On success, promotes the market session
    /// straight to `Ready` (market data needs no settlement confirm) and the
    /// trader session to `Ready` unless `settlement_confirm_required` -- in
    /// which case the caller must call [`Self::confirm_settlement`].
    pub async fn connect(self: &Arc<Self>, config: SessionConfig) -> bool {
        self.subscriptions.lock().clear();
        *self.order_meta.lock() = OrderMetaIndex::new();
        *self.trader_state.lock() = TraderSessionState::Disconnected;
        *self.market_state.lock() = MarketSessionState::Disconnected;

        let timeout = config.connect_timeout;
        let settlement_confirm_required = config.settlement_confirm_required;
        *self.config.lock() = Some(config.clone());

        let candidates: Vec<Option<FrontPair>> = if config.fronts.is_empty() {
            vec![None]
        } else {
            config.fronts.iter().cloned().map(Some).collect()
        };

        for (idx, front) in candidates.iter().enumerate() {
            let mut attempt_config = config.clone();
            if let Some(front) = front {
                attempt_config.fronts = vec![front.clone()];
            }

            let (tx, mut rx) = mpsc::unbounded_channel();
            if let Err(err) = self.transport.connect(&attempt_config, tx).await {
                *self.last_diagnostic.lock() = format!("front {idx} connect failed: {err}");
                continue;
            }

            *self.trader_state.lock() = TraderSessionState::Disconnected;
            *self.market_state.lock() = MarketSessionState::Disconnected;

            let deadline = Instant::now() + timeout;
            let mut reached = false;
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                let Ok(Some(event)) = tokio::time::timeout(remaining, rx.recv()).await else {
                    break;
                };
                self.apply_transport_event(&event);
                if self.forward_event(event).is_err() {
                    return false;
                }
                if *self.trader_state.lock() >= TraderSessionState::LoggedIn
                    && *self.market_state.lock() >= MarketSessionState::LoggedIn
                {
                    reached = true;
                    break;
                }
            }

            if !reached {
                *self.last_diagnostic.lock() =
                    format!("front {idx} timed out after {}ms waiting for LoggedIn", timeout.as_millis());
                continue;
            }

            let pump_handle = self.clone();
            tokio::spawn(async move {
                pump_handle.pump_events(rx).await;
            });

            *self.market_state.lock() = MarketSessionState::Ready;
            if !settlement_confirm_required {
                *self.trader_state.lock() = TraderSessionState::Ready;
            }

            self.replay_subscriptions().await;
            return true;
        }

        false
    }

    /// Promotes a `LoggedIn` trader session to `Ready`. No-op (returns
    /// `false`) unless the session is exactly `LoggedIn`.
    pub async fn confirm_settlement(&self) -> bool {
        let mut state = self.trader_state.lock();
        if *state == TraderSessionState::LoggedIn {
            *state = TraderSessionState::SettlementConfirmed;
            *state = TraderSessionState::Ready;
            true
        } else {
            false
        }
    }

    pub async fn disconnect(&self) {
        self.reconnect_stop.store(true, Ordering::SeqCst);
        self.reconnect_notify.notify_waiters();
        let _ = self.transport.disconnect().await;
        *self.trader_state.lock() = TraderSessionState::Disconnected;
        *self.market_state.lock() = MarketSessionState::Disconnected;
    }

    pub async fn subscribe(&self, instrument_ids: &[String]) -> bool {
        if *self.market_state.lock() != MarketSessionState::Ready {
            return false;
        }
        if self.transport.subscribe(instrument_ids).await.is_err() {
            return false;
        }
        self.subscriptions
            .lock()
            .extend(instrument_ids.iter().cloned());
        true
    }

    pub async fn unsubscribe(&self, instrument_ids: &[String]) -> bool {
        if *self.market_state.lock() != MarketSessionState::Ready {
            return false;
        }
        if self.transport.unsubscribe(instrument_ids).await.is_err() {
            return false;
        }
        let mut subs = self.subscriptions.lock();
        for id in instrument_ids {
            subs.remove(id);
        }
        true
    }

    /// Re-issues the full subscription set exactly once; called after the
    /// initial connect and after every successful reconnect.
    async fn replay_subscriptions(&self) {
        let ids: Vec<String> = self.subscriptions.lock().iter().cloned().collect();
        if ids.is_empty() {
            return;
        }
        let _ = self.transport.subscribe(&ids).await;
    }

    fn next_order_ref(&self) -> String {
        let seq = self.order_ref_seq.fetch_add(1, Ordering::SeqCst);
        format!("OR{seq:012}")
    }

    fn next_request_id(&self) -> i64 {
        self.request_id_seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Fails immediately (without consuming a flow-control token, since
    /// that gate lives upstream in the execution engine) when the trader
    /// session is not `Ready`. Returns the final `client_order_id` (filled
    /// in when the caller left it empty), not the internal order-ref.
    pub async fn place_order(&self, mut intent: OrderIntent) -> Result<String, SessionError> {
        if *self.trader_state.lock() != TraderSessionState::Ready {
            return Err(SessionError::NotReady);
        }
        if intent.client_order_id.is_empty() {
            let unix_ms = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis();
            let seq = self.order_ref_seq.load(Ordering::SeqCst);
            intent.client_order_id = format!("{}_{}_{}", intent.strategy_id, unix_ms, seq);
        }
        let order_ref = self.next_order_ref();
        self.transport.place_order(&order_ref, &intent).await?;
        self.order_meta.lock().insert(
            &intent.client_order_id,
            &order_ref,
            OrderRefMeta {
                instrument_id: intent.instrument_id.clone(),
                front_id: 1,
                session_id: 1,
            },
        );
        Ok(intent.client_order_id)
    }

    pub async fn cancel_order(
        &self,
        client_order_id: &str,
        trace_id: &str,
    ) -> Result<(), SessionError> {
        let (order_ref, meta) = {
            let index = self.order_meta.lock();
            let order_ref = index
                .order_ref_for(client_order_id)
                .ok_or_else(|| SessionError::UnknownClientOrderId(client_order_id.to_string()))?
                .to_string();
            let meta = index
                .meta_for(&order_ref)
                .cloned()
                .ok_or_else(|| SessionError::UnknownClientOrderId(client_order_id.to_string()))?;
            (order_ref, meta)
        };
        self.transport
            .cancel_order(&order_ref, &meta, trace_id)
            .await?;
        Ok(())
    }

    /// Builds and submits a query through the bounded-QPS scheduler.
    /// Returns the `request_id` assigned.
    pub fn enqueue_query(self: &Arc<Self>, priority: QueryPriority, kind: QueryKind) -> i64 {
        let request_id = self.next_request_id();
        let transport = self.transport.clone();
        let execute: QueryExecutor = Box::new(move || {
            tokio::spawn(async move {
                if let Err(err) = transport.query(request_id, kind).await {
                    tracing::warn!(request_id, ?kind, %err, "broker query failed");
                }
            });
        });
        self.query_scheduler.try_schedule(QueryTask {
            request_id,
            priority,
            execute,
            created_at: std::time::Instant::now(),
        });
        request_id
    }

    fn request_reconnect(&self) {
        if self.reconnect_stop.load(Ordering::SeqCst) {
            return;
        }
        self.reconnect_notify.notify_one();
    }

    async fn reconnect_worker_loop(self: Arc<Self>) {
        loop {
            self.reconnect_notify.notified().await;
            if self.reconnect_stop.load(Ordering::SeqCst) {
                return;
            }
            let Some(config) = self.config.lock().clone() else {
                continue;
            };
            let mut attempt = 0u32;
            let mut backoff = config.reconnect_initial_backoff;
            while attempt < config.reconnect_max_attempts {
                if self.reconnect_stop.load(Ordering::SeqCst) {
                    return;
                }
                if self.connect(config.clone()).await {
                    tracing::info!(attempt, "reconnect succeeded");
                    break;
                }
                attempt += 1;
                tokio::time::sleep(backoff).await;
                backoff = std::cmp::min(config.reconnect_max_backoff, backoff * 2);
            }
        }
    }

    /// Drains raw transport events, updates session state, normalises
    /// market snapshots, and forwards everything on `outbound`. Requests a
    /// reconnect the moment the trader session reports `Disconnected`
    /// after having been connected. Runs for the lifetime of one connected
    /// front pair -- `connect` spawns a fresh one per successful attempt.
    async fn pump_events(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<TransportEvent>) {
        while let Some(event) = rx.recv().await {
            self.apply_transport_event(&event);
            if self.forward_event(event).is_err() {
                return;
            }
        }
    }

    /// Updates trader/market session state and the order-meta index from
    /// one raw transport event. Shared by the connect-time login wait and
    /// the steady-state [`Self::pump_events`] loop so both see the same
    /// state-machine behaviour.
    fn apply_transport_event(&self, event: &TransportEvent) {
        match event {
            TransportEvent::TraderState(state) => {
                let was_ready = *self.trader_state.lock() != TraderSessionState::Disconnected;
                *self.trader_state.lock() = *state;
                if *state == TraderSessionState::Disconnected && was_ready {
                    self.request_reconnect();
                }
                self.state_notify.notify_waiters();
            }
            TransportEvent::MarketState(state) => {
                *self.market_state.lock() = *state;
                self.state_notify.notify_waiters();
            }
            TransportEvent::Order(order_event) => {
                self.apply_order_event(order_event);
            }
            TransportEvent::Market(_) => {}
        }
    }

    /// Normalises market snapshots, then forwards the event to `outbound`.
    fn forward_event(&self, event: TransportEvent) -> Result<(), mpsc::error::SendError<TransportEvent>> {
        let forwarded = match event {
            TransportEvent::Market(mut snapshot) => {
                snapshot.normalise();
                TransportEvent::Market(snapshot)
            }
            other => other,
        };
        self.outbound.send(forwarded)
    }

    /// Applies the order-meta status/fill-volume transition, then durably
    /// appends the raw event to the ledger regardless of whether the
    /// transition was accepted -- the broker callback is the forensic
    /// record even when it's out of order or violates fill-volume
    /// monotonicity.
    fn apply_order_event(&self, event: &OrderEvent) {
        if event.client_order_id.is_empty() {
            return;
        }
        let accepted = self.order_meta.lock().apply_status(
            &event.client_order_id,
            event.status,
            event.filled_volume,
            event.total_volume,
        );
        if !accepted {
            tracing::warn!(
                client_order_id = %event.client_order_id,
                status = ?event.status,
                filled_volume = event.filled_volume,
                total_volume = event.total_volume,
                "rejected order-event transition"
            );
        }
        if accepted && event.status.is_terminal() {
            self.check_late_terminal(&event.client_order_id);
        }
        if let Some(ledger) = &self.ledger {
            let ledger = ledger.clone();
            let record = order_event_ledger_record(event);
            tokio::spawn(async move {
                if let Err(err) = ledger.append(record).await {
                    tracing::warn!(%err, "failed to persist order event");
                }
            });
        }
    }

    /// `true` once the order-meta index has recorded a terminal status for
    /// `client_order_id`; a cancel call's ack-wait loop polls this.
    pub fn is_order_terminal(&self, client_order_id: &str) -> bool {
        self.order_meta.lock().is_terminal(client_order_id)
    }

    /// Records the ack-wait deadline of a `cancelOrder` attempt so a terminal
    /// event arriving after that deadline can be flagged as late.
    pub fn note_cancel_ack_deadline(&self, client_order_id: &str, deadline: Instant) {
        self.cancel_ack_deadlines
            .lock()
            .insert(client_order_id.to_string(), deadline);
    }

    /// Clears the recorded ack-wait deadline once a cancel call returns,
    /// whether or not it observed the terminal transition itself.
    pub fn clear_cancel_ack_deadline(&self, client_order_id: &str) {
        self.cancel_ack_deadlines.lock().remove(client_order_id);
    }

    fn check_late_terminal(&self, client_order_id: &str) {
        let mut deadlines = self.cancel_ack_deadlines.lock();
        if let Some(deadline) = deadlines.remove(client_order_id)
            && Instant::now() > deadline
        {
            tracing::warn!(
                client_order_id,
                "late_terminal_after_ack_timeout"
            );
        }
    }
}

/// Builds the `order_events` ledger row for `event`. The idempotency key
/// matches the documented `client_order_id|event_source|ts_ns|
/// filled_volume|trade_id` shape so a duplicate broker callback dedupes
/// instead of appending twice.
fn order_event_ledger_record(event: &OrderEvent) -> LedgerRecord {
    LedgerRecord {
        table: "order_events".into(),
        idempotency_key: format!(
            "{}|{:?}|{}|{}|{}",
            event.client_order_id, event.event_source, event.ts_ns, event.filled_volume, event.trade_id
        ),
        ts_ns: event.ts_ns,
        payload: serde_json::json!({
            "client_order_id": event.client_order_id,
            "exchange_order_id": event.exchange_order_id,
            "instrument_id": event.instrument_id,
            "status": event.status,
            "total_volume": event.total_volume,
            "filled_volume": event.filled_volume,
            "avg_fill_price": event.avg_fill_price,
            "event_source": event.event_source,
            "trade_id": event.trade_id,
            "strategy_id": event.strategy_id,
        }),
    }
}
