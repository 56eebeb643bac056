//! Bounded single-consumer event queue, timer ticks, and dispatch for every
//! running [`Strategy`].

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};

use crate::error::{StartError, StrategyError};
use crate::strategy::Strategy;
use crate::types::{SignalIntent, StrategyEvent};

type Factory = Box<dyn Fn() -> Result<Box<dyn Strategy>, StrategyError> + Send + Sync>;

struct StrategySlot {
    strategy: Box<dyn Strategy>,
    last_tick: Instant,
}

/// Drives every registered [`Strategy`] off one bounded, single-consumer
/// queue of [`StrategyEvent`]s. Construction is via [`Self::spawn`], which
/// starts the worker loop as a background task.
///
/// The queue drops the *oldest* pending event (not the incoming one) when
/// full, on the premise that a live strategy cares about the freshest state
/// more than a backlog it can never fully catch up on.
pub struct StrategyEngine {
    factories: Mutex<HashMap<String, Factory>>,
    strategies: Mutex<HashMap<String, StrategySlot>>,
    queue: Mutex<VecDeque<StrategyEvent>>,
    queue_capacity: usize,
    notify: Notify,
    stop: AtomicBool,
    intents: mpsc::UnboundedSender<SignalIntent>,
    dropped_events: AtomicU64,
    unmatched_order_events: AtomicU64,
    broadcast_order_events: AtomicU64,
    strategy_callback_exceptions: AtomicU64,
}

impl StrategyEngine {
    /// Starts the worker loop and returns the handle. `intents` receives
    /// every [`SignalIntent`] emitted by any strategy callback, in dispatch
    /// order.
    pub fn spawn(
        queue_capacity: usize,
        intents: mpsc::UnboundedSender<SignalIntent>,
    ) -> Arc<Self> {
        let engine = Arc::new(Self {
            factories: Mutex::new(HashMap::new()),
            strategies: Mutex::new(HashMap::new()),
            queue: Mutex::new(VecDeque::with_capacity(queue_capacity)),
            queue_capacity,
            notify: Notify::new(),
            stop: AtomicBool::new(false),
            intents,
            dropped_events: AtomicU64::new(0),
            unmatched_order_events: AtomicU64::new(0),
            broadcast_order_events: AtomicU64::new(0),
            strategy_callback_exceptions: AtomicU64::new(0),
        });

        let worker = engine.clone();
        tokio::spawn(async move {
            worker.run().await;
        });

        engine
    }

    /// Registers a factory under `name`; [`Self::start`] looks factories up
    /// by this name and an order event addresses a running strategy by the
    /// same name via `OrderEvent::strategy_id`.
    pub fn register(
        &self,
        name: impl Into<String>,
        factory: impl Fn() -> Result<Box<dyn Strategy>, StrategyError> + Send + Sync + 'static,
    ) {
        self.factories.lock().insert(name.into(), Box::new(factory));
    }

    /// Constructs and starts every strategy named in `names`. Atomic: if any
    /// single construction fails, none of the strategies requested in this
    /// call are started (the ones already constructed before the failure
    /// are simply dropped, never having been inserted into the running
    /// set).
    pub fn start(&self, names: &[String]) -> Result<(), StartError> {
        let factories = self.factories.lock();
        let mut constructed = Vec::with_capacity(names.len());
        for name in names {
            let factory = factories
                .get(name)
                .ok_or_else(|| StartError::UnknownFactory(name.clone()))?;
            match factory() {
                Ok(strategy) => constructed.push((name.clone(), strategy)),
                Err(err) => {
                    return Err(StartError::ConstructFailed {
                        name: name.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }
        drop(factories);

        let now = Instant::now();
        let mut running = self.strategies.lock();
        for (name, strategy) in constructed {
            running.insert(name, StrategySlot { strategy, last_tick: now });
        }
        Ok(())
    }

    pub fn stop_strategy(&self, name: &str) -> bool {
        self.strategies.lock().remove(name).is_some()
    }

    /// Enqueues an event, dropping the oldest queued event if the queue is
    /// already at capacity.
    pub fn post(&self, event: StrategyEvent) {
        let mut queue = self.queue.lock();
        if queue.len() >= self.queue_capacity {
            queue.pop_front();
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
        queue.push_back(event);
        drop(queue);
        self.notify.notify_one();
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    pub fn unmatched_order_events(&self) -> u64 {
        self.unmatched_order_events.load(Ordering::Relaxed)
    }

    pub fn broadcast_order_events(&self) -> u64 {
        self.broadcast_order_events.load(Ordering::Relaxed)
    }

    pub fn strategy_callback_exceptions(&self) -> u64 {
        self.strategy_callback_exceptions.load(Ordering::Relaxed)
    }

    async fn run(self: Arc<Self>) {
        loop {
            if self.stop.load(Ordering::SeqCst) {
                return;
            }

            let wait_for = self.next_timer_wait();
            match wait_for {
                Some(duration) => {
                    tokio::select! {
                        _ = self.notify.notified() => {}
                        _ = tokio::time::sleep(duration) => {
                            self.fire_due_timers();
                        }
                    }
                }
                None => self.notify.notified().await,
            }

            if self.stop.load(Ordering::SeqCst) {
                return;
            }

            while let Some(event) = self.pop_event() {
                self.dispatch(event);
            }
        }
    }

    fn pop_event(&self) -> Option<StrategyEvent> {
        self.queue.lock().pop_front()
    }

    /// Shortest remaining wait across every strategy with a timer interval
    /// configured, or `None` if no running strategy wants timer ticks.
    fn next_timer_wait(&self) -> Option<Duration> {
        let strategies = self.strategies.lock();
        let now = Instant::now();
        strategies
            .values()
            .filter_map(|slot| {
                let interval_ns = slot.strategy.timer_interval_ns()?;
                let interval = Duration::from_nanos(interval_ns.max(0) as u64);
                let elapsed = now.saturating_duration_since(slot.last_tick);
                Some(interval.saturating_sub(elapsed))
            })
            .min()
    }

    fn fire_due_timers(&self) {
        let now = Instant::now();
        let now_ns = current_ns();
        let mut strategies = self.strategies.lock();
        for (name, slot) in strategies.iter_mut() {
            let Some(interval_ns) = slot.strategy.timer_interval_ns() else {
                continue;
            };
            let interval = Duration::from_nanos(interval_ns.max(0) as u64);
            if now.saturating_duration_since(slot.last_tick) < interval {
                continue;
            }
            slot.last_tick = now;
            let mut out = Vec::new();
            if let Err(err) = slot.strategy.on_timer(now_ns, &mut out) {
                self.record_callback_failure(name, "on_timer", &err);
            }
            self.forward_intents(out);
        }
    }

    fn dispatch(&self, event: StrategyEvent) {
        match event {
            StrategyEvent::State(snapshot) => {
                let mut strategies = self.strategies.lock();
                for (name, slot) in strategies.iter_mut() {
                    let mut out = Vec::new();
                    if let Err(err) = slot.strategy.on_state(&snapshot, &mut out) {
                        self.record_callback_failure(name, "on_state", &err);
                    }
                    self.forward_intents(out);
                }
            }
            StrategyEvent::Account(snapshot) => {
                let mut strategies = self.strategies.lock();
                for (name, slot) in strategies.iter_mut() {
                    let mut out = Vec::new();
                    if let Err(err) = slot.strategy.on_account(&snapshot, &mut out) {
                        self.record_callback_failure(name, "on_account", &err);
                    }
                    self.forward_intents(out);
                }
            }
            StrategyEvent::Order(order_event) => {
                if order_event.strategy_id.is_empty() {
                    self.broadcast_order_events.fetch_add(1, Ordering::Relaxed);
                    let mut strategies = self.strategies.lock();
                    for (name, slot) in strategies.iter_mut() {
                        let mut out = Vec::new();
                        if let Err(err) = slot.strategy.on_order_event(&order_event, &mut out) {
                            self.record_callback_failure(name, "on_order_event", &err);
                        }
                        self.forward_intents(out);
                    }
                    return;
                }

                let mut strategies = self.strategies.lock();
                match strategies.get_mut(&order_event.strategy_id) {
                    Some(slot) => {
                        let mut out = Vec::new();
                        if let Err(err) = slot.strategy.on_order_event(&order_event, &mut out) {
                            self.record_callback_failure(&order_event.strategy_id, "on_order_event", &err);
                        }
                        self.forward_intents(out);
                    }
                    None => {
                        self.unmatched_order_events.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }
    }

    fn record_callback_failure(&self, strategy_name: &str, callback: &str, err: &StrategyError) {
        self.strategy_callback_exceptions.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(strategy = strategy_name, callback, %err, "strategy callback returned an error");
    }

    fn forward_intents(&self, intents: Vec<SignalIntent>) {
        for intent in intents {
            let _ = self.intents.send(intent);
        }
    }
}

fn current_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use hft_core::market::MarketSnapshot;
    use hft_core::order::{EventSource, OrderEvent, OrderStatus};
    use std::sync::atomic::AtomicUsize;

    fn order_event(strategy_id: &str) -> OrderEvent {
        OrderEvent {
            account_id: "acct1".into(),
            client_order_id: "co1".into(),
            exchange_order_id: String::new(),
            order_ref: "OR1".into(),
            front_id: 1,
            session_id: 1,
            instrument_id: "SHFE.ag2406".into(),
            status: OrderStatus::Accepted,
            total_volume: 1,
            filled_volume: 0,
            avg_fill_price: 0.0,
            reason: String::new(),
            event_source: EventSource::OnRtnOrder,
            ts_ns: 1,
            exchange_ts_ns: 1,
            recv_ts_ns: 1,
            trace_id: "t1".into(),
            trade_id: String::new(),
            strategy_id: strategy_id.to_string(),
        }
    }

    struct CountingStrategy {
        name: String,
        hits: Arc<AtomicUsize>,
    }

    impl Strategy for CountingStrategy {
        fn name(&self) -> &str {
            &self.name
        }

        fn on_state(&mut self, _snapshot: &MarketSnapshot, _out: &mut Vec<SignalIntent>) -> Result<(), StrategyError> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn on_order_event(&mut self, _event: &OrderEvent, _out: &mut Vec<SignalIntent>) -> Result<(), StrategyError> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingStrategy;

    impl Strategy for FailingStrategy {
        fn name(&self) -> &str {
            "failing"
        }

        fn on_state(&mut self, _snapshot: &MarketSnapshot, _out: &mut Vec<SignalIntent>) -> Result<(), StrategyError> {
            Err(StrategyError::new("boom"))
        }
    }

    fn snapshot() -> MarketSnapshot {
        MarketSnapshot {
            instrument_id: "SHFE.ag2406".into(),
            exchange_id: "SHFE".into(),
            trading_day: "20260726".into(),
            action_day: "20260726".into(),
            update_time: "09:00:00".into(),
            update_ms: 0,
            bid_price_1: 5000.0,
            bid_volume_1: 1,
            ask_price_1: 5001.0,
            ask_volume_1: 1,
            last_price: 5000.5,
            volume: 1,
            settlement_price: None,
            average_price_raw: 0.0,
            average_price_normalised: 0.0,
            valid: true,
            exchange_ts_ns: 0,
            recv_ts_ns: 0,
        }
    }

    #[tokio::test]
    async fn broadcasts_state_to_every_running_strategy() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let engine = StrategyEngine::spawn(16, tx);
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = hits.clone();
        engine.register("s1", move || {
            Ok(Box::new(CountingStrategy { name: "s1".into(), hits: hits2.clone() }) as Box<dyn Strategy>)
        });
        engine.start(&["s1".to_string()]).unwrap();

        engine.post(StrategyEvent::State(snapshot()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn order_event_without_strategy_id_broadcasts_and_counts() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let engine = StrategyEngine::spawn(16, tx);
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = hits.clone();
        engine.register("s1", move || {
            Ok(Box::new(CountingStrategy { name: "s1".into(), hits: hits2.clone() }) as Box<dyn Strategy>)
        });
        engine.start(&["s1".to_string()]).unwrap();

        engine.post(StrategyEvent::Order(order_event("")));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(engine.broadcast_order_events(), 1);
    }

    #[tokio::test]
    async fn order_event_with_unknown_strategy_id_is_counted_unmatched() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let engine = StrategyEngine::spawn(16, tx);

        engine.post(StrategyEvent::Order(order_event("does-not-exist")));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(engine.unmatched_order_events(), 1);
    }

    #[tokio::test]
    async fn failing_callback_is_counted_and_does_not_stop_the_engine() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let engine = StrategyEngine::spawn(16, tx);
        engine.register("failing", || Ok(Box::new(FailingStrategy) as Box<dyn Strategy>));
        engine.start(&["failing".to_string()]).unwrap();

        engine.post(StrategyEvent::State(snapshot()));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(engine.strategy_callback_exceptions(), 1);
    }

    #[tokio::test]
    async fn start_is_atomic_on_construction_failure() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let engine = StrategyEngine::spawn(16, tx);
        engine.register("ok", || Ok(Box::new(FailingStrategy) as Box<dyn Strategy>));
        engine.register("bad", || {
            Err(StrategyError::new("cannot construct")) as Result<Box<dyn Strategy>, StrategyError>
        });

        let err = engine
            .start(&["ok".to_string(), "bad".to_string()])
            .unwrap_err();
        assert!(matches!(err, StartError::ConstructFailed { .. }));
        assert!(!engine.stop_strategy("ok"));
    }

    #[tokio::test]
    async fn full_queue_drops_oldest_event() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let engine = StrategyEngine::spawn(2, tx);
        engine.post(StrategyEvent::State(snapshot()));
        engine.post(StrategyEvent::State(snapshot()));
        engine.post(StrategyEvent::State(snapshot()));
        assert_eq!(engine.dropped_events(), 1);
    }
}
