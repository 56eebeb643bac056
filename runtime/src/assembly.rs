//! Wires the config into live subsystem instances: session manager, flow
//! controller, breaker manager, execution engine, strategy engine, and the
//! in-memory store pair.

use std::sync::Arc;
use std::time::Duration;

use hft_core::breaker::BreakerManager;
use hft_core::dispatch::{CriticalQueue, EventDispatcher};
use hft_core::flow::FlowController;
use hft_execution::ExecutionEngine;
use hft_risk::{MaxOrderVolume, MaxOrderVolumeManager};
use hft_session::SessionManager;
use hft_store::{HashStore, LedgerStore, MemoryHashStore, MemoryLedgerStore};
use hft_strategy::StrategyEngine;
use hft_transport::{new_transport, transport_kind_name, TransportEvent};
use tokio::sync::mpsc;

use crate::config::RuntimeConfig;
use crate::error::RuntimeError;

/// One running instance of the engine: every subsystem the runtime wires
/// together, plus the channel the session manager forwards normalised
/// broker events on.
pub struct Runtime {
    pub session: Arc<SessionManager>,
    pub execution: Arc<ExecutionEngine<MaxOrderVolumeManager>>,
    pub strategy_engine: Arc<StrategyEngine>,
    pub hash_store: Arc<dyn HashStore>,
    pub ledger_store: Arc<dyn LedgerStore>,
    pub dispatcher: Arc<EventDispatcher>,
    pub critical_queue: Arc<CriticalQueue>,
    /// The one CTP investor id this process logs in as; strategy-emitted
    /// [`hft_strategy::SignalIntent`]s carry no account of their own, so
    /// `serve` stamps every order placed on their behalf with this id.
    pub account_id: String,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
    pub intents: mpsc::UnboundedReceiver<hft_strategy::SignalIntent>,
}

impl Runtime {
    /// Builds every subsystem from `config` and blocks until the session
    /// reaches `Ready` (or `connect_timeout_ms` elapses). Does not itself
    /// check store health -- callers that need the `5`/`6` exit codes call
    /// [`Self::check_storage_health`] once assembly succeeds.
    pub async fn bootstrap(config: &RuntimeConfig) -> Result<Self, RuntimeError> {
        let (outbound_tx, events) = mpsc::unbounded_channel();
        let transport = Arc::from(new_transport(config.session.transport.into()));
        tracing::info!(
            transport = transport_kind_name(config.session.transport.into()),
            "selected broker transport"
        );

        let ledger_store: Arc<dyn LedgerStore> = Arc::new(MemoryLedgerStore::new());

        let session_config = config.session.to_session_config();
        let query_qps = flow_query_rate(config);
        let session = SessionManager::spawn(transport, query_qps, outbound_tx, Some(ledger_store.clone()));
        if !session.connect(session_config).await {
            return Err(RuntimeError::SessionConnect(session.last_connect_diagnostic()));
        }

        let flow = Arc::new(FlowController::new());
        for rule in &config.flow.rules {
            flow.add_rule(hft_core::flow::FlowRule {
                account_id: rule.account_id.clone(),
                kind: rule.kind.into(),
                instrument_id: rule.instrument_id.clone(),
                rate_per_second: rule.rate_per_second,
                capacity: rule.capacity,
            });
        }

        let breakers = Arc::new(BreakerManager::new(
            config.breakers.strategy.to_scope_config(),
            config.breakers.account.to_scope_config(),
            config.breakers.system.to_scope_config(),
        ));

        let hash_store: Arc<dyn HashStore> = Arc::new(MemoryHashStore::new());

        let risk = MaxOrderVolumeManager::new(MaxOrderVolume::new(config.execution.max_order_volume));
        let execution = Arc::new(ExecutionEngine::new(
            session.clone(),
            breakers,
            flow,
            risk,
            (),
            config.execution.to_execution_config(),
        ));

        let (intent_tx, intents) = mpsc::unbounded_channel();
        let strategy_engine = StrategyEngine::spawn(config.strategy.queue_capacity, intent_tx);

        let dispatcher = EventDispatcher::new(config.dispatcher.worker_threads);
        let critical_queue = CriticalQueue::new(
            config.dispatcher.critical_queue_size,
            Duration::from_millis(config.dispatcher.critical_wait_ms),
            Duration::from_millis(config.dispatcher.critical_delay_alert_ms),
        );

        Ok(Self {
            session,
            execution,
            strategy_engine,
            hash_store,
            ledger_store,
            dispatcher,
            critical_queue,
            account_id: config.session.investor_id.clone(),
            events,
            intents,
        })
    }

    /// Returns `Ok(())` if both stores respond healthy, otherwise the
    /// matching `RuntimeError` (exit codes `5`/`6`).
    pub async fn check_storage_health(&self) -> Result<(), RuntimeError> {
        if self.hash_store.ping().await.is_err() {
            return Err(RuntimeError::CacheUnhealthy);
        }
        if !self.ledger_store.is_healthy().await {
            return Err(RuntimeError::LedgerUnhealthy);
        }
        Ok(())
    }
}

/// A single account-wide query rate for the session's query scheduler; the
/// flow controller's own per-operation rules are configured separately
/// above. Falls back to a conservative default when no `Query`-kind rule is
/// configured.
fn flow_query_rate(config: &RuntimeConfig) -> f64 {
    config
        .flow
        .rules
        .iter()
        .find(|rule| matches!(rule.kind, crate::config::FlowOpKind::Query))
        .map(|rule| rule.rate_per_second)
        .unwrap_or(20.0)
}
