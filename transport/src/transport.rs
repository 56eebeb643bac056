use async_trait::async_trait;
use hft_core::{
    market::MarketSnapshot,
    order::{OrderEvent, OrderIntent, OrderRefMeta},
    session::{MarketSessionState, SessionConfig, TraderSessionState},
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::BrokerError;

/// A broker-originated event, fanned out by the session manager to the
/// event dispatcher. A uniformly-shaped internal event the session manager
/// produces from raw broker callbacks.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    TraderState(TraderSessionState),
    MarketState(MarketSessionState),
    Order(OrderEvent),
    Market(MarketSnapshot),
}

/// Query kinds the session manager can submit through the query scheduler.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Orders,
    Trades,
    Account,
    Position,
}

/// Broker session/order/market-data surface the session manager drives.
///
/// Every method is non-blocking from the caller's perspective: results and
/// asynchronous callbacks arrive as [`TransportEvent`]s on the channel
/// handed to [`BrokerTransport::connect`]. A transport owns no retry or
/// backoff policy of its own -- that lives in the session manager's
/// reconnect worker and the execution engine's cancel-retry loop.
#[async_trait]
pub trait BrokerTransport: Send + Sync {
    /// Opens market-data and trader sessions per `config`, delivering every
    /// subsequent session-state, order, and market event on `events`.
    async fn connect(
        &self,
        config: &SessionConfig,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<(), BrokerError>;

    /// Tears down both sessions. Idempotent.
    async fn disconnect(&self) -> Result<(), BrokerError>;

    async fn subscribe(&self, instrument_ids: &[String]) -> Result<(), BrokerError>;

    async fn unsubscribe(&self, instrument_ids: &[String]) -> Result<(), BrokerError>;

    /// Submits a new order under `order_ref` (already synthesised by the
    /// caller). On success, an `OrderEvent` for this `order_ref` eventually
    /// arrives on the event channel.
    async fn place_order(&self, order_ref: &str, intent: &OrderIntent) -> Result<(), BrokerError>;

    /// Cancels a previously-placed order identified by `meta`.
    async fn cancel_order(
        &self,
        order_ref: &str,
        meta: &OrderRefMeta,
        trace_id: &str,
    ) -> Result<(), BrokerError>;

    /// Submits a query (order/trade/account/position) tagged with
    /// `request_id`; the query scheduler is responsible for QPS gating
    /// before this is ever called.
    async fn query(&self, request_id: i64, kind: QueryKind) -> Result<(), BrokerError>;
}

/// Which [`BrokerTransport`] implementation the runtime should construct.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Simulated,
    Live,
}

impl Default for TransportKind {
    fn default() -> Self {
        Self::Simulated
    }
}

/// Resolves `kind` to a concrete transport, honouring the `QH_FORCE_SIMULATED`
/// escape hatch: when set, the simulated transport wins regardless of
/// `kind`, matching the forced-mock override used for local development
/// and CI.
pub fn new_transport(kind: TransportKind) -> Box<dyn BrokerTransport> {
    let force_simulated = std::env::var("QH_FORCE_SIMULATED")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    if force_simulated {
        tracing::debug!("QH_FORCE_SIMULATED=1: using simulated transport");
        return Box::new(crate::simulated::SimulatedTransport::default());
    }

    match kind {
        TransportKind::Simulated => Box::new(crate::simulated::SimulatedTransport::default()),
        TransportKind::Live => {
            #[cfg(feature = "live-transport")]
            {
                Box::new(crate::live::LiveTransport::default())
            }
            #[cfg(not(feature = "live-transport"))]
            {
                tracing::warn!(
                    "transport kind Live requested but the `live-transport` feature is disabled; falling back to simulated"
                );
                Box::new(crate::simulated::SimulatedTransport::default())
            }
        }
    }
}

/// Diagnostic helper mirroring the concrete type name, independent of
/// `TransportKind` (useful when `QH_FORCE_SIMULATED` silently overrode it).
pub fn transport_kind_name(kind: TransportKind) -> &'static str {
    match kind {
        TransportKind::Simulated => "simulated",
        TransportKind::Live => "live",
    }
}
