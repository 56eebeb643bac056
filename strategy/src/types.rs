//! Event and intent types flowing through the strategy engine.

use hft_core::market::MarketSnapshot;
use hft_core::order::{Offset, OrderEvent, OrderIntent, Side};
use serde::{Deserialize, Serialize};

/// One account/position update delivered to every strategy. Mirrors the
/// domain store's `account_snapshots`/`position_snapshots` tables; the
/// engine itself only fans the snapshot out, it never persists it.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AccountSnapshot {
    pub account_id: String,
    pub balance: f64,
    pub available: f64,
    pub margin: f64,
    pub ts_ns: i64,
}

/// The three event kinds the strategy engine's bounded queue carries.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyEvent {
    State(MarketSnapshot),
    Order(OrderEvent),
    Account(AccountSnapshot),
}

/// One decoded `intent_i` field from a `strategy:intent:<strategyId>:latest`
/// hash entry.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SignalIntent {
    pub strategy_id: String,
    pub instrument_id: String,
    pub side: Side,
    pub offset: Offset,
    pub volume: u32,
    pub limit_price: f64,
    pub ts_ns: i64,
    pub trace_id: String,
}

impl SignalIntent {
    /// Lifts a decoded signal into a placeable [`OrderIntent`]; `client_order_id`
    /// is left empty so the session manager generates it.
    pub fn into_order_intent(self, account_id: impl Into<String>) -> OrderIntent {
        OrderIntent {
            account_id: account_id.into(),
            client_order_id: String::new(),
            strategy_id: self.strategy_id,
            instrument_id: self.instrument_id,
            side: self.side,
            offset: self.offset,
            order_type: hft_core::order::OrderType::Limit,
            volume: self.volume,
            price: self.limit_price,
            trace_id: self.trace_id,
            ts_ns: self.ts_ns,
        }
    }
}

/// One read of `strategy:intent:<strategyId>:latest`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StrategyIntentBatch {
    pub strategy_id: String,
    pub seq: u64,
    pub ts_ns: i64,
    pub intents: Vec<SignalIntent>,
}
