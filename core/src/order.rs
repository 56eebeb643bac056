//! Order intent/event types flowing between the strategy engine, the
//! execution engine, and the session manager.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Offset {
    Open,
    Close,
    CloseToday,
    CloseYesterday,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum OrderType {
    Market,
    Limit,
}

/// Caller-supplied instruction to place an order. `client_order_id` is
/// generated as `{strategy_id}_{unix_ms}_{seq}` when left empty.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OrderIntent {
    pub account_id: String,
    pub client_order_id: String,
    pub strategy_id: String,
    pub instrument_id: String,
    pub side: Side,
    pub offset: Offset,
    pub order_type: OrderType,
    pub volume: u32,
    pub price: f64,
    pub trace_id: String,
    pub ts_ns: i64,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum OrderStatus {
    New,
    Accepted,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
}

impl OrderStatus {
    /// Terminal statuses release the order-meta index entry.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Filled | Self::Canceled | Self::Rejected)
    }

    /// Position of this status in the monotonic
    /// `New -> Accepted -> PartiallyFilled* -> terminal` sequence, used to
    /// reject out-of-order transitions. `PartiallyFilled` and the terminal
    /// states share rank 2 since any terminal state may follow any number of
    /// partial fills (or none at all).
    fn rank(self) -> u8 {
        match self {
            Self::New => 0,
            Self::Accepted => 1,
            Self::PartiallyFilled => 2,
            Self::Filled | Self::Canceled | Self::Rejected => 2,
        }
    }

    /// Whether `self` may legally follow `prior` in the status-transition
    /// state machine.
    pub fn may_follow(self, prior: Self) -> bool {
        if prior.is_terminal() {
            return false;
        }
        self.rank() >= prior.rank()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum EventSource {
    OnRtnOrder,
    OnRtnTrade,
    OnRspQryOrder,
    OnRspQryTrade,
}

/// An observed change for a previously-placed order, delivered by the
/// session manager through the dispatcher.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OrderEvent {
    pub account_id: String,
    pub client_order_id: String,
    pub exchange_order_id: String,
    pub order_ref: String,
    pub front_id: i32,
    pub session_id: i32,
    pub instrument_id: String,
    pub status: OrderStatus,
    pub total_volume: u32,
    pub filled_volume: u32,
    pub avg_fill_price: f64,
    pub reason: String,
    pub event_source: EventSource,
    pub ts_ns: i64,
    pub exchange_ts_ns: i64,
    pub recv_ts_ns: i64,
    pub trace_id: String,
    /// Empty unless this event represents a fill.
    pub trade_id: String,
    /// The strategy that owns this order, if known. Empty means broadcast
    /// to every registered strategy (see the strategy engine's dispatch
    /// rules).
    pub strategy_id: String,
}

/// Bidirectional `clientOrderId <-> orderRef` map plus `orderRef ->
/// (instrumentId, frontId, sessionId)`, pruned on terminal status.
#[derive(Debug, Default)]
pub struct OrderMetaIndex {
    client_to_ref: HashMap<String, String>,
    ref_to_client: HashMap<String, String>,
    ref_meta: HashMap<String, OrderRefMeta>,
    last_status: HashMap<String, OrderStatus>,
    last_filled_volume: HashMap<String, u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRefMeta {
    pub instrument_id: String,
    pub front_id: i32,
    pub session_id: i32,
}

impl OrderMetaIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a new non-terminal placement. Returns `false` if the
    /// client-order-id is already mapped to a different order-ref.
    pub fn insert(&mut self, client_order_id: &str, order_ref: &str, meta: OrderRefMeta) -> bool {
        if let Some(existing) = self.client_to_ref.get(client_order_id)
            && existing != order_ref
        {
            return false;
        }
        self.client_to_ref
            .insert(client_order_id.to_string(), order_ref.to_string());
        self.ref_to_client
            .insert(order_ref.to_string(), client_order_id.to_string());
        self.ref_meta.insert(order_ref.to_string(), meta);
        true
    }

    pub fn order_ref_for(&self, client_order_id: &str) -> Option<&str> {
        self.client_to_ref.get(client_order_id).map(String::as_str)
    }

    pub fn client_order_id_for(&self, order_ref: &str) -> Option<&str> {
        self.ref_to_client.get(order_ref).map(String::as_str)
    }

    pub fn meta_for(&self, order_ref: &str) -> Option<&OrderRefMeta> {
        self.ref_meta.get(order_ref)
    }

    /// Validates and records the monotonic status transition and the
    /// fill-volume invariant (`filled_volume` must never decrease across
    /// events for the same order, nor exceed `total_volume`). Returns
    /// `false` (and does not mutate any state) if either check fails; the
    /// caller is still expected to append the raw event to the ledger.
    pub fn apply_status(
        &mut self,
        client_order_id: &str,
        status: OrderStatus,
        filled_volume: u32,
        total_volume: u32,
    ) -> bool {
        let status_ok = match self.last_status.get(client_order_id) {
            Some(&prior) => status.may_follow(prior),
            None => matches!(status, OrderStatus::New | OrderStatus::Accepted),
        };
        if !status_ok {
            return false;
        }
        if filled_volume > total_volume {
            return false;
        }
        if let Some(&prior_filled) = self.last_filled_volume.get(client_order_id)
            && filled_volume < prior_filled
        {
            return false;
        }
        self.last_status.insert(client_order_id.to_string(), status);
        self.last_filled_volume
            .insert(client_order_id.to_string(), filled_volume);
        if status.is_terminal() {
            self.purge(client_order_id);
        }
        true
    }

    /// Removes both directions of the mapping for a terminal order.
    pub fn purge(&mut self, client_order_id: &str) {
        if let Some(order_ref) = self.client_to_ref.remove(client_order_id) {
            self.ref_to_client.remove(&order_ref);
            self.ref_meta.remove(&order_ref);
        }
        self.last_status.remove(client_order_id);
        self.last_filled_volume.remove(client_order_id);
    }

    pub fn is_terminal(&self, client_order_id: &str) -> bool {
        self.last_status
            .get(client_order_id)
            .is_some_and(|s| s.is_terminal())
    }

    /// Every live key has a matching reverse entry: used by property tests.
    #[cfg(test)]
    pub(crate) fn is_consistent(&self) -> bool {
        self.client_to_ref.iter().all(|(client_id, order_ref)| {
            self.ref_to_client.get(order_ref).map(String::as_str) == Some(client_id.as_str())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> OrderRefMeta {
        OrderRefMeta {
            instrument_id: "SHFE.ag2406".into(),
            front_id: 1,
            session_id: 1,
        }
    }

    #[test]
    fn terminal_status_purges_both_directions() {
        let mut idx = OrderMetaIndex::new();
        assert!(idx.insert("c1", "r1", meta()));
        assert!(idx.apply_status("c1", OrderStatus::New, 0, 10));
        assert!(idx.apply_status("c1", OrderStatus::Accepted, 0, 10));
        assert!(idx.apply_status("c1", OrderStatus::Filled, 10, 10));
        assert!(idx.order_ref_for("c1").is_none());
        assert!(idx.client_order_id_for("r1").is_none());
        assert!(idx.is_consistent());
    }

    #[test]
    fn out_of_order_transition_rejected() {
        let mut idx = OrderMetaIndex::new();
        idx.insert("c1", "r1", meta());
        assert!(idx.apply_status("c1", OrderStatus::Accepted, 0, 10));
        assert!(idx.apply_status("c1", OrderStatus::Filled, 10, 10));
        // a stray Accepted arriving after the terminal Filled is rejected
        assert!(!idx.apply_status("c1", OrderStatus::Accepted, 10, 10));
    }

    #[test]
    fn status_rank_allows_repeated_partial_fills() {
        assert!(OrderStatus::PartiallyFilled.may_follow(OrderStatus::PartiallyFilled));
        assert!(OrderStatus::Filled.may_follow(OrderStatus::PartiallyFilled));
        assert!(!OrderStatus::Accepted.may_follow(OrderStatus::PartiallyFilled));
    }

    #[test]
    fn filled_volume_may_not_decrease() {
        let mut idx = OrderMetaIndex::new();
        idx.insert("c1", "r1", meta());
        assert!(idx.apply_status("c1", OrderStatus::PartiallyFilled, 5, 10));
        // a stale event reporting less fill than already recorded is rejected
        assert!(!idx.apply_status("c1", OrderStatus::PartiallyFilled, 3, 10));
    }

    #[test]
    fn filled_volume_may_not_exceed_total() {
        let mut idx = OrderMetaIndex::new();
        idx.insert("c1", "r1", meta());
        assert!(!idx.apply_status("c1", OrderStatus::PartiallyFilled, 11, 10));
    }
}
