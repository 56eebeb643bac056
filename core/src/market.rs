//! Normalised market-data snapshot delivered through the dispatcher at
//! `High` priority.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MarketSnapshot {
    pub instrument_id: String,
    pub exchange_id: String,
    pub trading_day: String,
    pub action_day: String,
    pub update_time: String,
    pub update_ms: i32,
    pub bid_price_1: f64,
    pub bid_volume_1: i64,
    pub ask_price_1: f64,
    pub ask_volume_1: i64,
    pub last_price: f64,
    pub volume: i64,
    pub settlement_price: Option<f64>,
    pub average_price_raw: f64,
    pub average_price_normalised: f64,
    pub valid: bool,
    pub exchange_ts_ns: i64,
    pub recv_ts_ns: i64,
}

/// Out-of-range sentinel used by the upstream feed to mean "no settlement
/// price published yet"; normalisation zeroes it rather than propagating the
/// sentinel.
const SETTLEMENT_SENTINEL_MIN: f64 = 1.0e10;

impl MarketSnapshot {
    /// Applies the normalisation rules named in the session manager's
    /// design: invalid settlement sentinels are zeroed; a missing
    /// exchange-id is derived from the instrument-id's dot-separated
    /// prefix; a missing trading-day falls back to the action-day.
    pub fn normalise(&mut self) {
        if let Some(settlement) = self.settlement_price
            && (!settlement.is_finite() || settlement.abs() >= SETTLEMENT_SENTINEL_MIN)
        {
            self.settlement_price = Some(0.0);
        }
        if self.exchange_id.is_empty()
            && let Some((prefix, _)) = self.instrument_id.split_once('.')
        {
            self.exchange_id = prefix.to_string();
        }
        if self.trading_day.is_empty() {
            self.trading_day = self.action_day.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> MarketSnapshot {
        MarketSnapshot {
            instrument_id: "SHFE.ag2406".into(),
            exchange_id: String::new(),
            trading_day: String::new(),
            action_day: "20260726".into(),
            update_time: "09:00:00".into(),
            update_ms: 500,
            bid_price_1: 4500.0,
            bid_volume_1: 10,
            ask_price_1: 4500.2,
            ask_volume_1: 8,
            last_price: 4500.1,
            volume: 1200,
            settlement_price: Some(1.0e12),
            average_price_raw: 4500.0,
            average_price_normalised: 4500.0,
            valid: true,
            exchange_ts_ns: 1,
            recv_ts_ns: 2,
        }
    }

    #[test]
    fn normalise_derives_missing_fields_and_zeroes_sentinel() {
        let mut s = snapshot();
        s.normalise();
        assert_eq!(s.exchange_id, "SHFE");
        assert_eq!(s.trading_day, "20260726");
        assert_eq!(s.settlement_price, Some(0.0));
    }
}
