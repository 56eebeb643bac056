//! # Session - session & reconnect manager
//!
//! Owns the broker session lifecycle on top of a [`hft_transport::BrokerTransport`]:
//! connect/disconnect, the trader/market state machines, subscription
//! replay, the order-meta index, and a reconnect worker with exponential
//! backoff. Nothing here talks to a concrete broker SDK -- that lives
//! behind the transport trait, selected once by the outer runtime layer.

mod error;
mod manager;

pub use error::SessionError;
pub use manager::SessionManager;

pub use hft_transport::TransportEvent;

#[cfg(test)]
mod tests {
    use super::*;
    use hft_core::{order::OrderIntent, session::SessionConfig};
    use hft_transport::SimulatedTransport;
    use std::sync::Arc;
    use std::time::Duration;

    fn intent(instrument_id: &str) -> OrderIntent {
        OrderIntent {
            account_id: "acct1".into(),
            client_order_id: String::new(),
            strategy_id: "strat1".into(),
            instrument_id: instrument_id.into(),
            side: hft_core::order::Side::Buy,
            offset: hft_core::order::Offset::Open,
            order_type: hft_core::order::OrderType::Limit,
            volume: 1,
            price: 5000.0,
            trace_id: "t1".into(),
            ts_ns: 1,
        }
    }

    #[tokio::test]
    async fn connect_promotes_to_ready_without_settlement_confirm() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let manager = SessionManager::spawn(Arc::new(SimulatedTransport::default()), 10.0, tx, None);
        let mut config = SessionConfig::default();
        config.connect_timeout = Duration::from_millis(500);
        config.settlement_confirm_required = false;

        assert!(manager.connect(config).await);
        assert_eq!(
            manager.trader_state(),
            hft_core::session::TraderSessionState::Ready
        );
        assert_eq!(
            manager.market_state(),
            hft_core::session::MarketSessionState::Ready
        );
    }

    #[tokio::test]
    async fn settlement_confirm_required_blocks_until_confirmed() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let manager = SessionManager::spawn(Arc::new(SimulatedTransport::default()), 10.0, tx, None);
        let mut config = SessionConfig::default();
        config.connect_timeout = Duration::from_millis(500);
        config.settlement_confirm_required = true;

        assert!(manager.connect(config).await);
        assert_eq!(
            manager.trader_state(),
            hft_core::session::TraderSessionState::LoggedIn
        );
        assert!(manager.place_order(intent("SHFE.ag2406")).await.is_err());

        assert!(manager.confirm_settlement().await);
        assert_eq!(
            manager.trader_state(),
            hft_core::session::TraderSessionState::Ready
        );
        assert!(manager.place_order(intent("SHFE.ag2406")).await.is_ok());
    }

    #[tokio::test]
    async fn place_and_cancel_round_trip() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let manager = SessionManager::spawn(Arc::new(SimulatedTransport::default()), 10.0, tx, None);
        let mut config = SessionConfig::default();
        config.connect_timeout = Duration::from_millis(500);
        assert!(manager.connect(config).await);

        let client_order_id = manager.place_order(intent("SHFE.ag2406")).await.unwrap();
        assert!(!client_order_id.is_empty());
        assert!(manager.cancel_order(&client_order_id, "t1").await.is_ok());
    }

    #[tokio::test]
    async fn cancel_unknown_client_order_id_fails() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let manager = SessionManager::spawn(Arc::new(SimulatedTransport::default()), 10.0, tx, None);
        let mut config = SessionConfig::default();
        config.connect_timeout = Duration::from_millis(500);
        assert!(manager.connect(config).await);

        assert!(manager.cancel_order("does-not-exist", "t1").await.is_err());
    }

    #[tokio::test]
    async fn connect_tries_front_candidates_in_order() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let manager = SessionManager::spawn(Arc::new(SimulatedTransport::default()), 10.0, tx, None);
        let mut config = SessionConfig::default();
        config.connect_timeout = Duration::from_millis(500);
        config.fronts = vec![
            hft_core::session::FrontPair {
                market_front: "tcp://md1".into(),
                trader_front: "tcp://td1".into(),
            },
            hft_core::session::FrontPair {
                market_front: "tcp://md2".into(),
                trader_front: "tcp://td2".into(),
            },
        ];

        assert!(manager.connect(config).await);
        assert_eq!(
            manager.trader_state(),
            hft_core::session::TraderSessionState::Ready
        );
    }
}
