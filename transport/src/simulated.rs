use std::time::Duration;

use async_trait::async_trait;
use hft_core::{
    order::{OrderEvent, OrderIntent, OrderRefMeta, OrderStatus},
    session::{MarketSessionState, SessionConfig, TraderSessionState},
};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::BrokerError;
use crate::transport::{BrokerTransport, QueryKind, TransportEvent};

/// In-process transport used in tests, demos, and whenever no live endpoint
/// is configured. Accepts every call, synthesizes the session-state
/// callback sequence a real broker would emit, and turns every
/// `place_order`/`cancel_order` into an immediate synthetic `OrderEvent`
/// (trace-id and timestamps preserved). Promotion all the way to `Ready`
/// is the session manager's call,
/// not this transport's -- it only emits the raw login sequence.
#[derive(Default)]
pub struct SimulatedTransport {
    events: Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>,
}

impl SimulatedTransport {
    fn sender(&self) -> Result<mpsc::UnboundedSender<TransportEvent>, BrokerError> {
        self.events.lock().clone().ok_or(BrokerError::NotReady)
    }
}

#[async_trait]
impl BrokerTransport for SimulatedTransport {
    async fn connect(
        &self,
        config: &SessionConfig,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<(), BrokerError> {
        *self.events.lock() = Some(events.clone());
        let enable_terminal_auth = config.enable_terminal_auth;

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let _ = events.send(TransportEvent::MarketState(MarketSessionState::Connected));
            let _ = events.send(TransportEvent::TraderState(TraderSessionState::Connected));

            tokio::time::sleep(Duration::from_millis(5)).await;
            if enable_terminal_auth {
                let _ = events.send(TransportEvent::TraderState(
                    TraderSessionState::Authenticated,
                ));
            }

            tokio::time::sleep(Duration::from_millis(5)).await;
            let _ = events.send(TransportEvent::MarketState(MarketSessionState::LoggedIn));
            let _ = events.send(TransportEvent::TraderState(TraderSessionState::LoggedIn));
        });
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), BrokerError> {
        if let Some(tx) = self.events.lock().take() {
            let _ = tx.send(TransportEvent::TraderState(TraderSessionState::Disconnected));
            let _ = tx.send(TransportEvent::MarketState(MarketSessionState::Disconnected));
        }
        Ok(())
    }

    async fn subscribe(&self, _instrument_ids: &[String]) -> Result<(), BrokerError> {
        self.sender()?;
        Ok(())
    }

    async fn unsubscribe(&self, _instrument_ids: &[String]) -> Result<(), BrokerError> {
        self.sender()?;
        Ok(())
    }

    async fn place_order(&self, order_ref: &str, intent: &OrderIntent) -> Result<(), BrokerError> {
        let tx = self.sender()?;
        let event = OrderEvent {
            account_id: intent.account_id.clone(),
            client_order_id: intent.client_order_id.clone(),
            exchange_order_id: format!("SIM-{order_ref}"),
            order_ref: order_ref.to_string(),
            front_id: 1,
            session_id: 1,
            instrument_id: intent.instrument_id.clone(),
            status: OrderStatus::Accepted,
            total_volume: intent.volume,
            filled_volume: 0,
            avg_fill_price: 0.0,
            reason: String::new(),
            event_source: hft_core::order::EventSource::OnRtnOrder,
            ts_ns: intent.ts_ns,
            exchange_ts_ns: intent.ts_ns,
            recv_ts_ns: intent.ts_ns,
            trace_id: intent.trace_id.clone(),
            trade_id: String::new(),
            strategy_id: intent.strategy_id.clone(),
        };
        tx.send(TransportEvent::Order(event))
            .map_err(|_| BrokerError::ChannelClosed)
    }

    async fn cancel_order(
        &self,
        order_ref: &str,
        meta: &OrderRefMeta,
        trace_id: &str,
    ) -> Result<(), BrokerError> {
        let tx = self.sender()?;
        let event = OrderEvent {
            account_id: String::new(),
            client_order_id: String::new(),
            exchange_order_id: format!("SIM-{order_ref}"),
            order_ref: order_ref.to_string(),
            front_id: meta.front_id,
            session_id: meta.session_id,
            instrument_id: meta.instrument_id.clone(),
            status: OrderStatus::Canceled,
            total_volume: 0,
            filled_volume: 0,
            avg_fill_price: 0.0,
            reason: "canceled by request".into(),
            event_source: hft_core::order::EventSource::OnRtnOrder,
            ts_ns: 0,
            exchange_ts_ns: 0,
            recv_ts_ns: 0,
            trace_id: trace_id.to_string(),
            trade_id: String::new(),
            strategy_id: String::new(),
        };
        tx.send(TransportEvent::Order(event))
            .map_err(|_| BrokerError::ChannelClosed)
    }

    async fn query(&self, _request_id: i64, _kind: QueryKind) -> Result<(), BrokerError> {
        self.sender()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent() -> OrderIntent {
        OrderIntent {
            account_id: "acct1".into(),
            client_order_id: "c1".into(),
            strategy_id: "s1".into(),
            instrument_id: "SHFE.ag2406".into(),
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
    async fn connect_then_place_order_emits_accepted() {
        let transport = SimulatedTransport::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        transport
            .connect(&SessionConfig::default(), tx)
            .await
            .unwrap();

        transport.place_order("ref1", &intent()).await.unwrap();

        // drain the login sequence plus the order event, looking for our Order
        let mut saw_order = false;
        for _ in 0..8 {
            match tokio::time::timeout(Duration::from_millis(200), rx.recv())
                .await
                .unwrap()
            {
                Some(TransportEvent::Order(ev)) => {
                    assert_eq!(ev.status, OrderStatus::Accepted);
                    assert_eq!(ev.order_ref, "ref1");
                    saw_order = true;
                    break;
                }
                Some(_) => continue,
                None => break,
            }
        }
        assert!(saw_order);
    }

    #[tokio::test]
    async fn place_order_before_connect_is_not_ready() {
        let transport = SimulatedTransport::default();
        let err = transport.place_order("ref1", &intent()).await.unwrap_err();
        assert!(matches!(err, BrokerError::NotReady));
    }
}
