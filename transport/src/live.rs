//! Typed placeholder for a real futures-brokerage gateway transport.
//!
//! No such gateway crate is part of this workspace's dependency stack, so
//! every operation returns [`BrokerError::Unsupported`] rather than
//! silently falling back to the simulator. Swapping in a real
//! implementation means replacing this file with one that speaks the
//! actual wire protocol behind the same [`BrokerTransport`] trait; nothing
//! above the transport boundary changes.

use async_trait::async_trait;
use hft_core::{
    order::{OrderIntent, OrderRefMeta},
    session::SessionConfig,
};
use tokio::sync::mpsc;

use crate::error::BrokerError;
use crate::transport::{BrokerTransport, QueryKind, TransportEvent};

#[derive(Debug, Default)]
pub struct LiveTransport;

#[async_trait]
impl BrokerTransport for LiveTransport {
    async fn connect(
        &self,
        _config: &SessionConfig,
        _events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<(), BrokerError> {
        Err(BrokerError::Unsupported)
    }

    async fn disconnect(&self) -> Result<(), BrokerError> {
        Err(BrokerError::Unsupported)
    }

    async fn subscribe(&self, _instrument_ids: &[String]) -> Result<(), BrokerError> {
        Err(BrokerError::Unsupported)
    }

    async fn unsubscribe(&self, _instrument_ids: &[String]) -> Result<(), BrokerError> {
        Err(BrokerError::Unsupported)
    }

    async fn place_order(&self, _order_ref: &str, _intent: &OrderIntent) -> Result<(), BrokerError> {
        Err(BrokerError::Unsupported)
    }

    async fn cancel_order(
        &self,
        _order_ref: &str,
        _meta: &OrderRefMeta,
        _trace_id: &str,
    ) -> Result<(), BrokerError> {
        Err(BrokerError::Unsupported)
    }

    async fn query(&self, _request_id: i64, _kind: QueryKind) -> Result<(), BrokerError> {
        Err(BrokerError::Unsupported)
    }
}
