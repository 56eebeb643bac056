use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("trader session is not Ready")]
    NotReady,
    #[error("no order-ref mapped for client-order-id {0}")]
    UnknownClientOrderId(String),
    #[error("transport error: {0}")]
    Transport(#[from] hft_transport::BrokerError),
}
