use thiserror::Error;

/// Errors surfaced by a [`crate::BrokerTransport`] implementation.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("session is not Ready")]
    NotReady,
    #[error("connect failed: {0}")]
    ConnectionFailed(String),
    #[error("order submission rejected: {0}")]
    SubmitFailed(String),
    #[error("operation not supported by this transport")]
    Unsupported,
    #[error("event channel closed")]
    ChannelClosed,
}
