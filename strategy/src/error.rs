use thiserror::Error;

/// Returned by a [`crate::Strategy`] callback. The engine counts and logs
/// this (`strategy_callback_exceptions`) rather than unwinding -- a failing
/// callback returns a typed `Err` instead of panicking.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct StrategyError(pub String);

impl StrategyError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

#[derive(Debug, Error)]
pub enum StartError {
    #[error("unknown strategy factory: {0}")]
    UnknownFactory(String),
    #[error("strategy {name} failed to construct: {reason}")]
    ConstructFailed { name: String, reason: String },
}

#[derive(Debug, Error)]
pub enum InboxError {
    #[error("store error: {0}")]
    Store(#[from] hft_store::StoreError),
    #[error("missing field {0} in intent_{1}")]
    MissingField(&'static str, usize),
    #[error("unknown side {0:?} in intent_{1}")]
    UnknownSide(String, usize),
    #[error("unknown offset {0:?} in intent_{1}")]
    UnknownOffset(String, usize),
    #[error("invalid volume {0:?} in intent_{1}")]
    InvalidVolume(String, usize),
    #[error("invalid price {0:?} in intent_{1}")]
    InvalidPrice(String, usize),
    #[error("invalid seq {0:?}")]
    InvalidSeq(String),
    #[error("invalid count {0:?}")]
    InvalidCount(String),
}
