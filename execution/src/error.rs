use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("account_id must not be empty")]
    MissingAccountId,
    #[error("strategy_id must not be empty")]
    MissingStrategyId,
    #[error("client_order_id must not be empty")]
    MissingClientOrderId,
    #[error("risk check rejected the order: {0}")]
    RiskRejected(String),
    #[error("circuit breaker open for ({strategy_id}, {account_id})")]
    BreakerOpen { strategy_id: String, account_id: String },
    #[error("flow control refused: {0}")]
    FlowRefused(String),
    #[error("broker submit failed: {0}")]
    SubmitFailed(String),
    #[error("unknown client_order_id: {0}")]
    UnknownClientOrderId(String),
}
