use thiserror::Error;

/// Maps onto the CLI's exit codes (`0` success is not a variant here).
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("config load failed: {0}")]
    Config(String),
    #[error("session connect failed: {0}")]
    SessionConnect(String),
    #[error("cache store unhealthy")]
    CacheUnhealthy,
    #[error("ledger store unhealthy")]
    LedgerUnhealthy,
}

impl RuntimeError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 1,
            Self::SessionConnect(_) => 2,
            Self::CacheUnhealthy => 5,
            Self::LedgerUnhealthy => 6,
        }
    }
}
