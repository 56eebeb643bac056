//! # Core Error Types
//!
//! Central error type aggregating failures raised inside the engine-internal
//! subsystems (dispatcher, flow controller, breakers, query scheduler) that
//! live in this crate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Central error type for the core module.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum CoreError {
    /// The dispatcher has been stopped and rejects further posts.
    #[error("dispatcher stopped")]
    DispatcherStopped,

    /// A critical task was rejected because the bounded queue stayed full
    /// past `criticalWaitMs`.
    #[error("critical queue full after {wait_ms}ms wait")]
    CriticalQueueTimeout { wait_ms: u64 },

    /// A task join failed.
    #[error("join error: {0}")]
    JoinError(String),

    /// The receiving side of an internal channel was dropped.
    #[error("receiver dropped")]
    RxDropped,
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for CoreError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Self::RxDropped
    }
}

impl From<tokio::task::JoinError> for CoreError {
    fn from(value: tokio::task::JoinError) -> Self {
        Self::JoinError(format!("{value:?}"))
    }
}
