//! # Execution - order execution engine
//!
//! Composes the pre-trade [`hft_risk::RiskManager`], the composite
//! [`hft_core::breaker::BreakerManager`], the [`hft_core::flow::FlowController`],
//! and the [`hft_session::SessionManager`] behind the two operations the
//! strategy engine actually calls: `placeOrder` and `cancelOrder`. Query
//! wrappers live in [`query`].

mod engine;
mod error;
pub mod query;

pub use engine::{ExecutionConfig, ExecutionEngine, OrderResult};
pub use error::ExecutionError;
