#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    clippy::useless_let_if_seq,
    missing_debug_implementations,
    rust_2018_idioms
)]
#![allow(clippy::type_complexity, clippy::too_many_arguments)]
//! # Core - engine primitives of the trading runtime
//!
//! This crate owns the domain types and the concurrency primitives shared by
//! every other crate in the workspace: the priority event dispatcher and its
//! bounded critical-callback queue, the query scheduler, the flow controller
//! and multi-scope circuit breakers, plus the session/order/market snapshot
//! types that flow between them.
//!
//! Nothing in this crate talks to a broker, a database, or the network —
//! those live behind trait boundaries in `session`, `transport`, and `store`.

pub mod breaker;
pub mod dispatch;
pub mod error;
pub mod flow;
pub mod logging;
pub mod market;
pub mod order;
pub mod query_scheduler;
pub mod session;
pub mod shutdown;

pub use error::CoreError;
