//! # Runtime - config loading and subsystem assembly
//!
//! The outer layer that turns a TOML file plus a handful of storage
//! environment toggles into a fully wired [`Runtime`]: session manager,
//! flow controller, breaker manager, execution engine, strategy engine, and
//! the in-memory store pair. The binary (`src/main.rs`) is a thin shell
//! over this library so the assembly logic itself stays testable without a
//! process boundary.

mod assembly;
mod config;
mod error;

pub use assembly::Runtime;
pub use config::{
    BreakersSection, DispatcherSection, ExecutionSection, FlowOpKind, FlowRuleSection,
    FlowSection, RuntimeConfig, SessionSection, StorageMode, StorageSection, StrategySection,
    TransportSetting,
};
pub use error::RuntimeError;
