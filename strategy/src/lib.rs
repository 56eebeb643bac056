//! # Strategy - event-driven strategy engine
//!
//! Fans market-data, order, and account events out to registered
//! [`Strategy`] implementations off one bounded, single-consumer queue, fires
//! per-strategy timer ticks, and forwards emitted [`SignalIntent`]s to the
//! execution layer. [`inbox::IntentInbox`] decodes the polling-based intent
//! hash format some strategies read from instead of emitting intents
//! directly from a callback.

mod engine;
mod error;
mod inbox;
mod strategy;
mod types;

pub use engine::StrategyEngine;
pub use error::{InboxError, StartError, StrategyError};
pub use inbox::IntentInbox;
pub use strategy::Strategy;
pub use types::{AccountSnapshot, SignalIntent, StrategyEvent, StrategyIntentBatch};
