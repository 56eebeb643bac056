//! The callback surface every strategy implements.

use hft_core::order::OrderEvent;
use hft_core::market::MarketSnapshot;

use crate::error::StrategyError;
use crate::types::{AccountSnapshot, SignalIntent};

/// Per-strategy business logic, driven by [`crate::engine::StrategyEngine`].
///
/// Every callback returns `Result<(), StrategyError>` rather than relying on
/// a caught panic: a failing callback is counted and logged by the engine,
/// the worker loop keeps running, and the other strategies are unaffected.
/// Any emitted [`SignalIntent`]s are appended to `out`; the engine forwards
/// them to the intent sink once the callback returns.
pub trait Strategy: Send {
    /// Stable identifier used to address this strategy from `OrderEvent`
    /// dispatch and from the factory registry.
    fn name(&self) -> &str;

    /// A market-data update. Broadcast to every running strategy.
    fn on_state(&mut self, snapshot: &MarketSnapshot, out: &mut Vec<SignalIntent>) -> Result<(), StrategyError> {
        let _ = (snapshot, out);
        Ok(())
    }

    /// An order lifecycle event. Delivered only to this strategy when
    /// `event.strategy_id` names it; broadcast to all strategies otherwise.
    fn on_order_event(&mut self, event: &OrderEvent, out: &mut Vec<SignalIntent>) -> Result<(), StrategyError> {
        let _ = (event, out);
        Ok(())
    }

    /// An account/position update. Broadcast to every running strategy.
    fn on_account(&mut self, snapshot: &AccountSnapshot, out: &mut Vec<SignalIntent>) -> Result<(), StrategyError> {
        let _ = (snapshot, out);
        Ok(())
    }

    /// Invoked when the engine's wait for the next event exceeds this
    /// strategy's configured timer interval.
    fn on_timer(&mut self, now_ns: i64, out: &mut Vec<SignalIntent>) -> Result<(), StrategyError> {
        let _ = (now_ns, out);
        Ok(())
    }

    /// Timer tick interval in nanoseconds; `None` disables `on_timer`.
    fn timer_interval_ns(&self) -> Option<i64> {
        None
    }

    /// Opaque state snapshot persisted by the engine on a clean shutdown and
    /// handed back to the next construction of this strategy, if the
    /// factory chooses to use it. Default: no state to save.
    fn save_state(&self) -> Option<Vec<u8>> {
        None
    }
}
