//! # Risk - pre-trade risk check
//!
//! The execution engine's `place_order` calls a [`RiskManager`] after the
//! circuit breakers and flow controller have admitted an intent but before
//! it reaches the session manager. A rejection here never touches the
//! broker: the caller gets back a `RiskRefused` with a human-readable
//! reason and the engine logs the decision without spending a flow-control
//! token or a broker round-trip.
//!
//! ## Implementation example
//! ```rust,ignore
//! use hft_core::order::OrderIntent;
//! use hft_risk::{RiskApproved, RiskManager, RiskRefused};
//!
//! struct MaxVolume(u32);
//!
//! impl RiskManager for MaxVolume {
//!     type State = ();
//!
//!     fn check(
//!         &self,
//!         _state: &Self::State,
//!         intent: OrderIntent,
//!     ) -> Result<RiskApproved<OrderIntent>, RiskRefused<OrderIntent>> {
//!         if intent.volume > self.0 {
//!             return Err(RiskRefused::new(intent, "exceeds maximum order volume"));
//!         }
//!         Ok(RiskApproved::new(intent))
//!     }
//! }
//! ```

pub mod check;

pub use check::{CheckHigherThan, CheckHigherThanError, MaxOrderVolume, RiskCheck};

use derive_more::{Constructor, Display};
use hft_core::order::OrderIntent;
use serde::{Deserialize, Serialize};

/// Approved result of a [`RiskManager`] check.
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize, Display, Constructor,
)]
pub struct RiskApproved<T>(pub T);

impl<T> RiskApproved<T> {
    pub fn into_item(self) -> T {
        self.0
    }
}

/// Rejected result of a [`RiskManager`] check: the rejected item plus the
/// specific reason, suitable for logging and for the `risk_decisions`
/// ledger table.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct RiskRefused<T, Reason = String> {
    pub item: T,
    pub reason: Reason,
}

impl<T> RiskRefused<T> {
    pub fn new(item: T, reason: impl Into<String>) -> Self {
        Self {
            item,
            reason: reason.into(),
        }
    }
}

impl<T, Reason> RiskRefused<T, Reason> {
    pub fn into_item(self) -> T {
        self.item
    }
}

/// Pluggable pre-trade check run by the execution engine before an
/// [`OrderIntent`] is handed to the session manager.
///
/// Implementations may consult external state (positions, margin, a
/// compliance service) via `Self::State`; the engine is expected to own
/// that state and pass a fresh reference on every call.
pub trait RiskManager {
    type State;

    fn check(
        &self,
        state: &Self::State,
        intent: OrderIntent,
    ) -> Result<RiskApproved<OrderIntent>, RiskRefused<OrderIntent>>;
}

/// Pass-through risk manager that approves every intent. Used when no
/// external risk service is configured.
#[derive(Debug, Clone, Default)]
pub struct NoRiskManager;

impl RiskManager for NoRiskManager {
    type State = ();

    fn check(
        &self,
        _state: &Self::State,
        intent: OrderIntent,
    ) -> Result<RiskApproved<OrderIntent>, RiskRefused<OrderIntent>> {
        Ok(RiskApproved::new(intent))
    }
}

/// Rejects any intent whose `volume` exceeds a configured per-instrument
/// (or default) limit, built on [`MaxOrderVolume`].
#[derive(Debug, Clone, Default)]
pub struct MaxOrderVolumeManager {
    limits: MaxOrderVolume,
}

impl MaxOrderVolumeManager {
    pub fn new(limits: MaxOrderVolume) -> Self {
        Self { limits }
    }
}

impl RiskManager for MaxOrderVolumeManager {
    type State = ();

    fn check(
        &self,
        _state: &Self::State,
        intent: OrderIntent,
    ) -> Result<RiskApproved<OrderIntent>, RiskRefused<OrderIntent>> {
        match self.limits.check(&intent.instrument_id, intent.volume) {
            Ok(()) => Ok(RiskApproved::new(intent)),
            Err(err) => {
                let reason = err.to_string();
                Err(RiskRefused::new(intent, reason))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hft_core::order::{Offset, OrderType, Side};

    fn intent(volume: u32) -> OrderIntent {
        OrderIntent {
            account_id: "acct1".into(),
            client_order_id: "c1".into(),
            strategy_id: "s1".into(),
            instrument_id: "SHFE.ag2406".into(),
            side: Side::Buy,
            offset: Offset::Open,
            order_type: OrderType::Limit,
            volume,
            price: 5000.0,
            trace_id: "t1".into(),
            ts_ns: 0,
        }
    }

    #[test]
    fn no_risk_manager_always_approves() {
        let mgr = NoRiskManager;
        assert!(mgr.check(&(), intent(1_000_000)).is_ok());
    }

    #[test]
    fn max_volume_rejects_over_limit() {
        let mgr = MaxOrderVolumeManager::new(MaxOrderVolume::new(Some(10)));
        assert!(mgr.check(&(), intent(5)).is_ok());
        let refused = mgr.check(&(), intent(11)).unwrap_err();
        assert_eq!(refused.item.volume, 11);
        assert!(refused.reason.contains("CheckHigherThan"));
    }

    #[test]
    fn max_volume_prefers_instrument_specific_limit() {
        let limits = MaxOrderVolume::new(Some(10)).with_instrument_limit("SHFE.ag2406", 2);
        let mgr = MaxOrderVolumeManager::new(limits);
        assert!(mgr.check(&(), intent(2)).is_ok());
        assert!(mgr.check(&(), intent(3)).is_err());
    }
}
