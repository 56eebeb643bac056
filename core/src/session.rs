//! Session configuration and lifecycle state shared by the session manager,
//! the execution engine, and the strategy engine.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One (market-data front, trader front) candidate pair tried in order during
/// `connect`; the first pair to reach `Ready` wins.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FrontPair {
    pub market_front: String,
    pub trader_front: String,
}

/// Immutable-once-connected configuration for a broker session.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SessionConfig {
    pub fronts: Vec<FrontPair>,
    pub broker_id: String,
    pub user_id: String,
    pub investor_id: String,
    pub password: String,
    pub app_id: String,
    pub auth_code: String,
    pub is_production: bool,
    pub enable_terminal_auth: bool,
    pub settlement_confirm_required: bool,
    pub connect_timeout: Duration,
    pub reconnect_initial_backoff: Duration,
    pub reconnect_max_backoff: Duration,
    pub reconnect_max_attempts: u32,
    pub recovery_quiet_period: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            fronts: Vec::new(),
            broker_id: String::new(),
            user_id: String::new(),
            investor_id: String::new(),
            password: String::new(),
            app_id: String::new(),
            auth_code: String::new(),
            is_production: false,
            enable_terminal_auth: false,
            settlement_confirm_required: false,
            connect_timeout: Duration::from_millis(5_000),
            reconnect_initial_backoff: Duration::from_millis(500),
            reconnect_max_backoff: Duration::from_millis(30_000),
            reconnect_max_attempts: 10,
            recovery_quiet_period: Duration::from_millis(1_000),
        }
    }
}

/// Trader-session lifecycle. Advances monotonically on successful responses;
/// resets to `Disconnected` on any disconnect or fatal response. Variant
/// declaration order is the lifecycle order, so the derived `Ord` lets
/// callers compare progress with `>=` instead of matching every variant.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub enum TraderSessionState {
    Disconnected,
    Connected,
    Authenticated,
    LoggedIn,
    SettlementConfirmed,
    Ready,
}

/// Market-data-session lifecycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub enum MarketSessionState {
    Disconnected,
    Connected,
    LoggedIn,
    Ready,
}

impl TraderSessionState {
    /// Only `Ready` accepts place/cancel.
    pub fn accepts_orders(self) -> bool {
        matches!(self, Self::Ready)
    }
}
