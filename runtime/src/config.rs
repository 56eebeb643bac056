//! TOML-deserializable outer configuration, converted into the typed
//! configs each subsystem crate actually wants. Every timeout here is a
//! plain millisecond integer in the TOML file -- the conversion to
//! `std::time::Duration` happens once, at assembly time, matching the
//! teacher's "config struct is fully populated before it reaches the core"
//! idiom.

use std::time::Duration;

use hft_core::breaker::BreakerConfig;
use hft_core::session::{FrontPair, SessionConfig};
use hft_transport::TransportKind;
use serde::{Deserialize, Serialize};

use crate::error::RuntimeError;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub session: SessionSection,
    pub dispatcher: DispatcherSection,
    pub flow: FlowSection,
    pub breakers: BreakersSection,
    pub execution: ExecutionSection,
    pub strategy: StrategySection,
    pub storage: StorageSection,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            session: SessionSection::default(),
            dispatcher: DispatcherSection::default(),
            flow: FlowSection::default(),
            breakers: BreakersSection::default(),
            execution: ExecutionSection::default(),
            strategy: StrategySection::default(),
            storage: StorageSection::default(),
        }
    }
}

impl RuntimeConfig {
    /// Parses `contents` as TOML, then applies environment-variable
    /// overrides for storage mode selection (the only section with env
    /// toggles).
    pub fn load(contents: &str) -> Result<Self, RuntimeError> {
        let mut config: RuntimeConfig =
            toml::from_str(contents).map_err(|err| RuntimeError::Config(err.to_string()))?;
        config.storage.apply_env_overrides();
        Ok(config)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionSection {
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
    pub connect_timeout_ms: u64,
    pub reconnect_initial_backoff_ms: u64,
    pub reconnect_max_backoff_ms: u64,
    pub reconnect_max_attempts: u32,
    pub recovery_quiet_period_ms: u64,
    pub transport: TransportSetting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum TransportSetting {
    #[default]
    Simulated,
    Live,
}

impl From<TransportSetting> for TransportKind {
    fn from(value: TransportSetting) -> Self {
        match value {
            TransportSetting::Simulated => TransportKind::Simulated,
            TransportSetting::Live => TransportKind::Live,
        }
    }
}

impl Default for SessionSection {
    fn default() -> Self {
        let defaults = SessionConfig::default();
        Self {
            fronts: defaults.fronts,
            broker_id: defaults.broker_id,
            user_id: defaults.user_id,
            investor_id: defaults.investor_id,
            password: defaults.password,
            app_id: defaults.app_id,
            auth_code: defaults.auth_code,
            is_production: defaults.is_production,
            enable_terminal_auth: defaults.enable_terminal_auth,
            settlement_confirm_required: defaults.settlement_confirm_required,
            connect_timeout_ms: defaults.connect_timeout.as_millis() as u64,
            reconnect_initial_backoff_ms: defaults.reconnect_initial_backoff.as_millis() as u64,
            reconnect_max_backoff_ms: defaults.reconnect_max_backoff.as_millis() as u64,
            reconnect_max_attempts: defaults.reconnect_max_attempts,
            recovery_quiet_period_ms: defaults.recovery_quiet_period.as_millis() as u64,
            transport: TransportSetting::default(),
        }
    }
}

impl SessionSection {
    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            fronts: self.fronts.clone(),
            broker_id: self.broker_id.clone(),
            user_id: self.user_id.clone(),
            investor_id: self.investor_id.clone(),
            password: self.password.clone(),
            app_id: self.app_id.clone(),
            auth_code: self.auth_code.clone(),
            is_production: self.is_production,
            enable_terminal_auth: self.enable_terminal_auth,
            settlement_confirm_required: self.settlement_confirm_required,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            reconnect_initial_backoff: Duration::from_millis(self.reconnect_initial_backoff_ms),
            reconnect_max_backoff: Duration::from_millis(self.reconnect_max_backoff_ms),
            reconnect_max_attempts: self.reconnect_max_attempts,
            recovery_quiet_period: Duration::from_millis(self.recovery_quiet_period_ms),
        }
    }
}

/// Reserved for a future shared `EventDispatcher`/`CriticalQueue`; nothing
/// in this crate constructs one yet, since none of the subsystems wired by
/// [`crate::Runtime::bootstrap`] currently take a shared dispatcher as a
/// constructor argument. Parsed and validated regardless, so deployments
/// can start recording their intended values now.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatcherSection {
    pub worker_threads: usize,
    pub critical_queue_size: usize,
    pub critical_wait_ms: u64,
    pub critical_delay_alert_ms: u64,
}

impl Default for DispatcherSection {
    fn default() -> Self {
        Self {
            worker_threads: 2,
            critical_queue_size: 1024,
            critical_wait_ms: 50,
            critical_delay_alert_ms: 100,
        }
    }
}

/// One `(account_id, kind, instrument_id)` flow rule; `instrument_id` empty
/// means account-scoped. `kind` names the four [`hft_core::flow::OpKind`]
/// variants as they'd appear in TOML.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FlowRuleSection {
    pub account_id: String,
    pub kind: FlowOpKind,
    #[serde(default)]
    pub instrument_id: String,
    pub rate_per_second: f64,
    pub capacity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum FlowOpKind {
    OrderInsert,
    OrderCancel,
    Query,
    SettlementQuery,
}

impl From<FlowOpKind> for hft_core::flow::OpKind {
    fn from(value: FlowOpKind) -> Self {
        match value {
            FlowOpKind::OrderInsert => hft_core::flow::OpKind::OrderInsert,
            FlowOpKind::OrderCancel => hft_core::flow::OpKind::OrderCancel,
            FlowOpKind::Query => hft_core::flow::OpKind::Query,
            FlowOpKind::SettlementQuery => hft_core::flow::OpKind::SettlementQuery,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct FlowSection {
    pub rules: Vec<FlowRuleSection>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerScopeSection {
    pub enabled: bool,
    pub failure_threshold: u32,
    pub timeout_ms: u64,
    pub half_open_timeout_ms: u64,
}

impl Default for BreakerScopeSection {
    fn default() -> Self {
        let defaults = BreakerConfig::default();
        Self {
            enabled: true,
            failure_threshold: defaults.failure_threshold,
            timeout_ms: defaults.timeout.as_millis() as u64,
            half_open_timeout_ms: defaults.half_open_timeout.as_millis() as u64,
        }
    }
}

impl BreakerScopeSection {
    pub fn to_scope_config(self) -> hft_core::breaker::ScopeConfig {
        hft_core::breaker::ScopeConfig {
            enabled: self.enabled,
            config: BreakerConfig {
                failure_threshold: self.failure_threshold,
                timeout: Duration::from_millis(self.timeout_ms),
                half_open_timeout: Duration::from_millis(self.half_open_timeout_ms),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakersSection {
    pub strategy: BreakerScopeSection,
    pub account: BreakerScopeSection,
    pub system: BreakerScopeSection,
}

impl Default for BreakersSection {
    fn default() -> Self {
        Self {
            strategy: BreakerScopeSection::default(),
            account: BreakerScopeSection::default(),
            system: BreakerScopeSection::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutionSection {
    pub order_insert_timeout_ms: u64,
    pub order_cancel_timeout_ms: u64,
    pub cancel_retry_max: u32,
    pub cancel_initial_backoff_ms: u64,
    pub cancel_max_backoff_ms: u64,
    pub cancel_wait_ack_timeout_ms: u64,
    /// Per-instrument override isn't TOML-expressible in this minimal
    /// section; `None` means unlimited. A real deployment would likely
    /// split this into its own `[[execution.instrument_limits]]` table.
    pub max_order_volume: Option<u32>,
}

impl Default for ExecutionSection {
    fn default() -> Self {
        let defaults = hft_execution::ExecutionConfig::default();
        Self {
            order_insert_timeout_ms: defaults.order_insert_timeout.as_millis() as u64,
            order_cancel_timeout_ms: defaults.order_cancel_timeout.as_millis() as u64,
            cancel_retry_max: defaults.cancel_retry_max,
            cancel_initial_backoff_ms: defaults.cancel_initial_backoff.as_millis() as u64,
            cancel_max_backoff_ms: defaults.cancel_max_backoff.as_millis() as u64,
            cancel_wait_ack_timeout_ms: defaults.cancel_wait_ack_timeout.as_millis() as u64,
            max_order_volume: None,
        }
    }
}

impl ExecutionSection {
    pub fn to_execution_config(self) -> hft_execution::ExecutionConfig {
        hft_execution::ExecutionConfig {
            order_insert_timeout: Duration::from_millis(self.order_insert_timeout_ms),
            order_cancel_timeout: Duration::from_millis(self.order_cancel_timeout_ms),
            cancel_retry_max: self.cancel_retry_max,
            cancel_initial_backoff: Duration::from_millis(self.cancel_initial_backoff_ms),
            cancel_max_backoff: Duration::from_millis(self.cancel_max_backoff_ms),
            cancel_wait_ack_timeout: Duration::from_millis(self.cancel_wait_ack_timeout_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StrategySection {
    pub queue_capacity: usize,
    /// Names to pass to [`hft_strategy::StrategyEngine::start`]. This crate
    /// ships no built-in [`hft_strategy::Strategy`] implementations, so
    /// `bootstrap` spawns the engine but never calls `start` itself --
    /// an embedder registers its own factories on `Runtime::strategy_engine`
    /// and starts `enabled` once that's done.
    pub enabled: Vec<String>,
}

impl Default for StrategySection {
    fn default() -> Self {
        Self {
            queue_capacity: 4096,
            enabled: Vec::new(),
        }
    }
}

/// Storage mode selection. This crate only ships the in-memory side of
/// the cache and ledger contracts; `redis_mode`/`timescale_mode` are
/// recorded so a deployment that links a real driver crate can read them,
/// and `allow_fallback` governs whether this process may silently fall
/// back to the in-memory store when a networked mode was requested but the
/// driver crate isn't linked.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageSection {
    pub redis_mode: StorageMode,
    pub timescale_mode: StorageMode,
    pub allow_fallback: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum StorageMode {
    #[default]
    Memory,
    Networked,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            redis_mode: StorageMode::Memory,
            timescale_mode: StorageMode::Memory,
            allow_fallback: true,
        }
    }
}

impl StorageSection {
    fn apply_env_overrides(&mut self) {
        if let Some(mode) = env_storage_mode("QH_REDIS_MODE") {
            self.redis_mode = mode;
        }
        if let Some(mode) = env_storage_mode("QH_TIMESCALE_MODE") {
            self.timescale_mode = mode;
        }
        if let Ok(raw) = std::env::var("QH_STORAGE_ALLOW_FALLBACK") {
            self.allow_fallback = raw == "1" || raw.eq_ignore_ascii_case("true");
        }
    }
}

fn env_storage_mode(var: &str) -> Option<StorageMode> {
    match std::env::var(var).ok()?.to_lowercase().as_str() {
        "memory" => Some(StorageMode::Memory),
        "networked" | "redis" | "timescale" => Some(StorageMode::Networked),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = RuntimeConfig::load("").unwrap();
        assert_eq!(config.dispatcher.worker_threads, 2);
        assert_eq!(config.execution.cancel_retry_max, 3);
    }

    #[test]
    fn partial_toml_overrides_only_named_fields() {
        let toml = r#"
            [session]
            broker_id = "9999"
            connect_timeout_ms = 2000

            [execution]
            max_order_volume = 50
        "#;
        let config = RuntimeConfig::load(toml).unwrap();
        assert_eq!(config.session.broker_id, "9999");
        assert_eq!(config.session.connect_timeout_ms, 2000);
        assert_eq!(config.execution.max_order_volume, Some(50));
        assert_eq!(config.execution.cancel_retry_max, 3);
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let err = RuntimeConfig::load("not valid toml =====").unwrap_err();
        assert!(matches!(err, RuntimeError::Config(_)));
    }

    #[test]
    fn session_section_round_trips_through_session_config() {
        let section = SessionSection {
            connect_timeout_ms: 1234,
            ..SessionSection::default()
        };
        let config = section.to_session_config();
        assert_eq!(config.connect_timeout, Duration::from_millis(1234));
    }
}
