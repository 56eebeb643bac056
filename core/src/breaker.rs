//! Multi-scope circuit breakers: `Closed -> Open -> HalfOpen` per
//! `(scope, key)`, composited across Strategy/Account/System scopes by the
//! execution engine.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    Strategy,
    Account,
    System,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub timeout: Duration,
    pub half_open_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_millis(1_000),
            half_open_timeout: Duration::from_millis(5_000),
        }
    }
}

impl BreakerConfig {
    fn clamped(self) -> Self {
        Self {
            failure_threshold: self.failure_threshold.max(1),
            timeout: self.timeout.max(Duration::from_millis(1)),
            half_open_timeout: self.half_open_timeout.max(Duration::from_millis(1)),
        }
    }
}

/// A single `(scope, key)` breaker instance.
struct Breaker {
    config: BreakerConfig,
    state: BreakerState,
    failure_count: u32,
    last_failure: Option<Instant>,
}

impl Breaker {
    fn new(config: BreakerConfig) -> Self {
        Self {
            config: config.clamped(),
            state: BreakerState::Closed,
            failure_count: 0,
            last_failure: None,
        }
    }

    /// Evaluates and, if the half-open window has elapsed, transitions
    /// `Open -> HalfOpen` as a side effect (matches the original's
    /// `AllowRequest` semantics of folding the timeout check into the
    /// allow-check itself).
    fn allow(&mut self) -> bool {
        match self.state {
            BreakerState::Closed => true,
            BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let elapsed = self
                    .last_failure
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::MAX);
                if elapsed >= self.config.half_open_timeout {
                    self.state = BreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    fn record_success(&mut self) {
        self.failure_count = 0;
        self.state = BreakerState::Closed;
    }

    /// Continued failures while already `Open` extend the open window: the
    /// original implementation resets `last_failure` on every call that
    /// keeps `failure_count >= threshold`, including repeated calls once
    /// already open. See DESIGN.md for the grounding on this choice.
    fn record_failure(&mut self, now: Instant) {
        if self.state == BreakerState::HalfOpen {
            self.state = BreakerState::Open;
            self.failure_count = self.config.failure_threshold;
            self.last_failure = Some(now);
            return;
        }
        self.failure_count += 1;
        if self.failure_count >= self.config.failure_threshold {
            self.state = BreakerState::Open;
            self.last_failure = Some(now);
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScopeConfig {
    pub enabled: bool,
    pub config: BreakerConfig,
}

impl ScopeConfig {
    pub fn enabled(config: BreakerConfig) -> Self {
        Self {
            enabled: true,
            config,
        }
    }
}

/// Owns one independently-configured breaker table per scope. The System
/// scope always normalises its key to a single fixed value, so there is
/// exactly one System-scope breaker process-wide regardless of what key
/// callers pass.
pub struct BreakerManager {
    scopes: [ScopeConfig; 3],
    breakers: Mutex<HashMap<(Scope, String), Breaker>>,
}

const SYSTEM_KEY: &str = "__system__";

impl BreakerManager {
    pub fn new(strategy: ScopeConfig, account: ScopeConfig, system: ScopeConfig) -> Self {
        Self {
            scopes: [strategy, account, system],
            breakers: Mutex::new(HashMap::new()),
        }
    }

    fn scope_config(&self, scope: Scope) -> ScopeConfig {
        match scope {
            Scope::Strategy => self.scopes[0],
            Scope::Account => self.scopes[1],
            Scope::System => self.scopes[2],
        }
    }

    fn normalise_key<'a>(scope: Scope, key: &'a str) -> &'a str {
        match scope {
            Scope::System => SYSTEM_KEY,
            _ => key,
        }
    }

    pub fn allow(&self, scope: Scope, key: &str) -> bool {
        let scope_config = self.scope_config(scope);
        if !scope_config.enabled {
            return true;
        }
        let key = Self::normalise_key(scope, key);
        let mut breakers = self.breakers.lock();
        breakers
            .entry((scope, key.to_string()))
            .or_insert_with(|| Breaker::new(scope_config.config))
            .allow()
    }

    pub fn record_success(&self, scope: Scope, key: &str) {
        if !self.scope_config(scope).enabled {
            return;
        }
        let key = Self::normalise_key(scope, key);
        let mut breakers = self.breakers.lock();
        if let Some(breaker) = breakers.get_mut(&(scope, key.to_string())) {
            breaker.record_success();
        }
    }

    pub fn record_failure(&self, scope: Scope, key: &str) {
        let scope_config = self.scope_config(scope);
        if !scope_config.enabled {
            return;
        }
        let key = Self::normalise_key(scope, key);
        let mut breakers = self.breakers.lock();
        breakers
            .entry((scope, key.to_string()))
            .or_insert_with(|| Breaker::new(scope_config.config))
            .record_failure(Instant::now());
    }

    pub fn current_state(&self, scope: Scope, key: &str) -> BreakerState {
        if !self.scope_config(scope).enabled {
            return BreakerState::Closed;
        }
        let key = Self::normalise_key(scope, key);
        let breakers = self.breakers.lock();
        breakers
            .get(&(scope, key.to_string()))
            .map(|b| b.state)
            .unwrap_or(BreakerState::Closed)
    }

    /// Composite policy used by the execution engine: `Allow` requires all
    /// three scopes to permit.
    pub fn allow_composite(&self, strategy_id: &str, account_id: &str) -> bool {
        self.allow(Scope::Strategy, strategy_id)
            && self.allow(Scope::Account, account_id)
            && self.allow(Scope::System, SYSTEM_KEY)
    }

    pub fn record_composite_success(&self, strategy_id: &str, account_id: &str) {
        self.record_success(Scope::Strategy, strategy_id);
        self.record_success(Scope::Account, account_id);
        self.record_success(Scope::System, SYSTEM_KEY);
    }

    pub fn record_composite_failure(&self, strategy_id: &str, account_id: &str) {
        self.record_failure(Scope::Strategy, strategy_id);
        self.record_failure(Scope::Account, account_id);
        self.record_failure(Scope::System, SYSTEM_KEY);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    fn manager(threshold: u32, half_open_ms: u64) -> BreakerManager {
        let cfg = BreakerConfig {
            failure_threshold: threshold,
            timeout: Duration::from_millis(1_000),
            half_open_timeout: Duration::from_millis(half_open_ms),
        };
        BreakerManager::new(
            ScopeConfig::enabled(cfg),
            ScopeConfig::enabled(cfg),
            ScopeConfig::enabled(cfg),
        )
    }

    #[test]
    fn half_open_probe_then_close() {
        let mgr = manager(1, 10);
        mgr.record_failure(Scope::Account, "acct");
        assert!(!mgr.allow(Scope::Account, "acct"));
        sleep(Duration::from_millis(12));
        assert!(mgr.allow(Scope::Account, "acct"));
        assert_eq!(
            mgr.current_state(Scope::Account, "acct"),
            BreakerState::HalfOpen
        );
        mgr.record_success(Scope::Account, "acct");
        assert_eq!(
            mgr.current_state(Scope::Account, "acct"),
            BreakerState::Closed
        );
    }

    #[test]
    fn continued_open_failures_extend_window() {
        let mgr = manager(1, 50);
        mgr.record_failure(Scope::Account, "acct");
        sleep(Duration::from_millis(20));
        // still inside the window: another failure re-anchors last_failure
        mgr.record_failure(Scope::Account, "acct");
        sleep(Duration::from_millis(35)); // 55ms after first, 35ms after second
        assert!(!mgr.allow(Scope::Account, "acct"));
        sleep(Duration::from_millis(20)); // 55ms after second failure
        assert!(mgr.allow(Scope::Account, "acct"));
    }

    #[test]
    fn disabled_scope_always_allows_and_records_nothing() {
        let mgr = BreakerManager::new(
            ScopeConfig::default(),
            ScopeConfig::enabled(BreakerConfig::default()),
            ScopeConfig::enabled(BreakerConfig::default()),
        );
        for _ in 0..10 {
            mgr.record_failure(Scope::Strategy, "s1");
        }
        assert!(mgr.allow(Scope::Strategy, "s1"));
        assert_eq!(mgr.current_state(Scope::Strategy, "s1"), BreakerState::Closed);
    }

    #[test]
    fn system_scope_key_is_normalised() {
        let mgr = manager(1, 1_000);
        mgr.record_failure(Scope::System, "accountA");
        assert!(!mgr.allow(Scope::System, "accountB"));
    }
}
