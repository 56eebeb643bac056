//! Token-bucket rate limiting per `(accountId, opKind, instrumentId)`.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::time::sleep;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum OpKind {
    OrderInsert,
    OrderCancel,
    Query,
    SettlementQuery,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Operation {
    pub account_id: String,
    pub kind: OpKind,
    pub instrument_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlowResult {
    pub allowed: bool,
    pub reason: String,
    pub wait_ms: u64,
}

impl FlowResult {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: String::new(),
            wait_ms: 0,
        }
    }

    fn denied(reason: &str, wait_ms: u64) -> Self {
        Self {
            allowed: false,
            reason: reason.to_string(),
            wait_ms,
        }
    }
}

struct TokenBucket {
    rate_per_second: f64,
    capacity: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(rate_per_second: f64, capacity: f64) -> Self {
        let capacity = capacity.max(1.0);
        Self {
            rate_per_second: rate_per_second.max(0.1),
            capacity,
            tokens: capacity,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed_ms = now.saturating_duration_since(self.last_refill).as_secs_f64() * 1_000.0;
        let refill = (elapsed_ms / 1_000.0) * self.rate_per_second;
        self.tokens = (self.tokens + refill).min(self.capacity);
        self.last_refill = now;
    }

    fn try_acquire(&mut self) -> bool {
        self.refill();
        if self.tokens < 1.0 {
            false
        } else {
            self.tokens -= 1.0;
            true
        }
    }

    fn set_rate(&mut self, rate_per_second: f64) {
        self.refill();
        self.rate_per_second = rate_per_second.max(0.1);
    }
}

/// A configured rate limit for a `(account, kind, instrument)` triple.
/// `instrument_id` empty means an account-scoped rule.
#[derive(Debug, Clone)]
pub struct FlowRule {
    pub account_id: String,
    pub kind: OpKind,
    pub instrument_id: String,
    pub rate_per_second: f64,
    pub capacity: f64,
}

pub struct FlowController {
    buckets: Mutex<HashMap<(String, OpKind, String), TokenBucket>>,
}

impl Default for FlowController {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowController {
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn add_rule(&self, rule: FlowRule) {
        let key = (rule.account_id, rule.kind, rule.instrument_id);
        self.buckets.lock().insert(
            key,
            TokenBucket::new(rule.rate_per_second, rule.capacity),
        );
    }

    /// Exact `(account, kind, instrument)` match first, then falls back to
    /// the account-scoped rule (`instrument_id == ""`); `None` means "no
    /// rule configured" which callers treat as always-allow.
    fn find_bucket<'a>(
        buckets: &'a mut HashMap<(String, OpKind, String), TokenBucket>,
        op: &Operation,
    ) -> Option<&'a mut TokenBucket> {
        let exact = (op.account_id.clone(), op.kind, op.instrument_id.clone());
        if buckets.contains_key(&exact) {
            return buckets.get_mut(&exact);
        }
        let account_scoped = (op.account_id.clone(), op.kind, String::new());
        buckets.get_mut(&account_scoped)
    }

    pub fn check(&self, op: &Operation) -> FlowResult {
        let mut buckets = self.buckets.lock();
        match Self::find_bucket(&mut buckets, op) {
            None => FlowResult::allow(),
            Some(bucket) => {
                if bucket.try_acquire() {
                    FlowResult::allow()
                } else {
                    FlowResult::denied("rate_limited", 0)
                }
            }
        }
    }

    pub async fn acquire(&self, op: &Operation, timeout: Duration) -> FlowResult {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut buckets = self.buckets.lock();
                match Self::find_bucket(&mut buckets, op) {
                    None => return FlowResult::allow(),
                    Some(bucket) => {
                        if bucket.try_acquire() {
                            return FlowResult::allow();
                        }
                    }
                }
            }
            if Instant::now() >= deadline {
                return FlowResult::denied("rate_limited_timeout", timeout.as_millis() as u64);
            }
            sleep(Duration::from_millis(1)).await;
        }
    }

    pub fn set_rate(&self, account_id: &str, kind: OpKind, instrument_id: &str, rate: f64) {
        let key = (account_id.to_string(), kind, instrument_id.to_string());
        if let Some(bucket) = self.buckets.lock().get_mut(&key) {
            bucket.set_rate(rate);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(instrument: &str) -> Operation {
        Operation {
            account_id: "acct1".into(),
            kind: OpKind::OrderInsert,
            instrument_id: instrument.into(),
        }
    }

    #[test]
    fn no_rule_always_allows() {
        let fc = FlowController::new();
        assert!(fc.check(&op("SHFE.ag2406")).allowed);
    }

    #[test]
    fn token_bucket_denies_then_recovers() {
        let fc = FlowController::new();
        fc.add_rule(FlowRule {
            account_id: "acct1".into(),
            kind: OpKind::OrderInsert,
            instrument_id: String::new(),
            rate_per_second: 1.0,
            capacity: 1.0,
        });
        assert!(fc.check(&op("SHFE.ag2406")).allowed);
        assert!(!fc.check(&op("SHFE.ag2406")).allowed);
        std::thread::sleep(Duration::from_millis(1_100));
        assert!(fc.check(&op("SHFE.ag2406")).allowed);
    }

    #[test]
    fn instrument_scoped_rule_takes_precedence() {
        let fc = FlowController::new();
        fc.add_rule(FlowRule {
            account_id: "acct1".into(),
            kind: OpKind::OrderInsert,
            instrument_id: String::new(),
            rate_per_second: 0.1,
            capacity: 1.0,
        });
        fc.add_rule(FlowRule {
            account_id: "acct1".into(),
            kind: OpKind::OrderInsert,
            instrument_id: "SHFE.ag2406".into(),
            rate_per_second: 100.0,
            capacity: 5.0,
        });
        for _ in 0..5 {
            assert!(fc.check(&op("SHFE.ag2406")).allowed);
        }
    }
}
