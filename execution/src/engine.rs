//! `placeOrder`/`cancelOrder` composed over risk, breakers, flow control, and
//! the session manager. Query wrappers live in [`crate::query`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use hft_core::breaker::BreakerManager;
use hft_core::flow::{FlowController, OpKind, Operation};
use hft_core::order::OrderIntent;
use hft_risk::RiskManager;
use hft_session::SessionManager;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;

use crate::error::ExecutionError;

/// Outcome of [`ExecutionEngine::place_order`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    pub success: bool,
    pub client_order_id: String,
}

#[derive(Debug, Clone, Copy)]
pub struct ExecutionConfig {
    pub order_insert_timeout: Duration,
    pub order_cancel_timeout: Duration,
    pub cancel_retry_max: u32,
    pub cancel_initial_backoff: Duration,
    pub cancel_max_backoff: Duration,
    pub cancel_wait_ack_timeout: Duration,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            order_insert_timeout: Duration::from_millis(500),
            order_cancel_timeout: Duration::from_millis(500),
            cancel_retry_max: 3,
            cancel_initial_backoff: Duration::from_millis(200),
            cancel_max_backoff: Duration::from_secs(2),
            cancel_wait_ack_timeout: Duration::from_secs(1),
        }
    }
}

/// Composes a [`RiskManager`], the [`BreakerManager`], the [`FlowController`],
/// and the [`SessionManager`] behind the two façade operations the strategy
/// engine actually calls. Order-event ledger writes happen inside
/// `SessionManager` itself, where the real broker-sourced `OrderEvent` is
/// available.
pub struct ExecutionEngine<R: RiskManager> {
    session: Arc<SessionManager>,
    breakers: Arc<BreakerManager>,
    flow: Arc<FlowController>,
    risk: R,
    risk_state: R::State,
    config: ExecutionConfig,
}

impl<R> ExecutionEngine<R>
where
    R: RiskManager,
    R::State: Send + Sync,
{
    pub fn new(
        session: Arc<SessionManager>,
        breakers: Arc<BreakerManager>,
        flow: Arc<FlowController>,
        risk: R,
        risk_state: R::State,
        config: ExecutionConfig,
    ) -> Self {
        Self {
            session,
            breakers,
            flow,
            risk,
            risk_state,
            config,
        }
    }

    /// Validates the intent, runs the delegated risk check, checks the
    /// composite breaker, acquires a flow token, submits through the
    /// session, then persists and records composite success/failure.
    pub async fn place_order(&self, intent: OrderIntent) -> Result<OrderResult, ExecutionError> {
        if intent.account_id.is_empty() {
            return Err(ExecutionError::MissingAccountId);
        }
        if intent.strategy_id.is_empty() {
            return Err(ExecutionError::MissingStrategyId);
        }

        let approved = match self.risk.check(&self.risk_state, intent) {
            Ok(approved) => approved.into_item(),
            Err(refused) => {
                tracing::info!(reason = %refused.reason, "risk check rejected order");
                return Err(ExecutionError::RiskRejected(refused.reason));
            }
        };

        let strategy_id = approved.strategy_id.clone();
        let account_id = approved.account_id.clone();

        if !self.breakers.allow_composite(&strategy_id, &account_id) {
            return Err(ExecutionError::BreakerOpen {
                strategy_id,
                account_id,
            });
        }

        let op = Operation {
            account_id: account_id.clone(),
            kind: OpKind::OrderInsert,
            instrument_id: approved.instrument_id.clone(),
        };
        let flow_result = self
            .flow
            .acquire(&op, self.config.order_insert_timeout)
            .await;
        if !flow_result.allowed {
            self.breakers.record_composite_failure(&strategy_id, &account_id);
            return Err(ExecutionError::FlowRefused(flow_result.reason));
        }

        match self.session.place_order(approved).await {
            Ok(client_order_id) => {
                self.breakers.record_composite_success(&strategy_id, &account_id);
                Ok(OrderResult {
                    success: true,
                    client_order_id,
                })
            }
            Err(err) => {
                self.breakers.record_composite_failure(&strategy_id, &account_id);
                Err(ExecutionError::SubmitFailed(err.to_string()))
            }
        }
    }

    /// Idempotent-if-terminal short-circuit, then up to `cancel_retry_max`
    /// attempts, each gated by a flow token and followed by a bounded
    /// ack-wait poll, with exponential backoff between attempts.
    pub async fn cancel_order(
        &self,
        client_order_id: &str,
        account_id: &str,
        instrument_id: &str,
        trace_id: &str,
    ) -> Result<bool, ExecutionError> {
        if client_order_id.is_empty() {
            return Err(ExecutionError::MissingClientOrderId);
        }
        if self.session.is_order_terminal(client_order_id) {
            return Ok(true);
        }

        // The cancel flow token is acquired on the account scope only
        // (`instrument_id = ""`); the instrument is carried through purely
        // for the log lines below.
        let op = Operation {
            account_id: account_id.to_string(),
            kind: OpKind::OrderCancel,
            instrument_id: String::new(),
        };

        let mut backoff = self.config.cancel_initial_backoff;
        for attempt in 1..=self.config.cancel_retry_max {
            let flow_result = self
                .flow
                .acquire(&op, self.config.order_cancel_timeout)
                .await;
            if !flow_result.allowed {
                tracing::debug!(
                    attempt,
                    client_order_id,
                    instrument_id,
                    "cancel flow token refused, retrying"
                );
                sleep(backoff).await;
                backoff = std::cmp::min(self.config.cancel_max_backoff, backoff * 2);
                continue;
            }

            match self.session.cancel_order(client_order_id, trace_id).await {
                Ok(()) => {
                    let deadline = Instant::now() + self.config.cancel_wait_ack_timeout;
                    self.session.note_cancel_ack_deadline(client_order_id, deadline);
                    let confirmed = self
                        .wait_for_terminal(client_order_id, self.config.cancel_wait_ack_timeout)
                        .await;
                    self.session.clear_cancel_ack_deadline(client_order_id);

                    if confirmed {
                        self.breakers.record_composite_success(
                            &cancel_strategy_scope_key(client_order_id),
                            account_id,
                        );
                        return Ok(true);
                    }
                }
                Err(err) => {
                    tracing::debug!(
                        attempt,
                        %err,
                        client_order_id,
                        instrument_id,
                        "cancel submit failed, retrying"
                    );
                }
            }

            sleep(backoff).await;
            backoff = std::cmp::min(self.config.cancel_max_backoff, backoff * 2);
        }

        self.breakers.record_composite_failure(
            &cancel_strategy_scope_key(client_order_id),
            account_id,
        );
        Ok(false)
    }

    async fn wait_for_terminal(&self, client_order_id: &str, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.session.is_order_terminal(client_order_id) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(Duration::from_millis(10)).await;
        }
    }
}

/// `cancelOrder` only carries `client_order_id`, not the owning strategy --
/// the strategy-scope breaker key for a cancel is the client-order-id
/// itself, so repeated cancel failures for the same order open that one
/// breaker slot rather than polluting a real strategy's key.
fn cancel_strategy_scope_key(client_order_id: &str) -> String {
    format!("cancel:{client_order_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use hft_core::order::{Offset, OrderType, Side};
    use hft_core::session::SessionConfig;
    use hft_risk::{MaxOrderVolume, MaxOrderVolumeManager, NoRiskManager};
    use hft_transport::SimulatedTransport;
    use std::time::Duration as StdDuration;

    fn intent(strategy_id: &str, volume: u32) -> OrderIntent {
        OrderIntent {
            account_id: "acct1".into(),
            client_order_id: String::new(),
            strategy_id: strategy_id.into(),
            instrument_id: "SHFE.ag2406".into(),
            side: Side::Buy,
            offset: Offset::Open,
            order_type: OrderType::Limit,
            volume,
            price: 5000.0,
            trace_id: "t1".into(),
            ts_ns: 1,
        }
    }

    async fn connected_session() -> Arc<SessionManager> {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let session = SessionManager::spawn(Arc::new(SimulatedTransport::default()), 50.0, tx, None);
        let mut config = SessionConfig::default();
        config.connect_timeout = StdDuration::from_millis(500);
        assert!(session.connect(config).await);
        session
    }

    fn engine(
        session: Arc<SessionManager>,
    ) -> ExecutionEngine<NoRiskManager> {
        ExecutionEngine::new(
            session,
            Arc::new(BreakerManager::new(
                Default::default(),
                Default::default(),
                Default::default(),
            )),
            Arc::new(FlowController::new()),
            NoRiskManager,
            (),
            ExecutionConfig::default(),
        )
    }

    #[tokio::test]
    async fn place_order_succeeds_against_simulated_transport() {
        let session = connected_session().await;
        let eng = engine(session);
        let result = eng.place_order(intent("strat1", 1)).await.unwrap();
        assert!(result.success);
        assert!(!result.client_order_id.is_empty());
    }

    #[tokio::test]
    async fn place_order_rejects_missing_account_id() {
        let session = connected_session().await;
        let eng = engine(session);
        let mut bad = intent("strat1", 1);
        bad.account_id.clear();
        assert!(matches!(
            eng.place_order(bad).await,
            Err(ExecutionError::MissingAccountId)
        ));
    }

    #[tokio::test]
    async fn place_order_rejects_over_risk_limit() {
        let session = connected_session().await;
        let eng = ExecutionEngine::new(
            session,
            Arc::new(BreakerManager::new(
                Default::default(),
                Default::default(),
                Default::default(),
            )),
            Arc::new(FlowController::new()),
            MaxOrderVolumeManager::new(MaxOrderVolume::new(Some(5))),
            (),
            ExecutionConfig::default(),
        );
        let result = eng.place_order(intent("strat1", 50)).await;
        assert!(matches!(result, Err(ExecutionError::RiskRejected(_))));
    }

    #[tokio::test]
    async fn cancel_unknown_order_exhausts_retries_and_fails() {
        let session = connected_session().await;
        let mut cfg = ExecutionConfig::default();
        cfg.cancel_retry_max = 1;
        cfg.cancel_initial_backoff = StdDuration::from_millis(5);
        let eng = ExecutionEngine::new(
            session,
            Arc::new(BreakerManager::new(
                Default::default(),
                Default::default(),
                Default::default(),
            )),
            Arc::new(FlowController::new()),
            NoRiskManager,
            (),
            cfg,
        );
        let ok = eng
            .cancel_order("does-not-exist", "acct1", "SHFE.ag2406", "t1")
            .await
            .unwrap();
        assert!(!ok);
    }

    #[tokio::test]
    async fn cancel_after_place_round_trips() {
        let session = connected_session().await;
        let eng = engine(session);
        let placed = eng.place_order(intent("strat1", 1)).await.unwrap();
        let ok = eng
            .cancel_order(&placed.client_order_id, "acct1", "SHFE.ag2406", "t1")
            .await
            .unwrap();
        assert!(ok);
    }
}
