//! Async query wrappers over the query scheduler: acquire a `Query` flow
//! token, enqueue the broker query, then poll a snapshot key in the hash
//! store until its `ts_ns` field advances past the caller's prior value or
//! a 3s deadline elapses.

use std::sync::Arc;
use std::time::{Duration, Instant};

use hft_core::flow::{FlowController, OpKind, Operation};
use hft_core::query_scheduler::QueryPriority;
use hft_session::SessionManager;
use hft_store::HashStore;
use hft_transport::QueryKind;

use crate::error::ExecutionError;

const QUERY_POLL_DEADLINE: Duration = Duration::from_secs(3);
const QUERY_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Wraps one of the broker's `ReqQry*` calls. `hash_key` is the realtime
/// cache key the dispatcher writes the query's snapshot to once the broker
/// responds; `prior_ts_ns` is the caller's last-observed value, typically
/// zero on the first call for a given key.
pub async fn run_query(
    session: &Arc<SessionManager>,
    flow: &FlowController,
    store: &dyn HashStore,
    account_id: &str,
    kind: QueryKind,
    hash_key: &str,
    prior_ts_ns: i64,
    acquire_timeout: Duration,
) -> Result<bool, ExecutionError> {
    let op = Operation {
        account_id: account_id.to_string(),
        kind: OpKind::Query,
        instrument_id: String::new(),
    };
    let flow_result = flow.acquire(&op, acquire_timeout).await;
    if !flow_result.allowed {
        return Err(ExecutionError::FlowRefused(flow_result.reason));
    }

    session.enqueue_query(QueryPriority::Normal, kind);
    Ok(poll_for_advance(store, hash_key, prior_ts_ns, QUERY_POLL_DEADLINE).await)
}

async fn poll_for_advance(
    store: &dyn HashStore,
    hash_key: &str,
    prior_ts_ns: i64,
    deadline_from_now: Duration,
) -> bool {
    let deadline = Instant::now() + deadline_from_now;
    loop {
        let fields = store.hgetall(hash_key).await.unwrap_or_default();
        let advanced = fields
            .get("ts_ns")
            .and_then(|v| v.parse::<i64>().ok())
            .is_some_and(|ts| ts > prior_ts_ns);
        if advanced {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(QUERY_POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hft_core::session::SessionConfig;
    use hft_store::MemoryHashStore;
    use hft_transport::SimulatedTransport;
    use std::collections::HashMap;

    async fn connected_session() -> Arc<SessionManager> {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let session = SessionManager::spawn(Arc::new(SimulatedTransport::default()), 50.0, tx, None);
        let mut config = SessionConfig::default();
        config.connect_timeout = Duration::from_millis(500);
        assert!(session.connect(config).await);
        session
    }

    #[tokio::test]
    async fn query_times_out_when_snapshot_never_advances() {
        let store = MemoryHashStore::new();
        let advanced = poll_for_advance(&store, "quant:rt:order:missing", 0, Duration::from_millis(50)).await;
        assert!(!advanced);
    }

    #[tokio::test]
    async fn query_detects_snapshot_advance() {
        let store = MemoryHashStore::new();
        let mut fields = HashMap::new();
        fields.insert("ts_ns".to_string(), "100".to_string());
        store.hset("quant:rt:order:acct1", fields).await.unwrap();

        let advanced = poll_for_advance(&store, "quant:rt:order:acct1", 50, Duration::from_millis(50)).await;
        assert!(advanced);
    }

    #[tokio::test]
    async fn run_query_enqueues_and_reports_advance() {
        let session = connected_session().await;
        let flow = FlowController::new();
        let store = MemoryHashStore::new();
        let mut fields = HashMap::new();
        fields.insert("ts_ns".to_string(), "1".to_string());
        store.hset("quant:rt:order:acct1", fields).await.unwrap();

        let result = run_query(
            &session,
            &flow,
            &store,
            "acct1",
            QueryKind::Orders,
            "quant:rt:order:acct1",
            0,
            Duration::from_millis(200),
        )
        .await
        .unwrap();
        assert!(result);
    }
}
