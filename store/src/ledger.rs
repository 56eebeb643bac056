use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreError;

/// One row destined for an append-only ledger table (`order_events`,
/// `trade_events`, `market_snapshots`, `risk_decisions`, `account_snapshots`,
/// `position_snapshots`, `replay_offsets`).
///
/// `idempotency_key` is caller-built; for `order_events`/`trade_events` its
/// shape is fixed as
/// `client_order_id|event_source|ts_ns|filled_volume|trade_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub table: String,
    pub idempotency_key: String,
    pub ts_ns: i64,
    pub payload: Value,
}

/// Time-series/ledger contract. A duplicate `idempotency_key` within the
/// same table is treated as success (debug-logged, not an error) rather
/// than surfaced as a conflict.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn append(&self, record: LedgerRecord) -> Result<(), StoreError>;
    async fn is_healthy(&self) -> bool;
}

/// In-memory [`LedgerStore`]. A real deployment would back this with a
/// TimescaleDB/Postgres driver behind the same trait; that client is
/// deliberately outside this crate's dependency stack.
#[derive(Default)]
pub struct MemoryLedgerStore {
    rows: Mutex<HashMap<String, Vec<LedgerRecord>>>,
    seen: Mutex<HashSet<(String, String)>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every row appended to `table`, in append order. Useful
    /// for in-process testing; a real ledger would expose this via a query,
    /// not a method.
    pub fn rows_for(&self, table: &str) -> Vec<LedgerRecord> {
        self.rows.lock().get(table).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn append(&self, record: LedgerRecord) -> Result<(), StoreError> {
        let dedup_key = (record.table.clone(), record.idempotency_key.clone());
        let mut seen = self.seen.lock();
        if !seen.insert(dedup_key) {
            tracing::debug!(
                table = %record.table,
                idempotency_key = %record.idempotency_key,
                "duplicate ledger append treated as success"
            );
            return Ok(());
        }
        drop(seen);
        self.rows
            .lock()
            .entry(record.table.clone())
            .or_default()
            .push(record);
        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(table: &str, key: &str) -> LedgerRecord {
        LedgerRecord {
            table: table.to_string(),
            idempotency_key: key.to_string(),
            ts_ns: 1,
            payload: serde_json::json!({"status": "Filled"}),
        }
    }

    #[tokio::test]
    async fn duplicate_idempotency_key_is_not_appended_twice() {
        let store = MemoryLedgerStore::new();
        store.append(record("order_events", "c1|OnRtnOrder|1|0|")).await.unwrap();
        store.append(record("order_events", "c1|OnRtnOrder|1|0|")).await.unwrap();
        assert_eq!(store.rows_for("order_events").len(), 1);
    }

    #[tokio::test]
    async fn distinct_keys_both_appended() {
        let store = MemoryLedgerStore::new();
        store.append(record("order_events", "c1|OnRtnOrder|1|0|")).await.unwrap();
        store.append(record("order_events", "c1|OnRtnTrade|2|1|t1")).await.unwrap();
        assert_eq!(store.rows_for("order_events").len(), 2);
    }
}
