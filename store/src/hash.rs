use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::StoreError;

/// Realtime-cache contract: `HSET`/`HGETALL`/`EXPIRE`/`PING` over opaque
/// string fields, matching the Redis hash-store shape used for
/// `market:tick:<instrument>:latest`, `quant:rt:order:<clientOrderId>`,
/// `position:<accountId>:<instrumentId>`, `strategy:intent:<strategyId>:latest`,
/// `strategy_state:<accountId>:<strategyId>`.
#[async_trait]
pub trait HashStore: Send + Sync {
    async fn hset(&self, key: &str, fields: HashMap<String, String>) -> Result<(), StoreError>;
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError>;
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;
    async fn ping(&self) -> Result<(), StoreError>;
}

struct Entry {
    fields: HashMap<String, String>,
    expires_at: Option<Instant>,
}

/// In-memory [`HashStore`]. A real deployment would back this with a Redis
/// driver behind the same trait; that client is deliberately outside this
/// crate's dependency stack.
#[derive(Default)]
pub struct MemoryHashStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryHashStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_live(entry: &Entry) -> bool {
        entry.expires_at.is_none_or(|at| Instant::now() < at)
    }
}

#[async_trait]
impl HashStore for MemoryHashStore {
    async fn hset(&self, key: &str, fields: HashMap<String, String>) -> Result<(), StoreError> {
        let mut entries = self.entries.lock();
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            fields: HashMap::new(),
            expires_at: None,
        });
        entry.fields.extend(fields);
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if Self::is_live(entry) => Ok(entry.fields.clone()),
            Some(_) => {
                entries.remove(key);
                Ok(HashMap::new())
            }
            None => Ok(HashMap::new()),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut entries = self.entries.lock();
        match entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(())
            }
            None => Err(StoreError::NotFound(key.to_string())),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn hset_then_hgetall_roundtrips() {
        let store = MemoryHashStore::new();
        store
            .hset("market:tick:SHFE.ag2406:latest", fields(&[("last_price", "4500.1")]))
            .await
            .unwrap();
        let got = store.hgetall("market:tick:SHFE.ag2406:latest").await.unwrap();
        assert_eq!(got.get("last_price"), Some(&"4500.1".to_string()));
    }

    #[tokio::test]
    async fn expired_key_returns_empty() {
        let store = MemoryHashStore::new();
        store.hset("k", fields(&[("a", "1")])).await.unwrap();
        store.expire("k", Duration::from_millis(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let got = store.hgetall("k").await.unwrap();
        assert!(got.is_empty());
    }

    #[tokio::test]
    async fn expire_missing_key_is_not_found() {
        let store = MemoryHashStore::new();
        assert!(store.expire("missing", Duration::from_secs(1)).await.is_err());
    }
}
