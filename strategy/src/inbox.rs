//! Intent inbox: decodes `strategy:intent:<strategyId>:latest` hash reads
//! into [`StrategyIntentBatch`]es, gated by a monotonic per-strategy seq.

use std::collections::HashMap;
use std::sync::Arc;

use hft_core::order::{Offset, Side};
use hft_store::HashStore;
use parking_lot::Mutex;

use crate::error::InboxError;
use crate::types::{SignalIntent, StrategyIntentBatch};

fn parse_side(raw: &str, idx: usize) -> Result<Side, InboxError> {
    match raw {
        "BUY" => Ok(Side::Buy),
        "SELL" => Ok(Side::Sell),
        other => Err(InboxError::UnknownSide(other.to_string(), idx)),
    }
}

fn parse_offset(raw: &str, idx: usize) -> Result<Offset, InboxError> {
    match raw {
        "OPEN" => Ok(Offset::Open),
        "CLOSE" => Ok(Offset::Close),
        "CLOSETODAY" => Ok(Offset::CloseToday),
        "CLOSEYESTERDAY" => Ok(Offset::CloseYesterday),
        other => Err(InboxError::UnknownOffset(other.to_string(), idx)),
    }
}

/// Decodes one `instrument|side|offset|volume|price|tsNs|traceId` tuple.
fn parse_intent_field(
    strategy_id: &str,
    raw: &str,
    idx: usize,
) -> Result<SignalIntent, InboxError> {
    let parts: Vec<&str> = raw.split('|').collect();
    if parts.len() != 7 {
        return Err(InboxError::MissingField("intent_i", idx));
    }
    let [instrument, side, offset, volume, price, ts_ns, trace_id] = parts[..] else {
        return Err(InboxError::MissingField("intent_i", idx));
    };
    let volume: u32 = volume
        .parse()
        .map_err(|_| InboxError::InvalidVolume(volume.to_string(), idx))?;
    let limit_price: f64 = price
        .parse()
        .map_err(|_| InboxError::InvalidPrice(price.to_string(), idx))?;
    let ts_ns: i64 = ts_ns.parse().unwrap_or(0);

    Ok(SignalIntent {
        strategy_id: strategy_id.to_string(),
        instrument_id: instrument.to_string(),
        side: parse_side(side, idx)?,
        offset: parse_offset(offset, idx)?,
        volume,
        limit_price,
        ts_ns,
        trace_id: trace_id.to_string(),
    })
}

/// Reads and decodes `strategy:intent:<strategyId>:latest` hashes, gating on
/// a monotonically non-decreasing per-strategy seq: a stale or repeated seq
/// short-circuits to an empty batch *before* any `intent_i` field is
/// decoded, so a stale hash's malformed fields never surface as a decode
/// error.
pub struct IntentInbox {
    store: Arc<dyn HashStore>,
    last_seen: Mutex<HashMap<String, u64>>,
}

impl IntentInbox {
    pub fn new(store: Arc<dyn HashStore>) -> Self {
        Self {
            store,
            last_seen: Mutex::new(HashMap::new()),
        }
    }

    pub async fn read_latest(&self, strategy_id: &str) -> Result<StrategyIntentBatch, InboxError> {
        let key = format!("strategy:intent:{strategy_id}:latest");
        let fields = self.store.hgetall(&key).await?;

        let seq: u64 = match fields.get("seq") {
            Some(raw) => raw
                .parse()
                .map_err(|_| InboxError::InvalidSeq(raw.clone()))?,
            None => return Ok(StrategyIntentBatch {
                strategy_id: strategy_id.to_string(),
                ..Default::default()
            }),
        };

        let last_seen = *self.last_seen.lock().get(strategy_id).unwrap_or(&0);
        if seq <= last_seen {
            return Ok(StrategyIntentBatch {
                strategy_id: strategy_id.to_string(),
                seq,
                ..Default::default()
            });
        }

        let count: usize = match fields.get("count") {
            Some(raw) => raw
                .parse()
                .map_err(|_| InboxError::InvalidCount(raw.clone()))?,
            None => 0,
        };
        let ts_ns: i64 = fields
            .get("ts_ns")
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(0);

        let mut intents = Vec::with_capacity(count);
        for i in 0..count {
            let field_name = format!("intent_{i}");
            let raw = fields
                .get(&field_name)
                .ok_or(InboxError::MissingField("intent_i", i))?;
            intents.push(parse_intent_field(strategy_id, raw, i)?);
        }

        self.last_seen.lock().insert(strategy_id.to_string(), seq);

        Ok(StrategyIntentBatch {
            strategy_id: strategy_id.to_string(),
            seq,
            ts_ns,
            intents,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hft_store::MemoryHashStore;
    use std::collections::HashMap as StdHashMap;

    fn fields(pairs: &[(&str, &str)]) -> StdHashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    async fn seed(store: &MemoryHashStore, strategy_id: &str, seq: u64, intent: &str) {
        store
            .hset(
                &format!("strategy:intent:{strategy_id}:latest"),
                fields(&[
                    ("seq", &seq.to_string()),
                    ("count", "1"),
                    ("ts_ns", "123"),
                    ("intent_0", intent),
                ]),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn monotonic_seq_gate_yields_empty_on_repeat() {
        let store = Arc::new(MemoryHashStore::new());
        let inbox = IntentInbox::new(store.clone());

        seed(&store, "s1", 1, "SHFE.ag2406|BUY|OPEN|2|4500.0|123|trace-1").await;
        let first = inbox.read_latest("s1").await.unwrap();
        assert_eq!(first.seq, 1);
        assert_eq!(first.intents.len(), 1);
        assert_eq!(first.intents[0].trace_id, "trace-1");

        let second = inbox.read_latest("s1").await.unwrap();
        assert_eq!(second.seq, 1);
        assert!(second.intents.is_empty());

        seed(&store, "s1", 2, "SHFE.ag2406|BUY|OPEN|2|4500.0|456|trace-2").await;
        let third = inbox.read_latest("s1").await.unwrap();
        assert_eq!(third.seq, 2);
        assert_eq!(third.intents[0].trace_id, "trace-2");
    }

    #[tokio::test]
    async fn stale_batch_short_circuits_before_decoding_malformed_fields() {
        let store = Arc::new(MemoryHashStore::new());
        let inbox = IntentInbox::new(store.clone());

        seed(&store, "s1", 5, "SHFE.ag2406|BUY|OPEN|2|4500.0|123|trace-1").await;
        inbox.read_latest("s1").await.unwrap();

        // stale hash with malformed fields: must not surface as an error
        seed(&store, "s1", 5, "not-enough-fields").await;
        let result = inbox.read_latest("s1").await.unwrap();
        assert_eq!(result.seq, 5);
        assert!(result.intents.is_empty());
    }

    #[tokio::test]
    async fn unknown_side_is_a_hard_error_on_fresh_batch() {
        let store = Arc::new(MemoryHashStore::new());
        let inbox = IntentInbox::new(store.clone());
        seed(&store, "s1", 1, "SHFE.ag2406|HOLD|OPEN|2|4500.0|123|trace-1").await;
        assert!(inbox.read_latest("s1").await.is_err());
    }
}
