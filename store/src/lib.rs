//! # Store - realtime cache and ledger collaborator contracts
//!
//! Two trait boundaries the core relies on without depending on a concrete
//! driver: [`HashStore`] (realtime cache, Redis-shaped) and [`LedgerStore`]
//! (append-only time-series, idempotent on a caller-supplied key). Both
//! ship an in-memory implementation so the rest of the workspace is fully
//! exercisable without external services.

mod error;
mod hash;
mod ledger;

pub use error::StoreError;
pub use hash::{HashStore, MemoryHashStore};
pub use ledger::{LedgerRecord, LedgerStore, MemoryLedgerStore};
