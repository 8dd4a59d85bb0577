//! Strike Ledger
//!
//! Persists the learner's strike count and ban state per course, behind a
//! small key-value port so the same logic runs against a file, a browser
//! storage bridge, or an in-memory fake.

mod ledger;
mod store;

pub use ledger::{BanRecord, LedgerPolicy, SessionKeys, StrikeLedger, StrikeOutcome};
pub use store::{FileStore, KeyValueStore, MemoryStore};

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage I/O error: {0}")]
    Io(String),
    #[error("Lock error: {0}")]
    Lock(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
