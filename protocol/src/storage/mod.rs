//! # Storage Module
//!
//! The platform's opaque key/value store and the two things the handoff
//! keeps in it.
//!
//! ```text
//! KeyValueStore  - get / set / remove of string values
//!   ├─ MemoryStore   in-process map, tests and demos
//!   └─ SledStore     sled tree on disk, flushed after every write
//!
//! ReplaySessionStore - capped FIFO of consumed session ids
//! SettingsStore      - auto-accept and listener preferences
//! ```
//!
//! | Key                 | Value                              |
//! |---------------------|------------------------------------|
//! | `nfc_used_sessions` | JSON array of session ids, max 100 |
//! | `nfc_auto_accept`   | `"true"` / `"false"`               |
//! | `nfc_enabled`       | `"true"` / `"false"`               |
//!
//! Persistence is best effort. The stores built on top log storage failures
//! and carry on; only explicit preference writes report them.

pub mod replay;
pub mod settings;
pub mod sled_store;

pub use replay::{ReplayGuard, ReplaySessionStore};
pub use settings::SettingsStore;
pub use sled_store::SledStore;

use std::collections::HashMap;

use parking_lot::RwLock;
use thiserror::Error;

/// Errors from a key/value backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("value stored under {key} is not valid UTF-8")]
    Encoding { key: String },

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// String key/value persistence, as provided by the platform.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    fn remove(&self, key: &str) -> StorageResult<()>;
}

/// In-memory [`KeyValueStore`]. Contents are lost with the value.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_crud() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").unwrap(), None);
        store.set("k", "v1").unwrap();
        store.set("k", "v2").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v2"));
        store.remove("k").unwrap();
        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }
}
