//! sled-backed [`KeyValueStore`].
//!
//! All values live in one tree, `settings`, keyed by the UTF-8 key name.
//! Every write is flushed before returning so a consumed session survives a
//! crash right after validation.

use std::path::Path;

use sled::{Db, Tree};

use super::{KeyValueStore, StorageError, StorageResult};

const SETTINGS_TREE: &str = "settings";

#[derive(Debug, Clone)]
pub struct SledStore {
    db: Db,
    settings: Tree,
}

impl SledStore {
    /// Open or create a store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        Self::from_db(sled::open(path)?)
    }

    /// A store that is deleted when dropped. No filesystem cleanup needed.
    pub fn open_temporary() -> StorageResult<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> StorageResult<Self> {
        let settings = db.open_tree(SETTINGS_TREE)?;
        Ok(Self { db, settings })
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.settings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.settings.is_empty()
    }
}

impl KeyValueStore for SledStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        match self.settings.get(key.as_bytes())? {
            Some(bytes) => String::from_utf8(bytes.to_vec())
                .map(Some)
                .map_err(|_| StorageError::Encoding {
                    key: key.to_string(),
                }),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.settings.insert(key.as_bytes(), value.as_bytes())?;
        self.db.flush()?;
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.settings.remove(key.as_bytes())?;
        self.db.flush()?;
        Ok(())
    }
}
