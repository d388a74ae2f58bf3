//! Replay protection: the bounded record of consumed sessions.
//!
//! Sessions are kept oldest-first in a deque capped at
//! [`MAX_STORED_SESSIONS`]. Inserting past the cap evicts from the front.
//! An evicted session is no longer recognised, so a token that is still
//! unexpired could be replayed after a hundred newer ones were accepted.
//!
//! The list is loaded from the key/value store on first use and written back
//! synchronously after every insertion. Storage failures are logged and
//! treated as an empty list or a missed write; they never fail validation.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::config::{MAX_STORED_SESSIONS, USED_SESSIONS_KEY};

use super::KeyValueStore;

pub struct ReplaySessionStore {
    kv: Arc<dyn KeyValueStore>,
    capacity: usize,
    /// `None` until the first access loads the persisted list.
    sessions: Mutex<Option<VecDeque<String>>>,
}

impl ReplaySessionStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self::with_capacity(kv, MAX_STORED_SESSIONS)
    }

    /// A store remembering at most `capacity` sessions (minimum one).
    pub fn with_capacity(kv: Arc<dyn KeyValueStore>, capacity: usize) -> Self {
        Self {
            kv,
            capacity: capacity.max(1),
            sessions: Mutex::new(None),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Lock the store for a check-then-mark sequence.
    ///
    /// While the guard lives no other caller can read or mark sessions, so a
    /// validation holding it cannot race another validation of the same
    /// session.
    pub fn lock(&self) -> ReplayGuard<'_> {
        let sessions = MutexGuard::map(self.sessions.lock(), |slot| {
            slot.get_or_insert_with(|| self.load())
        });
        ReplayGuard {
            kv: self.kv.as_ref(),
            capacity: self.capacity,
            sessions,
        }
    }

    pub fn is_used(&self, session: &str) -> bool {
        self.lock().is_used(session)
    }

    pub fn mark_used(&self, session: &str) {
        self.lock().mark_used(session);
    }

    /// Forget every session, in memory and in storage.
    pub fn clear(&self) {
        let mut guard = self.lock();
        guard.sessions.clear();
        if let Err(err) = self.kv.remove(USED_SESSIONS_KEY) {
            warn!(error = %err, "failed to clear used sessions");
        }
    }

    pub fn len(&self) -> usize {
        self.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remembered sessions, oldest first.
    pub fn sessions(&self) -> Vec<String> {
        self.lock().sessions.iter().cloned().collect()
    }

    fn load(&self) -> VecDeque<String> {
        let stored = match self.kv.get(USED_SESSIONS_KEY) {
            Ok(Some(json)) => json,
            Ok(None) => return VecDeque::new(),
            Err(err) => {
                warn!(error = %err, "failed to load used sessions, starting empty");
                return VecDeque::new();
            }
        };

        match serde_json::from_str::<Vec<String>>(&stored) {
            Ok(list) => {
                let skip = list.len().saturating_sub(self.capacity);
                let sessions: VecDeque<String> = list.into_iter().skip(skip).collect();
                debug!(count = sessions.len(), "loaded used sessions");
                sessions
            }
            Err(err) => {
                warn!(error = %err, "stored used sessions are corrupt, starting empty");
                VecDeque::new()
            }
        }
    }
}

impl std::fmt::Debug for ReplaySessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplaySessionStore")
            .field("capacity", &self.capacity)
            .field("loaded", &self.sessions.try_lock().map(|slot| slot.is_some()))
            .finish()
    }
}

/// Exclusive access to the loaded session list. See [`ReplaySessionStore::lock`].
pub struct ReplayGuard<'a> {
    kv: &'a dyn KeyValueStore,
    capacity: usize,
    sessions: MappedMutexGuard<'a, VecDeque<String>>,
}

impl ReplayGuard<'_> {
    pub fn is_used(&self, session: &str) -> bool {
        self.sessions.iter().any(|s| s == session)
    }

    /// Record `session`, evict the oldest entries over capacity and persist.
    pub fn mark_used(&mut self, session: &str) {
        if self.is_used(session) {
            return;
        }
        self.sessions.push_back(session.to_string());
        while self.sessions.len() > self.capacity {
            if let Some(evicted) = self.sessions.pop_front() {
                debug!(session = %evicted, "evicted oldest used session");
            }
        }
        self.persist();
    }

    fn persist(&self) {
        let list: Vec<&String> = self.sessions.iter().collect();
        let result = serde_json::to_string(&list)
            .map_err(|err| err.to_string())
            .and_then(|json| {
                self.kv
                    .set(USED_SESSIONS_KEY, &json)
                    .map_err(|err| err.to_string())
            });
        if let Err(err) = result {
            warn!(error = %err, "failed to persist used sessions");
        }
    }
}
