//! Persisted handoff preferences.

use std::sync::Arc;

use tracing::warn;

use crate::config::{AUTO_ACCEPT_KEY, LISTENER_ENABLED_KEY};

use super::{KeyValueStore, StorageResult};

/// Typed view over the auto-accept and listener-enabled flags.
#[derive(Clone)]
pub struct SettingsStore {
    kv: Arc<dyn KeyValueStore>,
}

impl SettingsStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Play received songs without asking. Off unless stored as `"true"`.
    pub fn auto_accept(&self) -> bool {
        self.read(AUTO_ACCEPT_KEY).as_deref() == Some("true")
    }

    pub fn set_auto_accept(&self, enabled: bool) -> StorageResult<()> {
        self.kv.set(AUTO_ACCEPT_KEY, bool_str(enabled))
    }

    /// Run the guest listener. On unless stored as `"false"`.
    pub fn listener_enabled(&self) -> bool {
        self.read(LISTENER_ENABLED_KEY).as_deref() != Some("false")
    }

    pub fn set_listener_enabled(&self, enabled: bool) -> StorageResult<()> {
        self.kv.set(LISTENER_ENABLED_KEY, bool_str(enabled))
    }

    fn read(&self, key: &str) -> Option<String> {
        self.kv.get(key).unwrap_or_else(|err| {
            warn!(key, error = %err, "failed to read setting, using default");
            None
        })
    }
}

fn bool_str(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}
