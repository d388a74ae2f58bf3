//! # Handoff Configuration & Constants
//!
//! Every protocol constant lives here, next to [`NfcConfig`], the explicit
//! configuration value handed to the orchestrators at construction time.
//! Nothing in this crate reads configuration from ambient global state; a
//! change goes through [`NfcConfig::apply`] with an [`NfcConfigUpdate`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Wire Defaults
// ---------------------------------------------------------------------------

/// URI scheme the app registers for deep links.
pub const DEFAULT_APP_SCHEME: &str = "beatit";

/// URI host segment of the handoff link.
pub const DEFAULT_APP_HOST: &str = "nfc";

/// URI path of the handoff link. Always starts with `/`.
pub const DEFAULT_APP_PATH: &str = "/pair";

/// MIME type of the JSON record form.
pub const DEFAULT_MIME_TYPE: &str = "application/beatit.nfc";

/// Package named by the app-identity (AAR) record.
pub const DEFAULT_APP_PACKAGE: &str = "com.anonymous.beatit";

/// Token lifetime: two minutes from creation.
pub const DEFAULT_EXPIRY_DURATION_MS: u64 = 120_000;

// ---------------------------------------------------------------------------
// Crypto Parameters
// ---------------------------------------------------------------------------

/// Length of the ephemeral signing secret before transport encoding.
pub const EPHEMERAL_SECRET_LENGTH: usize = 32;

/// Field separator of the canonical signing string `session|songId|expiry`.
pub const SIGNING_FIELD_SEPARATOR: char = '|';

// ---------------------------------------------------------------------------
// Replay Protection & Persisted Keys
// ---------------------------------------------------------------------------

/// Maximum number of consumed session ids remembered across restarts.
/// Older sessions fall out first and could be replayed if still unexpired.
pub const MAX_STORED_SESSIONS: usize = 100;

/// Key holding the JSON array of consumed session ids.
pub const USED_SESSIONS_KEY: &str = "nfc_used_sessions";

/// Key holding `"true"` / `"false"` for auto-playing received songs.
pub const AUTO_ACCEPT_KEY: &str = "nfc_auto_accept";

/// Key holding `"true"` / `"false"` for the guest listener preference.
pub const LISTENER_ENABLED_KEY: &str = "nfc_enabled";

// ---------------------------------------------------------------------------
// Host Timings
// ---------------------------------------------------------------------------

/// Pause between stopping the listener and starting a write, so the
/// platform has released the radio.
pub const LISTENER_RELEASE_DELAY: Duration = Duration::from_millis(300);

/// How long `success` and `error` stay visible before resetting to `idle`.
pub const TERMINAL_DISPLAY_DELAY: Duration = Duration::from_millis(2_000);

/// How long `cancelled` stays visible before resetting to `idle`.
pub const CANCELLED_DISPLAY_DELAY: Duration = Duration::from_millis(1_000);

/// Default deadline for the guest tap during a share.
pub const DEFAULT_SHARE_WAIT: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// NfcConfig
// ---------------------------------------------------------------------------

/// Which payload record the host writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordFormat {
    /// Well-known URI record carrying `scheme://host/path?query`.
    #[default]
    Uri,
    /// MIME record carrying the flat JSON payload.
    Mime,
}

impl std::str::FromStr for RecordFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "uri" => Ok(Self::Uri),
            "mime" | "json" => Ok(Self::Mime),
            other => Err(format!("unknown record format: {other}")),
        }
    }
}

/// Process-wide handoff configuration.
///
/// Supplied once at startup and owned by the orchestrators. Deserializes
/// from partial documents: missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NfcConfig {
    /// Deep-link scheme, e.g. `beatit`.
    pub app_scheme: String,
    /// Deep-link host, e.g. `nfc`.
    pub app_host: String,
    /// Deep-link path, e.g. `/pair`.
    pub app_path: String,
    /// Media type of the JSON record form.
    pub mime_type: String,
    /// Token lifetime in milliseconds.
    pub expiry_duration_ms: u64,
    /// Whether the host signs payloads at all.
    pub enable_signature: bool,
    /// Application package written into the app-identity record.
    pub app_package: String,
    /// Payload record written by the host.
    pub record_format: RecordFormat,
}

impl Default for NfcConfig {
    fn default() -> Self {
        Self {
            app_scheme: DEFAULT_APP_SCHEME.to_string(),
            app_host: DEFAULT_APP_HOST.to_string(),
            app_path: DEFAULT_APP_PATH.to_string(),
            mime_type: DEFAULT_MIME_TYPE.to_string(),
            expiry_duration_ms: DEFAULT_EXPIRY_DURATION_MS,
            enable_signature: true,
            app_package: DEFAULT_APP_PACKAGE.to_string(),
            record_format: RecordFormat::Uri,
        }
    }
}

impl NfcConfig {
    /// `scheme://host/path` - the prefix every handoff link starts with.
    pub fn link_prefix(&self) -> String {
        format!("{}://{}{}", self.app_scheme, self.app_host, self.app_path)
    }

    /// Apply an explicit partial update. Fields left as `None` are kept.
    pub fn apply(&mut self, update: NfcConfigUpdate) {
        if let Some(scheme) = update.app_scheme {
            self.app_scheme = scheme;
        }
        if let Some(host) = update.app_host {
            self.app_host = host;
        }
        if let Some(path) = update.app_path {
            self.app_path = path;
        }
        if let Some(mime) = update.mime_type {
            self.mime_type = mime;
        }
        if let Some(expiry) = update.expiry_duration_ms {
            self.expiry_duration_ms = expiry;
        }
        if let Some(sign) = update.enable_signature {
            self.enable_signature = sign;
        }
        if let Some(package) = update.app_package {
            self.app_package = package;
        }
        if let Some(format) = update.record_format {
            self.record_format = format;
        }
    }

    /// Builder-style variant of [`apply`](Self::apply).
    pub fn with(mut self, update: NfcConfigUpdate) -> Self {
        self.apply(update);
        self
    }
}

/// Partial update of [`NfcConfig`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NfcConfigUpdate {
    pub app_scheme: Option<String>,
    pub app_host: Option<String>,
    pub app_path: Option<String>,
    pub mime_type: Option<String>,
    pub expiry_duration_ms: Option<u64>,
    pub enable_signature: Option<bool>,
    pub app_package: Option<String>,
    pub record_format: Option<RecordFormat>,
}

// ---------------------------------------------------------------------------
// ShareTimings
// ---------------------------------------------------------------------------

/// Durations used by the host share flow and the listener handoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShareTimings {
    /// Wait after stopping the listener before writing.
    pub listener_release_delay: Duration,
    /// Display time of `success` before the reset to `idle`.
    pub success_display: Duration,
    /// Display time of `error` before the reset to `idle`.
    pub error_display: Duration,
    /// Display time of `cancelled` before the reset to `idle`.
    pub cancelled_display: Duration,
    /// Caller deadline for the tap. `None` waits for the binding.
    pub wait_timeout: Option<Duration>,
}

impl Default for ShareTimings {
    fn default() -> Self {
        Self {
            listener_release_delay: LISTENER_RELEASE_DELAY,
            success_display: TERMINAL_DISPLAY_DELAY,
            error_display: TERMINAL_DISPLAY_DELAY,
            cancelled_display: CANCELLED_DISPLAY_DELAY,
            wait_timeout: Some(DEFAULT_SHARE_WAIT),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_wire_format() {
        let config = NfcConfig::default();
        assert_eq!(config.link_prefix(), "beatit://nfc/pair");
        assert_eq!(config.mime_type, "application/beatit.nfc");
        assert_eq!(config.expiry_duration_ms, 120_000);
        assert!(config.enable_signature);
        assert_eq!(config.record_format, RecordFormat::Uri);
    }

    #[test]
    fn apply_only_touches_given_fields() {
        let mut config = NfcConfig::default();
        config.apply(NfcConfigUpdate {
            enable_signature: Some(false),
            expiry_duration_ms: Some(5_000),
            ..Default::default()
        });

        assert!(!config.enable_signature);
        assert_eq!(config.expiry_duration_ms, 5_000);
        assert_eq!(config.app_scheme, DEFAULT_APP_SCHEME);
        assert_eq!(config.app_package, DEFAULT_APP_PACKAGE);
    }

    #[test]
    fn partial_document_uses_defaults() {
        let config: NfcConfig =
            serde_json::from_str(r#"{"app_scheme":"tunes","record_format":"mime"}"#).unwrap();
        assert_eq!(config.app_scheme, "tunes");
        assert_eq!(config.record_format, RecordFormat::Mime);
        assert_eq!(config.app_host, DEFAULT_APP_HOST);
        assert_eq!(config.expiry_duration_ms, DEFAULT_EXPIRY_DURATION_MS);
    }

    #[test]
    fn record_format_parses_case_insensitively() {
        assert_eq!("URI".parse::<RecordFormat>(), Ok(RecordFormat::Uri));
        assert_eq!("json".parse::<RecordFormat>(), Ok(RecordFormat::Mime));
        assert!("nfc-a".parse::<RecordFormat>().is_err());
    }

    #[test]
    fn release_delay_shorter_than_displays() {
        let timings = ShareTimings::default();
        assert!(timings.listener_release_delay < timings.cancelled_display);
        assert!(timings.cancelled_display < timings.success_display);
    }
}
