//! # NFC Radio
//!
//! The platform binding the orchestrators drive, and the arbitration that
//! keeps them from driving it at the same time.
//!
//! A binding runs one technology request at a time. Issuing a second request
//! while one is outstanding is a caller error, so callers take a
//! [`RadioLease`] from the shared [`RadioArbiter`] before touching the radio
//! and hold it for as long as they listen or write.

pub mod arbiter;
pub mod loopback;

pub use arbiter::{RadioArbiter, RadioLease};
pub use loopback::{LoopbackRadio, WriteBehavior};

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::ndef::NdefRecord;

/// Errors reported by a radio binding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RadioError {
    #[error("NFC is not supported")]
    NotSupported,

    #[error("NFC is disabled")]
    Disabled,

    #[error("another NFC request is in progress")]
    Busy,

    #[error("NFC request timed out")]
    Timeout,

    #[error("NFC request cancelled")]
    Cancelled,

    #[error("no NFC tag in range")]
    NoTag,

    /// Anything else, with the platform's own message.
    #[error("{0}")]
    Platform(String),
}

impl RadioError {
    /// `true` when the failure is the user (or app) aborting the request.
    ///
    /// Platforms report this inconsistently, so a platform message that
    /// mentions cancelling counts too.
    pub fn is_cancellation(&self) -> bool {
        match self {
            RadioError::Cancelled => true,
            RadioError::Platform(message) => message.to_ascii_lowercase().contains("cancel"),
            _ => false,
        }
    }
}

pub type RadioResult<T> = Result<T, RadioError>;

/// A tag seen by the discovery handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredTag {
    /// Hardware identifier, if the platform reports one.
    pub id: Option<Vec<u8>>,
    pub records: Vec<NdefRecord>,
}

/// Callback invoked by the binding for every discovered tag.
pub type DiscoveryHandler = Arc<dyn Fn(DiscoveredTag) + Send + Sync>;

/// Who is using the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RadioUser {
    /// Guest listener waiting for tags.
    Listener,
    /// Host share writing a tag.
    Writer,
    /// One-shot guest read.
    Reader,
}

impl fmt::Display for RadioUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RadioUser::Listener => write!(f, "listener"),
            RadioUser::Writer => write!(f, "writer"),
            RadioUser::Reader => write!(f, "reader"),
        }
    }
}

/// The platform NFC binding.
#[async_trait]
pub trait NfcRadio: Send + Sync {
    /// Whether the device has NFC hardware at all.
    async fn is_supported(&self) -> bool;

    /// Whether NFC is switched on in the device settings.
    async fn is_enabled(&self) -> bool;

    /// Initialise the binding. Safe to call more than once.
    async fn start(&self) -> RadioResult<()>;

    /// Write one NDEF message. Resolves when a tag has been written, or
    /// fails with [`RadioError::Cancelled`] after [`cancel`](Self::cancel).
    async fn request_write(&self, records: &[NdefRecord]) -> RadioResult<()>;

    /// Read the NDEF message of the tag in range.
    async fn request_read(&self) -> RadioResult<Vec<NdefRecord>>;

    /// Start delivering discovered tags to `handler`.
    async fn register_discovery(&self, handler: DiscoveryHandler) -> RadioResult<()>;

    async fn unregister_discovery(&self) -> RadioResult<()>;

    /// Abort the outstanding request, if any.
    async fn cancel(&self) -> RadioResult<()>;

    /// Open the OS NFC settings screen.
    async fn open_settings(&self) -> RadioResult<()> {
        Err(RadioError::Platform(
            "this platform has no NFC settings screen".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_detection() {
        assert!(RadioError::Cancelled.is_cancellation());
        assert!(RadioError::Platform("UserCancel".into()).is_cancellation());
        assert!(RadioError::Platform("request was cancelled".into()).is_cancellation());
        assert!(!RadioError::Platform("tag lost".into()).is_cancellation());
        assert!(!RadioError::Timeout.is_cancellation());
    }

    #[test]
    fn user_display() {
        assert_eq!(RadioUser::Writer.to_string(), "writer");
    }
}
