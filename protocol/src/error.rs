//! Crate-wide error taxonomy.
//!
//! Validation failures travel as [`ValidationResult`](crate::ValidationResult)
//! values inside the guest pipeline and only become an [`NfcError`] at the
//! coordinator boundary. Radio failures are mapped here so the app can tell
//! a user cancellation from a real fault.

use thiserror::Error;

use crate::payload::{CodecError, ValidationError};
use crate::radio::{RadioError, RadioUser};
use crate::storage::StorageError;

/// How loudly a failure should reach the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Log only. No dialog.
    Silent,
    /// Quiet hint that another tap or share may work.
    RetryPrompt,
    /// Dialog with a way to fix it, e.g. a link to the NFC settings.
    Actionable,
    /// The protocol worked but the library could not follow up.
    Notice,
}

/// Errors surfaced by the handoff subsystem.
#[derive(Debug, Error)]
pub enum NfcError {
    /// The token was decoded but rejected by the guest validator.
    #[error("payload rejected: {0}")]
    Validation(ValidationError),

    /// Nothing usable could be decoded from the records or link.
    #[error("payload codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("NFC is not supported on this device")]
    RadioUnsupported,

    #[error("NFC is disabled in the device settings")]
    RadioDisabled,

    /// Another operation already owns the radio.
    #[error("NFC radio is busy{}", busy_suffix(.held_by))]
    RadioBusy { held_by: Option<RadioUser> },

    #[error("timed out waiting for an NFC tag")]
    RadioTimeout,

    /// The user (or the app on their behalf) aborted the operation.
    #[error("operation cancelled")]
    UserCancelled,

    /// Any other failure reported by the platform binding.
    #[error("radio error: {0}")]
    Radio(RadioError),

    /// The token was valid but the named song is not in the local library.
    #[error("song {0} is not available locally")]
    SongUnavailable(String),

    #[error("playback failed: {0}")]
    Playback(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// An operation was called from a state that does not allow it.
    #[error("cannot {operation} while {current}")]
    InvalidState {
        current: String,
        operation: &'static str,
    },
}

fn busy_suffix(held_by: &Option<RadioUser>) -> String {
    held_by
        .map(|user| format!(" (held by {user})"))
        .unwrap_or_default()
}

impl NfcError {
    /// Presentation policy for this error.
    pub fn severity(&self) -> Severity {
        match self {
            NfcError::UserCancelled | NfcError::Storage(_) | NfcError::InvalidState { .. } => {
                Severity::Silent
            }
            NfcError::Validation(kind) => match kind {
                ValidationError::AlreadyUsed | ValidationError::InvalidSignature => {
                    Severity::Silent
                }
                ValidationError::MissingFields | ValidationError::Expired => Severity::RetryPrompt,
            },
            NfcError::Codec(_)
            | NfcError::RadioBusy { .. }
            | NfcError::RadioTimeout
            | NfcError::Radio(_) => Severity::RetryPrompt,
            NfcError::RadioUnsupported | NfcError::RadioDisabled => Severity::Actionable,
            NfcError::SongUnavailable(_) | NfcError::Playback(_) => Severity::Notice,
        }
    }

    /// Whether repeating the same action can succeed without the user
    /// changing anything else.
    pub fn is_retryable(&self) -> bool {
        match self {
            NfcError::Validation(kind) => kind.is_retryable(),
            NfcError::Codec(_)
            | NfcError::RadioBusy { .. }
            | NfcError::RadioTimeout
            | NfcError::Radio(_)
            | NfcError::Playback(_) => true,
            NfcError::RadioUnsupported
            | NfcError::RadioDisabled
            | NfcError::UserCancelled
            | NfcError::SongUnavailable(_)
            | NfcError::Storage(_)
            | NfcError::InvalidState { .. } => false,
        }
    }

    /// `true` for a user cancellation, which is not shown as an error.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, NfcError::UserCancelled)
    }
}

impl From<ValidationError> for NfcError {
    fn from(kind: ValidationError) -> Self {
        NfcError::Validation(kind)
    }
}

impl From<RadioError> for NfcError {
    fn from(err: RadioError) -> Self {
        if err.is_cancellation() {
            return NfcError::UserCancelled;
        }
        match err {
            RadioError::NotSupported => NfcError::RadioUnsupported,
            RadioError::Disabled => NfcError::RadioDisabled,
            RadioError::Busy => NfcError::RadioBusy { held_by: None },
            RadioError::Timeout => NfcError::RadioTimeout,
            other => NfcError::Radio(other),
        }
    }
}
