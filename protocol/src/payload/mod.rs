//! # Handoff Payload
//!
//! The token that moves between devices, its validation verdict and its two
//! wire forms.
//!
//! ```text
//! URI   beatit://nfc/pair?session=..&songId=..&expiry=..[&sig=..][&secretPublic=..]
//! JSON  {"session":"..","songId":"..","expiry":1700000120000,"sig":"..","secretPublic":".."}
//! ```
//!
//! A [`Payload`] is immutable once built. Decoders never return a partial
//! payload: a missing mandatory field is a [`CodecError`].

pub mod json;
pub mod uri;

pub use json::{decode_json, encode_json};
pub use uri::{decode_uri, encode_uri};

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::PayloadSignature;
use crate::ndef::NdefError;

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// A signed, time-limited, single-use reference to a song.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawPayload")]
pub struct Payload {
    session: String,
    song_id: String,
    /// Unix milliseconds after which the token is rejected.
    expiry: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    sig: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    secret_public: Option<String>,
}

impl Payload {
    /// An unsigned payload.
    pub fn new(session: impl Into<String>, song_id: impl Into<String>, expiry: u64) -> Self {
        Self {
            session: session.into(),
            song_id: song_id.into(),
            expiry,
            sig: None,
            secret_public: None,
        }
    }

    /// Attach the signature fields produced by the signer.
    pub fn with_signature(self, signature: PayloadSignature) -> Self {
        self.with_signature_fields(Some(signature.sig), Some(signature.secret_public))
    }

    /// Attach raw signature fields. Empty strings count as absent.
    pub(crate) fn with_signature_fields(
        mut self,
        sig: Option<String>,
        secret_public: Option<String>,
    ) -> Self {
        self.sig = sig.filter(|s| !s.is_empty());
        self.secret_public = secret_public.filter(|s| !s.is_empty());
        self
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    pub fn song_id(&self) -> &str {
        &self.song_id
    }

    pub fn expiry(&self) -> u64 {
        self.expiry
    }

    pub fn sig(&self) -> Option<&str> {
        self.sig.as_deref()
    }

    pub fn secret_public(&self) -> Option<&str> {
        self.secret_public.as_deref()
    }

    /// `true` if either signature field is present.
    pub fn is_signed(&self) -> bool {
        self.sig.is_some() || self.secret_public.is_some()
    }

    /// `session`, `songId` and `expiry` are all present. An expiry of zero
    /// counts as absent.
    pub fn has_required_fields(&self) -> bool {
        !self.session.is_empty() && !self.song_id.is_empty() && self.expiry != 0
    }

    /// `true` once `now_millis` is past the expiry.
    pub fn is_expired_at(&self, now_millis: u64) -> bool {
        self.expiry < now_millis
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "session={} song={} expiry={}{}",
            self.session,
            self.song_id,
            self.expiry,
            if self.is_signed() { " (signed)" } else { "" }
        )
    }
}

/// Wire shape before the mandatory fields are checked.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct RawPayload {
    session: Option<String>,
    song_id: Option<String>,
    expiry: Option<u64>,
    sig: Option<String>,
    secret_public: Option<String>,
}

impl TryFrom<RawPayload> for Payload {
    type Error = CodecError;

    fn try_from(raw: RawPayload) -> Result<Self, Self::Error> {
        let session = non_empty(raw.session).ok_or(CodecError::MissingField("session"))?;
        let song_id = non_empty(raw.song_id).ok_or(CodecError::MissingField("songId"))?;
        let expiry = raw
            .expiry
            .filter(|&e| e != 0)
            .ok_or(CodecError::MissingField("expiry"))?;

        Ok(Payload::new(session, song_id, expiry).with_signature_fields(raw.sig, raw.secret_public))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Fresh session identifier: a random (v4) UUID.
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ---------------------------------------------------------------------------
// Validation verdict
// ---------------------------------------------------------------------------

/// Why the guest validator rejected a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ValidationError {
    #[error("missing required fields")]
    MissingFields,
    #[error("expired")]
    Expired,
    #[error("already used")]
    AlreadyUsed,
    #[error("invalid signature")]
    InvalidSignature,
}

impl ValidationError {
    /// A fresh tap or a fresh share may succeed. Replays and tampered
    /// tokens are final.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ValidationError::MissingFields | ValidationError::Expired)
    }
}

/// Outcome of validating one payload. Never raised as an error so the
/// listener survives a bad tap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub valid: bool,
    pub error: Option<ValidationError>,
    pub payload: Option<Payload>,
}

impl ValidationResult {
    pub fn accepted(payload: Payload) -> Self {
        Self {
            valid: true,
            error: None,
            payload: Some(payload),
        }
    }

    pub fn rejected(error: ValidationError) -> Self {
        Self {
            valid: false,
            error: Some(error),
            payload: None,
        }
    }

    /// Collapse into a `Result` for callers that prefer `?`.
    pub fn into_result(self) -> Result<Payload, ValidationError> {
        match (self.valid, self.payload, self.error) {
            (true, Some(payload), _) => Ok(payload),
            (_, _, Some(error)) => Err(error),
            _ => Err(ValidationError::MissingFields),
        }
    }
}

// ---------------------------------------------------------------------------
// Codec errors
// ---------------------------------------------------------------------------

/// Failures turning a payload into wire form or back.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("empty NDEF message")]
    EmptyMessage,

    #[error("no valid payload found in NDEF message")]
    NoValidPayload,

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("expiry is not an integer: {0:?}")]
    InvalidExpiry(String),

    #[error("malformed URI: {0}")]
    InvalidUri(#[from] url::ParseError),

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Ndef(#[from] NdefError),

    #[error("not a handoff link: {0}")]
    NotHandoffLink(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_signature_fields_are_absent() {
        let payload = Payload::new("s1", "abc123", 10).with_signature(PayloadSignature {
            sig: String::new(),
            secret_public: "cHVi".into(),
        });
        assert_eq!(payload.sig(), None);
        assert_eq!(payload.secret_public(), Some("cHVi"));
        assert!(payload.is_signed());
    }

    #[test]
    fn required_fields() {
        assert!(Payload::new("s1", "abc123", 10).has_required_fields());
        assert!(!Payload::new("", "abc123", 10).has_required_fields());
        assert!(!Payload::new("s1", "", 10).has_required_fields());
        assert!(!Payload::new("s1", "abc123", 0).has_required_fields());
    }

    #[test]
    fn expiry_is_inclusive_of_now() {
        let payload = Payload::new("s1", "abc123", 1_000);
        assert!(!payload.is_expired_at(999));
        assert!(!payload.is_expired_at(1_000));
        assert!(payload.is_expired_at(1_001));
    }

    #[test]
    fn session_ids_are_uuid_v4() {
        let id = new_session_id();
        let parsed = uuid::Uuid::parse_str(&id).expect("uuid");
        assert_eq!(parsed.get_version_num(), 4);
        assert_ne!(id, new_session_id());
    }

    #[test]
    fn deserialize_rejects_missing_song() {
        let err = serde_json::from_str::<Payload>(r#"{"session":"s1","expiry":5}"#).unwrap_err();
        assert!(err.to_string().contains("songId"));
    }

    #[test]
    fn into_result() {
        let ok = ValidationResult::accepted(Payload::new("s1", "abc123", 10));
        assert_eq!(ok.into_result().unwrap().song_id(), "abc123");

        let err = ValidationResult::rejected(ValidationError::AlreadyUsed);
        assert_eq!(err.into_result(), Err(ValidationError::AlreadyUsed));
    }

    #[test]
    fn validation_messages() {
        assert_eq!(ValidationError::MissingFields.to_string(), "missing required fields");
        assert_eq!(ValidationError::InvalidSignature.to_string(), "invalid signature");
        assert!(ValidationError::Expired.is_retryable());
        assert!(!ValidationError::AlreadyUsed.is_retryable());
    }
}
