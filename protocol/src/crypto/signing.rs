//! # Payload Signing
//!
//! The host signs `"{session}|{songId}|{expiry}"` with HMAC-SHA256 keyed by
//! the ephemeral secret, and publishes `SHA-256(secret)` next to it as
//! `secretPublic`.
//!
//! ## What verification can and cannot do
//!
//! The guest never receives the secret. Without it the HMAC cannot be
//! recomputed, so offline verification only checks that `sig` and
//! `secretPublic` are present and non-empty. That catches stripped or
//! truncated payloads. It does not catch a forged payload carrying made-up
//! values in both fields; expiry and single use carry the protection in that
//! case.
//!
//! When the caller does hold the secret (host and guest sharing context),
//! [`Signer::verify`] recomputes both values and requires exact equality.

use tracing::warn;

use crate::config::SIGNING_FIELD_SEPARATOR;
use crate::payload::Payload;

use super::encode_transport;
use super::hash::HashBackend;
use super::secret::EphemeralSecret;

/// The two transport-encoded signature fields carried by a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadSignature {
    /// `base64(HMAC-SHA256(secret, canonical))`.
    pub sig: String,
    /// `base64(SHA-256(secret))`.
    pub secret_public: String,
}

/// The canonical string that gets signed.
pub fn canonical_string(session: &str, song_id: &str, expiry: u64) -> String {
    format!("{session}{SIGNING_FIELD_SEPARATOR}{song_id}{SIGNING_FIELD_SEPARATOR}{expiry}")
}

/// Signs and verifies payloads with a chosen [`HashBackend`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Signer {
    backend: HashBackend,
}

impl Signer {
    pub fn new(backend: HashBackend) -> Self {
        if !backend.is_secure() {
            warn!(?backend, "payload signer created with a non-cryptographic hash");
        }
        Self { backend }
    }

    pub fn backend(&self) -> HashBackend {
        self.backend
    }

    /// Sign the three payload fields with `secret`.
    pub fn sign(
        &self,
        session: &str,
        song_id: &str,
        expiry: u64,
        secret: &EphemeralSecret,
    ) -> PayloadSignature {
        let canonical = canonical_string(session, song_id, expiry);
        let key = secret.as_str().as_bytes();

        PayloadSignature {
            sig: encode_transport(&self.backend.mac(key, canonical.as_bytes())),
            secret_public: encode_transport(&self.backend.digest(key)),
        }
    }

    /// Check the signature fields of `payload`.
    ///
    /// Both fields must be present. With `secret` the values are recomputed
    /// and compared exactly; without it only non-emptiness is checked.
    pub fn verify(&self, payload: &Payload, secret: Option<&EphemeralSecret>) -> bool {
        let (Some(sig), Some(secret_public)) = (payload.sig(), payload.secret_public()) else {
            return false;
        };

        match secret {
            Some(secret) => {
                let expected =
                    self.sign(payload.session(), payload.song_id(), payload.expiry(), secret);
                expected.sig == sig && expected.secret_public == secret_public
            }
            None => !sig.is_empty() && !secret_public.is_empty(),
        }
    }
}

/// Sign with the default SHA-256 backend.
pub fn sign_payload(
    session: &str,
    song_id: &str,
    expiry: u64,
    secret: &EphemeralSecret,
) -> PayloadSignature {
    Signer::default().sign(session, song_id, expiry, secret)
}

/// Verify with the default SHA-256 backend.
pub fn verify_payload(payload: &Payload, secret: Option<&EphemeralSecret>) -> bool {
    Signer::default().verify(payload, secret)
}
