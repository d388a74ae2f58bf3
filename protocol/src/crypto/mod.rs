//! # Ephemeral Signing
//!
//! Everything security-related in the handoff flows through here: the
//! per-share secret, the digests, and the payload signature.
//!
//! - **SHA-256** publishes a one-way fingerprint of the secret
//!   (`secretPublic`).
//! - **HMAC-SHA256** signs the canonical string `session|songId|expiry`.
//! - **base64** is the transport encoding of every binary value.
//!
//! Both primitives have fallbacks for platforms that lack them. A fallback is
//! never silent: it logs a warning and reports itself through
//! [`SecretStrength`] or [`HashBackend::is_secure`].

pub mod hash;
pub mod secret;
pub mod signing;

pub use hash::{hmac_sha256, sha256, HashBackend};
pub use secret::{generate_ephemeral_secret, EphemeralSecret, SecretStrength};
pub use signing::{sign_payload, verify_payload, PayloadSignature, Signer};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Transport-encode bytes (standard base64 with padding).
pub fn encode_transport(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Reverse of [`encode_transport`]. Returns `None` on malformed input.
pub fn decode_transport(encoded: &str) -> Option<Vec<u8>> {
    STANDARD.decode(encoded).ok()
}
