//! Ephemeral per-share secrets.
//!
//! A secret is 32 random bytes, base64-encoded, generated for one share and
//! then dropped. The encoded string (not the raw bytes) is the HMAC key, so
//! any implementation that signs with the transported form interoperates.

use std::fmt;

use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};
use tracing::warn;

use crate::config::EPHEMERAL_SECRET_LENGTH;

use super::encode_transport;

/// Quality of the randomness behind a secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretStrength {
    /// Drawn from the operating system CSPRNG.
    Cryptographic,
    /// The OS source failed; drawn from a time-seeded PRNG.
    Weak,
}

/// A transport-encoded ephemeral signing secret.
#[derive(Clone, PartialEq, Eq)]
pub struct EphemeralSecret {
    encoded: String,
    strength: SecretStrength,
}

impl EphemeralSecret {
    /// Wrap an already-encoded secret, e.g. one shared out of band for the
    /// full verification path.
    pub fn from_encoded(encoded: impl Into<String>) -> Self {
        Self {
            encoded: encoded.into(),
            strength: SecretStrength::Cryptographic,
        }
    }

    /// The base64 form, which is also the HMAC key.
    pub fn as_str(&self) -> &str {
        &self.encoded
    }

    pub fn strength(&self) -> SecretStrength {
        self.strength
    }
}

impl fmt::Debug for EphemeralSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EphemeralSecret")
            .field("encoded", &"<redacted>")
            .field("strength", &self.strength)
            .finish()
    }
}

/// Generate a fresh secret from the OS randomness source.
pub fn generate_ephemeral_secret() -> EphemeralSecret {
    generate_ephemeral_secret_with(&mut OsRng)
}

/// Generate a secret from `rng`, falling back to a weak PRNG if it fails.
pub fn generate_ephemeral_secret_with<R: RngCore + ?Sized>(rng: &mut R) -> EphemeralSecret {
    let mut bytes = [0u8; EPHEMERAL_SECRET_LENGTH];
    let strength = match rng.try_fill_bytes(&mut bytes) {
        Ok(()) => SecretStrength::Cryptographic,
        Err(err) => {
            warn!(
                error = %err,
                "cryptographic randomness unavailable, secret drawn from a non-cryptographic PRNG"
            );
            let seed = chrono::Utc::now()
                .timestamp_nanos_opt()
                .unwrap_or_default() as u64
                ^ u64::from(std::process::id());
            StdRng::seed_from_u64(seed).fill_bytes(&mut bytes);
            SecretStrength::Weak
        }
    };

    EphemeralSecret {
        encoded: encode_transport(&bytes),
        strength,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::decode_transport;

    struct BrokenRng;

    impl RngCore for BrokenRng {
        fn next_u32(&mut self) -> u32 {
            0
        }

        fn next_u64(&mut self) -> u64 {
            0
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            dest.fill(0);
        }

        fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> Result<(), rand::Error> {
            Err(rand::Error::new("entropy source offline"))
        }
    }

    #[test]
    fn secret_is_32_bytes_of_base64() {
        let secret = generate_ephemeral_secret();
        let raw = decode_transport(secret.as_str()).expect("valid base64");
        assert_eq!(raw.len(), EPHEMERAL_SECRET_LENGTH);
        assert_eq!(secret.strength(), SecretStrength::Cryptographic);
    }

    #[test]
    fn secrets_are_unique() {
        let a = generate_ephemeral_secret();
        let b = generate_ephemeral_secret();
        assert_ne!(a, b);
    }

    #[test]
    fn broken_rng_is_flagged_weak() {
        let secret = generate_ephemeral_secret_with(&mut BrokenRng);
        assert_eq!(secret.strength(), SecretStrength::Weak);
        let raw = decode_transport(secret.as_str()).unwrap();
        assert_eq!(raw.len(), EPHEMERAL_SECRET_LENGTH);
        // The fallback still produces something other than the zeroed buffer.
        assert!(raw.iter().any(|&b| b != 0));
    }

    #[test]
    fn debug_never_prints_the_secret() {
        let secret = EphemeralSecret::from_encoded("c2VjcmV0");
        let rendered = format!("{:?}", secret);
        assert!(!rendered.contains("c2VjcmV0"));
        assert!(rendered.contains("redacted"));
    }
}
