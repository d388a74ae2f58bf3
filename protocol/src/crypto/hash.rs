//! # Hashing Utilities
//!
//! SHA-256 and HMAC-SHA256, plus the explicitly insecure fallback used when a
//! platform cannot provide a strong hash.
//!
//! ## The fallback
//!
//! [`HashBackend::InsecureFallback`] folds the input into a 32-bit rolling
//! hash and pads it to 32 bytes. It exists so a device without a strong hash
//! still produces well-formed payloads. It offers no tamper resistance at
//! all, and every use of it is logged.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Output length of every digest produced here.
pub const DIGEST_LENGTH: usize = 32;

/// Compute the SHA-256 hash of the input data.
///
/// # Example
///
/// ```
/// use beatit_nfc::crypto::sha256;
///
/// let hash = sha256(b"beatit");
/// assert_eq!(hash.len(), 32);
/// ```
pub fn sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// Compute `HMAC-SHA256(key, message)`.
///
/// HMAC accepts keys of any length, so this cannot fail.
pub fn hmac_sha256(key: &[u8], message: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

/// Rolling 32-bit hash padded to [`DIGEST_LENGTH`] bytes. NOT secure.
///
/// The first four bytes hold the hash big-endian; the rest are zero.
pub fn insecure_hash(data: &[u8]) -> Vec<u8> {
    let mut hash: i32 = 0;
    for &byte in data {
        hash = (hash << 5).wrapping_sub(hash).wrapping_add(byte as i32);
    }
    let mut output = vec![0u8; DIGEST_LENGTH];
    output[..4].copy_from_slice(&hash.to_be_bytes());
    output
}

/// Which digest implementation signing uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashBackend {
    /// SHA-256 and HMAC-SHA256.
    #[default]
    Sha256,
    /// Non-cryptographic stand-in for platforms without a strong hash.
    InsecureFallback,
}

impl HashBackend {
    pub fn is_secure(&self) -> bool {
        matches!(self, HashBackend::Sha256)
    }

    /// One-way digest of `data`.
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            HashBackend::Sha256 => sha256(data),
            HashBackend::InsecureFallback => {
                warn!("strong hash unavailable, using insecure fallback hash");
                insecure_hash(data)
            }
        }
    }

    /// Keyed digest of `message`. The fallback hashes `key || message`.
    pub fn mac(&self, key: &[u8], message: &[u8]) -> Vec<u8> {
        match self {
            HashBackend::Sha256 => hmac_sha256(key, message),
            HashBackend::InsecureFallback => {
                warn!("strong hash unavailable, using insecure fallback HMAC");
                insecure_hash(&[key, message].concat())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        let hash = sha256(b"");
        let expected =
            hex::decode("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
                .unwrap();
        assert_eq!(hash, expected);
    }

    #[test]
    fn test_hmac_rfc4231_case_2() {
        // RFC 4231, test case 2.
        let mac = hmac_sha256(b"Jefe", b"what do ya want for nothing?");
        let expected =
            hex::decode("5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843")
                .unwrap();
        assert_eq!(mac, expected);
    }

    #[test]
    fn hmac_depends_on_key() {
        assert_ne!(hmac_sha256(b"k1", b"msg"), hmac_sha256(b"k2", b"msg"));
    }

    #[test]
    fn insecure_hash_layout() {
        // "a" = 97, so the hash is 97 and the rest is padding.
        let hash = insecure_hash(b"a");
        assert_eq!(hash.len(), DIGEST_LENGTH);
        assert_eq!(&hash[..4], &97i32.to_be_bytes());
        assert!(hash[4..].iter().all(|&b| b == 0));
    }

    #[test]
    fn insecure_hash_wraps_instead_of_overflowing() {
        let long = vec![0xFFu8; 4096];
        assert_eq!(insecure_hash(&long).len(), DIGEST_LENGTH);
    }

    #[test]
    fn backend_flags() {
        assert!(HashBackend::Sha256.is_secure());
        assert!(!HashBackend::InsecureFallback.is_secure());
        assert_eq!(HashBackend::default(), HashBackend::Sha256);
    }

    #[test]
    fn backends_disagree() {
        let data = b"session|song|1";
        assert_ne!(
            HashBackend::Sha256.digest(data),
            HashBackend::InsecureFallback.digest(data)
        );
    }
}
