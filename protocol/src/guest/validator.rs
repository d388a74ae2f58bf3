//! Guest-side payload checks.
//!
//! Checks run in a fixed order and stop at the first failure:
//!
//! 1. required fields present
//! 2. not expired
//! 3. session not already used
//! 4. signature, if the payload carries any signature field
//!
//! Only a payload that passes all four is marked used. The replay check,
//! the signature check and the marking share one replay-store lock, so two
//! validations of the same session cannot both succeed.

use std::sync::Arc;

use tracing::{debug, info};

use crate::clock::Clock;
use crate::crypto::{EphemeralSecret, Signer};
use crate::payload::{Payload, ValidationError, ValidationResult};
use crate::storage::ReplaySessionStore;

pub struct GuestValidator {
    store: Arc<ReplaySessionStore>,
    signer: Signer,
    clock: Arc<dyn Clock>,
}

impl GuestValidator {
    pub fn new(store: Arc<ReplaySessionStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            signer: Signer::default(),
            clock,
        }
    }

    /// Verify signatures with `signer` instead of the SHA-256 default.
    pub fn with_signer(mut self, signer: Signer) -> Self {
        self.signer = signer;
        self
    }

    pub fn store(&self) -> &Arc<ReplaySessionStore> {
        &self.store
    }

    /// Validate a payload received from another device.
    pub fn validate(&self, payload: &Payload) -> ValidationResult {
        self.validate_with_secret(payload, None)
    }

    /// Validate, recomputing the signature when the signing secret is known.
    pub fn validate_with_secret(
        &self,
        payload: &Payload,
        secret: Option<&EphemeralSecret>,
    ) -> ValidationResult {
        let verdict = self.check(payload, secret);
        match verdict {
            Ok(()) => {
                info!(
                    session = %payload.session(),
                    song_id = %payload.song_id(),
                    "handoff payload accepted"
                );
                ValidationResult::accepted(payload.clone())
            }
            Err(reason) => {
                debug!(session = %payload.session(), %reason, "handoff payload rejected");
                ValidationResult::rejected(reason)
            }
        }
    }

    fn check(
        &self,
        payload: &Payload,
        secret: Option<&EphemeralSecret>,
    ) -> Result<(), ValidationError> {
        if !payload.has_required_fields() {
            return Err(ValidationError::MissingFields);
        }
        if payload.is_expired_at(self.clock.now_millis()) {
            return Err(ValidationError::Expired);
        }

        let mut sessions = self.store.lock();
        if sessions.is_used(payload.session()) {
            return Err(ValidationError::AlreadyUsed);
        }
        // Unsigned payloads skip this step entirely.
        if payload.is_signed() && !self.signer.verify(payload, secret) {
            return Err(ValidationError::InvalidSignature);
        }
        sessions.mark_used(payload.session());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::crypto::{generate_ephemeral_secret, sign_payload, PayloadSignature};
    use crate::storage::MemoryStore;

    const NOW: u64 = 1_700_000_000_000;

    fn validator() -> (GuestValidator, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(NOW));
        let store = Arc::new(ReplaySessionStore::new(Arc::new(MemoryStore::new())));
        (GuestValidator::new(store, clock.clone()), clock)
    }

    fn signed(session: &str, expiry: u64) -> Payload {
        let secret = generate_ephemeral_secret();
        Payload::new(session, "abc123", expiry)
            .with_signature(sign_payload(session, "abc123", expiry, &secret))
    }

    #[test]
    fn accepts_fresh_signed_payload() {
        let (validator, _) = validator();
        let result = validator.validate(&signed("s1", NOW + 3_600_000));
        assert!(result.valid);
        assert_eq!(result.error, None);
        assert_eq!(result.payload.unwrap().session(), "s1");
    }

    #[test]
    fn expiry_boundary() {
        let (validator, _) = validator();
        let stale = validator.validate(&signed("s1", NOW - 1));
        assert_eq!(stale.error, Some(ValidationError::Expired));

        let exact = validator.validate(&signed("s2", NOW));
        assert!(exact.valid);
    }

    #[test]
    fn replay_is_rejected() {
        let (validator, _) = validator();
        let payload = signed("s1", NOW + 60_000);
        assert!(validator.validate(&payload).valid);

        let again = validator.validate(&payload);
        assert!(!again.valid);
        assert_eq!(again.error, Some(ValidationError::AlreadyUsed));
    }

    #[test]
    fn missing_fields_come_first() {
        let (validator, _) = validator();
        // Also expired, but the structural failure is reported.
        let result = validator.validate(&Payload::new("s1", "", 1));
        assert_eq!(result.error, Some(ValidationError::MissingFields));
    }

    #[test]
    fn expired_payload_is_not_marked_used() {
        let (validator, clock) = validator();
        let payload = signed("s1", NOW + 10);
        clock.advance(11);
        assert_eq!(
            validator.validate(&payload).error,
            Some(ValidationError::Expired)
        );
        assert!(!validator.store().is_used("s1"));
    }

    #[test]
    fn half_signed_payload_is_tamper() {
        let (validator, _) = validator();
        let payload = Payload::new("s1", "abc123", NOW + 60_000).with_signature(PayloadSignature {
            sig: String::new(),
            secret_public: "cHVi".into(),
        });
        assert_eq!(
            validator.validate(&payload).error,
            Some(ValidationError::InvalidSignature)
        );
        assert!(!validator.store().is_used("s1"));
    }

    #[test]
    fn unsigned_payload_is_accepted() {
        let (validator, _) = validator();
        assert!(validator
            .validate(&Payload::new("s1", "abc123", NOW + 60_000))
            .valid);
    }

    #[test]
    fn full_verification_with_secret() {
        let (validator, _) = validator();
        let secret = generate_ephemeral_secret();
        let expiry = NOW + 60_000;
        let payload = Payload::new("s1", "abc123", expiry)
            .with_signature(sign_payload("s1", "abc123", expiry, &secret));

        let wrong = generate_ephemeral_secret();
        assert_eq!(
            validator.validate_with_secret(&payload, Some(&wrong)).error,
            Some(ValidationError::InvalidSignature)
        );
        assert!(validator.validate_with_secret(&payload, Some(&secret)).valid);
    }
}
