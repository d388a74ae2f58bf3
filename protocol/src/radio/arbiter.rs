//! Single-flight access to the radio.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::NfcError;

use super::RadioUser;

/// Hands out at most one [`RadioLease`] at a time.
///
/// Clones share the same slot, so the listener and the host share flow can
/// each hold a clone.
#[derive(Debug, Clone, Default)]
pub struct RadioArbiter {
    holder: Arc<Mutex<Option<RadioUser>>>,
}

impl RadioArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the radio for `user`, or report who holds it.
    pub fn try_acquire(&self, user: RadioUser) -> Result<RadioLease, NfcError> {
        let mut holder = self.holder.lock();
        if let Some(current) = *holder {
            debug!(%user, held_by = %current, "radio busy");
            return Err(NfcError::RadioBusy {
                held_by: Some(current),
            });
        }
        *holder = Some(user);
        debug!(%user, "radio acquired");

        Ok(RadioLease {
            holder: Arc::clone(&self.holder),
            user,
        })
    }

    /// Current holder, if any.
    pub fn holder(&self) -> Option<RadioUser> {
        *self.holder.lock()
    }

    pub fn is_free(&self) -> bool {
        self.holder().is_none()
    }
}

/// Exclusive use of the radio. Released on drop.
#[derive(Debug)]
pub struct RadioLease {
    holder: Arc<Mutex<Option<RadioUser>>>,
    user: RadioUser,
}

impl RadioLease {
    pub fn user(&self) -> RadioUser {
        self.user
    }
}

impl Drop for RadioLease {
    fn drop(&mut self) {
        let mut holder = self.holder.lock();
        if *holder == Some(self.user) {
            *holder = None;
        }
        debug!(user = %self.user, "radio released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_lease_at_a_time() {
        let arbiter = RadioArbiter::new();
        let lease = arbiter.try_acquire(RadioUser::Listener).unwrap();
        assert_eq!(arbiter.holder(), Some(RadioUser::Listener));

        let err = arbiter.clone().try_acquire(RadioUser::Writer).unwrap_err();
        assert!(matches!(
            err,
            NfcError::RadioBusy {
                held_by: Some(RadioUser::Listener)
            }
        ));

        drop(lease);
        assert!(arbiter.is_free());
        let lease = arbiter.try_acquire(RadioUser::Writer).unwrap();
        assert_eq!(lease.user(), RadioUser::Writer);
    }
}
