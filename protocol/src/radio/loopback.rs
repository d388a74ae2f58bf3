//! In-process radio with no hardware behind it.
//!
//! Tests and demos drive it from the outside: [`LoopbackRadio::tap`] plays a
//! tag discovery, [`LoopbackRadio::complete_pending_write`] plays a guest
//! phone touching the host during a write, and the toggles simulate devices
//! without NFC or with NFC switched off. A completed write also becomes the
//! tag returned by [`NfcRadio::request_read`].

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use crate::ndef::NdefRecord;

use super::{DiscoveredTag, DiscoveryHandler, NfcRadio, RadioError, RadioResult};

/// What [`NfcRadio::request_write`] does.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum WriteBehavior {
    /// Succeed immediately, as if a tag was already in range.
    #[default]
    Complete,
    /// Fail immediately with the given error.
    Fail(RadioError),
    /// Wait for [`LoopbackRadio::complete_pending_write`] or a cancel.
    WaitForTap,
}

struct PendingWrite {
    records: Vec<NdefRecord>,
    reply: oneshot::Sender<RadioResult<()>>,
}

#[derive(Default)]
struct LoopbackState {
    unsupported: bool,
    disabled: bool,
    started: bool,
    write_behavior: WriteBehavior,
    in_flight: bool,
    pending_write: Option<PendingWrite>,
    present_tag: Option<Vec<NdefRecord>>,
    written: Vec<Vec<NdefRecord>>,
    handler: Option<DiscoveryHandler>,
    cancel_count: usize,
}

#[derive(Default)]
pub struct LoopbackRadio {
    state: Mutex<LoopbackState>,
}

impl LoopbackRadio {
    /// A supported, enabled radio whose writes complete immediately.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_supported(&self, supported: bool) {
        self.state.lock().unsupported = !supported;
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.state.lock().disabled = !enabled;
    }

    pub fn set_write_behavior(&self, behavior: WriteBehavior) {
        self.state.lock().write_behavior = behavior;
    }

    /// Put a tag in range for [`NfcRadio::request_read`].
    pub fn present_tag(&self, records: Vec<NdefRecord>) {
        self.state.lock().present_tag = Some(records);
    }

    pub fn remove_tag(&self) {
        self.state.lock().present_tag = None;
    }

    /// Deliver a tag to the registered discovery handler. Returns `false`
    /// when nobody is listening.
    pub fn tap(&self, records: Vec<NdefRecord>) -> bool {
        let handler = self.state.lock().handler.clone();
        match handler {
            Some(handler) => {
                handler(DiscoveredTag { id: None, records });
                true
            }
            None => false,
        }
    }

    /// Finish the write that is waiting for a tap.
    pub fn complete_pending_write(&self) -> bool {
        let pending = {
            let mut state = self.state.lock();
            let Some(pending) = state.pending_write.take() else {
                return false;
            };
            state.in_flight = false;
            state.written.push(pending.records.clone());
            state.present_tag = Some(pending.records.clone());
            pending
        };
        let _ = pending.reply.send(Ok(()));
        true
    }

    /// Fail the write that is waiting for a tap.
    pub fn fail_pending_write(&self, error: RadioError) -> bool {
        let pending = {
            let mut state = self.state.lock();
            state.in_flight = false;
            state.pending_write.take()
        };
        match pending {
            Some(pending) => {
                let _ = pending.reply.send(Err(error));
                true
            }
            None => false,
        }
    }

    pub fn has_pending_write(&self) -> bool {
        self.state.lock().pending_write.is_some()
    }

    /// Poll until a write is waiting for a tap.
    pub async fn wait_for_pending_write(&self) {
        while !self.has_pending_write() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    /// Every message written so far, oldest first.
    pub fn written(&self) -> Vec<Vec<NdefRecord>> {
        self.state.lock().written.clone()
    }

    pub fn last_written(&self) -> Option<Vec<NdefRecord>> {
        self.state.lock().written.last().cloned()
    }

    pub fn cancel_count(&self) -> usize {
        self.state.lock().cancel_count
    }

    pub fn discovery_registered(&self) -> bool {
        self.state.lock().handler.is_some()
    }

    pub fn is_started(&self) -> bool {
        self.state.lock().started
    }

    fn check_available(state: &LoopbackState) -> RadioResult<()> {
        if state.unsupported {
            Err(RadioError::NotSupported)
        } else if state.disabled {
            Err(RadioError::Disabled)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl NfcRadio for LoopbackRadio {
    async fn is_supported(&self) -> bool {
        !self.state.lock().unsupported
    }

    async fn is_enabled(&self) -> bool {
        let state = self.state.lock();
        !state.unsupported && !state.disabled
    }

    async fn start(&self) -> RadioResult<()> {
        let mut state = self.state.lock();
        if state.unsupported {
            return Err(RadioError::NotSupported);
        }
        state.started = true;
        Ok(())
    }

    async fn request_write(&self, records: &[NdefRecord]) -> RadioResult<()> {
        let wait = {
            let mut state = self.state.lock();
            Self::check_available(&state)?;
            if state.in_flight {
                return Err(RadioError::Busy);
            }

            match state.write_behavior.clone() {
                WriteBehavior::Complete => {
                    state.written.push(records.to_vec());
                    state.present_tag = Some(records.to_vec());
                    debug!(records = records.len(), "loopback write completed");
                    return Ok(());
                }
                WriteBehavior::Fail(error) => return Err(error),
                WriteBehavior::WaitForTap => {
                    let (reply, wait) = oneshot::channel();
                    state.in_flight = true;
                    state.pending_write = Some(PendingWrite {
                        records: records.to_vec(),
                        reply,
                    });
                    wait
                }
            }
        };

        debug!("loopback write waiting for a tap");
        wait.await.unwrap_or(Err(RadioError::Cancelled))
    }

    async fn request_read(&self) -> RadioResult<Vec<NdefRecord>> {
        let state = self.state.lock();
        Self::check_available(&state)?;
        if state.in_flight {
            return Err(RadioError::Busy);
        }
        state.present_tag.clone().ok_or(RadioError::NoTag)
    }

    async fn register_discovery(&self, handler: DiscoveryHandler) -> RadioResult<()> {
        let mut state = self.state.lock();
        Self::check_available(&state)?;
        state.handler = Some(handler);
        Ok(())
    }

    async fn unregister_discovery(&self) -> RadioResult<()> {
        self.state.lock().handler = None;
        Ok(())
    }

    async fn cancel(&self) -> RadioResult<()> {
        let pending = {
            let mut state = self.state.lock();
            state.cancel_count += 1;
            state.in_flight = false;
            state.pending_write.take()
        };
        if let Some(pending) = pending {
            debug!("loopback write cancelled");
            let _ = pending.reply.send(Err(RadioError::Cancelled));
        }
        Ok(())
    }

    async fn open_settings(&self) -> RadioResult<()> {
        Ok(())
    }
}
