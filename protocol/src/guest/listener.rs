//! Guest listen orchestrator.
//!
//! `Stopped ⇄ Listening`. While listening the listener holds the radio lease
//! and a discovery handler; each discovered tag is decoded, validated and, if
//! valid, handed to the [`PayloadSink`]. A bad tag is logged and dropped and
//! the listener keeps going.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{NfcConfig, NfcConfigUpdate};
use crate::error::NfcError;
use crate::ndef::{decode_records, NdefRecord};
use crate::payload::Payload;
use crate::radio::{DiscoveredTag, NfcRadio, RadioArbiter, RadioLease, RadioUser};

use super::validator::GuestValidator;

/// Receives every validated payload.
#[async_trait]
pub trait PayloadSink: Send + Sync {
    async fn deliver(&self, payload: Payload);
}

#[async_trait]
impl PayloadSink for mpsc::UnboundedSender<Payload> {
    async fn deliver(&self, payload: Payload) {
        if self.send(payload).is_err() {
            debug!("payload receiver dropped");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Stopped,
    Listening,
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenerState::Stopped => write!(f, "stopped"),
            ListenerState::Listening => write!(f, "listening"),
        }
    }
}

struct ListenerInner {
    state: ListenerState,
    worker: Option<JoinHandle<()>>,
    lease: Option<RadioLease>,
}

pub struct GuestListener {
    config: Arc<RwLock<NfcConfig>>,
    radio: Arc<dyn NfcRadio>,
    arbiter: RadioArbiter,
    validator: Arc<GuestValidator>,
    inner: Mutex<ListenerInner>,
}

impl GuestListener {
    pub fn with_config(
        config: NfcConfig,
        radio: Arc<dyn NfcRadio>,
        arbiter: RadioArbiter,
        validator: Arc<GuestValidator>,
    ) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            radio,
            arbiter,
            validator,
            inner: Mutex::new(ListenerInner {
                state: ListenerState::Stopped,
                worker: None,
                lease: None,
            }),
        }
    }

    pub fn config(&self) -> NfcConfig {
        self.config.read().clone()
    }

    pub fn update_config(&self, update: NfcConfigUpdate) {
        self.config.write().apply(update);
    }

    pub fn validator(&self) -> &Arc<GuestValidator> {
        &self.validator
    }

    pub async fn state(&self) -> ListenerState {
        self.inner.lock().await.state
    }

    pub async fn is_listening(&self) -> bool {
        self.state().await == ListenerState::Listening
    }

    /// Take the radio and start delivering validated payloads to `sink`.
    pub async fn start(&self, sink: Arc<dyn PayloadSink>) -> Result<(), NfcError> {
        let mut inner = self.inner.lock().await;
        if inner.state == ListenerState::Listening {
            return Err(NfcError::InvalidState {
                current: inner.state.to_string(),
                operation: "start listening",
            });
        }

        if !self.radio.is_supported().await {
            return Err(NfcError::RadioUnsupported);
        }
        self.radio.start().await?;
        let lease = self.arbiter.try_acquire(RadioUser::Listener)?;

        let (tags_tx, mut tags_rx) = mpsc::unbounded_channel::<DiscoveredTag>();
        self.radio
            .register_discovery(Arc::new(move |tag: DiscoveredTag| {
                let _ = tags_tx.send(tag);
            }))
            .await?;

        let config = Arc::clone(&self.config);
        let validator = Arc::clone(&self.validator);
        let worker = tokio::spawn(async move {
            while let Some(tag) = tags_rx.recv().await {
                match receive(&tag.records, &config, &validator) {
                    Ok(payload) => sink.deliver(payload).await,
                    Err(err) => warn!(error = %err, "ignoring NFC tag"),
                }
            }
            debug!("tag stream closed");
        });

        inner.state = ListenerState::Listening;
        inner.worker = Some(worker);
        inner.lease = Some(lease);
        info!("guest listener started");
        Ok(())
    }

    /// Release the radio. A no-op when already stopped.
    ///
    /// The listener counts as stopped before the radio is told, so a `stop`
    /// abandoned mid-way still leaves it restartable.
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state == ListenerState::Stopped {
            return;
        }
        inner.state = ListenerState::Stopped;
        if let Some(worker) = inner.worker.take() {
            worker.abort();
        }
        let _lease = inner.lease.take();

        if let Err(err) = self.radio.unregister_discovery().await {
            warn!(error = %err, "failed to unregister tag discovery");
        }
        if let Err(err) = self.radio.cancel().await {
            debug!(error = %err, "cancel after listening failed");
        }
        info!("guest listener stopped");
    }

    /// Read the tag in range once, outside of listening.
    ///
    /// The radio request is always cancelled afterwards, whatever happened.
    pub async fn read_once(&self) -> Result<Payload, NfcError> {
        if !self.radio.is_supported().await {
            return Err(NfcError::RadioUnsupported);
        }
        let _lease = self.arbiter.try_acquire(RadioUser::Reader)?;

        let read = self.radio.request_read().await;
        if let Err(err) = self.radio.cancel().await {
            debug!(error = %err, "cancel after read failed");
        }

        receive(&read?, &self.config, &self.validator)
    }
}

impl Drop for GuestListener {
    fn drop(&mut self) {
        if let Some(worker) = self.inner.get_mut().worker.take() {
            worker.abort();
        }
    }
}

/// Decode and validate one record set.
fn receive(
    records: &[NdefRecord],
    config: &RwLock<NfcConfig>,
    validator: &GuestValidator,
) -> Result<Payload, NfcError> {
    let payload = {
        let config = config.read();
        decode_records(records, &config)?
    };
    Ok(validator.validate(&payload).into_result()?)
}
