//! # Host Share Orchestrator
//!
//! ```text
//!        share()                write ok
//! Idle ──────────▶ Waiting ──────────────▶ Success ─┐
//!   ▲                 │  radio error                │
//!   │                 ├──────────────────▶ Error ───┤ display delay
//!   │                 │  cancel() / deadline        │
//!   │                 └──────────────────▶ Cancelled┤
//!   └───────────────────────────────────────────────┘
//! ```
//!
//! A share builds a fresh payload, takes the radio lease as writer and waits
//! for the write, a cancel, or the caller's deadline, whichever comes first.
//! The radio request is cancelled afterwards in every case.
//!
//! Cancellation is not an error: a user cancel, a platform cancellation and
//! the wait deadline all end in `Cancelled` and return `Ok`.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::{NfcConfig, NfcConfigUpdate, ShareTimings};
use crate::crypto::{generate_ephemeral_secret, Signer};
use crate::error::NfcError;
use crate::ndef::encode_records;
use crate::payload::{new_session_id, Payload, ValidationError};
use crate::radio::{NfcRadio, RadioArbiter, RadioUser};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Phase of the host share flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ShareState {
    Idle,
    Waiting,
    Success,
    Error,
    Cancelled,
}

impl ShareState {
    /// `Success`, `Error` or `Cancelled`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ShareState::Success | ShareState::Error | ShareState::Cancelled
        )
    }
}

impl fmt::Display for ShareState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShareState::Idle => "idle",
            ShareState::Waiting => "waiting",
            ShareState::Success => "success",
            ShareState::Error => "error",
            ShareState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// `cancel()` or a cancellation reported by the platform.
    User,
    /// The caller's wait deadline passed.
    Timeout,
}

/// How a share ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareOutcome {
    Shared(Payload),
    Cancelled(CancelReason),
}

// ---------------------------------------------------------------------------
// Payload creation
// ---------------------------------------------------------------------------

/// Build a fresh payload for `song_id`, signed if the config asks for it.
///
/// The signing secret lives only for the duration of this call.
pub fn create_payload(
    song_id: &str,
    config: &NfcConfig,
    signer: &Signer,
    now_millis: u64,
) -> Payload {
    let expiry = now_millis.saturating_add(config.expiry_duration_ms.max(1));
    let payload = Payload::new(new_session_id(), song_id, expiry);
    if !config.enable_signature {
        return payload;
    }

    let secret = generate_ephemeral_secret();
    let signature = signer.sign(payload.session(), payload.song_id(), expiry, &secret);
    payload.with_signature(signature)
}

// ---------------------------------------------------------------------------
// ShareOrchestrator
// ---------------------------------------------------------------------------

pub struct ShareOrchestrator {
    config: RwLock<NfcConfig>,
    timings: ShareTimings,
    radio: Arc<dyn NfcRadio>,
    arbiter: RadioArbiter,
    signer: Signer,
    clock: Arc<dyn Clock>,
    state: Arc<watch::Sender<ShareState>>,
    /// Cancel signal of the share in progress. Also serialises the
    /// `Idle → Waiting` transition against `cancel()`.
    cancel_tx: Mutex<Option<oneshot::Sender<()>>>,
    /// Bumped per share and per reset so a stale auto-reset does nothing.
    epoch: Arc<AtomicU64>,
}

impl ShareOrchestrator {
    pub fn with_config(
        config: NfcConfig,
        timings: ShareTimings,
        radio: Arc<dyn NfcRadio>,
        arbiter: RadioArbiter,
        signer: Signer,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (state, _) = watch::channel(ShareState::Idle);
        Self {
            config: RwLock::new(config),
            timings,
            radio,
            arbiter,
            signer,
            clock,
            state: Arc::new(state),
            cancel_tx: Mutex::new(None),
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn config(&self) -> NfcConfig {
        self.config.read().clone()
    }

    pub fn update_config(&self, update: NfcConfigUpdate) {
        self.config.write().apply(update);
    }

    pub fn timings(&self) -> ShareTimings {
        self.timings
    }

    pub fn state(&self) -> ShareState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ShareState> {
        self.state.subscribe()
    }

    /// The current state followed by every change.
    ///
    /// States that change faster than the stream is polled are coalesced to
    /// the latest one.
    pub fn state_stream(&self) -> impl Stream<Item = ShareState> + Send + 'static {
        let rx = self.state.subscribe();
        futures::stream::unfold((rx, true), |(mut rx, first)| async move {
            if !first {
                rx.changed().await.ok()?;
            }
            let state = *rx.borrow_and_update();
            Some((state, (rx, false)))
        })
    }

    /// Share `song_id` with the next device that taps.
    ///
    /// Only valid from `Idle`. Resolves when the write completes, fails, is
    /// cancelled or times out. The terminal state resets to `Idle` after its
    /// display delay.
    pub async fn share(&self, song_id: &str) -> Result<ShareOutcome, NfcError> {
        if song_id.is_empty() {
            return Err(NfcError::Validation(ValidationError::MissingFields));
        }
        if !self.radio.is_supported().await {
            return Err(NfcError::RadioUnsupported);
        }
        if !self.radio.is_enabled().await {
            return Err(NfcError::RadioDisabled);
        }

        let (cancel_rx, epoch) = self.begin()?;
        let mut attempt = Attempt {
            host: self,
            epoch,
            armed: true,
        };
        let result = self.write(song_id, cancel_rx).await;
        attempt.armed = false;
        self.cancel_tx.lock().take();

        let (terminal, display) = match &result {
            Ok(ShareOutcome::Shared(payload)) => {
                info!(session = %payload.session(), song_id, "song shared");
                (ShareState::Success, self.timings.success_display)
            }
            Ok(ShareOutcome::Cancelled(reason)) => {
                info!(song_id, ?reason, "share cancelled");
                (ShareState::Cancelled, self.timings.cancelled_display)
            }
            Err(err) => {
                warn!(song_id, error = %err, "share failed");
                (ShareState::Error, self.timings.error_display)
            }
        };
        self.state.send_replace(terminal);
        self.schedule_reset(epoch, display);

        result
    }

    /// Abort the share in progress. Only valid while `Waiting`.
    pub fn cancel(&self) -> Result<(), NfcError> {
        let mut slot = self.cancel_tx.lock();
        let current = self.state();
        if current != ShareState::Waiting {
            return Err(NfcError::InvalidState {
                current: current.to_string(),
                operation: "cancel sharing",
            });
        }
        if let Some(cancel) = slot.take() {
            let _ = cancel.send(());
        }
        Ok(())
    }

    /// Dismiss a terminal state now instead of after its display delay.
    pub fn reset(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        reset_if_terminal(&self.state);
    }

    /// `Idle → Waiting`, arming a fresh cancel signal.
    fn begin(&self) -> Result<(oneshot::Receiver<()>, u64), NfcError> {
        let mut slot = self.cancel_tx.lock();
        let mut current = ShareState::Idle;
        let entered = self.state.send_if_modified(|state| {
            current = *state;
            if *state == ShareState::Idle {
                *state = ShareState::Waiting;
                true
            } else {
                false
            }
        });
        if !entered {
            return Err(NfcError::InvalidState {
                current: current.to_string(),
                operation: "share",
            });
        }

        let (cancel_tx, cancel_rx) = oneshot::channel();
        *slot = Some(cancel_tx);
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        Ok((cancel_rx, epoch))
    }

    async fn write(
        &self,
        song_id: &str,
        cancel_rx: oneshot::Receiver<()>,
    ) -> Result<ShareOutcome, NfcError> {
        let config = self.config();
        let payload = create_payload(song_id, &config, &self.signer, self.clock.now_millis());
        let records = encode_records(&payload, &config)?;
        let lease = self.arbiter.try_acquire(RadioUser::Writer)?;

        debug!(
            session = %payload.session(),
            song_id,
            format = ?config.record_format,
            "waiting for a tap"
        );
        let deadline = async {
            match self.timings.wait_timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending::<()>().await,
            }
        };

        let outcome = tokio::select! {
            written = self.radio.request_write(&records) => match written {
                Ok(()) => Ok(ShareOutcome::Shared(payload)),
                Err(err) if err.is_cancellation() => {
                    Ok(ShareOutcome::Cancelled(CancelReason::User))
                }
                Err(err) => Err(NfcError::from(err)),
            },
            _ = cancel_rx => Ok(ShareOutcome::Cancelled(CancelReason::User)),
            _ = deadline => Ok(ShareOutcome::Cancelled(CancelReason::Timeout)),
        };

        if let Err(err) = self.radio.cancel().await {
            debug!(error = %err, "cancel after write failed");
        }
        drop(lease);
        outcome
    }

    fn schedule_reset(&self, epoch: u64, delay: Duration) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            reset_if_terminal(&self.state);
            return;
        };
        let state = Arc::clone(&self.state);
        let epochs = Arc::clone(&self.epoch);
        runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if epochs.load(Ordering::SeqCst) == epoch {
                reset_if_terminal(&state);
            }
        });
    }
}

/// Cleans up a share whose future was dropped while `Waiting`.
struct Attempt<'a> {
    host: &'a ShareOrchestrator,
    epoch: u64,
    armed: bool,
}

impl Drop for Attempt<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let host = self.host;
        warn!("share abandoned while waiting, cancelling");
        host.cancel_tx.lock().take();
        host.state.send_replace(ShareState::Cancelled);
        host.schedule_reset(self.epoch, host.timings.cancelled_display);

        let radio = Arc::clone(&host.radio);
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                if let Err(err) = radio.cancel().await {
                    debug!(error = %err, "cancel after abandoned share failed");
                }
            });
        }
    }
}

fn reset_if_terminal(state: &watch::Sender<ShareState>) {
    state.send_if_modified(|state| {
        if state.is_terminal() {
            *state = ShareState::Idle;
            true
        } else {
            false
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{NfcConfigUpdate, RecordFormat};
    use crate::crypto::verify_payload;
    use crate::ndef::decode_records;
    use crate::radio::{LoopbackRadio, RadioError, WriteBehavior};
    use futures::StreamExt;

    const NOW: u64 = 1_700_000_000_000;

    fn orchestrator(radio: &Arc<LoopbackRadio>) -> Arc<ShareOrchestrator> {
        orchestrator_with(radio, NfcConfig::default(), ShareTimings::default())
    }

    fn orchestrator_with(
        radio: &Arc<LoopbackRadio>,
        config: NfcConfig,
        timings: ShareTimings,
    ) -> Arc<ShareOrchestrator> {
        Arc::new(ShareOrchestrator::with_config(
            config,
            timings,
            radio.clone(),
            RadioArbiter::new(),
            Signer::default(),
            Arc::new(ManualClock::new(NOW)),
        ))
    }

    fn waiting_radio() -> Arc<LoopbackRadio> {
        let radio = Arc::new(LoopbackRadio::new());
        radio.set_write_behavior(WriteBehavior::WaitForTap);
        radio
    }

    #[test]
    fn created_payload_shape() {
        let config = NfcConfig::default();
        let payload = create_payload("abc123", &config, &Signer::default(), NOW);
        assert_eq!(payload.song_id(), "abc123");
        assert_eq!(payload.expiry(), NOW + 120_000);
        assert!(uuid::Uuid::parse_str(payload.session()).is_ok());
        assert!(verify_payload(&payload, None));

        let unsigned = create_payload(
            "abc123",
            &config.with(NfcConfigUpdate {
                enable_signature: Some(false),
                expiry_duration_ms: Some(0),
                ..Default::default()
            }),
            &Signer::default(),
            NOW,
        );
        assert!(!unsigned.is_signed());
        assert!(unsigned.expiry() > NOW);
    }

    #[tokio::test(start_paused = true)]
    async fn successful_share_writes_payload_and_resets() {
        let radio = Arc::new(LoopbackRadio::new());
        let host = orchestrator(&radio);

        let payload = match host.share("abc123").await.unwrap() {
            ShareOutcome::Shared(payload) => payload,
            other => panic!("expected a shared payload, got {other:?}"),
        };
        assert_eq!(host.state(), ShareState::Success);

        let written = radio.last_written().expect("one write");
        assert_eq!(written.len(), 2);
        assert_eq!(decode_records(&written, &host.config()).unwrap(), payload);
        assert_eq!(radio.cancel_count(), 1);

        tokio::time::sleep(Duration::from_millis(2_100)).await;
        assert_eq!(host.state(), ShareState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn mime_format_is_honoured() {
        let radio = Arc::new(LoopbackRadio::new());
        let config = NfcConfig::default().with(NfcConfigUpdate {
            record_format: Some(RecordFormat::Mime),
            ..Default::default()
        });
        let host = orchestrator_with(&radio, config, ShareTimings::default());
        host.share("abc123").await.unwrap();

        let written = radio.last_written().unwrap();
        assert_eq!(written[0].record_type, b"application/beatit.nfc".to_vec());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_while_waiting() {
        let radio = waiting_radio();
        let host = orchestrator(&radio);

        let share = {
            let host = Arc::clone(&host);
            tokio::spawn(async move { host.share("abc123").await })
        };
        radio.wait_for_pending_write().await;
        assert_eq!(host.state(), ShareState::Waiting);

        host.cancel().unwrap();
        let outcome = share.await.unwrap().unwrap();
        assert_eq!(outcome, ShareOutcome::Cancelled(CancelReason::User));
        assert_eq!(host.state(), ShareState::Cancelled);
        assert!(!radio.has_pending_write());

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert_eq!(host.state(), ShareState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_behaves_like_cancel() {
        let radio = waiting_radio();
        let timings = ShareTimings {
            wait_timeout: Some(Duration::from_secs(5)),
            ..ShareTimings::default()
        };
        let host = orchestrator_with(&radio, NfcConfig::default(), timings);

        let outcome = host.share("abc123").await.unwrap();
        assert_eq!(outcome, ShareOutcome::Cancelled(CancelReason::Timeout));
        assert_eq!(host.state(), ShareState::Cancelled);
        assert!(radio.written().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn radio_failure_is_an_error() {
        let radio = Arc::new(LoopbackRadio::new());
        radio.set_write_behavior(WriteBehavior::Fail(RadioError::Platform("tag lost".into())));
        let host = orchestrator(&radio);

        let err = host.share("abc123").await.unwrap_err();
        assert!(matches!(err, NfcError::Radio(RadioError::Platform(_))));
        assert_eq!(host.state(), ShareState::Error);

        tokio::time::sleep(Duration::from_millis(2_100)).await;
        assert_eq!(host.state(), ShareState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn radio_timeout_is_a_retryable_error() {
        let radio = Arc::new(LoopbackRadio::new());
        radio.set_write_behavior(WriteBehavior::Fail(RadioError::Timeout));
        let host = orchestrator(&radio);

        let err = host.share("abc123").await.unwrap_err();
        assert!(matches!(err, NfcError::RadioTimeout));
        assert!(err.is_retryable());
        assert_eq!(host.state(), ShareState::Error);
        assert!(radio.written().is_empty());

        tokio::time::sleep(Duration::from_millis(2_100)).await;
        assert_eq!(host.state(), ShareState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn platform_cancellation_is_not_an_error() {
        let radio = Arc::new(LoopbackRadio::new());
        radio.set_write_behavior(WriteBehavior::Fail(RadioError::Platform(
            "UserCancel".into(),
        )));
        let host = orchestrator(&radio);

        assert_eq!(
            host.share("abc123").await.unwrap(),
            ShareOutcome::Cancelled(CancelReason::User)
        );
        assert_eq!(host.state(), ShareState::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_radio_leaves_state_idle() {
        let radio = Arc::new(LoopbackRadio::new());
        radio.set_enabled(false);
        let host = orchestrator(&radio);

        assert!(matches!(
            host.share("abc123").await,
            Err(NfcError::RadioDisabled)
        ));
        assert_eq!(host.state(), ShareState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn second_share_and_idle_cancel_are_invalid() {
        let radio = waiting_radio();
        let host = orchestrator(&radio);
        assert!(matches!(host.cancel(), Err(NfcError::InvalidState { .. })));

        let share = {
            let host = Arc::clone(&host);
            tokio::spawn(async move { host.share("abc123").await })
        };
        radio.wait_for_pending_write().await;

        assert!(matches!(
            host.share("other").await,
            Err(NfcError::InvalidState { ref current, .. }) if current == "waiting"
        ));

        radio.complete_pending_write();
        assert!(matches!(
            share.await.unwrap(),
            Ok(ShareOutcome::Shared(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn reset_dismisses_terminal_state_early() {
        let radio = Arc::new(LoopbackRadio::new());
        let host = orchestrator(&radio);
        host.share("abc123").await.unwrap();
        host.reset();
        assert_eq!(host.state(), ShareState::Idle);

        // The next share is not clobbered by the first share's timer.
        radio.set_write_behavior(WriteBehavior::WaitForTap);
        let share = {
            let host = Arc::clone(&host);
            tokio::spawn(async move { host.share("abc123").await })
        };
        radio.wait_for_pending_write().await;
        tokio::time::sleep(Duration::from_millis(2_100)).await;
        assert_eq!(host.state(), ShareState::Waiting);

        host.cancel().unwrap();
        share.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_share_does_not_stay_waiting() {
        let radio = waiting_radio();
        let host = orchestrator(&radio);

        let share = {
            let host = Arc::clone(&host);
            tokio::spawn(async move { host.share("abc123").await })
        };
        radio.wait_for_pending_write().await;
        share.abort();
        let _ = share.await;

        assert_eq!(host.state(), ShareState::Cancelled);
        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert_eq!(host.state(), ShareState::Idle);
        assert!(!radio.has_pending_write());
    }

    #[tokio::test(start_paused = true)]
    async fn state_stream_follows_transitions() {
        let radio = waiting_radio();
        let host = orchestrator(&radio);
        let mut states = Box::pin(host.state_stream());
        assert_eq!(states.next().await, Some(ShareState::Idle));

        let share = {
            let host = Arc::clone(&host);
            tokio::spawn(async move { host.share("abc123").await })
        };
        assert_eq!(states.next().await, Some(ShareState::Waiting));

        radio.wait_for_pending_write().await;
        radio.complete_pending_write();
        assert_eq!(states.next().await, Some(ShareState::Success));
        share.await.unwrap().unwrap();

        assert_eq!(states.next().await, Some(ShareState::Idle));
    }
}
