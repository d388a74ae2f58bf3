//! # Handoff Coordinator
//!
//! [`NfcHandoff`] is what the app talks to. It owns both orchestrators, the
//! persisted settings and the routing of received songs into the library
//! and the player.
//!
//! ## Radio handoff
//!
//! The listener and the host share need the same radio. [`NfcHandoff::share`]
//! pauses a running listener, waits for the platform to let go of the radio,
//! shares, and restarts the listener whether the share worked or not. The
//! restart is tied to a guard, so even a share future dropped halfway through
//! brings the listener back.
//!
//! ## Received payloads
//!
//! Tags and deep links go through the same validator and the same replay
//! store. Every accepted payload is announced as
//! [`HandoffEvent::PayloadReceived`]; then it is either played straight away
//! (auto-accept) or announced as [`HandoffEvent::ConfirmationRequested`] for
//! the app to [`accept`](NfcHandoff::accept).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::{NfcConfig, NfcConfigUpdate, ShareTimings};
use crate::crypto::Signer;
use crate::error::NfcError;
use crate::guest::{GuestListener, GuestValidator, PayloadSink};
use crate::host::{ShareOrchestrator, ShareOutcome, ShareState};
use crate::library::{Player, Song, SongLibrary};
use crate::payload::{decode_uri, CodecError, Payload};
use crate::radio::{NfcRadio, RadioArbiter};
use crate::storage::{KeyValueStore, MemoryStore, ReplaySessionStore, SettingsStore};

/// Buffered events per subscriber before the oldest are dropped.
const EVENT_CAPACITY: usize = 64;

/// App lifecycle transitions the handoff reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppLifecycle {
    Foreground,
    Background,
}

/// Notifications for the app's UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandoffEvent {
    /// A tag or link passed validation.
    PayloadReceived(Payload),
    /// Auto-accept is off; the app should ask before calling `accept`.
    ConfirmationRequested(Payload),
    NowPlaying(Song),
    /// The payload was valid but the song is not on this device.
    SongUnavailable { song_id: String },
    PlaybackFailed { song_id: String, reason: String },
    /// NFC was switched on while the app was in the background.
    RadioEnabled,
}

/// Snapshot for a settings screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RadioStatus {
    pub supported: bool,
    pub enabled: bool,
    pub listening: bool,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

pub struct NfcHandoffBuilder {
    radio: Arc<dyn NfcRadio>,
    library: Arc<dyn SongLibrary>,
    player: Arc<dyn Player>,
    config: NfcConfig,
    timings: ShareTimings,
    store: Option<Arc<dyn KeyValueStore>>,
    clock: Arc<dyn Clock>,
    signer: Signer,
}

impl NfcHandoffBuilder {
    pub fn config(mut self, config: NfcConfig) -> Self {
        self.config = config;
        self
    }

    pub fn timings(mut self, timings: ShareTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Persistent key/value store. Defaults to an in-memory one.
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn signer(mut self, signer: Signer) -> Self {
        self.signer = signer;
        self
    }

    pub fn build(self) -> NfcHandoff {
        let kv = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn KeyValueStore>);
        let arbiter = RadioArbiter::new();

        let replay = Arc::new(ReplaySessionStore::new(Arc::clone(&kv)));
        let validator = Arc::new(
            GuestValidator::new(replay, Arc::clone(&self.clock)).with_signer(self.signer),
        );
        let listener = Arc::new(GuestListener::with_config(
            self.config.clone(),
            Arc::clone(&self.radio),
            arbiter.clone(),
            validator,
        ));
        let host = ShareOrchestrator::with_config(
            self.config.clone(),
            self.timings,
            Arc::clone(&self.radio),
            arbiter,
            self.signer,
            self.clock,
        );

        let settings = SettingsStore::new(kv);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let router = Arc::new(PayloadRouter {
            settings: settings.clone(),
            library: self.library,
            player: self.player,
            events,
            last_received: Mutex::new(None),
        });

        NfcHandoff {
            config: RwLock::new(self.config),
            timings: self.timings,
            radio: self.radio,
            host,
            listener,
            router,
            settings,
            supported: AtomicBool::new(false),
            radio_enabled: AtomicBool::new(false),
            gate: Arc::new(ListenerGate::default()),
        }
    }
}

// ---------------------------------------------------------------------------
// NfcHandoff
// ---------------------------------------------------------------------------

pub struct NfcHandoff {
    config: RwLock<NfcConfig>,
    timings: ShareTimings,
    radio: Arc<dyn NfcRadio>,
    host: ShareOrchestrator,
    listener: Arc<GuestListener>,
    router: Arc<PayloadRouter>,
    settings: SettingsStore,
    supported: AtomicBool,
    radio_enabled: AtomicBool,
    gate: Arc<ListenerGate>,
}

/// Serialises listener start/stop between shares, lifecycle changes and the
/// settings toggles, including restarts deferred past a dropped share.
#[derive(Default)]
struct ListenerGate {
    ops: tokio::sync::Mutex<()>,
    background: AtomicBool,
}

impl NfcHandoff {
    pub fn builder(
        radio: Arc<dyn NfcRadio>,
        library: Arc<dyn SongLibrary>,
        player: Arc<dyn Player>,
    ) -> NfcHandoffBuilder {
        NfcHandoffBuilder {
            radio,
            library,
            player,
            config: NfcConfig::default(),
            timings: ShareTimings::default(),
            store: None,
            clock: Arc::new(SystemClock),
            signer: Signer::default(),
        }
    }

    /// Probe the radio and start listening if the user wants to.
    ///
    /// Returns `Ok(false)` on devices without NFC; nothing is started then.
    pub async fn initialize(&self) -> Result<bool, NfcError> {
        let supported = self.radio.is_supported().await;
        self.supported.store(supported, Ordering::SeqCst);
        if !supported {
            warn!("NFC is not supported on this device");
            return Ok(false);
        }

        self.radio.start().await?;
        let enabled = self.radio.is_enabled().await;
        self.radio_enabled.store(enabled, Ordering::SeqCst);
        info!(
            enabled,
            auto_accept = self.settings.auto_accept(),
            "NFC handoff initialized"
        );

        if enabled && self.settings.listener_enabled() {
            let _ops = self.gate.ops.lock().await;
            if let Err(err) = self.start_listener().await {
                warn!(error = %err, "failed to start NFC listener");
            }
        }
        Ok(true)
    }

    // -- Host ----------------------------------------------------------------

    /// Share `song_id`, pausing the listener around the write.
    pub async fn share(&self, song_id: &str) -> Result<ShareOutcome, NfcError> {
        if !self.radio.is_supported().await {
            return Err(NfcError::RadioUnsupported);
        }
        let enabled = self.radio.is_enabled().await;
        self.radio_enabled.store(enabled, Ordering::SeqCst);
        if !enabled {
            return Err(NfcError::RadioDisabled);
        }
        let current = self.host.state();
        if current != ShareState::Idle {
            return Err(NfcError::InvalidState {
                current: current.to_string(),
                operation: "share",
            });
        }

        let _ops = self.gate.ops.lock().await;
        let pause = ListenerPause::begin(
            Arc::clone(&self.listener),
            self.sink(),
            Arc::clone(&self.gate),
            self.settings.clone(),
            self.timings.listener_release_delay,
        )
        .await;
        let result = self.host.share(song_id).await;
        pause.resume().await;
        result
    }

    pub fn cancel_share(&self) -> Result<(), NfcError> {
        self.host.cancel()
    }

    pub fn share_state(&self) -> ShareState {
        self.host.state()
    }

    pub fn share_states(&self) -> impl Stream<Item = ShareState> + Send + 'static {
        self.host.state_stream()
    }

    pub fn subscribe(&self) -> watch::Receiver<ShareState> {
        self.host.subscribe()
    }

    // -- Guest ---------------------------------------------------------------

    /// Start listening and remember the choice.
    pub async fn enable_listener(&self) -> Result<(), NfcError> {
        if !self.radio.is_supported().await {
            return Err(NfcError::RadioUnsupported);
        }
        let enabled = self.radio.is_enabled().await;
        self.radio_enabled.store(enabled, Ordering::SeqCst);
        if !enabled {
            return Err(NfcError::RadioDisabled);
        }

        let _ops = self.gate.ops.lock().await;
        self.start_listener().await?;
        self.settings.set_listener_enabled(true)?;
        Ok(())
    }

    /// Stop listening and remember the choice.
    pub async fn disable_listener(&self) -> Result<(), NfcError> {
        let _ops = self.gate.ops.lock().await;
        self.listener.stop().await;
        self.settings.set_listener_enabled(false)?;
        Ok(())
    }

    pub async fn is_listening(&self) -> bool {
        self.listener.is_listening().await
    }

    /// Read the tag in range once and route it like a discovered tag.
    pub async fn read_once(&self) -> Result<Payload, NfcError> {
        let _ops = self.gate.ops.lock().await;
        let payload = self.listener.read_once().await?;
        self.router.route(payload.clone()).await;
        Ok(payload)
    }

    /// Validate and route a `scheme://host/path?..` link opened by the OS.
    pub async fn handle_deep_link(&self, url: &str) -> Result<Payload, NfcError> {
        let prefix = self.config.read().link_prefix();
        if !is_handoff_link(url, &prefix) {
            return Err(CodecError::NotHandoffLink(url.to_string()).into());
        }

        let payload = decode_uri(url)?;
        let payload = self.listener.validator().validate(&payload).into_result()?;
        self.router.route(payload.clone()).await;
        Ok(payload)
    }

    /// Play the song of a payload the app confirmed.
    pub async fn accept(&self, payload: &Payload) -> Result<Song, NfcError> {
        self.router.play(payload).await
    }

    pub fn last_received(&self) -> Option<Payload> {
        self.router.last_received.lock().clone()
    }

    pub fn events(&self) -> broadcast::Receiver<HandoffEvent> {
        self.router.events.subscribe()
    }

    /// Forget every consumed session.
    pub fn clear_used_sessions(&self) {
        self.listener.validator().store().clear();
    }

    // -- Settings and lifecycle ------------------------------------------------

    pub fn auto_accept(&self) -> bool {
        self.settings.auto_accept()
    }

    pub fn set_auto_accept(&self, enabled: bool) -> Result<(), NfcError> {
        self.settings.set_auto_accept(enabled)?;
        Ok(())
    }

    pub async fn check_radio_status(&self) -> RadioStatus {
        let supported = self.radio.is_supported().await;
        let enabled = supported && self.radio.is_enabled().await;
        self.supported.store(supported, Ordering::SeqCst);
        self.radio_enabled.store(enabled, Ordering::SeqCst);
        RadioStatus {
            supported,
            enabled,
            listening: self.listener.is_listening().await,
        }
    }

    pub async fn open_radio_settings(&self) -> Result<(), NfcError> {
        Ok(self.radio.open_settings().await?)
    }

    /// Stop on background; on foreground re-probe and restart if allowed.
    pub async fn on_lifecycle(&self, lifecycle: AppLifecycle) {
        let _ops = self.gate.ops.lock().await;
        match lifecycle {
            AppLifecycle::Background => {
                debug!("app in background, stopping listener");
                self.gate.background.store(true, Ordering::SeqCst);
                self.listener.stop().await;
            }
            AppLifecycle::Foreground => {
                self.gate.background.store(false, Ordering::SeqCst);
                if !self.supported.load(Ordering::SeqCst) {
                    return;
                }
                let enabled = self.radio.is_enabled().await;
                let was_enabled = self.radio_enabled.swap(enabled, Ordering::SeqCst);
                if enabled && !was_enabled {
                    info!("NFC was switched on");
                    self.router.emit(HandoffEvent::RadioEnabled);
                }
                if enabled && self.settings.listener_enabled() {
                    if let Err(err) = self.start_listener().await {
                        warn!(error = %err, "failed to restart NFC listener");
                    }
                }
            }
        }
    }

    pub fn config(&self) -> NfcConfig {
        self.config.read().clone()
    }

    /// Apply a configuration change to both orchestrators.
    pub fn update_config(&self, update: NfcConfigUpdate) {
        self.config.write().apply(update.clone());
        self.host.update_config(update.clone());
        self.listener.update_config(update);
    }

    fn sink(&self) -> Arc<dyn PayloadSink> {
        self.router.clone()
    }

    async fn start_listener(&self) -> Result<(), NfcError> {
        if self.listener.is_listening().await {
            return Ok(());
        }
        self.listener.start(self.sink()).await
    }
}

/// `url` is `prefix` itself, or `prefix` followed by a query or a subpath.
fn is_handoff_link(url: &str, prefix: &str) -> bool {
    url.strip_prefix(prefix)
        .is_some_and(|rest| matches!(rest.chars().next(), None | Some('?') | Some('/')))
}

// ---------------------------------------------------------------------------
// Listener pause
// ---------------------------------------------------------------------------

/// A listener stopped for a share. Resumed explicitly, or on drop.
///
/// The explicit resume runs under the caller's gate lock. The drop path
/// spawns a restart that takes the gate itself and gives up if the app went
/// to the background or the user turned listening off in the meantime.
struct ListenerPause {
    listener: Arc<GuestListener>,
    sink: Arc<dyn PayloadSink>,
    gate: Arc<ListenerGate>,
    settings: SettingsStore,
    paused: bool,
}

impl ListenerPause {
    async fn begin(
        listener: Arc<GuestListener>,
        sink: Arc<dyn PayloadSink>,
        gate: Arc<ListenerGate>,
        settings: SettingsStore,
        release_delay: Duration,
    ) -> Self {
        let mut pause = Self {
            listener,
            sink,
            gate,
            settings,
            paused: false,
        };
        if pause.listener.is_listening().await {
            debug!("pausing listener for share");
            pause.paused = true;
            pause.listener.stop().await;
            tokio::time::sleep(release_delay).await;
        }
        pause
    }

    async fn resume(mut self) {
        if std::mem::take(&mut self.paused) {
            restart_listener(&self.listener, &self.sink).await;
        }
    }
}

impl Drop for ListenerPause {
    fn drop(&mut self) {
        if !self.paused {
            return;
        }
        let listener = Arc::clone(&self.listener);
        let sink = Arc::clone(&self.sink);
        let gate = Arc::clone(&self.gate);
        let settings = self.settings.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    let _ops = gate.ops.lock().await;
                    if gate.background.load(Ordering::SeqCst) || !settings.listener_enabled() {
                        debug!("listener stays stopped after abandoned share");
                        return;
                    }
                    if !listener.is_listening().await {
                        restart_listener(&listener, &sink).await;
                    }
                });
            }
            Err(_) => warn!("share abandoned outside a runtime, listener left stopped"),
        }
    }
}

async fn restart_listener(listener: &GuestListener, sink: &Arc<dyn PayloadSink>) {
    match listener.start(Arc::clone(sink)).await {
        Ok(()) => debug!("listener resumed after share"),
        Err(err) => warn!(error = %err, "failed to resume NFC listener after share"),
    }
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

struct PayloadRouter {
    settings: SettingsStore,
    library: Arc<dyn SongLibrary>,
    player: Arc<dyn Player>,
    events: broadcast::Sender<HandoffEvent>,
    last_received: Mutex<Option<Payload>>,
}

impl PayloadRouter {
    fn emit(&self, event: HandoffEvent) {
        if self.events.send(event).is_err() {
            debug!("no handoff event subscribers");
        }
    }

    async fn route(&self, payload: Payload) {
        *self.last_received.lock() = Some(payload.clone());
        self.emit(HandoffEvent::PayloadReceived(payload.clone()));

        if self.settings.auto_accept() {
            if let Err(err) = self.play(&payload).await {
                warn!(song_id = %payload.song_id(), error = %err, "auto-play failed");
            }
        } else {
            self.emit(HandoffEvent::ConfirmationRequested(payload));
        }
    }

    async fn play(&self, payload: &Payload) -> Result<Song, NfcError> {
        let song_id = payload.song_id();
        let Some(song) = self.library.find_song_by_id(song_id).await else {
            self.emit(HandoffEvent::SongUnavailable {
                song_id: song_id.to_string(),
            });
            return Err(NfcError::SongUnavailable(song_id.to_string()));
        };

        if let Err(reason) = self.player.play(&song).await {
            self.emit(HandoffEvent::PlaybackFailed {
                song_id: song_id.to_string(),
                reason: reason.clone(),
            });
            return Err(NfcError::Playback(reason));
        }

        info!(song_id, title = %song.title, "playing shared song");
        self.emit(HandoffEvent::NowPlaying(song.clone()));
        Ok(song)
    }
}

#[async_trait]
impl PayloadSink for PayloadRouter {
    async fn deliver(&self, payload: Payload) {
        self.route(payload).await;
    }
}
