// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # BeatIt NFC - Offline Song Handoff
//!
//! One phone (the *host*) writes a signed, short-lived, single-use token
//! naming a song onto an NFC tag write. A second phone (the *guest*)
//! discovers the tag, decodes the token, checks it and hands the song to the
//! player. No network, no server, no prior pairing.
//!
//! ## Architecture
//!
//! Modules are listed leaves first:
//!
//! - **crypto** - ephemeral secrets, SHA-256 / HMAC-SHA256, payload signing.
//! - **payload** - the canonical `Payload` token and its URI / JSON forms.
//! - **ndef** - NDEF records, binary message framing, and the payload codec.
//! - **storage** - key/value persistence, the replay-protection store and
//!   the persisted handoff settings.
//! - **guest** - the validator and the listen orchestrator.
//! - **host** - the share state machine.
//! - **radio** - the platform binding trait, exclusive-access arbitration and
//!   an in-process loopback binding.
//! - **handoff** - the coordinator the app talks to: share with listener
//!   handoff, listener lifecycle, settings and playback routing.
//! - **config** - `NfcConfig`, timings and protocol constants.
//!
//! ## Trust model
//!
//! Tokens are protected by expiry and single use. Signatures are made with a
//! secret the guest never sees, so an offline guest can only check that the
//! signature fields are present. See [`crypto::signing`].

pub mod clock;
pub mod config;
pub mod crypto;
pub mod error;
pub mod guest;
pub mod handoff;
pub mod host;
pub mod library;
pub mod ndef;
pub mod payload;
pub mod radio;
pub mod storage;

pub use config::{NfcConfig, NfcConfigUpdate, RecordFormat, ShareTimings};
pub use error::{NfcError, Severity};
pub use handoff::{AppLifecycle, HandoffEvent, NfcHandoff, NfcHandoffBuilder, RadioStatus};
pub use payload::{Payload, ValidationError, ValidationResult};
