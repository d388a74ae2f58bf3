//! # Host
//!
//! The sharing side: payload creation and the share state machine.

pub mod share;

pub use share::{create_payload, CancelReason, ShareOrchestrator, ShareOutcome, ShareState};
