//! # Guest
//!
//! The receiving side: the validator that decides whether a token is
//! acceptable, and the listener that feeds it tags from the radio.

pub mod listener;
pub mod validator;

pub use listener::{GuestListener, ListenerState, PayloadSink};
pub use validator::GuestValidator;
