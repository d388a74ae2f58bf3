//! # NDEF Layer
//!
//! Records, binary message framing, and the codec mapping handoff payloads
//! onto record sets.

pub mod codec;
pub mod message;
pub mod record;

pub use codec::{decode_records, decode_tag, encode_records, DecodeStrategy, DECODE_ORDER};
pub use message::{decode_message, encode_message, NdefError};
pub use record::{NdefRecord, RecordKind, Tnf};
