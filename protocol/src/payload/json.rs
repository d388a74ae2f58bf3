//! Flat JSON form, carried in MIME records and in the text-record fallback.
//!
//! Unknown fields are ignored so newer hosts can add fields without breaking
//! older guests.

use super::{CodecError, Payload, RawPayload};

/// Serialize to compact JSON. Absent signature fields are omitted.
pub fn encode_json(payload: &Payload) -> Result<String, CodecError> {
    Ok(serde_json::to_string(payload)?)
}

/// Parse JSON text, requiring `session`, `songId` and `expiry`.
pub fn decode_json(text: &str) -> Result<Payload, CodecError> {
    let raw: RawPayload = serde_json::from_str(text.trim())?;
    Payload::try_from(raw)
}
