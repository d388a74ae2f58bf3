//! Binary NDEF message framing.
//!
//! ```text
//!  7   6   5   4   3   2   1   0
//! [MB][ME][CF][SR][IL][  TNF    ]   header
//! [        TYPE LENGTH         ]   1 byte
//! [       PAYLOAD LENGTH       ]   1 byte if SR, else 4 bytes big-endian
//! [         ID LENGTH          ]   1 byte, only if IL
//! [TYPE][ID][PAYLOAD]
//! ```
//!
//! Chunked records (CF) are not produced by any handoff writer and are
//! rejected on read.

use thiserror::Error;

use super::record::{NdefRecord, Tnf};

const FLAG_MB: u8 = 0x80;
const FLAG_ME: u8 = 0x40;
const FLAG_CF: u8 = 0x20;
const FLAG_SR: u8 = 0x10;
const FLAG_IL: u8 = 0x08;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NdefError {
    #[error("NDEF message truncated at byte {0}")]
    Truncated(usize),

    #[error("chunked NDEF records are not supported")]
    Chunked,

    #[error("first NDEF record lacks the message-begin flag")]
    MissingMessageBegin,

    #[error("NDEF message ends without a message-end flag")]
    MissingMessageEnd,

    #[error("{0} bytes follow the message-end record")]
    TrailingData(usize),

    #[error("record {field} is {len} bytes, over the 255-byte limit")]
    FieldTooLong { field: &'static str, len: usize },
}

/// Frame `records` as one NDEF message. An empty slice becomes the single
/// empty record that stands for an empty message.
pub fn encode_message(records: &[NdefRecord]) -> Result<Vec<u8>, NdefError> {
    if records.is_empty() {
        return encode_message(&[NdefRecord::empty()]);
    }

    let mut out = Vec::new();
    let last = records.len() - 1;
    for (index, record) in records.iter().enumerate() {
        let type_len = short_len("type", record.record_type.len())?;
        let id_len = short_len("id", record.id.len())?;
        let payload_len = u32::try_from(record.payload.len()).map_err(|_| {
            NdefError::FieldTooLong {
                field: "payload",
                len: record.payload.len(),
            }
        })?;

        let short = payload_len <= u8::MAX as u32;
        let mut header = record.tnf.bits();
        if index == 0 {
            header |= FLAG_MB;
        }
        if index == last {
            header |= FLAG_ME;
        }
        if short {
            header |= FLAG_SR;
        }
        if id_len > 0 {
            header |= FLAG_IL;
        }

        out.push(header);
        out.push(type_len);
        if short {
            out.push(payload_len as u8);
        } else {
            out.extend_from_slice(&payload_len.to_be_bytes());
        }
        if id_len > 0 {
            out.push(id_len);
        }
        out.extend_from_slice(&record.record_type);
        out.extend_from_slice(&record.id);
        out.extend_from_slice(&record.payload);
    }
    Ok(out)
}

fn short_len(field: &'static str, len: usize) -> Result<u8, NdefError> {
    u8::try_from(len).map_err(|_| NdefError::FieldTooLong { field, len })
}

/// Parse an NDEF message. A message holding only the empty record decodes
/// to no records.
pub fn decode_message(bytes: &[u8]) -> Result<Vec<NdefRecord>, NdefError> {
    let mut reader = Reader { bytes, pos: 0 };
    let mut records = Vec::new();

    loop {
        let header = reader.byte()?;
        if records.is_empty() && header & FLAG_MB == 0 {
            return Err(NdefError::MissingMessageBegin);
        }
        if header & FLAG_CF != 0 {
            return Err(NdefError::Chunked);
        }

        let type_len = reader.byte()? as usize;
        let payload_len = if header & FLAG_SR != 0 {
            reader.byte()? as usize
        } else {
            let raw = reader.take(4)?;
            u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize
        };
        let id_len = if header & FLAG_IL != 0 {
            reader.byte()? as usize
        } else {
            0
        };

        let record_type = reader.take(type_len)?.to_vec();
        let id = reader.take(id_len)?.to_vec();
        let payload = reader.take(payload_len)?.to_vec();

        records.push(NdefRecord {
            tnf: Tnf::from_bits(header),
            record_type,
            id,
            payload,
        });

        if header & FLAG_ME != 0 {
            break;
        }
        if reader.remaining() == 0 {
            return Err(NdefError::MissingMessageEnd);
        }
    }

    if reader.remaining() > 0 {
        return Err(NdefError::TrailingData(reader.remaining()));
    }

    if let [only] = records.as_slice() {
        if *only == NdefRecord::empty() {
            records.clear();
        }
    }
    Ok(records)
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn byte(&mut self) -> Result<u8, NdefError> {
        Ok(self.take(1)?[0])
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], NdefError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or(NdefError::Truncated(self.pos))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_message_layout() {
        let bytes = encode_message(&[]).unwrap();
        assert_eq!(bytes, vec![0xD0, 0x00, 0x00]);
        assert!(decode_message(&bytes).unwrap().is_empty());
    }

    #[test]
    fn single_short_record_layout() {
        let bytes = encode_message(&[NdefRecord::uri("https://a.b")]).unwrap();
        // MB|ME|SR|WellKnown, type len 1, payload len 4, "U", code 0x04, "a.b"
        assert_eq!(
            bytes,
            vec![0xD1, 0x01, 0x04, b'U', 0x04, b'a', b'.', b'b']
        );
    }

    #[test]
    fn long_payload_and_id_round_trip() {
        let records = vec![
            NdefRecord::mime("application/beatit.nfc", vec![b'x'; 300]).with_id(b"p1".to_vec()),
            NdefRecord::android_application("com.anonymous.beatit"),
        ];
        let bytes = encode_message(&records).unwrap();
        assert_eq!(bytes[0] & (FLAG_SR | FLAG_IL), FLAG_IL);
        assert_eq!(decode_message(&bytes).unwrap(), records);
    }

    #[test]
    fn truncation_is_an_error() {
        let bytes = encode_message(&[NdefRecord::uri("beatit://nfc/pair?session=s1")]).unwrap();
        for cut in 0..bytes.len() {
            assert!(decode_message(&bytes[..cut]).is_err(), "cut at {cut}");
        }
    }

    #[test]
    fn huge_declared_length_does_not_panic() {
        let bytes = [0xC1, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, b'U'];
        assert!(matches!(decode_message(&bytes), Err(NdefError::Truncated(_))));
    }

    #[test]
    fn framing_flags_are_checked() {
        assert_eq!(
            decode_message(&[0x51, 0x00, 0x00]),
            Err(NdefError::MissingMessageBegin)
        );
        assert_eq!(decode_message(&[0xF1, 0x00, 0x00]), Err(NdefError::Chunked));
        assert_eq!(
            decode_message(&[0x91, 0x00, 0x00]),
            Err(NdefError::MissingMessageEnd)
        );
        assert_eq!(
            decode_message(&[0xD0, 0x00, 0x00, 0xAA]),
            Err(NdefError::TrailingData(1))
        );
    }

    #[test]
    fn oversized_type_is_rejected() {
        let record = NdefRecord::mime(&"a".repeat(256), Vec::new());
        assert!(matches!(
            encode_message(&[record]),
            Err(NdefError::FieldTooLong { field: "type", len: 256 })
        ));
    }
}
