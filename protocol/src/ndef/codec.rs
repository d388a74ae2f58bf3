//! Payload ⇄ NDEF record set.
//!
//! Hosts write two records: the payload record (URI or MIME, per
//! [`RecordFormat`]) and an app-identity record so the guest OS launches the
//! app directly.
//!
//! Guests accept whatever their NFC stack hands back. Strategies run in
//! [`DECODE_ORDER`] across the whole record set, so a URI record wins over a
//! MIME record no matter where each sits in the message.

use tracing::debug;

use crate::config::{NfcConfig, RecordFormat};
use crate::payload::{decode_json, decode_uri, encode_json, encode_uri, CodecError, Payload};

use super::message::decode_message;
use super::record::{NdefRecord, RecordKind};

/// One way of finding a payload in a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStrategy {
    /// URI record under the configured scheme, or an http(s) link.
    Uri,
    /// MIME record of the configured media type holding JSON.
    Mime,
    /// Text record holding JSON.
    Text,
}

/// Priority of the decode strategies.
pub const DECODE_ORDER: [DecodeStrategy; 3] =
    [DecodeStrategy::Uri, DecodeStrategy::Mime, DecodeStrategy::Text];

impl DecodeStrategy {
    /// `None` if the record is not this strategy's shape.
    fn attempt(self, kind: &RecordKind, config: &NfcConfig) -> Option<Result<Payload, CodecError>> {
        match (self, kind) {
            (DecodeStrategy::Uri, RecordKind::Uri(uri)) if accepts_link(uri, config) => {
                Some(decode_uri(uri))
            }
            (DecodeStrategy::Mime, RecordKind::Mime { media_type, body })
                if media_type.eq_ignore_ascii_case(&config.mime_type) =>
            {
                Some(decode_json(&String::from_utf8_lossy(body)))
            }
            (DecodeStrategy::Text, RecordKind::Text(text)) => Some(decode_json(text)),
            _ => None,
        }
    }
}

fn accepts_link(uri: &str, config: &NfcConfig) -> bool {
    match uri.split_once("://") {
        Some((scheme, _)) => {
            scheme.eq_ignore_ascii_case(&config.app_scheme)
                || scheme.eq_ignore_ascii_case("http")
                || scheme.eq_ignore_ascii_case("https")
        }
        None => false,
    }
}

/// Build the record set for `payload`.
pub fn encode_records(
    payload: &Payload,
    config: &NfcConfig,
) -> Result<Vec<NdefRecord>, CodecError> {
    let payload_record = match config.record_format {
        RecordFormat::Uri => NdefRecord::uri(&encode_uri(payload, config)),
        RecordFormat::Mime => NdefRecord::mime(&config.mime_type, encode_json(payload)?),
    };
    Ok(vec![
        payload_record,
        NdefRecord::android_application(&config.app_package),
    ])
}

/// Find the first payload in `records`, trying each strategy in turn.
pub fn decode_records(records: &[NdefRecord], config: &NfcConfig) -> Result<Payload, CodecError> {
    if records.is_empty() {
        return Err(CodecError::EmptyMessage);
    }

    let kinds: Vec<RecordKind> = records.iter().map(NdefRecord::kind).collect();
    for strategy in DECODE_ORDER {
        for (index, kind) in kinds.iter().enumerate() {
            match strategy.attempt(kind, config) {
                Some(Ok(payload)) => {
                    debug!(
                        ?strategy,
                        index,
                        session = %payload.session(),
                        "decoded handoff payload"
                    );
                    return Ok(payload);
                }
                Some(Err(err)) => {
                    debug!(?strategy, index, error = %err, "record did not hold a payload");
                }
                None => {}
            }
        }
    }

    Err(CodecError::NoValidPayload)
}

/// Parse raw NDEF bytes and decode the payload they carry.
pub fn decode_tag(bytes: &[u8], config: &NfcConfig) -> Result<Payload, CodecError> {
    let records = decode_message(bytes)?;
    decode_records(&records, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NfcConfigUpdate;
    use crate::crypto::PayloadSignature;
    use crate::ndef::encode_message;

    fn payload() -> Payload {
        Payload::new("s1", "abc123", 1_700_000_120_000).with_signature(PayloadSignature {
            sig: "c2ln+/==".into(),
            secret_public: "cHVi".into(),
        })
    }

    fn mime_config() -> NfcConfig {
        NfcConfig::default().with(NfcConfigUpdate {
            record_format: Some(RecordFormat::Mime),
            ..Default::default()
        })
    }

    #[test]
    fn uri_record_set() {
        let config = NfcConfig::default();
        let records = encode_records(&payload(), &config).unwrap();
        assert_eq!(records.len(), 2);
        assert!(matches!(records[0].kind(), RecordKind::Uri(ref u) if u.contains("songId=abc123")));
        assert_eq!(
            records[1].kind(),
            RecordKind::AppIdentity("com.anonymous.beatit".into())
        );
        assert_eq!(decode_records(&records, &config).unwrap(), payload());
    }

    #[test]
    fn mime_record_set() {
        let config = mime_config();
        let records = encode_records(&payload(), &config).unwrap();
        assert!(matches!(
            records[0].kind(),
            RecordKind::Mime { ref media_type, .. } if media_type == "application/beatit.nfc"
        ));
        assert_eq!(decode_records(&records, &config).unwrap(), payload());
    }

    #[test]
    fn uri_wins_regardless_of_order() {
        let config = NfcConfig::default();
        let from_mime = Payload::new("mime-session", "m", 5);
        let from_uri = Payload::new("uri-session", "u", 5);
        let records = vec![
            NdefRecord::mime(&config.mime_type, encode_json(&from_mime).unwrap()),
            NdefRecord::uri(&encode_uri(&from_uri, &config)),
        ];
        assert_eq!(decode_records(&records, &config).unwrap(), from_uri);
    }

    #[test]
    fn text_record_fallback() {
        let config = NfcConfig::default();
        let json = encode_json(&payload()).unwrap();
        let records = vec![NdefRecord::text(&json, "en")];
        assert_eq!(decode_records(&records, &config).unwrap(), payload());
    }

    #[test]
    fn foreign_scheme_and_media_type_are_skipped() {
        let config = NfcConfig::default();
        let json = encode_json(&payload()).unwrap();
        let records = vec![
            NdefRecord::uri("spotify://track?session=s1&songId=a&expiry=5"),
            NdefRecord::mime("text/plain", json),
        ];
        assert!(matches!(
            decode_records(&records, &config),
            Err(CodecError::NoValidPayload)
        ));
    }

    #[test]
    fn http_links_are_accepted() {
        let records = vec![NdefRecord::uri(
            "https://beatit.app/pair?session=s1&songId=abc123&expiry=5",
        )];
        let payload = decode_records(&records, &NfcConfig::default()).unwrap();
        assert_eq!(payload.song_id(), "abc123");
    }

    #[test]
    fn broken_uri_falls_through_to_mime() {
        let config = NfcConfig::default();
        let records = vec![
            NdefRecord::uri("beatit://nfc/pair?session=s1&expiry=5"),
            NdefRecord::mime(&config.mime_type, encode_json(&payload()).unwrap()),
        ];
        assert_eq!(decode_records(&records, &config).unwrap(), payload());
    }

    #[test]
    fn empty_record_list() {
        assert!(matches!(
            decode_records(&[], &NfcConfig::default()),
            Err(CodecError::EmptyMessage)
        ));
    }

    #[test]
    fn decode_tag_from_bytes() {
        let config = NfcConfig::default();
        let bytes = encode_message(&encode_records(&payload(), &config).unwrap()).unwrap();
        assert_eq!(decode_tag(&bytes, &config).unwrap(), payload());
        assert!(matches!(
            decode_tag(&bytes[..3], &config),
            Err(CodecError::Ndef(_))
        ));
    }
}
