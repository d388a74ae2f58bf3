//! Deep-link form: `{scheme}://{host}{path}?session=..&songId=..&expiry=..`.
//!
//! Every value is form-urlencoded, which matters for the base64 signature
//! fields (`+`, `/` and `=`). When a key repeats, the first value wins.

use url::{form_urlencoded, Url};

use crate::config::NfcConfig;

use super::{CodecError, Payload};

/// Build the handoff link for `payload` under the configured prefix.
pub fn encode_uri(payload: &Payload, config: &NfcConfig) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    query
        .append_pair("session", payload.session())
        .append_pair("songId", payload.song_id())
        .append_pair("expiry", &payload.expiry().to_string());
    if let Some(sig) = payload.sig() {
        query.append_pair("sig", sig);
    }
    if let Some(secret_public) = payload.secret_public() {
        query.append_pair("secretPublic", secret_public);
    }

    format!("{}?{}", config.link_prefix(), query.finish())
}

/// Parse a handoff link. The scheme is not checked here; the record codec
/// and the deep-link router decide which links to feed in.
pub fn decode_uri(uri: &str) -> Result<Payload, CodecError> {
    let url = Url::parse(uri.trim())?;

    let mut session = None;
    let mut song_id = None;
    let mut expiry = None;
    let mut sig = None;
    let mut secret_public = None;

    for (key, value) in url.query_pairs() {
        let slot = match key.as_ref() {
            "session" => &mut session,
            "songId" => &mut song_id,
            "expiry" => &mut expiry,
            "sig" => &mut sig,
            "secretPublic" => &mut secret_public,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(value.into_owned());
        }
    }

    let session = required(session, "session")?;
    let song_id = required(song_id, "songId")?;
    let expiry_text = required(expiry, "expiry")?;
    let expiry = expiry_text
        .parse::<u64>()
        .map_err(|_| CodecError::InvalidExpiry(expiry_text.clone()))?;
    if expiry == 0 {
        return Err(CodecError::MissingField("expiry"));
    }

    Ok(Payload::new(session, song_id, expiry).with_signature_fields(sig, secret_public))
}

fn required(value: Option<String>, name: &'static str) -> Result<String, CodecError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or(CodecError::MissingField(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::PayloadSignature;

    fn signed() -> Payload {
        Payload::new("3f1c-9a", "abc123", 1_700_000_120_000).with_signature(PayloadSignature {
            sig: "ab+/cd==".into(),
            secret_public: "x/y+z=".into(),
        })
    }

    #[test]
    fn encodes_under_configured_prefix() {
        let uri = encode_uri(&Payload::new("s1", "abc123", 42), &NfcConfig::default());
        assert_eq!(uri, "beatit://nfc/pair?session=s1&songId=abc123&expiry=42");
    }

    #[test]
    fn base64_values_survive_percent_encoding() {
        let uri = encode_uri(&signed(), &NfcConfig::default());
        assert!(uri.contains("sig=ab%2B%2Fcd%3D%3D"));
        assert_eq!(decode_uri(&uri).unwrap(), signed());
    }

    #[test]
    fn missing_song_is_an_error_not_a_partial_payload() {
        let err = decode_uri("beatit://nfc/pair?session=s1&expiry=42").unwrap_err();
        assert!(matches!(err, CodecError::MissingField("songId")));

        let err = decode_uri("beatit://nfc/pair?session=s1&songId=&expiry=42").unwrap_err();
        assert!(matches!(err, CodecError::MissingField("songId")));
    }

    #[test]
    fn expiry_must_be_an_integer() {
        let err = decode_uri("beatit://nfc/pair?session=s1&songId=a&expiry=tomorrow").unwrap_err();
        assert!(matches!(err, CodecError::InvalidExpiry(ref v) if v == "tomorrow"));
    }

    #[test]
    fn first_occurrence_wins_and_extras_are_ignored() {
        let payload =
            decode_uri("https://beatit.app/pair?songId=a&songId=b&session=s1&expiry=9&utm=x")
                .unwrap();
        assert_eq!(payload.song_id(), "a");
        assert!(!payload.is_signed());
    }

    #[test]
    fn unparseable_link() {
        assert!(matches!(
            decode_uri("not a link"),
            Err(CodecError::InvalidUri(_))
        ));
    }
}
