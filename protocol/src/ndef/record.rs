//! NDEF records and the record-kind view the payload codec matches on.

use std::fmt;

/// Well-known type of a URI record.
pub const URI_TYPE: &[u8] = b"U";

/// Well-known type of a text record.
pub const TEXT_TYPE: &[u8] = b"T";

/// External type of an Android application record.
pub const ANDROID_APP_TYPE: &[u8] = b"android.com:pkg";

/// Status-byte flag marking UTF-16 text.
const TEXT_UTF16_FLAG: u8 = 0x80;

/// Low six bits of the status byte hold the language code length.
const TEXT_LANG_MASK: u8 = 0x3F;

/// NFC Forum URI identifier codes. The index is the code written as the
/// first payload byte; code 0 means no abbreviation.
const URI_PREFIXES: [&str; 36] = [
    "",
    "http://www.",
    "https://www.",
    "http://",
    "https://",
    "tel:",
    "mailto:",
    "ftp://anonymous:anonymous@",
    "ftp://ftp.",
    "ftps://",
    "sftp://",
    "smb://",
    "nfs://",
    "ftp://",
    "dav://",
    "news:",
    "telnet://",
    "imap:",
    "rtsp://",
    "urn:",
    "pop:",
    "sip:",
    "sips:",
    "tftp:",
    "btspp://",
    "btl2cap://",
    "btgoep://",
    "tcpobex://",
    "irdaobex://",
    "file://",
    "urn:epc:id:",
    "urn:epc:tag:",
    "urn:epc:pat:",
    "urn:epc:raw:",
    "urn:epc:",
    "urn:nfc:",
];

// ---------------------------------------------------------------------------
// TNF
// ---------------------------------------------------------------------------

/// Type Name Format: the low three bits of a record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Tnf {
    Empty = 0x00,
    WellKnown = 0x01,
    MimeMedia = 0x02,
    AbsoluteUri = 0x03,
    External = 0x04,
    Unknown = 0x05,
    Unchanged = 0x06,
    Reserved = 0x07,
}

impl Tnf {
    /// Decode from header bits. Only the low three bits are read.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0x00 => Tnf::Empty,
            0x01 => Tnf::WellKnown,
            0x02 => Tnf::MimeMedia,
            0x03 => Tnf::AbsoluteUri,
            0x04 => Tnf::External,
            0x05 => Tnf::Unknown,
            0x06 => Tnf::Unchanged,
            _ => Tnf::Reserved,
        }
    }

    pub fn bits(self) -> u8 {
        self as u8
    }
}

// ---------------------------------------------------------------------------
// NdefRecord
// ---------------------------------------------------------------------------

/// A single NDEF record.
#[derive(Clone, PartialEq, Eq)]
pub struct NdefRecord {
    pub tnf: Tnf,
    pub record_type: Vec<u8>,
    pub id: Vec<u8>,
    pub payload: Vec<u8>,
}

impl NdefRecord {
    pub fn new(tnf: Tnf, record_type: impl Into<Vec<u8>>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            tnf,
            record_type: record_type.into(),
            id: Vec::new(),
            payload: payload.into(),
        }
    }

    pub fn with_id(mut self, id: impl Into<Vec<u8>>) -> Self {
        self.id = id.into();
        self
    }

    /// The record that stands for an empty message.
    pub fn empty() -> Self {
        Self::new(Tnf::Empty, Vec::new(), Vec::new())
    }

    /// Well-known URI record. The longest matching identifier prefix is
    /// replaced by its one-byte code.
    pub fn uri(uri: &str) -> Self {
        let (code, prefix) = URI_PREFIXES
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, prefix)| uri.starts_with(*prefix))
            .max_by_key(|(_, prefix)| prefix.len())
            .map(|(code, prefix)| (code as u8, prefix.len()))
            .unwrap_or((0, 0));

        let mut payload = Vec::with_capacity(1 + uri.len() - prefix);
        payload.push(code);
        payload.extend_from_slice(&uri.as_bytes()[prefix..]);
        Self::new(Tnf::WellKnown, URI_TYPE, payload)
    }

    /// Well-known text record, UTF-8 encoded.
    pub fn text(text: &str, language: &str) -> Self {
        let language = &language.as_bytes()[..language.len().min(TEXT_LANG_MASK as usize)];
        let mut payload = Vec::with_capacity(1 + language.len() + text.len());
        payload.push(language.len() as u8);
        payload.extend_from_slice(language);
        payload.extend_from_slice(text.as_bytes());
        Self::new(Tnf::WellKnown, TEXT_TYPE, payload)
    }

    /// MIME media record.
    pub fn mime(media_type: &str, body: impl Into<Vec<u8>>) -> Self {
        Self::new(Tnf::MimeMedia, media_type.as_bytes(), body)
    }

    /// Android application record (AAR) naming an installed package.
    pub fn android_application(package: &str) -> Self {
        Self::new(Tnf::External, ANDROID_APP_TYPE, package.as_bytes())
    }

    /// Classify the record. Undecodable content is [`RecordKind::Other`].
    pub fn kind(&self) -> RecordKind {
        match self.tnf {
            Tnf::WellKnown if self.record_type == URI_TYPE => {
                decode_uri_payload(&self.payload).map_or(RecordKind::Other, RecordKind::Uri)
            }
            Tnf::WellKnown if self.record_type == TEXT_TYPE => {
                decode_text_payload(&self.payload).map_or(RecordKind::Other, RecordKind::Text)
            }
            Tnf::AbsoluteUri => String::from_utf8(self.record_type.clone())
                .map_or(RecordKind::Other, RecordKind::Uri),
            Tnf::MimeMedia => match std::str::from_utf8(&self.record_type) {
                Ok(media_type) => RecordKind::Mime {
                    media_type: media_type.to_string(),
                    body: self.payload.clone(),
                },
                Err(_) => RecordKind::Other,
            },
            Tnf::External if self.record_type == ANDROID_APP_TYPE => {
                String::from_utf8(self.payload.clone())
                    .map_or(RecordKind::Other, RecordKind::AppIdentity)
            }
            _ => RecordKind::Other,
        }
    }
}

impl fmt::Debug for NdefRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NdefRecord")
            .field("tnf", &self.tnf)
            .field("type", &String::from_utf8_lossy(&self.record_type))
            .field("id_len", &self.id.len())
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

/// What a record carries, as far as the handoff protocol cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKind {
    /// Well-known `U` record or absolute-URI record, prefix expanded.
    Uri(String),
    /// MIME media record.
    Mime { media_type: String, body: Vec<u8> },
    /// Well-known `T` record, language code stripped.
    Text(String),
    /// Android application record naming a package.
    AppIdentity(String),
    Other,
}

fn decode_uri_payload(payload: &[u8]) -> Option<String> {
    let (&code, rest) = payload.split_first()?;
    // Unassigned codes are treated as no abbreviation.
    let prefix = URI_PREFIXES.get(code as usize).copied().unwrap_or("");
    let rest = std::str::from_utf8(rest).ok()?;
    Some(format!("{prefix}{rest}"))
}

fn decode_text_payload(payload: &[u8]) -> Option<String> {
    let (&status, rest) = payload.split_first()?;
    let lang_len = (status & TEXT_LANG_MASK) as usize;
    let body = rest.get(lang_len..)?;

    if status & TEXT_UTF16_FLAG == 0 {
        return String::from_utf8(body.to_vec()).ok();
    }

    if body.len() % 2 != 0 {
        return None;
    }
    // Big-endian unless a byte-order mark says otherwise.
    let (little_endian, body) = match body {
        [0xFF, 0xFE, rest @ ..] => (true, rest),
        [0xFE, 0xFF, rest @ ..] => (false, rest),
        _ => (false, body),
    };
    let units: Vec<u16> = body
        .chunks_exact(2)
        .map(|pair| {
            if little_endian {
                u16::from_le_bytes([pair[0], pair[1]])
            } else {
                u16::from_be_bytes([pair[0], pair[1]])
            }
        })
        .collect();
    String::from_utf16(&units).ok()
}
