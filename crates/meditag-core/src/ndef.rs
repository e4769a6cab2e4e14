//! NDEF message and record encoding.
//!
//! Record layout (NFC Forum NDEF 1.0):
//!
//! ```text
//! header | type length | payload length (1 or 4, BE) | [id length] | type | [id] | payload
//! ```
//!
//! Header bits: MB 0x80, ME 0x40, CF 0x20, SR 0x10, IL 0x08, TNF 0x07.

use crate::error::{DecodeFailure, NdefError};

const FLAG_MB: u8 = 0x80;
const FLAG_ME: u8 = 0x40;
const FLAG_CF: u8 = 0x20;
const FLAG_SR: u8 = 0x10;
const FLAG_IL: u8 = 0x08;
const TNF_MASK: u8 = 0x07;

/// Well-known record type of a text record.
pub const RTD_TEXT: &[u8] = b"T";

/// Well-known record type of a URI record.
pub const RTD_URI: &[u8] = b"U";

/// Status byte bit selecting UTF-16 text.
pub const TEXT_UTF16_FLAG: u8 = 0x80;

/// Status byte bits holding the language code length.
pub const TEXT_LANGUAGE_MASK: u8 = 0x3F;

/// Type name format of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tnf {
    Empty,
    WellKnown,
    MimeMedia,
    AbsoluteUri,
    External,
    Unknown,
    Unchanged,
}

impl Tnf {
    pub fn bits(self) -> u8 {
        match self {
            Self::Empty => 0x00,
            Self::WellKnown => 0x01,
            Self::MimeMedia => 0x02,
            Self::AbsoluteUri => 0x03,
            Self::External => 0x04,
            Self::Unknown => 0x05,
            Self::Unchanged => 0x06,
        }
    }

    pub fn from_bits(bits: u8) -> Result<Self, NdefError> {
        match bits & TNF_MASK {
            0x00 => Ok(Self::Empty),
            0x01 => Ok(Self::WellKnown),
            0x02 => Ok(Self::MimeMedia),
            0x03 => Ok(Self::AbsoluteUri),
            0x04 => Ok(Self::External),
            0x05 => Ok(Self::Unknown),
            0x06 => Ok(Self::Unchanged),
            other => Err(NdefError::ReservedTnf(other)),
        }
    }
}

/// What a record carries, as far as the payload decoder cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKind {
    Mime(String),
    Text,
    Uri,
    External(String),
    Empty,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NdefRecord {
    pub tnf: Tnf,
    pub record_type: Vec<u8>,
    pub id: Vec<u8>,
    pub payload: Vec<u8>,
}

impl NdefRecord {
    /// MIME media record.
    pub fn mime(media_type: &str, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            tnf: Tnf::MimeMedia,
            record_type: media_type.as_bytes().to_vec(),
            id: Vec::new(),
            payload: payload.into(),
        }
    }

    /// Well-known text record, UTF-8 encoded.
    pub fn text(language: &str, text: &str) -> Self {
        Self {
            tnf: Tnf::WellKnown,
            record_type: RTD_TEXT.to_vec(),
            id: Vec::new(),
            payload: encode_text_payload(language, text),
        }
    }

    pub fn empty() -> Self {
        Self {
            tnf: Tnf::Empty,
            record_type: Vec::new(),
            id: Vec::new(),
            payload: Vec::new(),
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self.tnf {
            Tnf::Empty => RecordKind::Empty,
            Tnf::MimeMedia => {
                RecordKind::Mime(String::from_utf8_lossy(&self.record_type).into_owned())
            }
            Tnf::WellKnown if self.record_type == RTD_TEXT => RecordKind::Text,
            Tnf::WellKnown if self.record_type == RTD_URI => RecordKind::Uri,
            Tnf::AbsoluteUri => RecordKind::Uri,
            Tnf::External => {
                RecordKind::External(String::from_utf8_lossy(&self.record_type).into_owned())
            }
            _ => RecordKind::Unknown,
        }
    }

    fn encoded_len(&self) -> usize {
        let length_field = if self.payload.len() <= u8::MAX as usize { 1 } else { 4 };
        let id_field = if self.id.is_empty() { 0 } else { 1 };
        2 + length_field + id_field + self.record_type.len() + self.id.len() + self.payload.len()
    }

    fn write_into(&self, out: &mut Vec<u8>, first: bool, last: bool) -> Result<(), NdefError> {
        check_len("type", self.record_type.len(), u8::MAX as usize)?;
        check_len("id", self.id.len(), u8::MAX as usize)?;
        check_len("payload", self.payload.len(), u32::MAX as usize)?;

        let short = self.payload.len() <= u8::MAX as usize;
        let mut header = self.tnf.bits();
        if first {
            header |= FLAG_MB;
        }
        if last {
            header |= FLAG_ME;
        }
        if short {
            header |= FLAG_SR;
        }
        if !self.id.is_empty() {
            header |= FLAG_IL;
        }

        out.push(header);
        out.push(self.record_type.len() as u8);
        if short {
            out.push(self.payload.len() as u8);
        } else {
            out.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        }
        if !self.id.is_empty() {
            out.push(self.id.len() as u8);
        }
        out.extend_from_slice(&self.record_type);
        out.extend_from_slice(&self.id);
        out.extend_from_slice(&self.payload);
        Ok(())
    }
}

/// Ordered set of records read from or written to one tag.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NdefMessage {
    records: Vec<NdefRecord>,
}

impl NdefMessage {
    pub fn new(records: Vec<NdefRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[NdefRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<NdefRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Size of the serialized message in bytes.
    pub fn byte_len(&self) -> usize {
        if self.records.is_empty() {
            return 3;
        }
        self.records.iter().map(NdefRecord::encoded_len).sum()
    }

    /// Serializes the message. A message without records becomes one empty record.
    pub fn to_bytes(&self) -> Result<Vec<u8>, NdefError> {
        if self.records.is_empty() {
            return Ok(vec![FLAG_MB | FLAG_ME | FLAG_SR | Tnf::Empty.bits(), 0, 0]);
        }

        let mut out = Vec::with_capacity(self.byte_len());
        let last = self.records.len() - 1;
        for (idx, record) in self.records.iter().enumerate() {
            record.write_into(&mut out, idx == 0, idx == last)?;
        }
        Ok(out)
    }

    /// Parses a serialized message.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, NdefError> {
        if bytes.is_empty() {
            return Err(NdefError::Empty);
        }

        let mut records = Vec::new();
        let mut offset = 0;

        loop {
            let index = records.len();
            let header = take(bytes, &mut offset, 1)?[0];

            if index == 0 && header & FLAG_MB == 0 {
                return Err(NdefError::MissingBegin);
            }
            if header & FLAG_CF != 0 {
                return Err(NdefError::Chunked);
            }
            let tnf = Tnf::from_bits(header)?;
            if tnf == Tnf::Unchanged {
                return Err(NdefError::UnexpectedUnchanged { index });
            }

            let type_len = take(bytes, &mut offset, 1)?[0] as usize;
            if matches!(tnf, Tnf::Empty | Tnf::Unknown) && type_len != 0 {
                return Err(NdefError::UnexpectedType { index, len: type_len });
            }
            let payload_len = if header & FLAG_SR != 0 {
                take(bytes, &mut offset, 1)?[0] as usize
            } else {
                read_u32_be(take(bytes, &mut offset, 4)?) as usize
            };
            let id_len = if header & FLAG_IL != 0 {
                take(bytes, &mut offset, 1)?[0] as usize
            } else {
                0
            };

            let record_type = take(bytes, &mut offset, type_len)?.to_vec();
            let id = take(bytes, &mut offset, id_len)?.to_vec();
            let payload = take(bytes, &mut offset, payload_len)?.to_vec();

            records.push(NdefRecord {
                tnf,
                record_type,
                id,
                payload,
            });

            if header & FLAG_ME != 0 {
                if offset < bytes.len() {
                    return Err(NdefError::TrailingBytes {
                        index,
                        trailing: bytes.len() - offset,
                    });
                }
                break;
            }
            if offset == bytes.len() {
                return Err(NdefError::MissingEnd);
            }
        }

        Ok(Self { records })
    }
}

impl From<Vec<NdefRecord>> for NdefMessage {
    fn from(records: Vec<NdefRecord>) -> Self {
        Self::new(records)
    }
}

/// Text encoding selected by the status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Utf16,
}

/// Decoded text record payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextPayload {
    pub language: String,
    pub encoding: TextEncoding,
    pub text: String,
}

/// Frames `text` as a UTF-8 text record payload.
///
/// Only the first 63 bytes of `language` fit in the status byte.
pub fn encode_text_payload(language: &str, text: &str) -> Vec<u8> {
    let lang = &language.as_bytes()[..language.len().min(TEXT_LANGUAGE_MASK as usize)];
    let mut out = Vec::with_capacity(1 + lang.len() + text.len());
    out.push(lang.len() as u8);
    out.extend_from_slice(lang);
    out.extend_from_slice(text.as_bytes());
    out
}

/// Strips the status byte and language code, then decodes the text.
pub fn decode_text_payload(payload: &[u8]) -> Result<TextPayload, DecodeFailure> {
    let (&status, rest) = payload
        .split_first()
        .ok_or_else(|| DecodeFailure::MalformedText("missing status byte".into()))?;

    let lang_len = (status & TEXT_LANGUAGE_MASK) as usize;
    if rest.len() < lang_len {
        return Err(DecodeFailure::MalformedText(format!(
            "language code of {} bytes exceeds payload of {} bytes",
            lang_len,
            rest.len()
        )));
    }
    let (lang, body) = rest.split_at(lang_len);
    let language = String::from_utf8_lossy(lang).into_owned();

    if status & TEXT_UTF16_FLAG != 0 {
        Ok(TextPayload {
            language,
            encoding: TextEncoding::Utf16,
            text: decode_utf16(body)?,
        })
    } else {
        let text = std::str::from_utf8(body)
            .map_err(|e| DecodeFailure::MalformedText(e.to_string()))?
            .to_string();
        Ok(TextPayload {
            language,
            encoding: TextEncoding::Utf8,
            text,
        })
    }
}

fn decode_utf16(body: &[u8]) -> Result<String, DecodeFailure> {
    if body.len() % 2 != 0 {
        return Err(DecodeFailure::MalformedText(format!(
            "UTF-16 text has odd length {}",
            body.len()
        )));
    }

    let (little_endian, body) = match body {
        [0xFF, 0xFE, rest @ ..] => (true, rest),
        [0xFE, 0xFF, rest @ ..] => (false, rest),
        _ => (false, body),
    };

    let units: Vec<u16> = body
        .chunks_exact(2)
        .map(|pair| {
            let bytes = [pair[0], pair[1]];
            if little_endian {
                u16::from_le_bytes(bytes)
            } else {
                u16::from_be_bytes(bytes)
            }
        })
        .collect();

    String::from_utf16(&units).map_err(|e| DecodeFailure::MalformedText(e.to_string()))
}

fn check_len(field: &'static str, len: usize, limit: usize) -> Result<(), NdefError> {
    if len > limit {
        return Err(NdefError::FieldTooLarge { field, len, limit });
    }
    Ok(())
}

/// Returns the next `len` bytes and advances `offset`.
#[inline]
fn take<'a>(bytes: &'a [u8], offset: &mut usize, len: usize) -> Result<&'a [u8], NdefError> {
    let start = *offset;
    let available = bytes.len().saturating_sub(start);
    if available < len {
        return Err(NdefError::Truncated {
            offset: start,
            needed: len - available,
        });
    }
    *offset = start + len;
    Ok(&bytes[start..start + len])
}

#[inline]
fn read_u32_be(buf: &[u8]) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[..4]);
    u32::from_be_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_roundtrip_short_and_long() {
        let long_text = "x".repeat(300);
        let message = NdefMessage::new(vec![
            NdefRecord::mime("application/json", b"{}".to_vec()),
            NdefRecord::text("en", &long_text),
        ]);

        let bytes = message.to_bytes().unwrap();
        assert_eq!(bytes.len(), message.byte_len());
        // MB | SR | TNF mime
        assert_eq!(bytes[0], 0x92);

        let parsed = NdefMessage::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, message);
        assert_eq!(parsed.records()[1].kind(), RecordKind::Text);
    }

    #[test]
    fn test_single_record_header() {
        let message = NdefMessage::new(vec![NdefRecord::text("en", "hi")]);
        let bytes = message.to_bytes().unwrap();
        assert_eq!(bytes, vec![0xD1, 0x01, 0x05, b'T', 0x02, b'e', b'n', b'h', b'i']);
    }

    #[test]
    fn test_record_with_id() {
        let mut record = NdefRecord::mime("text/plain", b"abc".to_vec());
        record.id = b"7".to_vec();
        let message = NdefMessage::new(vec![record]);

        let bytes = message.to_bytes().unwrap();
        assert_eq!(bytes[0] & FLAG_IL, FLAG_IL);
        assert_eq!(NdefMessage::from_bytes(&bytes).unwrap(), message);
    }

    #[test]
    fn test_truncated_input() {
        let bytes = NdefMessage::new(vec![NdefRecord::text("en", "hello")])
            .to_bytes()
            .unwrap();
        let err = NdefMessage::from_bytes(&bytes[..bytes.len() - 2]).unwrap_err();
        assert_eq!(err, NdefError::Truncated { offset: 4, needed: 2 });
        assert_eq!(NdefMessage::from_bytes(&[]), Err(NdefError::Empty));
    }

    #[test]
    fn test_invalid_headers() {
        // No MB on the first record
        assert_eq!(
            NdefMessage::from_bytes(&[0x51, 0x00, 0x00]),
            Err(NdefError::MissingBegin)
        );
        // Chunked
        assert_eq!(
            NdefMessage::from_bytes(&[0xB1, 0x00, 0x00]),
            Err(NdefError::Chunked)
        );
        // Missing ME with nothing after it
        assert_eq!(
            NdefMessage::from_bytes(&[0x91, 0x00, 0x00]),
            Err(NdefError::MissingEnd)
        );
        // Bytes after ME
        assert_eq!(
            NdefMessage::from_bytes(&[0xD0, 0x00, 0x00, 0xFF]),
            Err(NdefError::TrailingBytes { index: 0, trailing: 1 })
        );
        assert_eq!(
            NdefMessage::from_bytes(&[0xD7, 0x00, 0x00]),
            Err(NdefError::ReservedTnf(7))
        );
        // Unchanged outside a chunk
        assert_eq!(
            NdefMessage::from_bytes(&[0xD6, 0x00, 0x00]),
            Err(NdefError::UnexpectedUnchanged { index: 0 })
        );
        // Empty and Unknown records carry no type
        assert_eq!(
            NdefMessage::from_bytes(&[0xD0, 0x01, 0x00, b'T']),
            Err(NdefError::UnexpectedType { index: 0, len: 1 })
        );
        assert_eq!(
            NdefMessage::from_bytes(&[0xD5, 0x02, 0x00, b'a', b'b']),
            Err(NdefError::UnexpectedType { index: 0, len: 2 })
        );
        assert!(NdefMessage::from_bytes(&[0xD5, 0x00, 0x01, 0x2A]).is_ok());
    }

    #[test]
    fn test_empty_message_bytes() {
        let bytes = NdefMessage::default().to_bytes().unwrap();
        let parsed = NdefMessage::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.records(), &[NdefRecord::empty()]);
    }

    #[test]
    fn test_text_framing_utf8() {
        let json = r#"{"v":1}"#;
        let mut payload = vec![0x02];
        payload.extend_from_slice(b"en");
        payload.extend_from_slice(json.as_bytes());

        let text = decode_text_payload(&payload).unwrap();
        assert_eq!(text.language, "en");
        assert_eq!(text.encoding, TextEncoding::Utf8);
        assert_eq!(text.text, json);
        assert_eq!(encode_text_payload("en", json), payload);
    }

    #[test]
    fn test_text_framing_utf16() {
        let mut payload = vec![TEXT_UTF16_FLAG | 0x02];
        payload.extend_from_slice(b"de");
        payload.extend_from_slice(&[0xFF, 0xFE]);
        for unit in "{}".encode_utf16() {
            payload.extend_from_slice(&unit.to_le_bytes());
        }

        let text = decode_text_payload(&payload).unwrap();
        assert_eq!(text.language, "de");
        assert_eq!(text.encoding, TextEncoding::Utf16);
        assert_eq!(text.text, "{}");

        let mut big_endian = vec![TEXT_UTF16_FLAG];
        for unit in "ok".encode_utf16() {
            big_endian.extend_from_slice(&unit.to_be_bytes());
        }
        assert_eq!(decode_text_payload(&big_endian).unwrap().text, "ok");

        let mut with_bom = vec![TEXT_UTF16_FLAG, 0xFE, 0xFF];
        for unit in "ok".encode_utf16() {
            with_bom.extend_from_slice(&unit.to_be_bytes());
        }
        assert_eq!(decode_text_payload(&with_bom).unwrap().text, "ok");
    }

    #[test]
    fn test_text_framing_errors() {
        assert!(matches!(
            decode_text_payload(&[]),
            Err(DecodeFailure::MalformedText(_))
        ));
        assert!(matches!(
            decode_text_payload(&[0x05, b'e', b'n']),
            Err(DecodeFailure::MalformedText(_))
        ));
        assert!(matches!(
            decode_text_payload(&[TEXT_UTF16_FLAG, 0x00]),
            Err(DecodeFailure::MalformedText(_))
        ));
        assert!(matches!(
            decode_text_payload(&[0x00, 0xC3, 0x28]),
            Err(DecodeFailure::MalformedText(_))
        ));
    }
}
