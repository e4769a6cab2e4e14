//! Tag payload encoding.
//!
//! A medicine is stored as the JSON envelope
//! `{"v":1,"type":"meditag/medicine","data":{...}}`, written twice: once as an
//! `application/json` MIME record and once as a text record, so readers
//! without MIME support can still recover it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DecodeFailure, TagError, TagResult};
use crate::model::{
    DEFAULT_COLOR, DEFAULT_FREQUENCY, DEFAULT_PROGRAM_WEEKS, MedicineDraft, Shape,
};
use crate::ndef::{NdefMessage, NdefRecord, RecordKind, decode_text_payload};

pub const PAYLOAD_VERSION: u32 = 1;
pub const PAYLOAD_TYPE: &str = "meditag/medicine";
pub const JSON_MEDIA_TYPE: &str = "application/json";

/// Wire envelope written to a tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagPayload {
    pub v: u32,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: MedicineDraft,
}

impl TagPayload {
    pub fn new(draft: MedicineDraft) -> Self {
        Self {
            v: PAYLOAD_VERSION,
            kind: PAYLOAD_TYPE.to_string(),
            data: draft,
        }
    }

    pub fn to_json(&self) -> TagResult<String> {
        serde_json::to_string(self).map_err(|e| TagError::Unknown(e.to_string()))
    }
}

/// The two records carrying one payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload {
    json: String,
    mime: NdefRecord,
    text: NdefRecord,
}

impl EncodedPayload {
    pub fn json(&self) -> &str {
        &self.json
    }

    pub fn mime_record(&self) -> &NdefRecord {
        &self.mime
    }

    pub fn text_record(&self) -> &NdefRecord {
        &self.text
    }

    /// MIME record first, text record second.
    pub fn message(&self) -> NdefMessage {
        NdefMessage::new(vec![self.mime.clone(), self.text.clone()])
    }
}

/// Encodes a draft into its MIME and text records.
pub fn encode(draft: &MedicineDraft, language: &str) -> TagResult<EncodedPayload> {
    let json = TagPayload::new(draft.clone()).to_json()?;
    Ok(EncodedPayload {
        mime: NdefRecord::mime(JSON_MEDIA_TYPE, json.as_bytes()),
        text: NdefRecord::text(language, &json),
        json,
    })
}

/// Decodes and validates the draft carried by a tag's records.
pub fn decode(records: &[NdefRecord]) -> TagResult<MedicineDraft> {
    let draft = decode_envelope(records)?;
    draft.validate()?;
    Ok(draft)
}

/// Recovers the draft without checking its invariants.
pub fn decode_envelope(records: &[NdefRecord]) -> Result<MedicineDraft, DecodeFailure> {
    let text = select_text(records)?;
    parse_draft(&text)
}

/// Picks the JSON text: first `application/json` record, else first text record.
fn select_text(records: &[NdefRecord]) -> Result<String, DecodeFailure> {
    let kinds: Vec<(RecordKind, &NdefRecord)> = records
        .iter()
        .map(|record| (record.kind(), record))
        .filter(|(kind, _)| *kind != RecordKind::Empty)
        .collect();

    if kinds.is_empty() {
        return Err(DecodeFailure::NoRecords);
    }

    if let Some((_, record)) = kinds
        .iter()
        .find(|(kind, _)| matches!(kind, RecordKind::Mime(media) if is_json_media_type(media)))
    {
        return String::from_utf8(record.payload.clone())
            .map_err(|e| DecodeFailure::MalformedJson(e.to_string()));
    }

    if let Some((_, record)) = kinds.iter().find(|(kind, _)| *kind == RecordKind::Text) {
        return decode_text_payload(&record.payload).map(|text| text.text);
    }

    let found: Vec<String> = kinds.iter().map(|(kind, _)| format!("{:?}", kind)).collect();
    Err(DecodeFailure::UnsupportedFormat(found.join(", ")))
}

fn is_json_media_type(media: &str) -> bool {
    media
        .split(';')
        .next()
        .map(|essence| essence.trim().eq_ignore_ascii_case(JSON_MEDIA_TYPE))
        .unwrap_or(false)
}

/// Tag-side shape of a draft. Every field is optional so that partial
/// payloads still decode and can be reported as invalid.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireDraft {
    name: Option<String>,
    dose: Option<String>,
    shape: Option<String>,
    color: Option<String>,
    frequency: Option<u32>,
    program_duration: Option<u32>,
    times: Option<Vec<String>>,
}

fn parse_draft(text: &str) -> Result<MedicineDraft, DecodeFailure> {
    let parsed: Value =
        serde_json::from_str(text).map_err(|e| DecodeFailure::MalformedJson(e.to_string()))?;
    let Value::Object(envelope) = parsed else {
        return Err(DecodeFailure::MalformedJson(
            "expected a JSON object".to_string(),
        ));
    };

    match envelope.get("type").and_then(Value::as_str) {
        Some(kind) if kind != PAYLOAD_TYPE => {
            return Err(DecodeFailure::UnsupportedFormat(format!(
                "payload type {:?}",
                kind
            )));
        }
        _ => {}
    }
    let version = envelope.get("v").and_then(Value::as_u64).unwrap_or(0);
    if version > u64::from(PAYLOAD_VERSION) {
        tracing::warn!(
            "[MeditagCodec] payload version {} is newer than {}, decoding anyway",
            version,
            PAYLOAD_VERSION
        );
    }

    let data = match envelope.get("data") {
        Some(data @ Value::Object(_)) => data.clone(),
        _ => Value::Object(envelope),
    };

    let wire: WireDraft =
        serde_json::from_value(data).map_err(|e| DecodeFailure::MalformedJson(e.to_string()))?;

    let shape = match wire.shape.as_deref() {
        None => Shape::default(),
        Some(raw) => raw.parse().unwrap_or_else(|unknown| {
            tracing::warn!("[MeditagCodec] unknown shape {:?}, using pill", unknown);
            Shape::default()
        }),
    };

    Ok(MedicineDraft {
        name: wire.name.unwrap_or_default(),
        dose: wire.dose.unwrap_or_default(),
        shape,
        color: wire.color.unwrap_or_else(|| DEFAULT_COLOR.to_string()),
        frequency: wire.frequency.unwrap_or(DEFAULT_FREQUENCY),
        program_duration: wire.program_duration.unwrap_or(DEFAULT_PROGRAM_WEEKS),
        times: wire.times.unwrap_or_default(),
    })
}
