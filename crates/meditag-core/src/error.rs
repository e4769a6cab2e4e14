//! Error types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type TagResult<T> = Result<T, TagError>;
pub type StoreResult<T> = Result<T, StoreError>;

/// Failure reason reported to the UI shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    Unavailable,
    PermissionDenied,
    Unsupported,
    Timeout,
    Canceled,
    MalformedPayload,
    InvalidPayload,
    Locked,
    UnsupportedTag,
    Busy,
    Unknown,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unavailable => "unavailable",
            Self::PermissionDenied => "permissionDenied",
            Self::Unsupported => "unsupported",
            Self::Timeout => "timeout",
            Self::Canceled => "canceled",
            Self::MalformedPayload => "malformedPayload",
            Self::InvalidPayload => "invalidPayload",
            Self::Locked => "locked",
            Self::UnsupportedTag => "unsupportedTag",
            Self::Busy => "busy",
            Self::Unknown => "unknown",
        }
    }

    /// Notification text shown to the user for this failure.
    pub fn user_message(self) -> &'static str {
        match self {
            Self::Unavailable => {
                "NFC is not available here. Use a device with NFC hardware and enable NFC."
            }
            Self::PermissionDenied => {
                "NFC permission denied or unavailable. Ensure NFC is enabled in system settings."
            }
            Self::Unsupported => "NFC is not supported on this device.",
            Self::Timeout => "No tag detected. Hold the tag near the device and try again.",
            Self::Canceled => "The tag operation was canceled.",
            Self::MalformedPayload => {
                "The tag could not be read. It may be blank or written by another app."
            }
            Self::InvalidPayload => "Tag does not contain valid medicine information.",
            Self::Locked => "This tag is read-only and cannot be written.",
            Self::UnsupportedTag => "This tag cannot store medicine information.",
            Self::Busy => "A tag operation is already in progress.",
            Self::Unknown => "Failed to read or write the NFC tag.",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Byte-level NDEF message errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NdefError {
    #[error("NDEF message is empty")]
    Empty,

    #[error("NDEF message truncated at offset {offset}: {needed} more bytes needed")]
    Truncated { offset: usize, needed: usize },

    #[error("Chunked NDEF records are not supported")]
    Chunked,

    #[error("First record is missing the message-begin flag")]
    MissingBegin,

    #[error("Record {index} ends the message but {trailing} bytes follow")]
    TrailingBytes { index: usize, trailing: usize },

    #[error("Last record is missing the message-end flag")]
    MissingEnd,

    #[error("Reserved TNF value {0}")]
    ReservedTnf(u8),

    #[error("Record {index} uses TNF unchanged outside a chunk")]
    UnexpectedUnchanged { index: usize },

    #[error("Record {index} has a {len}-byte type but its TNF allows none")]
    UnexpectedType { index: usize, len: usize },

    #[error("Record {field} is {len} bytes, limit is {limit}")]
    FieldTooLarge {
        field: &'static str,
        len: usize,
        limit: usize,
    },
}

/// Reasons a tag's records could not be turned into a draft.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeFailure {
    #[error("Tag holds no records")]
    NoRecords,

    #[error("Unsupported record format: {0}")]
    UnsupportedFormat(String),

    #[error("Malformed JSON: {0}")]
    MalformedJson(String),

    #[error("Malformed text record: {0}")]
    MalformedText(String),

    #[error("Malformed NDEF message: {0}")]
    MalformedMessage(#[from] NdefError),
}

/// Draft invariant violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DraftError {
    #[error("Medicine name is required")]
    MissingName,

    #[error("Medicine dose is required")]
    MissingDose,

    #[error("Frequency must be at least once per day")]
    ZeroFrequency,

    #[error("Program duration must be at least one week")]
    ZeroDuration,
}

/// Classified failure of a scan or write orchestration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TagError {
    #[error("Tag capability unavailable: {0}")]
    Unavailable(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Not supported: {0}")]
    Unsupported(String),

    #[error("Tag operation timed out after {0} ms")]
    Timeout(u64),

    #[error("Tag operation canceled")]
    Canceled,

    #[error("Malformed tag payload: {0}")]
    MalformedPayload(#[from] DecodeFailure),

    #[error("Invalid tag payload: {0}")]
    InvalidPayload(#[from] DraftError),

    #[error("Tag is read-only: {0}")]
    Locked(String),

    #[error("Tag cannot hold this payload: {0}")]
    UnsupportedTag(String),

    #[error("Another tag operation is already in progress")]
    Busy,

    #[error("Tag operation failed: {0}")]
    Unknown(String),
}

impl TagError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Unavailable(_) => FailureKind::Unavailable,
            Self::PermissionDenied(_) => FailureKind::PermissionDenied,
            Self::Unsupported(_) => FailureKind::Unsupported,
            Self::Timeout(_) => FailureKind::Timeout,
            Self::Canceled => FailureKind::Canceled,
            Self::MalformedPayload(_) => FailureKind::MalformedPayload,
            Self::InvalidPayload(_) => FailureKind::InvalidPayload,
            Self::Locked(_) => FailureKind::Locked,
            Self::UnsupportedTag(_) => FailureKind::UnsupportedTag,
            Self::Busy => FailureKind::Busy,
            Self::Unknown(_) => FailureKind::Unknown,
        }
    }

    pub fn user_message(&self) -> &'static str {
        self.kind().user_message()
    }
}

impl From<NdefError> for TagError {
    fn from(e: NdefError) -> Self {
        TagError::MalformedPayload(DecodeFailure::MalformedMessage(e))
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Medicine not found: {0}")]
    NotFound(u64),

    #[error("Invalid medicine: {0}")]
    Invalid(#[from] DraftError),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        StoreError::LockPoisoned(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("Text language code must be 1..=63 ASCII bytes, got {0:?}")]
    InvalidLanguage(String),
}
