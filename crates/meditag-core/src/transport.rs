//! Tag transport adapter.
//!
//! Wraps a callback-style platform capability into two awaitable one-shot
//! operations. Listener registration and pending writes are owned by drop
//! guards, so every exit path (result, error, timeout, caller drop) tears
//! them down.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time;

use crate::error::{NdefError, TagError, TagResult};
use crate::ndef::NdefMessage;

/// Channel end a capability pushes events into.
pub type EventSink = mpsc::UnboundedSender<TagEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    Reading,
    Error,
}

/// Event delivered to a registered listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagEvent {
    Reading(NdefMessage),
    /// A tag was read but its bytes are not an NDEF message.
    Unparsed(NdefError),
    Error(PlatformError),
}

impl TagEvent {
    pub fn kind(&self) -> ListenerKind {
        match self {
            Self::Reading(_) | Self::Unparsed(_) => ListenerKind::Reading,
            Self::Error(_) => ListenerKind::Error,
        }
    }
}

/// Structured error code reported by a platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlatformErrorCode {
    NotAllowed,
    Security,
    NotSupported,
    Abort,
    Timeout,
    NotReadable,
    Network,
    InvalidState,
    ReadOnlyTag,
    IncompatibleTag,
    CapacityExceeded,
    Other,
}

impl PlatformErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotAllowed => "NotAllowedError",
            Self::Security => "SecurityError",
            Self::NotSupported => "NotSupportedError",
            Self::Abort => "AbortError",
            Self::Timeout => "TimeoutError",
            Self::NotReadable => "NotReadableError",
            Self::Network => "NetworkError",
            Self::InvalidState => "InvalidStateError",
            Self::ReadOnlyTag => "ReadOnlyTagError",
            Self::IncompatibleTag => "IncompatibleTagError",
            Self::CapacityExceeded => "CapacityExceededError",
            Self::Other => "Error",
        }
    }

    /// Maps an error name such as `NotAllowedError` onto a code.
    /// The `Error` suffix is optional; unknown names become `Other`.
    pub fn from_code(code: &str) -> Self {
        let name = code.trim();
        let name = name.strip_suffix("Error").unwrap_or(name);
        match name {
            "NotAllowed" => Self::NotAllowed,
            "Security" => Self::Security,
            "NotSupported" => Self::NotSupported,
            "Abort" => Self::Abort,
            "Timeout" => Self::Timeout,
            "NotReadable" => Self::NotReadable,
            "Network" => Self::Network,
            "InvalidState" => Self::InvalidState,
            "ReadOnlyTag" => Self::ReadOnlyTag,
            "IncompatibleTag" => Self::IncompatibleTag,
            "CapacityExceeded" => Self::CapacityExceeded,
            _ => Self::Other,
        }
    }
}

impl std::fmt::Display for PlatformErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct PlatformError {
    pub code: PlatformErrorCode,
    pub message: String,
}

impl PlatformError {
    pub fn new(code: PlatformErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Platform tag capability.
///
/// Readings and reading errors are pushed to listeners while a scan is
/// active. Writes complete through the returned future.
pub trait TagCapability: Send + Sync {
    /// Whether the runtime exposes a tag radio at all.
    fn is_present(&self) -> bool;

    /// Whether the current context may use the radio.
    fn is_secure_context(&self) -> bool;

    fn add_listener(&self, kind: ListenerKind, sink: EventSink) -> ListenerId;

    fn remove_listener(&self, id: ListenerId);

    fn start_scan(&self) -> Result<(), PlatformError>;

    fn stop_scan(&self);

    fn write(&self, message: NdefMessage)
    -> impl Future<Output = Result<(), PlatformError>> + Send;

    /// Aborts a pending write. No-op when none is pending.
    fn abort_write(&self);
}

/// Maps a platform error onto the failure taxonomy.
pub fn classify(error: PlatformError, timeout: Duration) -> TagError {
    use PlatformErrorCode::*;

    match error.code {
        NotAllowed | Security => TagError::PermissionDenied(error.message),
        NotSupported => TagError::Unsupported(error.message),
        Abort => TagError::Canceled,
        Timeout => TagError::Timeout(millis(timeout)),
        ReadOnlyTag => TagError::Locked(error.message),
        IncompatibleTag | CapacityExceeded => TagError::UnsupportedTag(error.message),
        NotReadable | Network | InvalidState | Other => TagError::Unknown(error.to_string()),
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Listener pair and scan handle held for one `scan_once`.
struct ScanSession<'a, C: TagCapability + ?Sized> {
    capability: &'a C,
    listeners: Vec<ListenerId>,
    scanning: bool,
}

impl<'a, C: TagCapability + ?Sized> ScanSession<'a, C> {
    fn open(capability: &'a C, sink: EventSink) -> Self {
        let listeners = vec![
            capability.add_listener(ListenerKind::Reading, sink.clone()),
            capability.add_listener(ListenerKind::Error, sink),
        ];
        tracing::debug!("[MeditagTransport] listeners registered: {:?}", listeners);
        Self {
            capability,
            listeners,
            scanning: false,
        }
    }

    fn start(&mut self) -> Result<(), PlatformError> {
        self.capability.start_scan()?;
        self.scanning = true;
        Ok(())
    }
}

impl<C: TagCapability + ?Sized> Drop for ScanSession<'_, C> {
    fn drop(&mut self) {
        if self.scanning {
            self.capability.stop_scan();
        }
        for id in self.listeners.drain(..) {
            self.capability.remove_listener(id);
        }
        tracing::debug!("[MeditagTransport] scan session closed");
    }
}

/// Aborts the platform write unless disarmed.
struct WriteGuard<'a, C: TagCapability + ?Sized> {
    capability: &'a C,
    armed: bool,
}

impl<C: TagCapability + ?Sized> WriteGuard<'_, C> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<C: TagCapability + ?Sized> Drop for WriteGuard<'_, C> {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!("[MeditagTransport] aborting pending write");
            self.capability.abort_write();
        }
    }
}

/// One-shot scan and write on top of a [`TagCapability`].
pub struct TagTransport<C> {
    capability: Arc<C>,
}

impl<C> Clone for TagTransport<C> {
    fn clone(&self) -> Self {
        Self {
            capability: Arc::clone(&self.capability),
        }
    }
}

impl<C: TagCapability> TagTransport<C> {
    pub fn new(capability: C) -> Self {
        Self::from_arc(Arc::new(capability))
    }

    pub fn from_arc(capability: Arc<C>) -> Self {
        Self { capability }
    }

    pub fn capability(&self) -> &Arc<C> {
        &self.capability
    }

    /// True when the radio is present and the context is secure.
    pub fn is_available(&self) -> bool {
        self.capability.is_present() && self.capability.is_secure_context()
    }

    fn ensure_available(&self) -> TagResult<()> {
        if !self.capability.is_present() {
            return Err(TagError::Unavailable("no tag radio on this device".into()));
        }
        if !self.capability.is_secure_context() {
            return Err(TagError::Unavailable("context is not secure".into()));
        }
        Ok(())
    }

    /// Waits for exactly one reading or reading error.
    ///
    /// A tag whose bytes do not parse fails with `MalformedPayload`.
    pub async fn scan_once(&self, timeout: Duration) -> TagResult<NdefMessage> {
        self.ensure_available()?;

        let (sink, mut events) = mpsc::unbounded_channel();
        let mut session = ScanSession::open(self.capability.as_ref(), sink);
        session
            .start()
            .map_err(|e| classify(e, timeout))?;

        match time::timeout(timeout, events.recv()).await {
            Ok(Some(TagEvent::Reading(message))) => {
                tracing::debug!(
                    "[MeditagTransport] reading with {} record(s)",
                    message.len()
                );
                Ok(message)
            }
            Ok(Some(TagEvent::Unparsed(error))) => {
                tracing::warn!("[MeditagTransport] unparsable tag: {}", error);
                Err(error.into())
            }
            Ok(Some(TagEvent::Error(error))) => Err(classify(error, timeout)),
            Ok(None) => Err(TagError::Unknown("scan listeners dropped".into())),
            Err(_) => Err(TagError::Timeout(millis(timeout))),
        }
    }

    /// Writes a message to the tag in proximity.
    pub async fn write_once(&self, message: NdefMessage, timeout: Duration) -> TagResult<()> {
        self.ensure_available()?;

        let guard = WriteGuard {
            capability: self.capability.as_ref(),
            armed: true,
        };
        let result = time::timeout(timeout, self.capability.write(message)).await;
        match result {
            Ok(written) => {
                guard.disarm();
                written.map_err(|e| classify(e, timeout))
            }
            Err(_) => Err(TagError::Timeout(millis(timeout))),
        }
    }
}
