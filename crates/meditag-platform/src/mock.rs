//! Scripted tag capability for tests and demos.
//!
//! Scan and write outcomes are queued up front and consumed in order. When a
//! queue is empty, scans stay silent and writes succeed immediately.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use meditag_core::{
    EventSink, ListenerId, ListenerKind, NdefMessage, PlatformError, TagCapability, TagEvent,
};

/// What the next scan produces.
#[derive(Debug, Clone)]
pub enum ScriptedScan {
    /// Delivers a reading after the delay.
    Reading(NdefMessage),
    /// Delivers raw tag bytes, parsed the way a platform would.
    Bytes(Vec<u8>),
    /// Delivers a reading error after the delay.
    Error(PlatformError),
    /// `start_scan` itself fails.
    Reject(PlatformError),
    /// Nothing ever arrives.
    Silence,
}

/// What the next write produces.
#[derive(Debug, Clone)]
pub enum ScriptedWrite {
    Succeed,
    Fail(PlatformError),
    /// Never completes unless aborted by the caller dropping it.
    Hang,
}

#[derive(Default)]
struct Inner {
    listeners: Mutex<HashMap<u64, (ListenerKind, EventSink)>>,
    scans: Mutex<VecDeque<(ScriptedScan, Duration)>>,
    writes: Mutex<VecDeque<(ScriptedWrite, Duration)>>,
    written: Mutex<Vec<NdefMessage>>,
    present: AtomicBool,
    secure: AtomicBool,
    next_listener: AtomicU64,
    scan_generation: AtomicU64,
    listener_adds: AtomicUsize,
    scan_starts: AtomicUsize,
    scan_stops: AtomicUsize,
    write_calls: AtomicUsize,
    write_aborts: AtomicUsize,
}

impl Inner {
    fn dispatch(&self, generation: u64, event: TagEvent) {
        if self.scan_generation.load(Ordering::SeqCst) != generation {
            return;
        }
        let kind = event.kind();
        if let Ok(listeners) = self.listeners.lock() {
            for (listener_kind, sink) in listeners.values() {
                if *listener_kind == kind {
                    let _ = sink.send(event.clone());
                }
            }
        }
    }
}

/// In-memory [`TagCapability`] with scripted outcomes and call counters.
///
/// Clones share state, so a test can keep one handle while the transport
/// owns another.
#[derive(Clone)]
pub struct ScriptedCapability {
    inner: Arc<Inner>,
}

impl Default for ScriptedCapability {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedCapability {
    /// A present, secure capability with empty scripts.
    pub fn new() -> Self {
        let inner = Inner {
            present: AtomicBool::new(true),
            secure: AtomicBool::new(true),
            next_listener: AtomicU64::new(1),
            ..Inner::default()
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// A capability the runtime does not expose.
    pub fn absent() -> Self {
        let capability = Self::new();
        capability.set_present(false);
        capability
    }

    pub fn set_present(&self, present: bool) {
        self.inner.present.store(present, Ordering::SeqCst);
    }

    pub fn set_secure_context(&self, secure: bool) {
        self.inner.secure.store(secure, Ordering::SeqCst);
    }

    pub fn push_scan(&self, scan: ScriptedScan) -> &Self {
        self.push_scan_after(scan, Duration::ZERO)
    }

    pub fn push_scan_after(&self, scan: ScriptedScan, delay: Duration) -> &Self {
        if let Ok(mut scans) = self.inner.scans.lock() {
            scans.push_back((scan, delay));
        }
        self
    }

    pub fn push_write(&self, write: ScriptedWrite) -> &Self {
        self.push_write_after(write, Duration::ZERO)
    }

    pub fn push_write_after(&self, write: ScriptedWrite, delay: Duration) -> &Self {
        if let Ok(mut writes) = self.inner.writes.lock() {
            writes.push_back((write, delay));
        }
        self
    }

    /// Listeners currently registered.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn scan_starts(&self) -> usize {
        self.inner.scan_starts.load(Ordering::SeqCst)
    }

    pub fn scan_stops(&self) -> usize {
        self.inner.scan_stops.load(Ordering::SeqCst)
    }

    pub fn write_calls(&self) -> usize {
        self.inner.write_calls.load(Ordering::SeqCst)
    }

    pub fn write_aborts(&self) -> usize {
        self.inner.write_aborts.load(Ordering::SeqCst)
    }

    /// Messages that were written successfully.
    pub fn written_messages(&self) -> Vec<NdefMessage> {
        self.inner
            .written
            .lock()
            .map(|w| w.clone())
            .unwrap_or_default()
    }

    /// Listener registrations, scan starts and writes issued so far.
    pub fn transport_calls(&self) -> usize {
        self.inner.listener_adds.load(Ordering::SeqCst) + self.scan_starts() + self.write_calls()
    }
}

impl TagCapability for ScriptedCapability {
    fn is_present(&self) -> bool {
        self.inner.present.load(Ordering::SeqCst)
    }

    fn is_secure_context(&self) -> bool {
        self.inner.secure.load(Ordering::SeqCst)
    }

    fn add_listener(&self, kind: ListenerKind, sink: EventSink) -> ListenerId {
        self.inner.listener_adds.fetch_add(1, Ordering::SeqCst);
        let id = self.inner.next_listener.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut listeners) = self.inner.listeners.lock() {
            listeners.insert(id, (kind, sink));
        }
        ListenerId(id)
    }

    fn remove_listener(&self, id: ListenerId) {
        if let Ok(mut listeners) = self.inner.listeners.lock() {
            listeners.remove(&id.0);
        }
    }

    fn start_scan(&self) -> Result<(), PlatformError> {
        self.inner.scan_starts.fetch_add(1, Ordering::SeqCst);
        let generation = self.inner.scan_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let next = self
            .inner
            .scans
            .lock()
            .ok()
            .and_then(|mut scans| scans.pop_front());

        let (scan, delay) = next.unwrap_or((ScriptedScan::Silence, Duration::ZERO));
        let event = match scan {
            ScriptedScan::Reject(error) => return Err(error),
            ScriptedScan::Silence => return Ok(()),
            ScriptedScan::Reading(message) => TagEvent::Reading(message),
            ScriptedScan::Bytes(bytes) => match NdefMessage::from_bytes(&bytes) {
                Ok(message) => TagEvent::Reading(message),
                Err(e) => TagEvent::Unparsed(e),
            },
            ScriptedScan::Error(error) => TagEvent::Error(error),
        };

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            inner.dispatch(generation, event);
        });
        Ok(())
    }

    fn stop_scan(&self) {
        self.inner.scan_stops.fetch_add(1, Ordering::SeqCst);
        self.inner.scan_generation.fetch_add(1, Ordering::SeqCst);
    }

    fn write(
        &self,
        message: NdefMessage,
    ) -> impl Future<Output = Result<(), PlatformError>> + Send {
        self.inner.write_calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .inner
            .writes
            .lock()
            .ok()
            .and_then(|mut writes| writes.pop_front());
        let (script, delay) = next.unwrap_or((ScriptedWrite::Succeed, Duration::ZERO));
        let inner = Arc::clone(&self.inner);

        async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match script {
                ScriptedWrite::Succeed => {
                    if let Ok(mut written) = inner.written.lock() {
                        written.push(message);
                    }
                    Ok(())
                }
                ScriptedWrite::Fail(error) => Err(error),
                ScriptedWrite::Hang => std::future::pending().await,
            }
        }
    }

    fn abort_write(&self) {
        self.inner.write_aborts.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meditag_core::PlatformErrorCode;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_reading_reaches_matching_listeners_only() {
        let capability = ScriptedCapability::new();
        capability.push_scan(ScriptedScan::Reading(NdefMessage::default()));

        let (reading_tx, mut reading_rx) = mpsc::unbounded_channel();
        let (error_tx, mut error_rx) = mpsc::unbounded_channel();
        capability.add_listener(ListenerKind::Reading, reading_tx);
        capability.add_listener(ListenerKind::Error, error_tx);

        capability.start_scan().unwrap();
        assert!(matches!(reading_rx.recv().await, Some(TagEvent::Reading(_))));
        assert!(error_rx.try_recv().is_err());
        assert_eq!(capability.transport_calls(), 3);
    }

    #[tokio::test]
    async fn test_reject_and_defaults() {
        let capability = ScriptedCapability::new();
        capability.push_scan(ScriptedScan::Reject(PlatformError::new(
            PlatformErrorCode::NotAllowed,
            "denied",
        )));
        assert!(capability.start_scan().is_err());
        assert!(capability.start_scan().is_ok());

        capability.write(NdefMessage::default()).await.unwrap();
        assert_eq!(capability.written_messages().len(), 1);
        assert_eq!(capability.scan_starts(), 2);
    }
}
