//! Tag capability backed by a native mobile plugin.
//!
//! The native side answers these blocking calls:
//!
//! | method        | args                  | response                       |
//! |---------------|-----------------------|--------------------------------|
//! | `status`      | `{}`                  | `{"present": bool, "enabled": bool}` |
//! | `scan`        | `{}`                  | `{"message": "<base64 NDEF>"}` |
//! | `cancelScan`  | `{}`                  | `{}`                           |
//! | `write`       | `{"message": "<base64 NDEF>"}` | `{}`                  |
//! | `cancelWrite` | `{}`                  | `{}`                           |
//!
//! Rejections carry an error name such as `NotAllowedError` as their code.
//!
//! `status` is called from async code and must answer from the adapter state
//! without waiting on the radio. Every other call runs off the executor, and
//! `scan`, `write` and the two cancels reach the native side in call order.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, mpsc};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::oneshot;

use meditag_core::{
    EventSink, ListenerId, ListenerKind, NdefMessage, PlatformError, PlatformErrorCode,
    TagCapability, TagEvent,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("{method} rejected with {code}: {message}")]
    Rejected {
        method: String,
        code: String,
        message: String,
    },

    #[error("Bridge call failed: {0}")]
    Transport(String),

    #[error("Invalid bridge response: {0}")]
    InvalidResponse(String),
}

impl BridgeError {
    pub fn into_platform_error(self) -> PlatformError {
        match self {
            BridgeError::Rejected { code, message, .. } => {
                PlatformError::new(PlatformErrorCode::from_code(&code), message)
            }
            BridgeError::Transport(message) => {
                PlatformError::new(PlatformErrorCode::Other, message)
            }
            BridgeError::InvalidResponse(message) => {
                PlatformError::new(PlatformErrorCode::NotReadable, message)
            }
        }
    }
}

/// Synchronous call into the native plugin.
pub trait MobileBridge: Send + Sync {
    fn invoke(&self, method: &str, args: Value) -> Result<Value, BridgeError>;
}

#[derive(Debug, Default, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    present: bool,
    #[serde(default)]
    enabled: bool,
}

#[derive(Debug, Deserialize)]
struct ScanResponse {
    message: String,
}

#[derive(Debug, Serialize)]
struct WriteArgs {
    message: String,
}

type ListenerMap = Mutex<HashMap<u64, (ListenerKind, EventSink)>>;

fn dispatch(listeners: &ListenerMap, event: TagEvent) {
    let kind = event.kind();
    let Ok(guard) = listeners.lock() else {
        tracing::error!("[MeditagBridge] listener map poisoned, dropping {:?}", kind);
        return;
    };
    let mut delivered = 0;
    for (listener_kind, sink) in guard.values() {
        if *listener_kind == kind && sink.send(event.clone()).is_ok() {
            delivered += 1;
        }
    }
    tracing::debug!("[MeditagBridge] {:?} delivered to {} listener(s)", kind, delivered);
}

/// Turns a `scan` response into the event listeners receive.
///
/// Bytes that are not NDEF are still a reading; only an unusable bridge
/// response is a reading error.
fn decode_scan(value: Value) -> TagEvent {
    let bytes = serde_json::from_value::<ScanResponse>(value)
        .map_err(|e| e.to_string())
        .and_then(|response| {
            STANDARD
                .decode(response.message.as_bytes())
                .map_err(|e| e.to_string())
        });
    match bytes {
        Ok(bytes) => match NdefMessage::from_bytes(&bytes) {
            Ok(message) => TagEvent::Reading(message),
            Err(e) => TagEvent::Unparsed(e),
        },
        Err(e) => TagEvent::Error(BridgeError::InvalidResponse(e).into_platform_error()),
    }
}

type Job = Box<dyn FnOnce() + Send>;

/// Starts the thread that issues control calls in order.
fn spawn_control_worker() -> Option<mpsc::Sender<Job>> {
    let (tx, rx) = mpsc::channel::<Job>();
    let spawned = std::thread::Builder::new()
        .name("meditag-control".into())
        .spawn(move || {
            while let Ok(job) = rx.recv() {
                job();
            }
        });
    match spawned {
        Ok(_) => Some(tx),
        Err(e) => {
            tracing::warn!("[MeditagBridge] control thread unavailable, calling inline: {}", e);
            None
        }
    }
}

/// Runs a blocking bridge call on its own thread.
fn spawn_call(name: &str, call: impl FnOnce() + Send + 'static) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name(name.into())
        .spawn(call)
        .map(|_| ())
}

/// [`TagCapability`] over a [`MobileBridge`].
///
/// Cancels run on a control thread; scans and writes are started from it on
/// their own threads, so a cancel never overtakes the call it follows. Scan
/// results from a scan that has since been stopped are discarded.
pub struct BridgeCapability {
    bridge: Arc<dyn MobileBridge>,
    listeners: Arc<ListenerMap>,
    next_listener: AtomicU64,
    scan_generation: Arc<AtomicU64>,
    control: Option<mpsc::Sender<Job>>,
}

impl BridgeCapability {
    pub fn new(bridge: Arc<dyn MobileBridge>) -> Self {
        Self {
            bridge,
            listeners: Arc::new(Mutex::new(HashMap::new())),
            next_listener: AtomicU64::new(1),
            scan_generation: Arc::new(AtomicU64::new(0)),
            control: spawn_control_worker(),
        }
    }

    fn enqueue(&self, job: Job) {
        match &self.control {
            Some(tx) => {
                if let Err(mpsc::SendError(job)) = tx.send(job) {
                    job();
                }
            }
            None => job(),
        }
    }

    fn cancel(&self, method: &'static str) {
        let bridge = Arc::clone(&self.bridge);
        self.enqueue(Box::new(move || {
            if let Err(e) = bridge.invoke(method, json!({})) {
                tracing::debug!("[MeditagBridge] {}: {}", method, e);
            }
        }));
    }

    fn status(&self) -> StatusResponse {
        match self.bridge.invoke("status", json!({})) {
            Ok(value) => serde_json::from_value(value).unwrap_or_else(|e| {
                tracing::warn!("[MeditagBridge] unreadable status: {}", e);
                StatusResponse::default()
            }),
            Err(e) => {
                tracing::warn!("[MeditagBridge] status failed: {}", e);
                StatusResponse::default()
            }
        }
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().map(|l| l.len()).unwrap_or(0)
    }
}

impl TagCapability for BridgeCapability {
    /// True when the device has a radio and it is switched on.
    fn is_present(&self) -> bool {
        let status = self.status();
        status.present && status.enabled
    }

    /// Native app contexts are always trusted.
    fn is_secure_context(&self) -> bool {
        true
    }

    fn add_listener(&self, kind: ListenerKind, sink: EventSink) -> ListenerId {
        let id = self.next_listener.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.insert(id, (kind, sink));
        }
        ListenerId(id)
    }

    fn remove_listener(&self, id: ListenerId) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.remove(&id.0);
        }
    }

    fn start_scan(&self) -> Result<(), PlatformError> {
        let generation = self.scan_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let bridge = Arc::clone(&self.bridge);
        let listeners = Arc::clone(&self.listeners);
        let current = Arc::clone(&self.scan_generation);

        self.enqueue(Box::new(move || {
            if current.load(Ordering::SeqCst) != generation {
                return;
            }
            let deliver = move |event: TagEvent| {
                if current.load(Ordering::SeqCst) == generation {
                    dispatch(&listeners, event);
                } else {
                    tracing::debug!("[MeditagBridge] discarding result of stopped scan");
                }
            };
            let scan = {
                let deliver = deliver.clone();
                move || {
                    let event = match bridge.invoke("scan", json!({})) {
                        Ok(value) => decode_scan(value),
                        Err(e) => {
                            tracing::error!("[MeditagBridge] scan failed: {}", e);
                            TagEvent::Error(e.into_platform_error())
                        }
                    };
                    deliver(event);
                }
            };
            if let Err(e) = spawn_call("meditag-scan", scan) {
                deliver(TagEvent::Error(PlatformError::new(
                    PlatformErrorCode::Other,
                    e.to_string(),
                )));
            }
        }));
        Ok(())
    }

    fn stop_scan(&self) {
        self.scan_generation.fetch_add(1, Ordering::SeqCst);
        self.cancel("cancelScan");
    }

    fn write(
        &self,
        message: NdefMessage,
    ) -> impl Future<Output = Result<(), PlatformError>> + Send {
        let prepared = message
            .to_bytes()
            .map_err(|e| PlatformError::new(PlatformErrorCode::CapacityExceeded, e.to_string()))
            .and_then(|bytes| {
                serde_json::to_value(WriteArgs {
                    message: STANDARD.encode(bytes),
                })
                .map_err(|e| PlatformError::new(PlatformErrorCode::Other, e.to_string()))
            });

        let (tx, rx) = oneshot::channel();
        match prepared {
            Ok(args) => {
                let bridge = Arc::clone(&self.bridge);
                self.enqueue(Box::new(move || {
                    let call = move || {
                        let result = bridge
                            .invoke("write", args)
                            .map(|_| ())
                            .map_err(BridgeError::into_platform_error);
                        let _ = tx.send(result);
                    };
                    if let Err(e) = spawn_call("meditag-write", call) {
                        tracing::error!("[MeditagBridge] write thread failed to start: {}", e);
                    }
                }));
            }
            Err(e) => {
                let _ = tx.send(Err(e));
            }
        }

        async move {
            rx.await.unwrap_or_else(|_| {
                Err(PlatformError::new(
                    PlatformErrorCode::Other,
                    "write thread ended without a result",
                ))
            })
        }
    }

    fn abort_write(&self) {
        self.cancel("cancelWrite");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    use meditag_core::{DecodeFailure, FailureKind, NdefError, NdefRecord, TagError, TagTransport};

    enum Reply {
        /// `scan` answers with these bytes as base64.
        Bytes(Vec<u8>),
        /// `scan` answers with this JSON as is.
        Raw(Value),
        /// Every call but `status` is rejected with this code.
        Reject(String),
    }

    struct FakeBridge {
        reply: Reply,
        cancel_delay: Duration,
        calls: Mutex<Vec<String>>,
    }

    impl FakeBridge {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        async fn wait_for_call(&self, method: &str) {
            let deadline = Instant::now() + Duration::from_secs(2);
            while !self.calls().iter().any(|call| call == method) {
                assert!(Instant::now() < deadline, "{} was never called", method);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }
    }

    impl MobileBridge for FakeBridge {
        fn invoke(&self, method: &str, _args: Value) -> Result<Value, BridgeError> {
            if method.starts_with("cancel") {
                std::thread::sleep(self.cancel_delay);
            }
            self.calls.lock().unwrap().push(method.to_string());
            match (method, &self.reply) {
                ("status", _) => Ok(json!({ "present": true, "enabled": true })),
                (_, Reply::Reject(code)) => Err(BridgeError::Rejected {
                    method: method.to_string(),
                    code: code.clone(),
                    message: "rejected".to_string(),
                }),
                ("scan", Reply::Bytes(bytes)) => Ok(json!({ "message": STANDARD.encode(bytes) })),
                ("scan", Reply::Raw(value)) => Ok(value.clone()),
                _ => Ok(json!({})),
            }
        }
    }

    fn bridge(reply: Reply) -> Arc<FakeBridge> {
        Arc::new(FakeBridge {
            reply,
            cancel_delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn test_scan_dispatches_reading() {
        let message = NdefMessage::new(vec![NdefRecord::text("en", "hello")]);
        let fake = bridge(Reply::Bytes(message.to_bytes().unwrap()));
        let transport = TagTransport::new(BridgeCapability::new(fake.clone()));

        let read = transport.scan_once(Duration::from_secs(2)).await.unwrap();
        assert_eq!(read, message);
        assert_eq!(transport.capability().listener_count(), 0);
        fake.wait_for_call("cancelScan").await;
    }

    #[tokio::test]
    async fn test_truncated_bytes_are_malformed_payload() {
        let fake = bridge(Reply::Bytes(vec![0xD1, 0x01, 0x05, b'T']));
        let transport = TagTransport::new(BridgeCapability::new(fake));

        let err = transport.scan_once(Duration::from_secs(2)).await.unwrap_err();
        assert!(matches!(
            err,
            TagError::MalformedPayload(DecodeFailure::MalformedMessage(NdefError::Truncated {
                offset: 4,
                ..
            }))
        ));
        assert_eq!(err.kind(), FailureKind::MalformedPayload);
        assert_eq!(transport.capability().listener_count(), 0);
    }

    #[tokio::test]
    async fn test_unusable_response_is_a_reading_error() {
        let bad_base64 = bridge(Reply::Raw(json!({ "message": "not base64!" })));
        let transport = TagTransport::new(BridgeCapability::new(bad_base64));
        let err = transport.scan_once(Duration::from_secs(2)).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Unknown);

        let missing_field = bridge(Reply::Raw(json!({ "bytes": [] })));
        let transport = TagTransport::new(BridgeCapability::new(missing_field));
        let err = transport.scan_once(Duration::from_secs(2)).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Unknown);
    }

    #[tokio::test]
    async fn test_slow_cancel_runs_off_the_caller_and_in_order() {
        let message = NdefMessage::new(vec![NdefRecord::text("en", "hello")]);
        let fake = Arc::new(FakeBridge {
            reply: Reply::Bytes(message.to_bytes().unwrap()),
            cancel_delay: Duration::from_millis(300),
            calls: Mutex::new(Vec::new()),
        });
        let transport = TagTransport::new(BridgeCapability::new(fake.clone()));

        let started = Instant::now();
        transport.scan_once(Duration::from_secs(2)).await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(250));

        transport.scan_once(Duration::from_secs(2)).await.unwrap();
        let calls = fake.calls();
        let first_cancel = calls.iter().position(|c| c == "cancelScan").unwrap();
        let second_scan = calls.iter().rposition(|c| c == "scan").unwrap();
        assert!(first_cancel < second_scan, "calls out of order: {:?}", calls);
    }

    #[tokio::test]
    async fn test_rejection_code_is_classified() {
        let transport = TagTransport::new(BridgeCapability::new(bridge(Reply::Reject(
            "NotAllowedError".to_string(),
        ))));

        let err = transport.scan_once(Duration::from_secs(2)).await.unwrap_err();
        assert!(matches!(err, TagError::PermissionDenied(_)));

        let write = NdefMessage::new(vec![NdefRecord::text("en", "x")]);
        let err = transport
            .write_once(write, Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, TagError::PermissionDenied(_)));
    }

    #[test]
    fn test_into_platform_error() {
        let err = BridgeError::Rejected {
            method: "write".into(),
            code: "ReadOnlyTagError".into(),
            message: "tag is locked".into(),
        };
        assert_eq!(
            err.into_platform_error().code,
            PlatformErrorCode::ReadOnlyTag
        );
        assert_eq!(
            BridgeError::InvalidResponse("x".into()).into_platform_error().code,
            PlatformErrorCode::NotReadable
        );
    }
}
