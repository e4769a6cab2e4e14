//! Scan and write orchestration.
//!
//! Each user action runs a one-shot state machine:
//! `Idle -> Checking -> InProgress -> Success | Failed`, then back to `Idle`
//! when the call returns. At most one orchestration is in flight at a time.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, oneshot, watch};

use crate::codec;
use crate::config::TagConfig;
use crate::error::{FailureKind, TagError, TagResult};
use crate::model::{MedicineDraft, MedicineRecord};
use crate::store::MedicineStore;
use crate::transport::{TagCapability, TagTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FlowAction {
    WriteOnSave,
    ScanForNew,
    ScanForImport,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum FlowState {
    #[default]
    Idle,
    Checking {
        action: FlowAction,
    },
    InProgress {
        action: FlowAction,
    },
    Success {
        action: FlowAction,
    },
    Failed {
        action: FlowAction,
        reason: FailureKind,
    },
}

impl FlowState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success { .. } | Self::Failed { .. })
    }
}

pub type FlowStateReceiver = watch::Receiver<FlowState>;

/// Every state change in order, for event forwarding.
pub type FlowEventReceiver = broadcast::Receiver<FlowState>;

const EVENT_CAPACITY: usize = 32;

/// Publishes a state to the latest-value channel and the event stream.
fn publish(
    state: &watch::Sender<FlowState>,
    events: &broadcast::Sender<FlowState>,
    next: FlowState,
) {
    state.send_replace(next.clone());
    // No subscribers is fine.
    let _ = events.send(next);
}

/// Result of the write-on-save flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Tag written and record stored.
    Written(MedicineRecord),
    /// Tag write failed; the record was stored anyway.
    SavedLocally {
        record: MedicineRecord,
        reason: TagError,
    },
    /// Nothing written and nothing stored.
    Rejected(TagError),
}

impl WriteOutcome {
    pub fn record(&self) -> Option<&MedicineRecord> {
        match self {
            Self::Written(record) | Self::SavedLocally { record, .. } => Some(record),
            Self::Rejected(_) => None,
        }
    }

    pub fn saved_locally(&self) -> bool {
        matches!(self, Self::SavedLocally { .. })
    }

    pub fn error(&self) -> Option<&TagError> {
        match self {
            Self::Written(_) => None,
            Self::SavedLocally { reason, .. } => Some(reason),
            Self::Rejected(err) => Some(err),
        }
    }
}

/// Clears the in-flight slot and returns to `Idle` when dropped.
struct Flight<'a> {
    in_flight: &'a AtomicBool,
    cancel: &'a Mutex<Option<oneshot::Sender<()>>>,
    state: &'a watch::Sender<FlowState>,
    events: &'a broadcast::Sender<FlowState>,
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.cancel.lock() {
            slot.take();
        }
        publish(self.state, self.events, FlowState::Idle);
        self.in_flight.store(false, Ordering::SeqCst);
    }
}

/// Scan/write orchestrator over a tag capability and the medicine store.
pub struct TagFlows<C> {
    transport: TagTransport<C>,
    store: Arc<MedicineStore>,
    config: TagConfig,
    in_flight: AtomicBool,
    cancel: Mutex<Option<oneshot::Sender<()>>>,
    state: watch::Sender<FlowState>,
    events: broadcast::Sender<FlowState>,
}

impl<C: TagCapability> TagFlows<C> {
    pub fn new(capability: C, store: Arc<MedicineStore>, config: TagConfig) -> Self {
        Self::with_transport(TagTransport::new(capability), store, config)
    }

    pub fn with_transport(
        transport: TagTransport<C>,
        store: Arc<MedicineStore>,
        config: TagConfig,
    ) -> Self {
        let (state, _) = watch::channel(FlowState::Idle);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            transport,
            store,
            config,
            in_flight: AtomicBool::new(false),
            cancel: Mutex::new(None),
            state,
            events,
        }
    }

    pub fn store(&self) -> &Arc<MedicineStore> {
        &self.store
    }

    pub fn transport(&self) -> &TagTransport<C> {
        &self.transport
    }

    pub fn config(&self) -> &TagConfig {
        &self.config
    }

    pub fn state(&self) -> FlowState {
        self.state.borrow().clone()
    }

    /// Latest state only; intermediate states may be skipped.
    pub fn subscribe(&self) -> FlowStateReceiver {
        self.state.subscribe()
    }

    /// Every state change from now on, in order.
    pub fn subscribe_events(&self) -> FlowEventReceiver {
        self.events.subscribe()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Cancels the orchestration in flight. Returns false when idle.
    pub fn cancel(&self) -> bool {
        let sender = match self.cancel.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        match sender {
            Some(tx) => {
                tracing::info!("[MeditagFlow] cancel requested");
                tx.send(()).is_ok()
            }
            None => false,
        }
    }

    fn begin(&self) -> Option<(Flight<'_>, oneshot::Receiver<()>)> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        if let Ok(mut slot) = self.cancel.lock() {
            *slot = Some(tx);
        }
        let flight = Flight {
            in_flight: &self.in_flight,
            cancel: &self.cancel,
            state: &self.state,
            events: &self.events,
        };
        Some((flight, rx))
    }

    fn transition(&self, next: FlowState) {
        tracing::debug!("[MeditagFlow] -> {:?}", next);
        publish(&self.state, &self.events, next);
    }

    /// Runs one transport operation through the state machine.
    async fn orchestrate<T, F, Fut>(&self, action: FlowAction, op: F) -> TagResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = TagResult<T>>,
    {
        let Some((_flight, cancel_rx)) = self.begin() else {
            tracing::warn!("[MeditagFlow] {:?} rejected: busy", action);
            return Err(TagError::Busy);
        };

        tracing::info!("[MeditagFlow] {:?} started", action);
        self.transition(FlowState::Checking { action });

        let result = if self.transport.is_available() {
            self.transition(FlowState::InProgress { action });
            tokio::select! {
                result = op() => result,
                Ok(()) = cancel_rx => Err(TagError::Canceled),
            }
        } else {
            Err(TagError::Unavailable(
                "tag capability absent or context not secure".into(),
            ))
        };

        match &result {
            Ok(_) => {
                tracing::info!("[MeditagFlow] {:?} succeeded", action);
                self.transition(FlowState::Success { action });
            }
            Err(err) => {
                tracing::warn!("[MeditagFlow] {:?} failed: {}", action, err);
                self.transition(FlowState::Failed {
                    action,
                    reason: err.kind(),
                });
            }
        }
        result
    }

    /// Writes the draft to a tag, then stores it.
    ///
    /// Any tag failure still stores the record. Invalid drafts and busy
    /// rejections store nothing.
    pub async fn start_write_flow(&self, draft: MedicineDraft) -> WriteOutcome {
        if let Err(e) = draft.validate() {
            return WriteOutcome::Rejected(e.into());
        }

        let timeout = self.config.write_timeout();
        let language = self.config.text_language.clone();
        let payload = &draft;
        let written = self
            .orchestrate(FlowAction::WriteOnSave, || async move {
                let encoded = codec::encode(payload, &language)?;
                self.transport.write_once(encoded.message(), timeout).await
            })
            .await;

        match written {
            Err(TagError::Busy) => WriteOutcome::Rejected(TagError::Busy),
            Ok(()) => match self.store.add(draft) {
                Ok(record) => WriteOutcome::Written(record),
                Err(e) => WriteOutcome::Rejected(TagError::Unknown(e.to_string())),
            },
            Err(reason) => match self.store.add(draft) {
                Ok(record) => {
                    tracing::warn!(
                        "[MeditagFlow] saved #{} locally after {}",
                        record.id,
                        reason.kind()
                    );
                    WriteOutcome::SavedLocally { record, reason }
                }
                Err(e) => WriteOutcome::Rejected(TagError::Unknown(e.to_string())),
            },
        }
    }

    /// Scans a tag to prefill the add-medicine form.
    ///
    /// Any reading succeeds; the prefill is present only when the tag holds a
    /// valid medicine payload.
    pub async fn start_scan_for_new_flow(&self) -> TagResult<Option<MedicineDraft>> {
        let timeout = self.config.scan_timeout();
        self.orchestrate(FlowAction::ScanForNew, || async move {
            let decoded = match self.transport.scan_once(timeout).await {
                Ok(message) => codec::decode(message.records()),
                Err(e @ TagError::MalformedPayload(_)) => Err(e),
                Err(e) => return Err(e),
            };
            match decoded {
                Ok(draft) => Ok(Some(draft)),
                Err(e) => {
                    tracing::debug!("[MeditagFlow] tag has no usable prefill: {}", e);
                    Ok(None)
                }
            }
        })
        .await
    }

    /// Scans a tag and returns the validated draft it carries.
    pub async fn start_scan_for_import_flow(&self) -> TagResult<MedicineDraft> {
        let timeout = self.config.scan_timeout();
        self.orchestrate(FlowAction::ScanForImport, || async move {
            let message = self.transport.scan_once(timeout).await?;
            codec::decode(message.records())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_state_wire_format() {
        let failed = FlowState::Failed {
            action: FlowAction::WriteOnSave,
            reason: FailureKind::PermissionDenied,
        };
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "state": "failed",
                "action": "writeOnSave",
                "reason": "permissionDenied"
            })
        );
        assert!(failed.is_terminal());

        let idle = serde_json::to_value(FlowState::Idle).unwrap();
        assert_eq!(idle, serde_json::json!({ "state": "idle" }));
    }

    #[test]
    fn test_write_outcome_accessors() {
        let store = MedicineStore::new();
        let record = store.add(MedicineDraft::new("Aspirin", "100 mg")).unwrap();

        let local = WriteOutcome::SavedLocally {
            record: record.clone(),
            reason: TagError::Timeout(15_000),
        };
        assert!(local.saved_locally());
        assert_eq!(local.record(), Some(&record));
        assert_eq!(local.error().map(TagError::kind), Some(FailureKind::Timeout));

        let rejected = WriteOutcome::Rejected(TagError::Busy);
        assert!(rejected.record().is_none());
        assert!(!WriteOutcome::Written(record).saved_locally());
    }
}
