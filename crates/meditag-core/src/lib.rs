//! Medicine tag payloads, the tag transport adapter and scan/write flows.

pub mod codec;
pub mod config;
pub mod error;
pub mod flow;
pub mod model;
pub mod ndef;
pub mod store;
pub mod transport;

pub use codec::{EncodedPayload, JSON_MEDIA_TYPE, PAYLOAD_TYPE, PAYLOAD_VERSION, TagPayload};
pub use config::TagConfig;
pub use error::{
    ConfigError, DecodeFailure, DraftError, FailureKind, NdefError, StoreError, StoreResult,
    TagError, TagResult,
};
pub use flow::{
    FlowAction, FlowEventReceiver, FlowState, FlowStateReceiver, TagFlows, WriteOutcome,
};
pub use model::{COLOR_PALETTE, MedicineDraft, MedicineRecord, Shape};
pub use ndef::{NdefMessage, NdefRecord, RecordKind, Tnf};
pub use store::MedicineStore;
pub use transport::{
    EventSink, ListenerId, ListenerKind, PlatformError, PlatformErrorCode, TagCapability,
    TagEvent, TagTransport, classify,
};
