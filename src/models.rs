//! IPC response shapes.

use serde::Serialize;

use meditag_core::{
    FailureKind, FlowState, MedicineDraft, MedicineRecord, TagError, TagResult, WriteOutcome,
};

/// `{ok: false, reason, message}` part shared by every flow response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowFailure {
    pub ok: bool,
    pub reason: FailureKind,
    pub message: String,
}

impl From<&TagError> for FlowFailure {
    fn from(err: &TagError) -> Self {
        Self {
            ok: false,
            reason: err.kind(),
            message: err.user_message().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteFlowResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub saved_locally: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<MedicineRecord>,
}

impl From<WriteOutcome> for WriteFlowResponse {
    fn from(outcome: WriteOutcome) -> Self {
        let failure = outcome.error().map(FlowFailure::from);
        Self {
            ok: failure.is_none(),
            saved_locally: outcome.saved_locally(),
            reason: failure.as_ref().map(|f| f.reason),
            message: failure.map(|f| f.message),
            record: outcome.record().cloned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ScanForNewResponse {
    Scanned {
        ok: bool,
        prefill: Option<MedicineDraft>,
    },
    Failed(FlowFailure),
}

impl From<TagResult<Option<MedicineDraft>>> for ScanForNewResponse {
    fn from(result: TagResult<Option<MedicineDraft>>) -> Self {
        match result {
            Ok(prefill) => Self::Scanned { ok: true, prefill },
            Err(err) => Self::Failed(FlowFailure::from(&err)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ImportResponse {
    Imported { ok: bool, draft: MedicineDraft },
    Failed(FlowFailure),
}

impl From<TagResult<MedicineDraft>> for ImportResponse {
    fn from(result: TagResult<MedicineDraft>) -> Self {
        match result {
            Ok(draft) => Self::Imported { ok: true, draft },
            Err(err) => Self::Failed(FlowFailure::from(&err)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagStatus {
    pub available: bool,
    pub platform: String,
    pub state: FlowState,
}
