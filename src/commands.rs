//! MediTag commands.
//!
//! - `start_write_flow`: write a draft to a tag, then save it (locally on failure)
//! - `start_scan_for_new_flow`: scan a tag to prefill the add form
//! - `start_scan_for_import_flow`: scan a tag and return its validated draft
//! - `cancel_tag_flow`: cancel the flow in progress
//! - `tag_status`: radio availability and current flow state
//! - `list_medicines`, `add_medicine`, `toggle_medicine_taken`: the local list

use std::sync::Arc;

use tauri::{command, State};

use meditag_core::{MedicineDraft, MedicineRecord};

use crate::models::{ImportResponse, ScanForNewResponse, TagStatus, WriteFlowResponse};
use crate::Meditag;

#[command]
pub(crate) async fn start_write_flow(
    state: State<'_, Meditag>,
    draft: MedicineDraft,
) -> Result<WriteFlowResponse, String> {
    let outcome = state.flows().start_write_flow(draft).await;
    Ok(outcome.into())
}

#[command]
pub(crate) async fn start_scan_for_new_flow(
    state: State<'_, Meditag>,
) -> Result<ScanForNewResponse, String> {
    Ok(state.flows().start_scan_for_new_flow().await.into())
}

#[command]
pub(crate) async fn start_scan_for_import_flow(
    state: State<'_, Meditag>,
) -> Result<ImportResponse, String> {
    Ok(state.flows().start_scan_for_import_flow().await.into())
}

/// Returns false when nothing was in flight.
#[command]
pub(crate) fn cancel_tag_flow(state: State<'_, Meditag>) -> bool {
    state.flows().cancel()
}

#[command]
pub(crate) async fn tag_status(state: State<'_, Meditag>) -> Result<TagStatus, String> {
    let flows = Arc::clone(state.flows());
    let available = tauri::async_runtime::spawn_blocking(move || flows.transport().is_available())
        .await
        .map_err(|e| format!("Failed to query tag status: {}", e))?;
    Ok(TagStatus {
        available,
        platform: state.platform().name().to_string(),
        state: state.flows().state(),
    })
}

#[command]
pub(crate) fn list_medicines(state: State<'_, Meditag>) -> Result<Vec<MedicineRecord>, String> {
    state
        .store()
        .list()
        .map_err(|e| format!("Failed to list medicines: {}", e))
}

/// Saves a draft without touching a tag.
#[command]
pub(crate) fn add_medicine(
    state: State<'_, Meditag>,
    draft: MedicineDraft,
) -> Result<MedicineRecord, String> {
    state.store().add(draft).map_err(|e| e.to_string())
}

#[command]
pub(crate) fn toggle_medicine_taken(
    state: State<'_, Meditag>,
    id: u64,
) -> Result<MedicineRecord, String> {
    state.store().toggle_taken(id).map_err(|e| e.to_string())
}
