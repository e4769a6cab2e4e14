use std::sync::Arc;

use tauri::plugin::{Builder, TauriPlugin};
use tauri::{AppHandle, Emitter, Manager, Runtime};

use meditag_core::{FlowEventReceiver, MedicineStore, TagConfig, TagFlows};
use tokio::sync::broadcast::error::RecvError;
use meditag_platform::Platform;

#[cfg(target_os = "android")]
pub mod android;

mod commands;
pub mod models;

pub use models::{FlowFailure, ImportResponse, ScanForNewResponse, TagStatus, WriteFlowResponse};

/// Event carrying each [`meditag_core::FlowState`] change.
pub const FLOW_STATE_EVENT: &str = "meditag://flow-state";

/// Tag capability used on this target.
#[cfg(target_os = "android")]
pub type PlatformCapability = meditag_platform::BridgeCapability;
#[cfg(not(target_os = "android"))]
pub type PlatformCapability = meditag_platform::UnsupportedCapability;

/// Managed plugin state.
pub struct Meditag {
    flows: Arc<TagFlows<PlatformCapability>>,
    platform: Platform,
}

impl Meditag {
    pub fn flows(&self) -> &Arc<TagFlows<PlatformCapability>> {
        &self.flows
    }

    pub fn store(&self) -> &Arc<MedicineStore> {
        self.flows.store()
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }
}

/// Access to the plugin state from any manager.
pub trait MeditagExt<R: Runtime> {
    fn meditag(&self) -> &Meditag;
}

impl<R: Runtime, T: Manager<R>> MeditagExt<R> for T {
    fn meditag(&self) -> &Meditag {
        self.state::<Meditag>().inner()
    }
}

/// Initializes the MediTag plugin.
pub fn init<R: Runtime>() -> TauriPlugin<R, Option<TagConfig>> {
    Builder::<R, Option<TagConfig>>::new("meditag")
        .setup(|app, api| {
            let config = api.config().clone().unwrap_or_default().validated_or_default();
            let platform = Platform::current();

            #[cfg(target_os = "android")]
            let capability = {
                let handle = android::register_android_plugin(&api).map_err(|err| {
                    tracing::error!("[MeditagAndroid] plugin registration failed: {:?}", err);
                    err
                })?;
                meditag_platform::BridgeCapability::new(Arc::new(android::PluginBridge(handle)))
            };
            #[cfg(not(target_os = "android"))]
            let capability = meditag_platform::UnsupportedCapability::new(platform);

            let store = Arc::new(MedicineStore::new());
            let flows = Arc::new(TagFlows::new(capability, store, config));
            forward_flow_state(app.clone(), flows.subscribe_events());
            app.manage(Meditag { flows, platform });

            tracing::info!("[Meditag] plugin initialized on {}", platform);
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::start_write_flow,
            commands::start_scan_for_new_flow,
            commands::start_scan_for_import_flow,
            commands::cancel_tag_flow,
            commands::tag_status,
            commands::list_medicines,
            commands::add_medicine,
            commands::toggle_medicine_taken,
        ])
        .build()
}

fn forward_flow_state<R: Runtime>(app: AppHandle<R>, mut events: FlowEventReceiver) {
    tauri::async_runtime::spawn(async move {
        loop {
            let state = match events.recv().await {
                Ok(state) => state,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("[Meditag] flow-state forwarder skipped {} change(s)", skipped);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            if let Err(err) = app.emit(FLOW_STATE_EVENT, &state) {
                tracing::warn!("[Meditag] failed to emit flow state: {}", err);
            }
        }
    });
}
