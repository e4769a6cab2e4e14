use serde_json::Value;
use tauri::plugin::mobile::PluginInvokeError;
use tauri::plugin::{PluginApi, PluginHandle};
use tauri::Runtime;

use meditag_core::TagConfig;
use meditag_platform::{BridgeError, MobileBridge};

/// Native `MeditagPlugin` reached through the Tauri plugin handle.
pub struct PluginBridge<R: Runtime>(pub PluginHandle<R>);

impl<R: Runtime> MobileBridge for PluginBridge<R> {
    fn invoke(&self, method: &str, args: Value) -> Result<Value, BridgeError> {
        self.0
            .run_mobile_plugin::<Value>(method, args)
            .map_err(|err| match err {
                PluginInvokeError::InvokeRejected(response) => BridgeError::Rejected {
                    method: method.to_string(),
                    code: response.code.unwrap_or_else(|| "Error".to_string()),
                    message: response.message.unwrap_or_default(),
                },
                other => BridgeError::Transport(other.to_string()),
            })
    }
}

pub(crate) fn register_android_plugin<R: Runtime>(
    api: &PluginApi<R, Option<TagConfig>>,
) -> Result<PluginHandle<R>, Box<dyn std::error::Error>> {
    api.register_android_plugin("app.tauri.meditag", "MeditagPlugin")
        .map_err(Into::into)
}
