//! Capability for platforms without a tag radio.

use std::future::Future;

use meditag_core::{
    EventSink, ListenerId, ListenerKind, NdefMessage, PlatformError, PlatformErrorCode,
    TagCapability,
};

use crate::Platform;

/// Reports no radio. The transport never gets past its availability check.
#[derive(Debug, Clone, Copy)]
pub struct UnsupportedCapability {
    platform: Platform,
}

impl Default for UnsupportedCapability {
    fn default() -> Self {
        Self::new(Platform::current())
    }
}

impl UnsupportedCapability {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    fn not_supported(&self) -> PlatformError {
        PlatformError::new(
            PlatformErrorCode::NotSupported,
            format!("no tag radio on {}", self.platform),
        )
    }
}

impl TagCapability for UnsupportedCapability {
    fn is_present(&self) -> bool {
        false
    }

    fn is_secure_context(&self) -> bool {
        false
    }

    fn add_listener(&self, _kind: ListenerKind, _sink: EventSink) -> ListenerId {
        ListenerId(0)
    }

    fn remove_listener(&self, _id: ListenerId) {}

    fn start_scan(&self) -> Result<(), PlatformError> {
        Err(self.not_supported())
    }

    fn stop_scan(&self) {}

    fn write(
        &self,
        _message: NdefMessage,
    ) -> impl Future<Output = Result<(), PlatformError>> + Send {
        let error = self.not_supported();
        async move { Err(error) }
    }

    fn abort_write(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use meditag_core::{FailureKind, TagTransport};
    use std::time::Duration;

    #[tokio::test]
    async fn test_flows_report_unavailable() {
        let transport = TagTransport::new(UnsupportedCapability::new(Platform::Linux));
        assert!(!transport.is_available());

        let err = transport.scan_once(Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Unavailable);
    }
}
