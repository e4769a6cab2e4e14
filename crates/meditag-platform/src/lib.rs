//! Tag capabilities for supported platforms.
//!
//! # Supported Platforms
//!
//! - **Android**: native NFC through the mobile plugin bridge ([`BridgeCapability`])
//! - **Desktop**: no radio, every flow reports `Unavailable` ([`UnsupportedCapability`])
//!
//! # Usage
//!
//! ```ignore
//! use meditag_platform::{Platform, UnsupportedCapability};
//! use meditag_core::{MedicineStore, TagConfig, TagFlows};
//!
//! let flows = TagFlows::new(UnsupportedCapability::new(Platform::current()), store, TagConfig::default());
//! let outcome = flows.start_write_flow(draft).await;
//! ```

pub mod bridge;
#[cfg(feature = "mock")]
pub mod mock;
pub mod unsupported;

pub use bridge::{BridgeCapability, BridgeError, MobileBridge};
#[cfg(feature = "mock")]
pub use mock::{ScriptedCapability, ScriptedScan, ScriptedWrite};
pub use unsupported::UnsupportedCapability;

/// Platform identifier for runtime detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Android,
    Ios,
    Linux,
    MacOS,
    Windows,
    Unknown,
}

impl Platform {
    /// Returns the current platform at compile time.
    pub const fn current() -> Self {
        #[cfg(target_os = "android")]
        {
            Platform::Android
        }
        #[cfg(target_os = "ios")]
        {
            Platform::Ios
        }
        #[cfg(target_os = "linux")]
        {
            Platform::Linux
        }
        #[cfg(target_os = "macos")]
        {
            Platform::MacOS
        }
        #[cfg(target_os = "windows")]
        {
            Platform::Windows
        }
        #[cfg(not(any(
            target_os = "android",
            target_os = "ios",
            target_os = "linux",
            target_os = "macos",
            target_os = "windows"
        )))]
        {
            Platform::Unknown
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Platform::Android => "android",
            Platform::Ios => "ios",
            Platform::Linux => "linux",
            Platform::MacOS => "macos",
            Platform::Windows => "windows",
            Platform::Unknown => "unknown",
        }
    }

    /// Whether this platform family ships phones with a tag radio.
    pub const fn has_nfc_radio(&self) -> bool {
        matches!(self, Platform::Android | Platform::Ios)
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_names() {
        assert_eq!(Platform::Ios.to_string(), "ios");
        assert!(Platform::Android.has_nfc_radio());
        assert!(!Platform::Linux.has_nfc_radio());
        assert_ne!(Platform::current().name(), "");
    }
}
