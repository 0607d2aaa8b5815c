// ── Device metadata ──

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Immutable snapshot of a connected device's attributes.
///
/// Produced once per connection by the transport after the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    pub firmware_version: String,
    /// Capability flags advertised by the firmware (e.g. `"app_run_state"`).
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardware_platform: Option<String>,
}

impl Metadata {
    pub fn new(name: impl Into<String>, firmware_version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            firmware_version: firmware_version.into(),
            capabilities: BTreeSet::new(),
            serial: None,
            hardware_platform: None,
        }
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.insert(capability.into());
        self
    }

    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.serial = Some(serial.into());
        self
    }

    pub fn with_hardware_platform(mut self, platform: impl Into<String>) -> Self {
        self.hardware_platform = Some(platform.into());
        self
    }

    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }
}
