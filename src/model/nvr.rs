//! The NVR record — the controller itself. Exactly one per bootstrap.

use serde::{Deserialize, Serialize};

use super::common::DeviceHeader;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StorageDevice {
    pub name: String,
    pub healthy: bool,
    pub size_bytes: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StorageInfo {
    pub devices: Vec<StorageDevice>,
    pub used_bytes: Option<i64>,
    pub total_bytes: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    pub storage: StorageInfo,
    pub cpu_load_percent: Option<f64>,
    pub memory_used_percent: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Nvr {
    #[serde(flatten)]
    pub header: DeviceHeader,

    pub name: String,
    pub version: String,
    pub timezone: String,
    pub system_info: SystemInfo,
}

impl Nvr {
    /// True when any storage device is reporting unhealthy — the signal
    /// the diff engine and subscribers use to flag storage degradation
    /// rather than a per-device boolean buried in `system_info`.
    pub fn has_unhealthy_storage(&self) -> bool {
        self.system_info.storage.devices.iter().any(|d| !d.healthy)
    }
}
