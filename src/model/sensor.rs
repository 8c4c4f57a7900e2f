//! Sensor device variant.

use serde::{Deserialize, Serialize};

use super::common::{DeviceHeader, MountType};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MotionSettings {
    pub sensitivity: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BatteryStatus {
    pub percentage: Option<i32>,
    pub is_low: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sensor {
    #[serde(flatten)]
    pub header: DeviceHeader,

    pub name: String,
    pub mount_type: Option<MountType>,
    pub motion_settings: MotionSettings,
    pub battery_status: BatteryStatus,
    pub temperature_celsius: Option<f64>,
    pub humidity_percent: Option<f64>,

    /// Derived / volatile telemetry, cleared on disconnect.
    #[serde(default)]
    pub is_motion_detected: bool,
    #[serde(default)]
    pub is_opened: bool,
    #[serde(default)]
    pub leak_detected: bool,
}

impl Sensor {
    pub fn clear_volatile_on_disconnect(&mut self) {
        self.is_motion_detected = false;
        self.leak_detected = false;
    }
}
