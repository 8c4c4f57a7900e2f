//! Light device variant.

use serde::{Deserialize, Serialize};

use super::common::DeviceHeader;
use super::common::DeviceId;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PirSettings {
    pub sensitivity: Option<i32>,
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Light {
    #[serde(flatten)]
    pub header: DeviceHeader,

    pub name: String,
    pub pir_settings: PirSettings,
    pub camera_id: Option<DeviceId>,

    /// Derived by the diff engine from `light` on/off events.
    #[serde(default)]
    pub is_light_on: bool,
}

impl Light {
    pub fn clear_volatile_on_disconnect(&mut self) {
        self.is_light_on = false;
    }
}
