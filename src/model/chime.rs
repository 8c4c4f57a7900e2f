//! Chime device variant.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::common::DeviceHeader;
use super::common::DeviceId;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RingtoneSetting {
    pub ringtone_id: String,
    pub volume: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chime {
    #[serde(flatten)]
    pub header: DeviceHeader,

    pub name: String,

    /// Paired camera IDs. These are expected to exist
    /// in the bootstrap's cameras map; the diff engine logs a warning
    /// and *retains* unresolved entries rather
    /// than dropping them, so a later camera-add repairs the reference.
    pub camera_ids: Vec<DeviceId>,

    /// Per-camera ringtone/volume, keyed by camera id.
    pub ringtone_settings: HashMap<DeviceId, RingtoneSetting>,
}
