//! Liveview — a saved multi-camera layout on the controller.
//!
//! Liveviews are not physical devices: they carry an id for the apply
//! algorithm's add/update/remove dispatch but none of
//! [`super::common::DeviceHeader`]'s MAC/firmware/state fields.

use serde::{Deserialize, Serialize};

use super::common::DeviceId;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveviewSlot {
    pub camera_id: DeviceId,
    pub position: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Liveview {
    pub id: DeviceId,
    pub name: String,
    pub layout: i32,
    pub slots: Vec<LiveviewSlot>,
    pub is_default: bool,
}
