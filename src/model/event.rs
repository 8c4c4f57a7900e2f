//! Events — first-class objects that also imply state changes on their
//! target device.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::common::DeviceId;
use crate::time::Timestamp;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventType {
    Motion,
    Ring,
    SmartDetectZone,
    SmartDetectLine,
    SmartAudioDetect,
    NfcCardScanned,
    FingerprintIdentified,
    /// Device-lifecycle kinds the controller emits as events rather than
    /// add/update/remove packets (e.g. connection loss summaries).
    DeviceLifecycle(String),
    #[serde(untagged)]
    Unknown(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SmartDetectType {
    Person,
    Vehicle,
    Package,
    Animal,
    LicensePlate,
    Face,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub event_type: EventType,
    pub start: Timestamp,
    pub end: Option<Timestamp>,
    /// The camera or device this event pertains to. One of the two is
    /// always populated depending on event type.
    pub camera_id: Option<DeviceId>,
    pub device_id: Option<DeviceId>,
    pub smart_detect_types: Vec<SmartDetectType>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl Event {
    /// `active` (no end) -> `completed` (end
    /// set) exactly once, never back.
    pub fn is_active(&self) -> bool {
        self.end.is_none()
    }

    /// Restores the start-before-end invariant after a merge: an end
    /// earlier than start (clock skew) clamps start down to end rather
    /// than leaving a negative-duration event.
    pub fn enforce_start_before_end(&mut self) {
        if let Some(end) = self.end {
            if end < self.start {
                self.start = end;
            }
        }
    }
}
