//! The bootstrap — root of the in-memory object graph.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::bridge::Bridge;
use super::camera::Camera;
use super::chime::Chime;
use super::common::DeviceId;
use super::doorlock::Doorlock;
use super::event::Event;
use super::keyring::Keyring;
use super::light::Light;
use super::liveview::Liveview;
use super::nvr::Nvr;
use super::sensor::Sensor;
use super::ulp_user::UlpUser;
use super::viewer::Viewer;

/// A snapshot of the whole device graph at an instant in time.
///
/// Owns exactly one [`Nvr`], the ordered device mappings, and a bounded
/// `events` mapping: only events within the retention window are kept;
/// older ones fall out via [`Bootstrap::evict_expired_events`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bootstrap {
    pub nvr: Nvr,

    pub cameras: HashMap<DeviceId, Camera>,
    pub lights: HashMap<DeviceId, Light>,
    pub sensors: HashMap<DeviceId, Sensor>,
    pub viewers: HashMap<DeviceId, Viewer>,
    pub chimes: HashMap<DeviceId, Chime>,
    pub doorlocks: HashMap<DeviceId, Doorlock>,
    pub bridges: HashMap<DeviceId, Bridge>,
    pub liveviews: HashMap<DeviceId, Liveview>,
    pub keyrings: HashMap<DeviceId, Keyring>,
    pub ulp_users: HashMap<DeviceId, UlpUser>,

    pub events: HashMap<String, Event>,

    /// Opaque, monotonically non-decreasing.
    pub last_update_id: String,

    pub authenticated_user_id: String,
    pub access_key: String,

    /// Top-level keys the schema doesn't (yet) model, preserved for
    /// round-tripping.
    #[serde(default)]
    pub extras: HashMap<String, Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}

/// How long a completed event stays in [`Bootstrap::events`] before the
/// next eviction pass drops it.
pub const EVENT_RETENTION: chrono::Duration = chrono::Duration::hours(1);

impl Bootstrap {
    /// Placeholder graph held by [`crate::client::ProtectClient`] before
    /// the first successful `GET /api/bootstrap` completes. Never
    /// surfaced to subscribers — [`Self::parse`] replaces it wholesale.
    pub fn empty() -> Self {
        use super::common::{DeviceHeader, DeviceState, MacAddress, ModelKey, PermissionBitmap};

        Self {
            nvr: Nvr {
                header: DeviceHeader {
                    id: String::new(),
                    mac: MacAddress(String::new()),
                    model_key: ModelKey::Nvr,
                    state: DeviceState::Disconnected,
                    firmware_version: String::new(),
                    hardware_revision: String::new(),
                    up_since: None,
                    last_seen: None,
                    permissions: PermissionBitmap(0),
                    connection_host: None,
                    extras: HashMap::new(),
                },
                name: String::new(),
                version: String::new(),
                timezone: String::new(),
                system_info: Default::default(),
            },
            cameras: HashMap::new(),
            lights: HashMap::new(),
            sensors: HashMap::new(),
            viewers: HashMap::new(),
            chimes: HashMap::new(),
            doorlocks: HashMap::new(),
            bridges: HashMap::new(),
            liveviews: HashMap::new(),
            keyrings: HashMap::new(),
            ulp_users: HashMap::new(),
            events: HashMap::new(),
            last_update_id: String::new(),
            authenticated_user_id: String::new(),
            access_key: String::new(),
            extras: HashMap::new(),
        }
    }

    /// Parses loosely: unknown keys land in `extras`; missing optional
    /// device groups (e.g. doorlocks on older controllers) default to
    /// empty rather than failing. Only a missing NVR is a hard error —
    /// missing required keys fail only for the NVR.
    pub fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        let mut raw: Value = serde_json::from_slice(bytes)?;
        let obj = raw
            .as_object_mut()
            .ok_or(ParseError::MissingField("<root>"))?;

        let nvr_value = obj
            .remove("nvr")
            .ok_or(ParseError::MissingField("nvr"))?;
        let nvr: Nvr = serde_json::from_value(nvr_value)?;

        let cameras = parse_map(obj.remove("cameras"))?;
        let lights = parse_map(obj.remove("lights"))?;
        let sensors = parse_map(obj.remove("sensors"))?;
        let viewers = parse_map(obj.remove("viewers"))?;
        let chimes = parse_map(obj.remove("chimes"))?;
        let doorlocks = parse_map(obj.remove("doorlocks"))?;
        let bridges = parse_map(obj.remove("bridges"))?;
        let liveviews = parse_map(obj.remove("liveviews"))?;
        let keyrings = parse_map(obj.remove("keyrings"))?;
        let ulp_users = parse_map(obj.remove("ulpUsers"))?;
        let events = parse_map(obj.remove("events"))?;

        let last_update_id = obj
            .remove("lastUpdateId")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        let authenticated_user_id = obj
            .remove("authUserId")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        let access_key = obj
            .remove("accessKey")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();

        let extras = obj.into_iter().collect();

        Ok(Self {
            nvr,
            cameras,
            lights,
            sensors,
            viewers,
            chimes,
            doorlocks,
            bridges,
            liveviews,
            keyrings,
            ulp_users,
            events,
            last_update_id,
            authenticated_user_id,
            access_key,
            extras,
        })
    }

    /// Every camera id referenced by a chime's
    /// paired list or a light's binding must exist in `cameras`, or is
    /// dropped with a warning. Called after load and after any packet
    /// that could have introduced a dangling reference.
    pub fn check_referential_consistency(&self) {
        for chime in self.chimes.values() {
            for camera_id in &chime.camera_ids {
                if !self.cameras.contains_key(camera_id) {
                    tracing::warn!(
                        chime_id = %chime.header.id,
                        camera_id,
                        "chime references unknown camera; retaining for later repair"
                    );
                }
            }
        }
        for light in self.lights.values() {
            if let Some(camera_id) = &light.camera_id {
                if !self.cameras.contains_key(camera_id) {
                    tracing::warn!(
                        light_id = %light.header.id,
                        camera_id,
                        "light references unknown camera; retaining for later repair"
                    );
                }
            }
        }
    }

    /// Drops events older than [`EVENT_RETENTION`] that are already
    /// completed.
    pub fn evict_expired_events(&mut self, now: chrono::DateTime<chrono::Utc>) {
        self.events.retain(|_, event| {
            event.end.map(|end| now - *end < EVENT_RETENTION).unwrap_or(true)
        });
    }

    /// Looks up a device or the NVR by id across every map that holds a
    /// [`super::Device`] variant, erasing the map it came from. Liveviews,
    /// keyrings, and ULP users have no `Device` representation and are
    /// not searched.
    pub fn find_device(&self, id: &DeviceId) -> Option<super::Device> {
        if self.nvr.header.id == *id {
            return Some(super::Device::Nvr(self.nvr.clone()));
        }
        if let Some(d) = self.cameras.get(id) {
            return Some(super::Device::Camera(d.clone()));
        }
        if let Some(d) = self.lights.get(id) {
            return Some(super::Device::Light(d.clone()));
        }
        if let Some(d) = self.sensors.get(id) {
            return Some(super::Device::Sensor(d.clone()));
        }
        if let Some(d) = self.viewers.get(id) {
            return Some(super::Device::Viewer(d.clone()));
        }
        if let Some(d) = self.chimes.get(id) {
            return Some(super::Device::Chime(d.clone()));
        }
        if let Some(d) = self.doorlocks.get(id) {
            return Some(super::Device::Doorlock(d.clone()));
        }
        if let Some(d) = self.bridges.get(id) {
            return Some(super::Device::Bridge(d.clone()));
        }
        None
    }
}

fn parse_map<T: serde::de::DeserializeOwned>(
    value: Option<Value>,
) -> Result<HashMap<DeviceId, T>, ParseError> {
    match value {
        None => Ok(HashMap::new()),
        Some(Value::Null) => Ok(HashMap::new()),
        Some(Value::Array(items)) => {
            let mut map = HashMap::new();
            for item in items {
                let id = item
                    .get("id")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .ok_or(ParseError::MissingField("id"))?;
                let parsed: T = serde_json::from_value(item)?;
                map.insert(id, parsed);
            }
            Ok(map)
        }
        Some(Value::Object(map)) => {
            let mut out = HashMap::new();
            for (id, item) in map {
                let parsed: T = serde_json::from_value(item)?;
                out.insert(id, parsed);
            }
            Ok(out)
        }
        Some(_) => Ok(HashMap::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_bootstrap_json() -> Value {
        serde_json::json!({
            "lastUpdateId": "u1",
            "authUserId": "user1",
            "accessKey": "key1",
            "nvr": {
                "id": "611111111111111111111111",
                "mac": "aabbccddeeff",
                "modelKey": "nvr",
                "state": "CONNECTED",
                "firmwareVersion": "1.0.0",
                "hardwareRevision": "x",
                "upSince": null,
                "lastSeen": null,
                "permissions": 0,
                "connectionHost": null,
                "name": "NVR",
                "version": "2.0.0",
                "timezone": "UTC",
                "systemInfo": { "storage": { "devices": [] } }
            },
            "cameras": []
        })
    }

    #[test]
    fn parses_minimal_bootstrap_with_empty_optional_groups() {
        let json = minimal_bootstrap_json();
        let bytes = serde_json::to_vec(&json).unwrap();
        let bootstrap = Bootstrap::parse(&bytes).unwrap();
        assert_eq!(bootstrap.last_update_id, "u1");
        assert!(bootstrap.doorlocks.is_empty());
        assert!(bootstrap.cameras.is_empty());
    }

    #[test]
    fn missing_nvr_is_an_error() {
        let json = serde_json::json!({ "cameras": [] });
        let bytes = serde_json::to_vec(&json).unwrap();
        assert!(Bootstrap::parse(&bytes).is_err());
    }

    #[test]
    fn unknown_top_level_keys_preserved_as_extras() {
        let mut json = minimal_bootstrap_json();
        json.as_object_mut()
            .unwrap()
            .insert("somethingNew".to_string(), serde_json::json!(42));
        let bytes = serde_json::to_vec(&json).unwrap();
        let bootstrap = Bootstrap::parse(&bytes).unwrap();
        assert_eq!(bootstrap.extras.get("somethingNew"), Some(&serde_json::json!(42)));
    }
}
