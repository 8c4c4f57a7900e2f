//! Shared device fields and closed-enum-with-fallback types.
//!
//! Every enum here follows the same shape: a closed set of known variants
//! plus an `Unknown(String)` arm that round-trips whatever string the
//! controller actually sent. New firmware adding an enum value must never
//! crash the client.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::time::Timestamp;

/// 24-hex-digit controller-assigned identifier.
pub type DeviceId = String;

/// Lowercase, separator-free MAC address. Construction goes through
/// [`crate::time::normalize_mac`]; this type does not re-validate so it
/// stays cheap to clone and compare.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MacAddress(pub String);

impl std::fmt::Display for MacAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `connected` / `connecting` / `disconnected`, the lattice
/// invariant 4 describes. Legal to transition between any two states;
/// transitioning *to* `Disconnected` clears volatile telemetry (see
/// [`crate::diff`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeviceState {
    Connected,
    Connecting,
    Disconnected,
}

/// The wire discriminator naming a device/object variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModelKey {
    Camera,
    Light,
    Sensor,
    Viewer,
    Chime,
    Doorlock,
    Bridge,
    Liveview,
    Nvr,
    Event,
    Keyring,
    #[serde(rename = "ulpUser")]
    UlpUser,
    #[serde(untagged)]
    Unknown(String),
}

impl std::fmt::Display for ModelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelKey::Camera => write!(f, "camera"),
            ModelKey::Light => write!(f, "light"),
            ModelKey::Sensor => write!(f, "sensor"),
            ModelKey::Viewer => write!(f, "viewer"),
            ModelKey::Chime => write!(f, "chime"),
            ModelKey::Doorlock => write!(f, "doorlock"),
            ModelKey::Bridge => write!(f, "bridge"),
            ModelKey::Liveview => write!(f, "liveview"),
            ModelKey::Nvr => write!(f, "nvr"),
            ModelKey::Event => write!(f, "event"),
            ModelKey::Keyring => write!(f, "keyring"),
            ModelKey::UlpUser => write!(f, "ulpUser"),
            ModelKey::Unknown(s) => write!(f, "{s}"),
        }
    }
}

/// Recording mode. Grows new values between firmware releases, hence the
/// `Unknown` fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecordingMode {
    Always,
    Never,
    Detections,
    #[serde(untagged)]
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VideoMode {
    Default,
    HighFps,
    Sport,
    Slow,
    #[serde(untagged)]
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MountType {
    None,
    Leak,
    Door,
    Window,
    Garage,
    #[serde(untagged)]
    Unknown(String),
}

/// Device-wide permission bitmap, kept opaque (the controller's bit
/// layout is undocumented and not needed for the engine's own logic).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PermissionBitmap(pub u64);

/// Fields shared by every device variant and the NVR record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceHeader {
    pub id: DeviceId,
    pub mac: MacAddress,
    pub model_key: ModelKey,
    pub state: DeviceState,
    pub firmware_version: String,
    pub hardware_revision: String,
    pub up_since: Option<Timestamp>,
    pub last_seen: Option<Timestamp>,
    pub permissions: PermissionBitmap,
    /// Which NVR this device is adopted to (multi-NVR consoles).
    pub connection_host: Option<DeviceId>,
    /// Unknown top-level keys, preserved verbatim for round-tripping.
    #[serde(default)]
    pub extras: HashMap<String, Value>,
}

impl DeviceHeader {
    /// A transition to `Disconnected` clears
    /// volatile telemetry. The header itself holds none of that
    /// telemetry (it lives on each device variant), so this only clears
    /// `last_seen`-adjacent liveness data that belongs to the header.
    pub fn transition_to(&mut self, new_state: DeviceState) {
        self.state = new_state;
    }
}

/// A sparse set of changed field paths, as produced by
/// [`crate::codec::update_in_place`] and consumed by the diff engine and
/// subscriber notifications.
pub type ChangedFields = std::collections::HashSet<String>;
