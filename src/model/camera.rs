//! Camera device variant.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::common::{DeviceHeader, DeviceId, RecordingMode, VideoMode};
use crate::time::Timestamp;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: i32,
    pub width: i32,
    pub height: i32,
    pub bitrate: i64,
    pub fps: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSettings {
    pub mode: Option<RecordingMode>,
    pub pre_padding_secs: Option<i32>,
    pub post_padding_secs: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct IspSettings {
    pub ir_led_mode: Option<String>,
    pub brightness: Option<i32>,
    pub contrast: Option<i32>,
    pub hdr_mode: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SmartDetectSettings {
    pub object_types: Vec<String>,
    pub audio_types: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TalkbackSettings {
    pub type_fmt: Option<String>,
    pub bind_addr: Option<String>,
    pub bind_port: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LcdMessage {
    pub text: Option<String>,
    pub reset_at: Option<Timestamp>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Camera {
    #[serde(flatten)]
    pub header: DeviceHeader,

    pub name: String,
    pub video_mode: Option<VideoMode>,
    pub recording_settings: RecordingSettings,
    pub isp_settings: IspSettings,
    pub channels: Vec<Channel>,
    pub smart_detect_settings: SmartDetectSettings,
    pub talkback_settings: TalkbackSettings,
    pub lcd_message: Option<LcdMessage>,
    pub led_settings_on: Option<bool>,

    /// Currently attached bridge, if any.
    pub bridge_id: Option<DeviceId>,

    /// Derived by the diff engine from `event.add`/`event.update` packets
    /// never set directly from a wire `camera` payload.
    #[serde(default)]
    pub is_motion_detected: bool,
    #[serde(default)]
    pub last_motion: Option<Timestamp>,
    #[serde(default)]
    pub last_motion_end: Option<Timestamp>,
    #[serde(default)]
    pub is_ringing: bool,
    #[serde(default)]
    pub is_smart_audio_detected: bool,

    /// Free-form capability flags added between firmware releases.
    #[serde(default)]
    pub feature_flags: HashMap<String, Value>,
}

impl Camera {
    /// Clears the telemetry fields that are volatile:
    /// current channel stats and derived motion/ring flags, but not
    /// configuration (recording settings, ISP settings, etc).
    pub fn clear_volatile_on_disconnect(&mut self) {
        self.is_motion_detected = false;
        self.is_ringing = false;
        self.is_smart_audio_detected = false;
    }
}
