//! Viewer (display console) device variant.

use serde::{Deserialize, Serialize};

use super::common::DeviceHeader;
use super::common::DeviceId;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewer {
    #[serde(flatten)]
    pub header: DeviceHeader,

    pub name: String,
    /// Liveview currently shown on this viewer, if any.
    pub liveview_id: Option<DeviceId>,
}
