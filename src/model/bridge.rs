//! Bridge device variant — links non-IP devices (e.g. some sensors) to
//! the NVR.

use serde::{Deserialize, Serialize};

use super::common::DeviceHeader;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bridge {
    #[serde(flatten)]
    pub header: DeviceHeader,

    pub name: String,
    pub platform: Option<String>,
}
