//! Doorlock device variant. Absent on older controllers.

use serde::{Deserialize, Serialize};

use super::common::DeviceHeader;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LockStatus {
    Open,
    Closed,
    Jammed,
    #[serde(untagged)]
    Unknown(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Doorlock {
    #[serde(flatten)]
    pub header: DeviceHeader,

    pub name: String,
    pub lock_status: LockStatus,
    pub auto_close_secs: Option<i32>,
}
