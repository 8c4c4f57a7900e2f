//! ULP (Ubiquiti Identity) user — links a cloud identity to keyring
//! credentials. Present only on newer controller versions.

use serde::{Deserialize, Serialize};

use super::common::DeviceId;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UlpUser {
    pub id: DeviceId,
    pub ulp_id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub status: Option<String>,
}
