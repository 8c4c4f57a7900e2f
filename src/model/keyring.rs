//! Keyring — NFC/fingerprint credential record. Present only on newer
//! controller versions.

use serde::{Deserialize, Serialize};

use super::common::DeviceId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyringType {
    Nfc,
    Fingerprint,
    #[serde(untagged)]
    Unknown(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Keyring {
    pub id: DeviceId,
    pub registry_id: String,
    pub registry_type: KeyringType,
    pub ulp_user: Option<DeviceId>,
}
