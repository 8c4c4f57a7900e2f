//! Local mutation path with echo suppression.
//!
//! Callers stage field changes in a per-device dirty buffer, then call
//! `save()`, which diffs against server-confirmed state, PATCHes only
//! the changed leaves, and registers an ignore-table entry so the
//! WebSocket echo of the very change we just made doesn't race a
//! competing in-memory update.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::model::DeviceId;

/// Fields the controller derives itself and echoes back unprompted.
/// These must never be suppressed even if they happen to collide with
/// an outstanding ignore-table entry.
pub const SERVER_DERIVED_FIELDS: &[&str] = &["lastSeen", "upSince", "stats", "uptime"];

fn is_server_derived(field: &str) -> bool {
    SERVER_DERIVED_FIELDS.iter().any(|f| *f == field)
}

#[derive(Debug, Clone)]
struct IgnoreEntry {
    expires_at: Instant,
}

/// Keyed by `(device-id, field-path)`. A field's echo is suppressed
/// exactly once (first hit) or until the TTL lapses, whichever comes
/// first.
pub struct IgnoreTable {
    ttl: Duration,
    entries: Mutex<HashMap<(DeviceId, String), IgnoreEntry>>,
}

impl IgnoreTable {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(&self, device_id: &DeviceId, field_paths: impl IntoIterator<Item = String>) {
        let expires_at = Instant::now() + self.ttl;
        let mut entries = self.entries.lock().unwrap();
        for field in field_paths {
            if is_server_derived(&field) {
                continue;
            }
            entries.insert((device_id.clone(), field), IgnoreEntry { expires_at });
        }
    }

    /// Called by the diff engine for each changed field on an echoed
    /// packet. Returns `true` if the field's change should be dropped
    /// for this packet, consuming the entry on a hit.
    pub fn consume_if_matches(&self, device_id: &DeviceId, field_path: &str) -> bool {
        if is_server_derived(field_path) {
            return false;
        }
        let mut entries = self.entries.lock().unwrap();
        let key = (device_id.clone(), field_path.to_string());
        match entries.get(&key) {
            Some(entry) if entry.expires_at >= Instant::now() => {
                entries.remove(&key);
                true
            }
            Some(_) => {
                entries.remove(&key);
                false
            }
            None => false,
        }
    }

    pub fn sweep_expired(&self) {
        let now = Instant::now();
        self.entries.lock().unwrap().retain(|_, e| e.expires_at >= now);
    }
}

/// A device's uncommitted, caller-staged field changes, keyed by wire
/// (camelCase) field name.
#[derive(Debug, Default)]
pub struct DirtyBuffer {
    pending: HashMap<String, Value>,
}

impl DirtyBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.pending.insert(field.into(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &String> {
        self.pending.keys()
    }

    pub fn as_patch_body(&self) -> Value {
        Value::Object(self.pending.clone().into_iter().collect())
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignore_entry_is_consumed_on_first_matching_hit() {
        let table = IgnoreTable::new(Duration::from_secs(2));
        table.register(&"cam1".to_string(), vec!["recordingSettings.mode".to_string()]);

        assert!(table.consume_if_matches(&"cam1".to_string(), "recordingSettings.mode"));
        assert!(!table.consume_if_matches(&"cam1".to_string(), "recordingSettings.mode"));
    }

    #[test]
    fn ignore_entry_expires_after_ttl() {
        let table = IgnoreTable::new(Duration::from_millis(1));
        table.register(&"cam1".to_string(), vec!["name".to_string()]);
        std::thread::sleep(Duration::from_millis(5));
        assert!(!table.consume_if_matches(&"cam1".to_string(), "name"));
    }

    #[test]
    fn server_derived_fields_are_never_registered_or_suppressed() {
        let table = IgnoreTable::new(Duration::from_secs(2));
        table.register(&"cam1".to_string(), vec!["lastSeen".to_string()]);
        assert!(!table.consume_if_matches(&"cam1".to_string(), "lastSeen"));
    }

    #[test]
    fn dirty_buffer_tracks_staged_fields() {
        let mut buffer = DirtyBuffer::new();
        assert!(buffer.is_empty());
        buffer.set("name", Value::String("front door".to_string()));
        assert!(!buffer.is_empty());
        let body = buffer.as_patch_body();
        assert_eq!(body["name"], "front door");
    }
}
