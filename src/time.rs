//! Hot-path parsing helpers with memoization.
//!
//! The controller re-sends the same millisecond timestamp across many
//! packets in a burst (e.g. every field in a camera `update` that shares
//! one `lastSeen`). Re-parsing the same i64 with `chrono` on every field
//! is wasted work at the packet rates this engine needs to sustain, so
//! both timestamp and MAC parsing go through a small bounded cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::sync::Mutex;

const CACHE_CAP: usize = 4096;

struct Cache<K, V> {
    map: Mutex<HashMap<K, V>>,
}

impl<K: std::hash::Hash + Eq + Clone, V: Clone> Cache<K, V> {
    fn new() -> Self {
        Self {
            map: Mutex::new(HashMap::new()),
        }
    }

    fn get_or_insert_with(&self, key: K, f: impl FnOnce() -> V) -> V {
        let mut map = self.map.lock().unwrap();
        if let Some(v) = map.get(&key) {
            return v.clone();
        }
        let v = f();
        if map.len() >= CACHE_CAP {
            map.clear();
        }
        map.insert(key, v.clone());
        v
    }
}

static TIMESTAMP_CACHE: std::sync::OnceLock<Cache<i64, Option<DateTime<Utc>>>> =
    std::sync::OnceLock::new();

fn timestamp_cache() -> &'static Cache<i64, Option<DateTime<Utc>>> {
    TIMESTAMP_CACHE.get_or_init(Cache::new)
}

/// Parse a wire timestamp (milliseconds since epoch) into a native
/// instant, memoized. Returns `None` for an out-of-range value rather
/// than panicking — the controller is not a trusted input source.
pub fn parse_millis(ms: i64) -> Option<DateTime<Utc>> {
    timestamp_cache().get_or_insert_with(ms, || DateTime::from_timestamp_millis(ms))
}

/// A wire-facing timestamp: milliseconds-since-epoch on the wire,
/// `DateTime<Utc>` everywhere else. (De)serialization goes through
/// [`parse_millis`], so every field using this type shares the same
/// memoized cache instead of each caller re-parsing the same burst of
/// repeated timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(pub DateTime<Utc>);

impl Timestamp {
    pub fn from_millis(ms: i64) -> Option<Self> {
        parse_millis(ms).map(Timestamp)
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Timestamp(dt)
    }
}

impl std::ops::Deref for Timestamp {
    type Target = DateTime<Utc>;

    fn deref(&self) -> &DateTime<Utc> {
        &self.0
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.0.timestamp_millis())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let ms = i64::deserialize(deserializer)?;
        Timestamp::from_millis(ms)
            .ok_or_else(|| serde::de::Error::custom(format!("timestamp {ms} out of range")))
    }
}

/// Normalize a MAC address to lowercase hex, no separators, exactly 12
/// chars. Any deviation (wrong length, non-hex char) is rejected per
/// the hot path.
pub fn normalize_mac(raw: &str) -> Option<String> {
    let stripped: String = raw
        .chars()
        .filter(|c| *c != ':' && *c != '-')
        .collect();
    if stripped.len() != 12 || !stripped.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(stripped.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_caches_timestamp() {
        let a = parse_millis(1_700_000_000_000);
        let b = parse_millis(1_700_000_000_000);
        assert_eq!(a, b);
        assert!(a.is_some());
    }

    #[test]
    fn rejects_absurd_timestamp() {
        assert!(parse_millis(i64::MAX).is_none());
    }

    #[test]
    fn timestamp_deserializes_from_wire_integer_milliseconds() {
        let ts: Timestamp = serde_json::from_str("1700000000000").unwrap();
        assert_eq!(ts.0.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn timestamp_serializes_back_to_integer_milliseconds() {
        let ts = Timestamp::from_millis(1_700_000_000_000).unwrap();
        assert_eq!(serde_json::to_string(&ts).unwrap(), "1700000000000");
    }

    #[test]
    fn timestamp_rejects_wire_string() {
        let err = serde_json::from_str::<Timestamp>("\"2023-11-14T22:13:20Z\"");
        assert!(err.is_err());
    }

    #[test]
    fn normalizes_uppercase_colon_mac() {
        assert_eq!(
            normalize_mac("AA:BB:CC:DD:EE:FF"),
            Some("aabbccddeeff".to_string())
        );
    }

    #[test]
    fn normalizes_dash_mac() {
        assert_eq!(
            normalize_mac("aa-bb-cc-dd-ee-ff"),
            Some("aabbccddeeff".to_string())
        );
    }

    #[test]
    fn rejects_short_mac() {
        assert_eq!(normalize_mac("aa:bb:cc"), None);
    }

    #[test]
    fn rejects_non_hex_mac() {
        assert_eq!(normalize_mac("zzbbccddeeff"), None);
    }
}
