//! Bidirectional mapping between the controller's camelCase wire form and
//! the strongly typed object graph in [`crate::model`].
//!
//! [`crate::model::bootstrap::Bootstrap::parse`] covers the bootstrap
//! document itself; this module covers the two operations the live
//! update stream and the mutation path need: merging a sparse partial
//! into an existing typed object, and re-serializing a typed object down
//! to a minimal field list.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::model::ChangedFields;

/// Emits only the listed fields from `object`, keyed by their wire
/// (camelCase) names. Used by the mutation path to build minimal
/// PATCH bodies instead of round-tripping the whole record.
pub fn to_wire<T: Serialize>(object: &T, fields: &[&str]) -> Result<Value, serde_json::Error> {
    let full = serde_json::to_value(object)?;
    let full = full.as_object().cloned().unwrap_or_default();
    let mut out = Map::new();
    for field in fields {
        if let Some(value) = full.get(*field) {
            out.insert((*field).to_string(), value.clone());
        }
    }
    Ok(Value::Object(out))
}

/// Merges a sparse partial (already resolved for snake_case/camelCase
/// duplicates via [`dedupe_wire_keys`]) into `object`, returning the set
/// of dotted field paths that actually changed. Used by the diff engine
/// to drive the "changed-fields" half of every logical event
/// applied.
pub fn update_in_place<T>(object: &mut T, partial: &Value) -> Result<ChangedFields, serde_json::Error>
where
    T: Serialize + DeserializeOwned,
{
    let mut partial = partial.clone();
    if let Some(map) = partial.as_object_mut() {
        dedupe_wire_keys(map);
    }

    let before = serde_json::to_value(&*object)?;
    let merged = merge_values(before.clone(), partial);
    let changed = collect_changed_paths(&before, &merged, "");

    *object = serde_json::from_value(merged)?;
    Ok(changed)
}

/// The controller sometimes ships the same logical field under both its
/// camelCase wire name and a raw snake_case alias during firmware
/// transitions. If both forms appear, snake_case wins and
/// camelCase is discarded." This rewrites the snake_case value onto the
/// camelCase key our types expect and drops the snake_case key.
pub fn dedupe_wire_keys(map: &mut Map<String, Value>) {
    let snake_keys: Vec<String> = map
        .keys()
        .filter(|k| k.contains('_'))
        .cloned()
        .collect();

    for snake_key in snake_keys {
        let camel_key = snake_to_camel(&snake_key);
        if camel_key != snake_key && map.contains_key(&camel_key) {
            if let Some(value) = map.remove(&snake_key) {
                map.insert(camel_key, value);
            }
        }
    }

    for value in map.values_mut() {
        if let Some(nested) = value.as_object_mut() {
            dedupe_wire_keys(nested);
        }
    }
}

fn snake_to_camel(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut upper_next = false;
    for c in s.chars() {
        if c == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Recursive merge: objects merge key-by-key, anything else (arrays,
/// scalars, and object-replaced-by-non-object) is replaced wholesale.
fn merge_values(base: Value, partial: Value) -> Value {
    match (base, partial) {
        (Value::Object(mut base_map), Value::Object(partial_map)) => {
            for (key, value) in partial_map {
                let merged = match base_map.remove(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, partial) => partial,
    }
}

/// Walks `before` and `after` in lockstep, recording a dotted path for
/// every leaf whose value differs. Object-valued fields that changed
/// anywhere underneath are recorded at every level (both the leaf path
/// and `recordingSettings`, say), which is what subscribers expect when
/// deciding whether a coarse-grained watch fired.
fn collect_changed_paths(before: &Value, after: &Value, prefix: &str) -> ChangedFields {
    let mut changed = ChangedFields::new();
    if before == after {
        return changed;
    }

    match (before, after) {
        (Value::Object(before_map), Value::Object(after_map)) => {
            let mut keys: Vec<&String> = after_map.keys().chain(before_map.keys()).collect();
            keys.sort();
            keys.dedup();
            for key in keys {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                let before_v = before_map.get(key).unwrap_or(&Value::Null);
                let after_v = after_map.get(key).unwrap_or(&Value::Null);
                if before_v != after_v {
                    changed.extend(collect_changed_paths(before_v, after_v, &path));
                    changed.insert(path);
                }
            }
        }
        _ => {
            changed.insert(prefix.to_string());
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct Inner {
        mode: String,
        pre_padding_secs: i32,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct Outer {
        name: String,
        is_motion_detected: bool,
        recording_settings: Inner,
    }

    fn sample() -> Outer {
        Outer {
            name: "front door".to_string(),
            is_motion_detected: false,
            recording_settings: Inner {
                mode: "always".to_string(),
                pre_padding_secs: 2,
            },
        }
    }

    #[test]
    fn update_in_place_merges_sparse_partial_and_reports_changed_leaves() {
        let mut object = sample();
        let partial = serde_json::json!({ "isMotionDetected": true });
        let changed = update_in_place(&mut object, &partial).unwrap();
        assert!(object.is_motion_detected);
        assert_eq!(object.name, "front door");
        assert!(changed.contains("isMotionDetected"));
        assert!(!changed.contains("name"));
    }

    #[test]
    fn update_in_place_reports_nested_paths_on_partial_nested_object() {
        let mut object = sample();
        let partial = serde_json::json!({ "recordingSettings": { "mode": "never" } });
        let changed = update_in_place(&mut object, &partial).unwrap();
        assert_eq!(object.recording_settings.mode, "never");
        assert_eq!(object.recording_settings.pre_padding_secs, 2);
        assert!(changed.contains("recordingSettings"));
        assert!(changed.contains("recordingSettings.mode"));
    }

    #[test]
    fn update_in_place_is_a_no_op_when_partial_matches_current_state() {
        let mut object = sample();
        let partial = serde_json::json!({ "name": "front door" });
        let changed = update_in_place(&mut object, &partial).unwrap();
        assert!(changed.is_empty());
    }

    #[test]
    fn dedupe_wire_keys_prefers_snake_case_value_over_camel_case() {
        let mut map = serde_json::json!({
            "isMotionDetected": false,
            "is_motion_detected": true,
        })
        .as_object()
        .unwrap()
        .clone();
        dedupe_wire_keys(&mut map);
        assert_eq!(map.get("isMotionDetected"), Some(&Value::Bool(true)));
        assert!(!map.contains_key("is_motion_detected"));
    }

    #[test]
    fn to_wire_emits_only_listed_fields() {
        let object = sample();
        let wire = to_wire(&object, &["name", "isMotionDetected"]).unwrap();
        let map = wire.as_object().unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("name").unwrap(), "front door");
        assert!(!map.contains_key("recordingSettings"));
    }
}
