//! The bootstrap apply algorithm: idempotent, in-order
//! application of decoded WebSocket packets to the in-memory graph, plus
//! event-derived camera/device flag updates and divergence detection.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::warn;

use crate::codec;
use crate::error::{ProtectError, Result};
use crate::model::event::{Event, EventType};
use crate::model::{Bootstrap, ChangedFields, DeviceId, ModelKey};
use crate::mutation::IgnoreTable;
use crate::subscribe::{Hub, Notification, NotificationAction};
use crate::ws::frame::{Action, Packet};

/// Signals the session layer to do a full re-bootstrap after
/// unrecoverable divergence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DivergenceSignal {
    Ok,
    FullRebootstrapRequired,
}

pub struct DiffEngine {
    ignore_table: Arc<IgnoreTable>,
    hub: Arc<Hub>,
    ring_reset_timeout: Duration,
    divergence_threshold: u32,
    divergence_window: Duration,
    divergence_log: Mutex<VecDeque<Instant>>,
    ring_generations: Mutex<HashMap<DeviceId, u64>>,
}

impl DiffEngine {
    pub fn new(
        ignore_table: Arc<IgnoreTable>,
        hub: Arc<Hub>,
        ring_reset_timeout: Duration,
        divergence_threshold: u32,
        divergence_window: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            ignore_table,
            hub,
            ring_reset_timeout,
            divergence_threshold,
            divergence_window,
            divergence_log: Mutex::new(VecDeque::new()),
            ring_generations: Mutex::new(HashMap::new()),
        })
    }

    /// Applies one decoded packet to `bootstrap`, publishing a logical
    /// notification on success. Stale packets are dropped
    /// silently and return `Ok(DivergenceSignal::Ok)`.
    pub async fn apply_packet(
        self: &Arc<Self>,
        bootstrap: &Arc<RwLock<Bootstrap>>,
        packet: Packet,
    ) -> Result<DivergenceSignal> {
        let mut bs = bootstrap.write().await;

        if !bs.last_update_id.is_empty() && packet.header.new_update_id <= bs.last_update_id {
            return Ok(DivergenceSignal::Ok);
        }

        let id = packet.header.id.clone();
        let model_key = packet.header.model_key.clone();
        let action = packet.header.action;

        let mut derived_notification: Option<(ModelKey, DeviceId, ChangedFields)> = None;

        let outcome = match &model_key {
            ModelKey::Event => {
                let (outcome, event_for_effects) =
                    self.apply_event_packet(&mut bs, action, &id, &packet.payload)?;
                if let Some(event) = event_for_effects {
                    derived_notification = self
                        .apply_event_side_effects(&mut bs, &event)
                        .map(|(device_id, changed)| (ModelKey::Camera, device_id, changed));
                }
                outcome
            }
            ModelKey::Camera => {
                apply_map_packet(&mut bs.cameras, action, &id, &packet.payload, &self.ignore_table)?
            }
            ModelKey::Light => {
                apply_map_packet(&mut bs.lights, action, &id, &packet.payload, &self.ignore_table)?
            }
            ModelKey::Sensor => {
                apply_map_packet(&mut bs.sensors, action, &id, &packet.payload, &self.ignore_table)?
            }
            ModelKey::Viewer => {
                apply_map_packet(&mut bs.viewers, action, &id, &packet.payload, &self.ignore_table)?
            }
            ModelKey::Chime => {
                apply_map_packet(&mut bs.chimes, action, &id, &packet.payload, &self.ignore_table)?
            }
            ModelKey::Doorlock => {
                apply_map_packet(&mut bs.doorlocks, action, &id, &packet.payload, &self.ignore_table)?
            }
            ModelKey::Bridge => {
                apply_map_packet(&mut bs.bridges, action, &id, &packet.payload, &self.ignore_table)?
            }
            ModelKey::Liveview => {
                apply_map_packet(&mut bs.liveviews, action, &id, &packet.payload, &self.ignore_table)?
            }
            ModelKey::Keyring => {
                apply_map_packet(&mut bs.keyrings, action, &id, &packet.payload, &self.ignore_table)?
            }
            ModelKey::UlpUser => {
                apply_map_packet(&mut bs.ulp_users, action, &id, &packet.payload, &self.ignore_table)?
            }
            ModelKey::Nvr => {
                let mut partial: Value = parse_payload(&packet.payload)?;
                if let Some(obj) = partial.as_object_mut() {
                    codec::dedupe_wire_keys(obj);
                    suppress_ignored(obj, &id, &self.ignore_table, "");
                }
                let changed = codec::update_in_place(&mut bs.nvr, &partial)?;
                ApplyOutcome::Applied(changed)
            }
            ModelKey::Unknown(kind) => {
                warn!(kind, id, "unrecognized model key; dropping packet");
                ApplyOutcome::SkippedUnknownOnUpdate
            }
        };

        bs.check_referential_consistency();
        bs.last_update_id = packet.header.new_update_id.clone();

        let divergence = self.record_outcome(&outcome);

        if let ApplyOutcome::Applied(changed_fields) = outcome {
            self.hub.publish_message(&Notification {
                action: notification_action(action),
                model_key: model_key.clone(),
                id: id.clone(),
                changed_fields,
                raw_packet: parse_payload(&packet.payload).unwrap_or(Value::Null),
            });
        }

        if let Some((derived_model_key, derived_id, changed_fields)) = derived_notification {
            self.hub.publish_message(&Notification {
                action: NotificationAction::Update,
                model_key: derived_model_key,
                id: derived_id,
                changed_fields,
                raw_packet: Value::Null,
            });
        }

        drop(bs);

        if let Some(camera_id) = ring_candidate(&model_key, &id, action) {
            self.maybe_start_ring_timer(bootstrap, camera_id, action);
        }

        Ok(divergence)
    }

    fn record_outcome(&self, outcome: &ApplyOutcome) -> DivergenceSignal {
        if !matches!(outcome, ApplyOutcome::SkippedUnknownOnRemove) {
            return DivergenceSignal::Ok;
        }
        let now = Instant::now();
        let mut log = self.divergence_log.lock().unwrap();
        log.push_back(now);
        while let Some(front) = log.front() {
            if now.duration_since(*front) > self.divergence_window {
                log.pop_front();
            } else {
                break;
            }
        }
        if log.len() as u32 >= self.divergence_threshold {
            log.clear();
            DivergenceSignal::FullRebootstrapRequired
        } else {
            DivergenceSignal::Ok
        }
    }

    /// Returns the applied outcome plus, for `add`/`update`, a snapshot of
    /// the event to run side effects on — side effects run once, in
    /// [`Self::apply_packet`], after this returns, so the derived
    /// camera-change notification can be published right after the
    /// event's own notification.
    fn apply_event_packet(
        &self,
        bootstrap: &mut Bootstrap,
        action: Action,
        id: &DeviceId,
        payload: &[u8],
    ) -> Result<(ApplyOutcome, Option<Event>)> {
        match action {
            Action::Add => {
                let mut event: Event = serde_json::from_slice(payload)?;
                event.enforce_start_before_end();
                bootstrap.events.insert(event.id.clone(), event.clone());
                Ok((ApplyOutcome::Applied(ChangedFields::new()), Some(event)))
            }
            Action::Update => {
                let Some(existing) = bootstrap.events.get_mut(id) else {
                    warn!(id, "event update for unknown id; ignoring");
                    return Ok((ApplyOutcome::SkippedUnknownOnUpdate, None));
                };
                let mut partial: Value = parse_payload(payload)?;
                if let Some(obj) = partial.as_object_mut() {
                    codec::dedupe_wire_keys(obj);
                }
                let changed = codec::update_in_place(existing, &partial)?;
                existing.enforce_start_before_end();
                let snapshot = existing.clone();
                Ok((ApplyOutcome::Applied(changed), Some(snapshot)))
            }
            Action::Remove => {
                if bootstrap.events.remove(id).is_none() {
                    warn!(id, "event remove for unknown id");
                    return Ok((ApplyOutcome::SkippedUnknownOnRemove, None));
                }
                Ok((ApplyOutcome::Applied(ChangedFields::new()), None))
            }
        }
    }

    /// Derives camera-level flags from an event's type and active/ended
    /// state, returning the camera id and the wire-named fields that
    /// changed so the caller can publish a derived notification.
    fn apply_event_side_effects(
        &self,
        bootstrap: &mut Bootstrap,
        event: &Event,
    ) -> Option<(DeviceId, ChangedFields)> {
        let camera_id = event.camera_id.clone()?;
        let camera = bootstrap.cameras.get_mut(&camera_id)?;

        let changed: ChangedFields = match &event.event_type {
            EventType::Motion | EventType::SmartDetectZone | EventType::SmartDetectLine => {
                if event.is_active() {
                    camera.is_motion_detected = true;
                    camera.last_motion = Some(event.start);
                    ["isMotionDetected", "lastMotion"].map(String::from).into()
                } else {
                    camera.is_motion_detected = false;
                    camera.last_motion_end = event.end;
                    ["isMotionDetected", "lastMotionEnd"].map(String::from).into()
                }
            }
            EventType::Ring => {
                camera.is_ringing = event.is_active();
                ["isRinging".to_string()].into()
            }
            EventType::SmartAudioDetect => {
                camera.is_smart_audio_detected = event.is_active();
                ["isSmartAudioDetected".to_string()].into()
            }
            EventType::NfcCardScanned
            | EventType::FingerprintIdentified
            | EventType::DeviceLifecycle(_)
            | EventType::Unknown(_) => return None,
        };
        Some((camera_id, changed))
    }

    fn maybe_start_ring_timer(
        self: &Arc<Self>,
        bootstrap: &Arc<RwLock<Bootstrap>>,
        camera_id: DeviceId,
        action: Action,
    ) {
        if action != Action::Update && action != Action::Add {
            return;
        }
        let generation = {
            let mut gens = self.ring_generations.lock().unwrap();
            let g = gens.entry(camera_id.clone()).or_insert(0);
            *g += 1;
            *g
        };
        let engine = Arc::clone(self);
        let bootstrap = Arc::clone(bootstrap);
        let timeout = self.ring_reset_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let still_current = {
                let gens = engine.ring_generations.lock().unwrap();
                gens.get(&camera_id).copied() == Some(generation)
            };
            if still_current {
                let mut bs = bootstrap.write().await;
                if let Some(camera) = bs.cameras.get_mut(&camera_id) {
                    camera.is_ringing = false;
                }
            }
        });
    }
}

/// Only a ring-setting event packet on a known camera needs the
/// automatic reset timer: the controller does not always send the
/// end-of-ring packet.
fn ring_candidate(model_key: &ModelKey, id: &DeviceId, action: Action) -> Option<DeviceId> {
    if *model_key == ModelKey::Event && action != Action::Remove {
        Some(id.clone())
    } else {
        None
    }
}

enum ApplyOutcome {
    Applied(ChangedFields),
    SkippedUnknownOnUpdate,
    SkippedUnknownOnRemove,
}

fn notification_action(action: Action) -> NotificationAction {
    match action {
        Action::Add => NotificationAction::Add,
        Action::Update => NotificationAction::Update,
        Action::Remove => NotificationAction::Remove,
    }
}

fn parse_payload(payload: &[u8]) -> Result<Value> {
    if payload.is_empty() {
        Ok(Value::Null)
    } else {
        Ok(serde_json::from_slice(payload)?)
    }
}

/// Shared add/update/remove dispatch for every plain device map — the
/// generic device/nvr/liveview dispatch, minus the NVR's singleton case
/// handled separately in [`DiffEngine::apply_packet`].
fn apply_map_packet<T>(
    map: &mut HashMap<DeviceId, T>,
    action: Action,
    id: &DeviceId,
    payload: &[u8],
    ignore_table: &IgnoreTable,
) -> Result<ApplyOutcome>
where
    T: Serialize + DeserializeOwned,
{
    match action {
        Action::Add => {
            if payload.is_empty() {
                return Err(ProtectError::Protocol(
                    "add packet missing payload".to_string(),
                ));
            }
            if map.contains_key(id) {
                warn!(id, "add for existing id; overwriting");
            }
            let value: T = serde_json::from_slice(payload)?;
            map.insert(id.clone(), value);
            Ok(ApplyOutcome::Applied(ChangedFields::new()))
        }
        Action::Update => {
            let Some(existing) = map.get_mut(id) else {
                warn!(id, "update for unknown id; ignoring");
                return Ok(ApplyOutcome::SkippedUnknownOnUpdate);
            };
            let mut partial: Value = parse_payload(payload)?;
            if let Some(obj) = partial.as_object_mut() {
                codec::dedupe_wire_keys(obj);
                suppress_ignored(obj, id, ignore_table, "");
            }
            let changed = codec::update_in_place(existing, &partial)?;
            Ok(ApplyOutcome::Applied(changed))
        }
        Action::Remove => {
            if map.remove(id).is_none() {
                warn!(id, "remove for unknown id");
                return Ok(ApplyOutcome::SkippedUnknownOnRemove);
            }
            Ok(ApplyOutcome::Applied(ChangedFields::new()))
        }
    }
}

/// Removes (and consumes) any key whose dotted path matches an
/// outstanding echo-suppression entry, recursing into nested objects
/// and the echo-suppression ignore table.
fn suppress_ignored(partial: &mut Map<String, Value>, device_id: &DeviceId, ignore_table: &IgnoreTable, prefix: &str) {
    let keys: Vec<String> = partial.keys().cloned().collect();
    for key in keys {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        if ignore_table.consume_if_matches(device_id, &path) {
            partial.remove(&key);
            continue;
        }
        if let Some(nested) = partial.get_mut(&key).and_then(|v| v.as_object_mut()) {
            suppress_ignored(nested, device_id, ignore_table, &path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::nvr::{Nvr, SystemInfo};
    use crate::model::common::{DeviceHeader, DeviceState, MacAddress, ModelKey as MK, PermissionBitmap};

    fn header(id: &str, model_key: MK) -> DeviceHeader {
        DeviceHeader {
            id: id.to_string(),
            mac: MacAddress("aabbccddeeff".to_string()),
            model_key,
            state: DeviceState::Connected,
            firmware_version: "1.0".to_string(),
            hardware_revision: "x".to_string(),
            up_since: None,
            last_seen: None,
            permissions: PermissionBitmap(0),
            connection_host: None,
            extras: Default::default(),
        }
    }

    fn make_bootstrap() -> Bootstrap {
        Bootstrap {
            nvr: Nvr {
                header: header("611111111111111111111111", MK::Nvr),
                name: "NVR".to_string(),
                version: "2.0".to_string(),
                timezone: "UTC".to_string(),
                system_info: SystemInfo::default(),
            },
            cameras: Default::default(),
            lights: Default::default(),
            sensors: Default::default(),
            viewers: Default::default(),
            chimes: Default::default(),
            doorlocks: Default::default(),
            bridges: Default::default(),
            liveviews: Default::default(),
            keyrings: Default::default(),
            ulp_users: Default::default(),
            events: Default::default(),
            last_update_id: String::new(),
            authenticated_user_id: "user1".to_string(),
            access_key: "key1".to_string(),
            extras: Default::default(),
        }
    }

    fn make_packet(action: &str, model_key: &str, id: &str, new_update_id: &str, payload: Value) -> Packet {
        use crate::ws::frame::ActionHeader;
        let header_json = serde_json::json!({
            "action": action,
            "newUpdateId": new_update_id,
            "modelKey": model_key,
            "id": id,
        });
        let header: ActionHeader = serde_json::from_value(header_json).unwrap();
        let payload_bytes = if payload.is_null() {
            Vec::new()
        } else {
            serde_json::to_vec(&payload).unwrap()
        };
        Packet { header, payload: payload_bytes }
    }

    fn make_camera(id: &str) -> Value {
        serde_json::json!({
            "id": id,
            "mac": "aabbccddeeff",
            "modelKey": "camera",
            "state": "CONNECTED",
            "firmwareVersion": "1.0",
            "hardwareRevision": "x",
            "upSince": null,
            "lastSeen": null,
            "permissions": 0,
            "connectionHost": null,
            "name": "front door",
            "videoMode": null,
            "recordingSettings": {},
            "ispSettings": {},
            "channels": [],
            "smartDetectSettings": {},
            "talkbackSettings": {},
            "lcdMessage": null,
            "ledSettingsOn": null,
            "bridgeId": null,
        })
    }

    #[tokio::test]
    async fn applies_camera_add_then_update_in_order() {
        let bootstrap = Arc::new(RwLock::new(make_bootstrap()));
        let ignore_table = Arc::new(IgnoreTable::new(Duration::from_secs(2)));
        let hub = Hub::new();
        let engine = DiffEngine::new(ignore_table, hub, Duration::from_secs(3), 3, Duration::from_secs(60));

        let add = make_packet("add", "camera", "cam1", "u1", make_camera("cam1"));
        engine.apply_packet(&bootstrap, add).await.unwrap();

        let update = make_packet("update", "camera", "cam1", "u2", serde_json::json!({ "name": "back door" }));
        engine.apply_packet(&bootstrap, update).await.unwrap();

        let bs = bootstrap.read().await;
        assert_eq!(bs.cameras.get("cam1").unwrap().name, "back door");
        assert_eq!(bs.last_update_id, "u2");
    }

    #[tokio::test]
    async fn drops_stale_packet_below_last_update_id() {
        let bootstrap = Arc::new(RwLock::new(make_bootstrap()));
        let ignore_table = Arc::new(IgnoreTable::new(Duration::from_secs(2)));
        let hub = Hub::new();
        let engine = DiffEngine::new(ignore_table, hub, Duration::from_secs(3), 3, Duration::from_secs(60));

        let add = make_packet("add", "camera", "cam1", "u5", make_camera("cam1"));
        engine.apply_packet(&bootstrap, add).await.unwrap();

        let stale = make_packet("update", "camera", "cam1", "u2", serde_json::json!({ "name": "ignored" }));
        engine.apply_packet(&bootstrap, stale).await.unwrap();

        let bs = bootstrap.read().await;
        assert_eq!(bs.cameras.get("cam1").unwrap().name, "front door");
        assert_eq!(bs.last_update_id, "u5");
    }

    #[tokio::test]
    async fn motion_event_sets_and_clears_camera_flag() {
        let bootstrap = Arc::new(RwLock::new(make_bootstrap()));
        {
            let mut bs = bootstrap.write().await;
            bs.cameras.insert("cam1".to_string(), serde_json::from_value(make_camera("cam1")).unwrap());
        }
        let ignore_table = Arc::new(IgnoreTable::new(Duration::from_secs(2)));
        let hub = Hub::new();
        let engine = DiffEngine::new(ignore_table, hub, Duration::from_secs(3), 3, Duration::from_secs(60));

        let start_event = serde_json::json!({
            "id": "evt1",
            "eventType": "motion",
            "start": 1_700_000_000_000i64,
            "end": null,
            "cameraId": "cam1",
            "deviceId": null,
            "smartDetectTypes": [],
        });
        let add = make_packet("add", "event", "evt1", "u1", start_event);
        engine.apply_packet(&bootstrap, add).await.unwrap();
        assert!(bootstrap.read().await.cameras.get("cam1").unwrap().is_motion_detected);

        let end_update = serde_json::json!({ "end": 1_700_000_005_000i64 });
        let update = make_packet("update", "event", "evt1", "u2", end_update);
        engine.apply_packet(&bootstrap, update).await.unwrap();
        assert!(!bootstrap.read().await.cameras.get("cam1").unwrap().is_motion_detected);
    }

    /// An `event.add` packet publishes its own notification plus a second,
    /// derived `camera` notification carrying the flags the event
    /// side-effected, in that order.
    #[tokio::test]
    async fn motion_event_add_publishes_event_then_derived_camera_notification() {
        let bootstrap = Arc::new(RwLock::new(make_bootstrap()));
        {
            let mut bs = bootstrap.write().await;
            bs.cameras.insert("cam1".to_string(), serde_json::from_value(make_camera("cam1")).unwrap());
        }
        let ignore_table = Arc::new(IgnoreTable::new(Duration::from_secs(2)));
        let hub = Hub::new();
        let engine = DiffEngine::new(ignore_table, Arc::clone(&hub), Duration::from_secs(3), 3, Duration::from_secs(60));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let _unsub = hub.subscribe_messages(Box::new(move |n: &Notification| {
            seen_clone.lock().unwrap().push((n.model_key.clone(), n.id.clone(), n.changed_fields.clone()));
        }));

        let start_event = serde_json::json!({
            "id": "evt1",
            "eventType": "motion",
            "start": 1_700_000_000_000i64,
            "end": null,
            "cameraId": "cam1",
            "deviceId": null,
            "smartDetectTypes": [],
        });
        let add = make_packet("add", "event", "evt1", "u1", start_event);
        engine.apply_packet(&bootstrap, add).await.unwrap();

        let notifications = seen.lock().unwrap();
        assert_eq!(notifications.len(), 2);
        assert_eq!(notifications[0].0, MK::Event);
        assert_eq!(notifications[0].1, "evt1");
        assert_eq!(notifications[1].0, MK::Camera);
        assert_eq!(notifications[1].1, "cam1");
        assert!(notifications[1].2.contains("isMotionDetected"));
        assert!(notifications[1].2.contains("lastMotion"));
    }

    #[tokio::test]
    async fn repeated_unknown_remove_triggers_divergence_signal() {
        let bootstrap = Arc::new(RwLock::new(make_bootstrap()));
        let ignore_table = Arc::new(IgnoreTable::new(Duration::from_secs(2)));
        let hub = Hub::new();
        let engine = DiffEngine::new(ignore_table, hub, Duration::from_secs(3), 3, Duration::from_secs(60));

        let mut last_signal = DivergenceSignal::Ok;
        for i in 0..3 {
            let remove = make_packet("remove", "camera", "ghost", &format!("u{i}"), Value::Null);
            last_signal = engine.apply_packet(&bootstrap, remove).await.unwrap();
        }
        assert_eq!(last_signal, DivergenceSignal::FullRebootstrapRequired);
    }

    #[tokio::test]
    async fn echoed_ignored_field_is_suppressed_for_one_packet() {
        let bootstrap = Arc::new(RwLock::new(make_bootstrap()));
        {
            let mut bs = bootstrap.write().await;
            bs.cameras.insert("cam1".to_string(), serde_json::from_value(make_camera("cam1")).unwrap());
            bs.last_update_id = "u1".to_string();
        }
        let ignore_table = Arc::new(IgnoreTable::new(Duration::from_secs(2)));
        ignore_table.register(&"cam1".to_string(), vec!["name".to_string()]);
        let hub = Hub::new();
        let engine = DiffEngine::new(ignore_table, hub, Duration::from_secs(3), 3, Duration::from_secs(60));

        let echo = make_packet("update", "camera", "cam1", "u2", serde_json::json!({ "name": "attacker set" }));
        engine.apply_packet(&bootstrap, echo).await.unwrap();

        assert_eq!(bootstrap.read().await.cameras.get("cam1").unwrap().name, "front door");
    }

    /// A reconnect replays the last packet the controller isn't sure the
    /// client saw. The duplicate at the already-applied update id must be
    /// dropped (no notification, no state change), while the next packet
    /// applies normally and is the only one to publish.
    #[tokio::test]
    async fn reconnect_replay_of_last_applied_packet_is_a_no_op() {
        let bootstrap = Arc::new(RwLock::new(make_bootstrap()));
        let ignore_table = Arc::new(IgnoreTable::new(Duration::from_secs(2)));
        let hub = Hub::new();
        let engine = DiffEngine::new(ignore_table, Arc::clone(&hub), Duration::from_secs(3), 3, Duration::from_secs(60));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let _unsub = hub.subscribe_messages(Box::new(move |n: &Notification| {
            seen_clone.lock().unwrap().push(n.id.clone());
        }));

        let add = make_packet("add", "camera", "cam1", "u1", make_camera("cam1"));
        engine.apply_packet(&bootstrap, add).await.unwrap();

        let update = make_packet("update", "camera", "cam1", "u2", serde_json::json!({ "name": "back door" }));
        engine.apply_packet(&bootstrap, update.clone()).await.unwrap();

        // Reconnect replays u2 verbatim: already applied, must be dropped.
        engine.apply_packet(&bootstrap, update).await.unwrap();

        let next = make_packet("update", "camera", "cam1", "u3", serde_json::json!({ "name": "side door" }));
        engine.apply_packet(&bootstrap, next).await.unwrap();

        let bs = bootstrap.read().await;
        assert_eq!(bs.last_update_id, "u3");
        assert_eq!(bs.cameras.get("cam1").unwrap().name, "side door");
        // add, update, update again for "side door" — the replayed u2 must
        // not have produced a fourth entry.
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    /// A chime update naming a camera id the graph doesn't know about yet
    /// still applies: dangling references are retained with a warning, not
    /// silently dropped, and the referential consistency check surfaces it
    /// without panicking or rejecting the packet.
    #[tokio::test]
    async fn chime_update_with_unknown_camera_id_applies_with_warning() {
        let bootstrap = Arc::new(RwLock::new(make_bootstrap()));
        let ignore_table = Arc::new(IgnoreTable::new(Duration::from_secs(2)));
        let hub = Hub::new();
        let engine = DiffEngine::new(ignore_table, hub, Duration::from_secs(3), 3, Duration::from_secs(60));

        let chime = serde_json::json!({
            "id": "chime1",
            "mac": "aabbccddeeff",
            "modelKey": "chime",
            "state": "CONNECTED",
            "firmwareVersion": "1.0",
            "hardwareRevision": "x",
            "upSince": null,
            "lastSeen": null,
            "permissions": 0,
            "connectionHost": null,
            "name": "front chime",
            "cameraIds": [],
            "ringtoneSettings": {},
        });
        let add = make_packet("add", "chime", "chime1", "u1", chime);
        engine.apply_packet(&bootstrap, add).await.unwrap();

        let update = make_packet(
            "update",
            "chime",
            "chime1",
            "u2",
            serde_json::json!({ "cameraIds": ["cam-does-not-exist"] }),
        );
        engine.apply_packet(&bootstrap, update).await.unwrap();

        let bs = bootstrap.read().await;
        assert_eq!(
            bs.chimes.get("chime1").unwrap().camera_ids,
            vec!["cam-does-not-exist".to_string()]
        );
        assert_eq!(bs.last_update_id, "u2");
    }
}
