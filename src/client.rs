//! [`ProtectClient`]: the public entry point tying the HTTP session, the
//! WebSocket session state machine, the diff engine, and the
//! subscription hub into one handle.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::diff::DiffEngine;
use crate::error::{ProtectError, Result};
use crate::http::HttpSession;
use crate::model::{Bootstrap, ChangedFields, DeviceId};
use crate::mutation::{DirtyBuffer, IgnoreTable};
use crate::subscribe::{Hub, Notification, SessionState};
use crate::ws::session::WsSession;

/// Which device map a [`DeviceMutation`] targets, and the REST resource
/// path segment that kind uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeviceKind {
    Camera,
    Light,
    Sensor,
    Viewer,
    Chime,
    Doorlock,
    Bridge,
}

impl DeviceKind {
    fn path_segment(self) -> &'static str {
        match self {
            DeviceKind::Camera => "cameras",
            DeviceKind::Light => "lights",
            DeviceKind::Sensor => "sensors",
            DeviceKind::Viewer => "viewers",
            DeviceKind::Chime => "chimes",
            DeviceKind::Doorlock => "doorlocks",
            DeviceKind::Bridge => "bridges",
        }
    }
}

/// The state-synchronization engine's public handle. Construct one per
/// controller session; [`ProtectClient::connect`] spawns the reader task
/// described below and returns once the initial bootstrap has
/// loaded.
pub struct ProtectClient {
    http: Arc<HttpSession>,
    bootstrap: Arc<RwLock<Bootstrap>>,
    hub: Arc<Hub>,
    diff_engine: Arc<DiffEngine>,
    ignore_table: Arc<IgnoreTable>,
    ws: Arc<WsSession>,
    cancel: CancellationToken,
    reader_task: AsyncMutex<Option<JoinHandle<()>>>,
}

impl ProtectClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let echo_ignore_ttl = config.echo_ignore_ttl;
        let ring_reset_timeout = config.ring_reset_timeout;
        let divergence_threshold = config.divergence_threshold;
        let divergence_window = config.divergence_window;

        let http = Arc::new(HttpSession::new(config)?);
        let bootstrap = Arc::new(RwLock::new(Bootstrap::empty()));
        let hub = Hub::new();
        let ignore_table = Arc::new(IgnoreTable::new(echo_ignore_ttl));
        let diff_engine = DiffEngine::new(
            Arc::clone(&ignore_table),
            Arc::clone(&hub),
            ring_reset_timeout,
            divergence_threshold,
            divergence_window,
        );
        let cancel = CancellationToken::new();
        let ws = Arc::new(WsSession::new(
            Arc::clone(&http),
            Arc::clone(&diff_engine),
            Arc::clone(&hub),
            Arc::clone(&bootstrap),
            cancel.clone(),
        ));

        Ok(Self {
            http,
            bootstrap,
            hub,
            diff_engine,
            ignore_table,
            ws,
            cancel,
            reader_task: AsyncMutex::new(None),
        })
    }

    /// Authenticates, loads the initial bootstrap, and spawns the reader
    /// task that owns the WebSocket from here on — one logical task owns
    /// the WebSocket reader and all diff-engine mutation. Returns once the
    /// bootstrap is visible to
    /// [`Self::get_snapshot`]; the WebSocket connects in the background.
    pub async fn connect(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(ProtectError::State("client already closed".to_string()));
        }

        self.hub.publish_state(SessionState::Authenticating);
        self.http.login().await?;

        self.hub.publish_state(SessionState::Bootstrapping);
        self.ws.load_bootstrap().await?;

        let ws = Arc::clone(&self.ws);
        let handle = tokio::spawn(async move { ws.run().await });
        *self.reader_task.lock().await = Some(handle);

        Ok(())
    }

    /// Cooperative shutdown: signals the reader task to
    /// stop at its next check, then waits for it to exit. Safe to call
    /// even if [`Self::connect`] was never called.
    pub async fn close(&self) {
        self.hub.publish_state(SessionState::Closing);
        self.cancel.cancel();
        if let Some(handle) = self.reader_task.lock().await.take() {
            let _ = handle.await;
        }
    }

    /// Forces a full re-bootstrap outside of the divergence-detection
    /// path: the graph is replaced wholesale.
    pub async fn refresh(&self) -> Result<()> {
        self.ws.load_bootstrap().await
    }

    /// A read-only clone of the current object graph. Suspends only long
    /// enough to acquire the shared read lock. Reads are torn only at
    /// whole-device granularity, since the reader task never holds the
    /// write lock across an await point.
    pub async fn get_snapshot(&self) -> Bootstrap {
        self.bootstrap.read().await.clone()
    }

    /// A single device or the NVR, erased to [`crate::model::Device`] so
    /// callers don't need to know which map it lives in.
    pub async fn device(&self, id: &DeviceId) -> Option<crate::model::Device> {
        self.bootstrap.read().await.find_device(id)
    }

    pub fn subscribe_state(&self) -> tokio::sync::broadcast::Receiver<SessionState> {
        self.hub.subscribe_state()
    }

    pub fn subscribe_messages(
        &self,
        listener: Box<dyn Fn(&Notification) + Send + Sync>,
    ) -> crate::subscribe::Unsubscribe {
        self.hub.subscribe_messages(listener)
    }

    /// Downloads a camera snapshot as raw JPEG bytes; URL construction and
    /// disk persistence are a caller concern.
    pub async fn camera_snapshot(&self, camera_id: &DeviceId, high_quality: bool) -> Result<Vec<u8>> {
        let path = format!(
            "/api/cameras/{camera_id}/snapshot?ts={}&highQuality={}",
            now_millis(),
            high_quality
        );
        self.http.get_bytes(&path).await
    }

    /// Downloads an exported video clip as raw bytes.
    pub async fn save_video(
        &self,
        camera_id: &DeviceId,
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<u8>> {
        let path = format!(
            "/api/video/export?camera={camera_id}&start={}&end={}",
            start.timestamp_millis(),
            end.timestamp_millis()
        );
        self.http.get_bytes(&path).await
    }

    fn mutate(&self, kind: DeviceKind, id: DeviceId) -> DeviceMutation<'_> {
        DeviceMutation {
            client: self,
            kind,
            id,
            dirty: DirtyBuffer::new(),
        }
    }

    pub fn camera(&self, id: &DeviceId) -> DeviceMutation<'_> {
        self.mutate(DeviceKind::Camera, id.clone())
    }

    pub fn light(&self, id: &DeviceId) -> DeviceMutation<'_> {
        self.mutate(DeviceKind::Light, id.clone())
    }

    pub fn sensor(&self, id: &DeviceId) -> DeviceMutation<'_> {
        self.mutate(DeviceKind::Sensor, id.clone())
    }

    pub fn viewer(&self, id: &DeviceId) -> DeviceMutation<'_> {
        self.mutate(DeviceKind::Viewer, id.clone())
    }

    pub fn chime(&self, id: &DeviceId) -> DeviceMutation<'_> {
        self.mutate(DeviceKind::Chime, id.clone())
    }

    pub fn doorlock(&self, id: &DeviceId) -> DeviceMutation<'_> {
        self.mutate(DeviceKind::Doorlock, id.clone())
    }

    pub fn bridge(&self, id: &DeviceId) -> DeviceMutation<'_> {
        self.mutate(DeviceKind::Bridge, id.clone())
    }

    /// The write path's later steps, dispatched by device kind. Not exposed
    /// directly; called from [`DeviceMutation::save`].
    async fn save_mutation(&self, kind: DeviceKind, id: &DeviceId, dirty: &DirtyBuffer) -> Result<ChangedFields> {
        if dirty.is_empty() {
            return Ok(ChangedFields::new());
        }

        let body = dirty.as_patch_body();
        self.ignore_table
            .register(id, dirty.fields().cloned());

        let path = format!("/api/{}/{}", kind.path_segment(), id);
        // Nothing is applied locally until the PATCH confirms, so a 4xx/5xx
        // here needs no explicit rollback.
        self.http.patch(&path, &body).await?;

        let mut bs = self.bootstrap.write().await;
        apply_confirmed_change(&mut bs, kind, id, &body)
    }
}

impl Drop for ProtectClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn apply_confirmed_change(
    bootstrap: &mut Bootstrap,
    kind: DeviceKind,
    id: &DeviceId,
    body: &Value,
) -> Result<ChangedFields> {
    match kind {
        DeviceKind::Camera => apply_to(bootstrap.cameras.get_mut(id), body),
        DeviceKind::Light => apply_to(bootstrap.lights.get_mut(id), body),
        DeviceKind::Sensor => apply_to(bootstrap.sensors.get_mut(id), body),
        DeviceKind::Viewer => apply_to(bootstrap.viewers.get_mut(id), body),
        DeviceKind::Chime => apply_to(bootstrap.chimes.get_mut(id), body),
        DeviceKind::Doorlock => apply_to(bootstrap.doorlocks.get_mut(id), body),
        DeviceKind::Bridge => apply_to(bootstrap.bridges.get_mut(id), body),
    }
}

fn apply_to<T: serde::Serialize + serde::de::DeserializeOwned>(
    existing: Option<&mut T>,
    body: &Value,
) -> Result<ChangedFields> {
    let existing = existing.ok_or_else(|| ProtectError::NotFound("device removed before save completed".to_string()))?;
    Ok(crate::codec::update_in_place(existing, body)?)
}

/// Staged field changes for one device, following the stage-then-save
/// write algorithm. Build with [`ProtectClient::camera`] and friends,
/// call [`Self::set`] per field, then [`Self::save`].
pub struct DeviceMutation<'a> {
    client: &'a ProtectClient,
    kind: DeviceKind,
    id: DeviceId,
    dirty: DirtyBuffer,
}

impl<'a> DeviceMutation<'a> {
    pub fn set(mut self, field: impl Into<String>, value: Value) -> Self {
        self.dirty.set(field, value);
        self
    }

    /// Computes the diff, registers the ignore-table entries, PATCHes
    /// the controller, and (on success) applies the same partial
    /// locally so readers see the change without waiting for the echo.
    pub async fn save(self) -> Result<ChangedFields> {
        self.client.save_mutation(self.kind, &self.id, &self.dirty).await
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ClientConfig {
        ClientConfig::new("10.0.0.1", "admin", "password")
    }

    #[test]
    fn device_kind_path_segments_match_rest_endpoints() {
        assert_eq!(DeviceKind::Camera.path_segment(), "cameras");
        assert_eq!(DeviceKind::Doorlock.path_segment(), "doorlocks");
    }

    #[tokio::test]
    async fn close_before_connect_is_a_safe_no_op() {
        let client = ProtectClient::new(test_config()).unwrap();
        client.close().await;
        let snapshot = client.get_snapshot().await;
        assert!(snapshot.cameras.is_empty());
    }

    #[tokio::test]
    async fn save_with_no_staged_fields_skips_the_network_round_trip() {
        let client = ProtectClient::new(test_config()).unwrap();
        let id = "611111111111111111111111".to_string();
        let changed = client.camera(&id).save().await.unwrap();
        assert!(changed.is_empty());
    }
}
