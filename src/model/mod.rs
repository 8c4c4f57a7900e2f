//! The object graph: device variants, the NVR, events, and the bootstrap
//! that owns all of them.

pub mod bootstrap;
pub mod bridge;
pub mod camera;
pub mod chime;
pub mod common;
pub mod doorlock;
pub mod event;
pub mod keyring;
pub mod light;
pub mod liveview;
pub mod nvr;
pub mod sensor;
pub mod ulp_user;
pub mod viewer;

pub use bootstrap::Bootstrap;
pub use common::{ChangedFields, DeviceHeader, DeviceId, DeviceState, ModelKey};

use bridge::Bridge;
use camera::Camera;
use chime::Chime;
use doorlock::Doorlock;
use light::Light;
use nvr::Nvr;
use sensor::Sensor;
use viewer::Viewer;

/// A device/NVR record, erased to a single type so the diff engine can
/// dispatch add/update/remove by [`ModelKey`] without a match arm per
/// caller.
///
/// Liveviews, keyrings, and ULP users are *not* represented here: they
/// have no [`DeviceHeader`] and no volatile telemetry to clear on
/// disconnect, so the diff engine addresses their maps directly.
#[derive(Debug, Clone)]
pub enum Device {
    Camera(Camera),
    Light(Light),
    Sensor(Sensor),
    Viewer(Viewer),
    Chime(Chime),
    Doorlock(Doorlock),
    Bridge(Bridge),
    Nvr(Nvr),
}

impl Device {
    pub fn header(&self) -> &DeviceHeader {
        match self {
            Device::Camera(d) => &d.header,
            Device::Light(d) => &d.header,
            Device::Sensor(d) => &d.header,
            Device::Viewer(d) => &d.header,
            Device::Chime(d) => &d.header,
            Device::Doorlock(d) => &d.header,
            Device::Bridge(d) => &d.header,
            Device::Nvr(d) => &d.header,
        }
    }

    pub fn header_mut(&mut self) -> &mut DeviceHeader {
        match self {
            Device::Camera(d) => &mut d.header,
            Device::Light(d) => &mut d.header,
            Device::Sensor(d) => &mut d.header,
            Device::Viewer(d) => &mut d.header,
            Device::Chime(d) => &mut d.header,
            Device::Doorlock(d) => &mut d.header,
            Device::Bridge(d) => &mut d.header,
            Device::Nvr(d) => &mut d.header,
        }
    }

    pub fn model_key(&self) -> ModelKey {
        match self {
            Device::Camera(_) => ModelKey::Camera,
            Device::Light(_) => ModelKey::Light,
            Device::Sensor(_) => ModelKey::Sensor,
            Device::Viewer(_) => ModelKey::Viewer,
            Device::Chime(_) => ModelKey::Chime,
            Device::Doorlock(_) => ModelKey::Doorlock,
            Device::Bridge(_) => ModelKey::Bridge,
            Device::Nvr(_) => ModelKey::Nvr,
        }
    }

    /// Transitioning to `Disconnected` clears
    /// each variant's own volatile telemetry (motion flags, light-on,
    /// etc). Viewers, chimes, bridges, and the NVR carry no such
    /// telemetry and are no-ops here.
    pub fn clear_volatile_on_disconnect(&mut self) {
        match self {
            Device::Camera(d) => d.clear_volatile_on_disconnect(),
            Device::Light(d) => d.clear_volatile_on_disconnect(),
            Device::Sensor(d) => d.clear_volatile_on_disconnect(),
            Device::Viewer(_) | Device::Chime(_) | Device::Bridge(_) | Device::Nvr(_) => {}
            Device::Doorlock(_) => {}
        }
    }
}
