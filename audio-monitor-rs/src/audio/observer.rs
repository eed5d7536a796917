//! Callback observers for the two OS notification streams.
//!
//! Each observer implements one OS callback set and forwards a single event
//! upstream to a bound [`MonitorListener`]. Observers are shared through
//! `Arc`: cloning is AddRef, dropping is Release, and the last drop frees.
//! The OS side may keep its own clone after registration, so an observer can
//! outlive the monitor that created it. The back-reference to the listener is
//! a `Weak`, so an orphaned observer simply stops forwarding.

use super::device::{AudioError, DataFlow, DeviceRole, DeviceState, PropertyKey, VolumeNotification};
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// Receiver of the events forwarded by the observers.
pub trait MonitorListener: Send + Sync {
    fn device_state_changed(&self);
    fn volume_state_changed(&self);
}

/// Interfaces an observer can be queried for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// IUnknown
    Unknown,
    /// IMMNotificationClient
    EndpointNotification,
    /// IAudioEndpointVolumeCallback
    EndpointVolumeCallback,
}

impl Capability {
    pub const IID_UNKNOWN: u128 = 0x00000000_0000_0000_c000_000000000046;
    pub const IID_ENDPOINT_NOTIFICATION: u128 = 0x7991eec9_7e89_4d85_8390_6c703cec60c0;
    pub const IID_ENDPOINT_VOLUME_CALLBACK: u128 = 0x657804fa_d6ad_4496_8a60_352752af4f89;

    pub fn iid(self) -> u128 {
        match self {
            Capability::Unknown => Self::IID_UNKNOWN,
            Capability::EndpointNotification => Self::IID_ENDPOINT_NOTIFICATION,
            Capability::EndpointVolumeCallback => Self::IID_ENDPOINT_VOLUME_CALLBACK,
        }
    }

    pub fn from_iid(iid: u128) -> Option<Self> {
        match iid {
            Self::IID_UNKNOWN => Some(Capability::Unknown),
            Self::IID_ENDPOINT_NOTIFICATION => Some(Capability::EndpointNotification),
            Self::IID_ENDPOINT_VOLUME_CALLBACK => Some(Capability::EndpointVolumeCallback),
            _ => None,
        }
    }
}

/// Device enumeration callbacks (IMMNotificationClient).
pub trait DeviceNotificationSink: Send + Sync {
    fn on_default_device_changed(&self, flow: DataFlow, role: DeviceRole, device_id: Option<&str>);
    fn on_device_added(&self, device_id: &str);
    fn on_device_removed(&self, device_id: &str);
    fn on_device_state_changed(&self, device_id: &str, new_state: DeviceState);
    fn on_property_value_changed(&self, device_id: &str, key: PropertyKey);
}

/// Endpoint volume callbacks (IAudioEndpointVolumeCallback).
pub trait VolumeNotificationSink: Send + Sync {
    fn on_notify(&self, data: &VolumeNotification);
}

/// Optional non-owning link to the listener.
#[derive(Default)]
struct ListenerSlot {
    listener: Mutex<Option<Weak<dyn MonitorListener>>>,
}

impl std::fmt::Debug for ListenerSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSlot").field("bound", &self.is_bound()).finish()
    }
}

impl ListenerSlot {
    fn set(&self, listener: Option<Weak<dyn MonitorListener>>) {
        *self.listener.lock().unwrap_or_else(PoisonError::into_inner) = listener;
    }

    fn get(&self) -> Option<Arc<dyn MonitorListener>> {
        self.listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(Weak::upgrade)
    }

    fn is_bound(&self) -> bool {
        self.get().is_some()
    }
}

/// Forwards device state changes; ignores every other enumeration event.
#[derive(Default, Debug)]
pub struct DeviceNotificationObserver {
    listener: ListenerSlot,
}

impl DeviceNotificationObserver {
    /// Create an observer with a single reference held by the caller.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Bind the listener that receives `device_state_changed`.
    pub fn set_listener(&self, listener: Weak<dyn MonitorListener>) {
        self.listener.set(Some(listener));
    }

    pub fn clear_listener(&self) {
        self.listener.set(None);
    }

    pub fn has_listener(&self) -> bool {
        self.listener.is_bound()
    }

    /// QueryInterface: on success the caller receives a new counted reference.
    pub fn query_interface(self: &Arc<Self>, iid: u128) -> Result<Arc<Self>, AudioError> {
        match Capability::from_iid(iid) {
            Some(Capability::Unknown | Capability::EndpointNotification) => Ok(Arc::clone(self)),
            _ => Err(AudioError::NoInterface { iid }),
        }
    }
}

impl DeviceNotificationSink for DeviceNotificationObserver {
    fn on_default_device_changed(&self, _flow: DataFlow, _role: DeviceRole, _device_id: Option<&str>) {}

    fn on_device_added(&self, _device_id: &str) {}

    fn on_device_removed(&self, _device_id: &str) {}

    fn on_device_state_changed(&self, device_id: &str, new_state: DeviceState) {
        tracing::trace!(device_id, ?new_state, "Device state changed");
        if let Some(listener) = self.listener.get() {
            listener.device_state_changed();
        }
    }

    fn on_property_value_changed(&self, _device_id: &str, _key: PropertyKey) {}
}

/// Forwards volume/mute changes of the tracked endpoint.
#[derive(Default, Debug)]
pub struct EndpointVolumeObserver {
    listener: ListenerSlot,
}

impl EndpointVolumeObserver {
    /// Create an observer with a single reference held by the caller.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Bind the listener that receives `volume_state_changed`.
    pub fn set_listener(&self, listener: Weak<dyn MonitorListener>) {
        self.listener.set(Some(listener));
    }

    pub fn clear_listener(&self) {
        self.listener.set(None);
    }

    pub fn has_listener(&self) -> bool {
        self.listener.is_bound()
    }

    /// QueryInterface: on success the caller receives a new counted reference.
    pub fn query_interface(self: &Arc<Self>, iid: u128) -> Result<Arc<Self>, AudioError> {
        match Capability::from_iid(iid) {
            Some(Capability::Unknown | Capability::EndpointVolumeCallback) => Ok(Arc::clone(self)),
            _ => Err(AudioError::NoInterface { iid }),
        }
    }
}

impl VolumeNotificationSink for EndpointVolumeObserver {
    fn on_notify(&self, data: &VolumeNotification) {
        tracing::trace!(
            muted = data.muted,
            master_volume = data.master_volume,
            channels = data.channel_count(),
            "Endpoint volume changed"
        );
        if let Some(listener) = self.listener.get() {
            listener.volume_state_changed();
        }
    }
}
