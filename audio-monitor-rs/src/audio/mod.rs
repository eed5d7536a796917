//! Audio module: observes the default audio endpoint.
//!
//! This module provides the backend seam over the OS audio subsystem, the
//! two callback observers, and the [`DeviceMonitor`] that wires them to
//! application-facing notifications.

pub mod backend;
pub mod config;
pub mod device;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod monitor;
pub mod observer;
pub mod signal;

#[cfg(windows)]
pub mod enumerator;
#[cfg(windows)]
pub mod notifications;
#[cfg(windows)]
pub mod volume;

pub use backend::{AudioBackend, AudioDevice, DeviceEnumerator, EndpointVolume};
pub use config::MonitorConfig;
pub use device::{AudioError, DataFlow, DeviceRole, DeviceState, OsError, PropertyKey, VolumeNotification};
#[cfg(any(test, feature = "mock"))]
pub use mock::{MockBackend, MockCall, MockStage};
pub use monitor::DeviceMonitor;
pub use observer::{
    Capability, DeviceNotificationObserver, DeviceNotificationSink, EndpointVolumeObserver,
    MonitorListener, VolumeNotificationSink,
};
pub use signal::{Notification, SubscriptionId};

#[cfg(windows)]
pub use enumerator::{ComGuard, WasapiBackend};
