//! Windows Audio Device Monitor - Library
//!
//! Watches the default audio endpoint and republishes OS notifications to
//! application code.
//!
//! ## Features
//!
//! - `device_state_changed` when a device is added, removed, enabled or disabled
//! - `volume_state_changed` when the tracked endpoint's volume or mute changes
//! - Construction on a worker thread with [`DeviceMonitor::create`]
//! - Inert-on-failure construction, or [`DeviceMonitor::try_with_backend`] to see why
//! - `MockBackend` (behind the `mock` feature) to drive the monitor without
//!   an audio subsystem

pub mod audio;

pub use audio::{
    AudioBackend, AudioError, DataFlow, DeviceMonitor, DeviceRole, DeviceState, MonitorConfig,
    Notification, SubscriptionId,
};

#[cfg(any(test, feature = "mock"))]
pub use audio::MockBackend;

#[cfg(windows)]
pub use audio::WasapiBackend;
