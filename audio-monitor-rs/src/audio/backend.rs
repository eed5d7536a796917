//! Seam between the monitor and the OS audio subsystem.
//!
//! Every handle type releases its OS resource on drop, so a monitor can
//! acquire them in sequence with `?` and let an early return unwind exactly
//! what was acquired so far.

use super::device::{AudioError, DataFlow, DeviceRole};
use super::observer::{DeviceNotificationObserver, EndpointVolumeObserver};
use std::sync::Arc;

/// Entry point into an audio subsystem.
pub trait AudioBackend {
    /// Threading context (COM apartment) kept alive for the monitor's lifetime.
    type Context: Send + 'static;
    type Enumerator: DeviceEnumerator + 'static;

    fn initialize_context(&self) -> Result<Self::Context, AudioError>;

    fn create_enumerator(&self) -> Result<Self::Enumerator, AudioError>;
}

/// IMMDeviceEnumerator.
pub trait DeviceEnumerator: Send {
    type Device: AudioDevice + 'static;
    /// Proof of a live endpoint-notification registration.
    type Registration: Send + 'static;

    fn default_audio_endpoint(
        &self,
        flow: DataFlow,
        role: DeviceRole,
    ) -> Result<Self::Device, AudioError>;

    fn register_endpoint_notification(
        &self,
        observer: &Arc<DeviceNotificationObserver>,
    ) -> Result<Self::Registration, AudioError>;

    fn unregister_endpoint_notification(
        &self,
        registration: Self::Registration,
    ) -> Result<(), AudioError>;
}

/// IMMDevice.
pub trait AudioDevice: Send {
    type EndpointVolume: EndpointVolume + 'static;

    /// Opaque device id, if the OS reports one.
    fn id(&self) -> Option<String>;

    fn activate_endpoint_volume(&self) -> Result<Self::EndpointVolume, AudioError>;
}

/// IAudioEndpointVolume.
pub trait EndpointVolume: Send {
    type Registration: Send + 'static;

    fn register_control_change_notify(
        &self,
        observer: &Arc<EndpointVolumeObserver>,
    ) -> Result<Self::Registration, AudioError>;

    fn unregister_control_change_notify(
        &self,
        registration: Self::Registration,
    ) -> Result<(), AudioError>;
}

pub type DeviceOf<B> = <<B as AudioBackend>::Enumerator as DeviceEnumerator>::Device;
pub type EndpointOf<B> = <DeviceOf<B> as AudioDevice>::EndpointVolume;
