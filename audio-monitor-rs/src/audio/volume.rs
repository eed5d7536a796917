//! Endpoint volume using IAudioEndpointVolume.
//!
//! The monitor only needs the interface to subscribe to volume/mute changes.

use super::backend::EndpointVolume;
use super::device::AudioError;
use super::notifications::{NotificationRegistration, VolumeNotificationClient};
use super::observer::EndpointVolumeObserver;
use std::sync::Arc;
use windows::Win32::Media::Audio::Endpoints::{IAudioEndpointVolume, IAudioEndpointVolumeCallback};
use windows::Win32::Media::Audio::IMMDevice;
use windows::Win32::System::Com::CLSCTX_ALL;

/// Volume control interface of the tracked device.
pub struct WasapiEndpointVolume {
    endpoint_volume: IAudioEndpointVolume,
}

// SAFETY: activated in the MTA; IAudioEndpointVolume is free-threaded there.
unsafe impl Send for WasapiEndpointVolume {}

impl WasapiEndpointVolume {
    /// Activate the volume interface on the given device.
    pub fn new(device: &IMMDevice) -> Result<Self, AudioError> {
        unsafe {
            let endpoint_volume: IAudioEndpointVolume = device
                .Activate(CLSCTX_ALL, None)
                .map_err(|e| AudioError::VolumeNotAvailable(e.into()))?;

            Ok(Self { endpoint_volume })
        }
    }
}

impl EndpointVolume for WasapiEndpointVolume {
    type Registration = NotificationRegistration<IAudioEndpointVolumeCallback>;

    fn register_control_change_notify(
        &self,
        observer: &Arc<EndpointVolumeObserver>,
    ) -> Result<Self::Registration, AudioError> {
        VolumeNotificationClient::new(observer.clone()).register(&self.endpoint_volume)
    }

    fn unregister_control_change_notify(&self, registration: Self::Registration) -> Result<(), AudioError> {
        unsafe {
            self.endpoint_volume
                .UnregisterControlChangeNotify(registration.interface())
                .map_err(|e| AudioError::RegistrationFailed(e.into()))
        }
    }
}
