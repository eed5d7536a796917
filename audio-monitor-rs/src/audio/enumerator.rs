//! WASAPI backend: COM context, device enumerator and default endpoint.
//!
//! The monitor may be built on one thread and dropped on another, so the
//! context keeps the process MTA alive with a usage cookie instead of
//! initializing an apartment on the constructing thread. Every handle below
//! is created inside the MTA and is therefore free-threaded.

use super::backend::{AudioBackend, AudioDevice, DeviceEnumerator};
use super::device::{AudioError, DataFlow, DeviceRole};
use super::notifications::{EndpointNotificationClient, NotificationRegistration};
use super::observer::DeviceNotificationObserver;
use super::volume::WasapiEndpointVolume;
use std::sync::Arc;
use windows::Win32::Media::Audio::{
    eAll, eCapture, eCommunications, eConsole, eMultimedia, eRender, EDataFlow, ERole, IMMDevice,
    IMMDeviceEnumerator, IMMNotificationClient, MMDeviceEnumerator,
};
use windows::Win32::System::Com::{
    CoCreateInstance, CoDecrementMTAUsage, CoIncrementMTAUsage, CoTaskMemFree, CLSCTX_ALL,
    CO_MTA_USAGE_COOKIE,
};

/// COM usage guard that releases the MTA on drop.
pub struct ComGuard {
    cookie: CO_MTA_USAGE_COOKIE,
}

// SAFETY: the MTA usage cookie may be released from any thread.
unsafe impl Send for ComGuard {}

impl ComGuard {
    /// Keep the process MTA alive until the guard is dropped.
    pub fn new() -> Result<Self, AudioError> {
        let cookie = unsafe { CoIncrementMTAUsage() }.map_err(|e| AudioError::ComInitFailed(e.into()))?;
        Ok(Self { cookie })
    }
}

impl Drop for ComGuard {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = CoDecrementMTAUsage(self.cookie) {
                tracing::warn!("CoDecrementMTAUsage failed: {}", e);
            }
        }
    }
}

/// The Core Audio (MMDevice API) backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct WasapiBackend;

impl AudioBackend for WasapiBackend {
    type Context = ComGuard;
    type Enumerator = WasapiEnumerator;

    fn initialize_context(&self) -> Result<ComGuard, AudioError> {
        ComGuard::new()
    }

    fn create_enumerator(&self) -> Result<WasapiEnumerator, AudioError> {
        WasapiEnumerator::new()
    }
}

/// Device enumerator using Windows MMDevice API.
pub struct WasapiEnumerator {
    enumerator: IMMDeviceEnumerator,
}

// SAFETY: created in the MTA; the MMDevice enumerator is free-threaded there.
unsafe impl Send for WasapiEnumerator {}

impl WasapiEnumerator {
    /// Note: a COM context must be held before calling this function.
    pub fn new() -> Result<Self, AudioError> {
        unsafe {
            let enumerator: IMMDeviceEnumerator =
                CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
                    .map_err(|e| AudioError::EnumeratorUnavailable(e.into()))?;

            Ok(Self { enumerator })
        }
    }

    fn to_edataflow(flow: DataFlow) -> EDataFlow {
        match flow {
            DataFlow::Render => eRender,
            DataFlow::Capture => eCapture,
            DataFlow::All => eAll,
        }
    }

    fn to_erole(role: DeviceRole) -> ERole {
        match role {
            DeviceRole::Console => eConsole,
            DeviceRole::Multimedia => eMultimedia,
            DeviceRole::Communications => eCommunications,
        }
    }
}

impl DeviceEnumerator for WasapiEnumerator {
    type Device = WasapiDevice;
    type Registration = NotificationRegistration<IMMNotificationClient>;

    fn default_audio_endpoint(&self, flow: DataFlow, role: DeviceRole) -> Result<WasapiDevice, AudioError> {
        unsafe {
            let device = self
                .enumerator
                .GetDefaultAudioEndpoint(Self::to_edataflow(flow), Self::to_erole(role))
                .map_err(|e| AudioError::NoDefaultDevice(e.into()))?;

            Ok(WasapiDevice { device })
        }
    }

    fn register_endpoint_notification(
        &self,
        observer: &Arc<DeviceNotificationObserver>,
    ) -> Result<Self::Registration, AudioError> {
        EndpointNotificationClient::new(observer.clone()).register(&self.enumerator)
    }

    fn unregister_endpoint_notification(&self, registration: Self::Registration) -> Result<(), AudioError> {
        unsafe {
            self.enumerator
                .UnregisterEndpointNotificationCallback(registration.interface())
                .map_err(|e| AudioError::RegistrationFailed(e.into()))
        }
    }
}

/// The default endpoint resolved at construction.
pub struct WasapiDevice {
    device: IMMDevice,
}

// SAFETY: created in the MTA; IMMDevice is free-threaded there.
unsafe impl Send for WasapiDevice {}

impl AudioDevice for WasapiDevice {
    type EndpointVolume = WasapiEndpointVolume;

    fn id(&self) -> Option<String> {
        unsafe {
            let id = self.device.GetId().ok()?;
            let id_string = id.to_string().ok();
            CoTaskMemFree(Some(id.0 as *const _));
            id_string
        }
    }

    fn activate_endpoint_volume(&self) -> Result<WasapiEndpointVolume, AudioError> {
        WasapiEndpointVolume::new(&self.device)
    }
}
