//! COM callback objects handed to the OS.
//!
//! `#[implement]` supplies IUnknown and the interface's reference count.
//! Each COM object owns an `Arc` clone of its portable observer, so the
//! observer lives for as long as the OS holds any reference to the COM object.

use super::device::{AudioError, DataFlow, DeviceRole, DeviceState, PropertyKey, VolumeNotification};
use super::observer::{
    DeviceNotificationObserver, DeviceNotificationSink, EndpointVolumeObserver,
    VolumeNotificationSink,
};
use std::sync::Arc;
use windows::core::{implement, Interface, PCWSTR};
use windows::Win32::Media::Audio::Endpoints::{
    IAudioEndpointVolume, IAudioEndpointVolumeCallback, IAudioEndpointVolumeCallback_Impl,
};
use windows::Win32::Media::Audio::{
    eCapture, eCommunications, eMultimedia, eRender, EDataFlow, ERole, IMMDeviceEnumerator,
    IMMNotificationClient, IMMNotificationClient_Impl, AUDIO_VOLUME_NOTIFICATION_DATA,
    DEVICE_STATE,
};
use windows::Win32::UI::Shell::PropertiesSystem::PROPERTYKEY;
// Re-export windows_core so the implement macro can find it
#[allow(unused_imports)]
use windows_core;

/// A registered callback interface, kept so it can be unregistered later.
pub struct NotificationRegistration<I: Interface> {
    interface: I,
}

// SAFETY: the wrapped objects are ours; their state is an `Arc` of a
// `Send + Sync` observer and `#[implement]` uses an atomic reference count.
unsafe impl<I: Interface> Send for NotificationRegistration<I> {}

impl<I: Interface> NotificationRegistration<I> {
    pub fn interface(&self) -> &I {
        &self.interface
    }
}

unsafe fn device_id_string(id: &PCWSTR) -> String {
    if id.is_null() {
        String::new()
    } else {
        id.to_string().unwrap_or_default()
    }
}

/// IMMNotificationClient forwarding to a [`DeviceNotificationObserver`].
#[implement(IMMNotificationClient)]
pub struct EndpointNotificationClient {
    observer: Arc<DeviceNotificationObserver>,
}

impl EndpointNotificationClient {
    pub fn new(observer: Arc<DeviceNotificationObserver>) -> Self {
        Self { observer }
    }

    /// Register this notification client with an enumerator.
    /// Takes ownership of self because the COM interface needs to own the data.
    pub fn register(
        self,
        enumerator: &IMMDeviceEnumerator,
    ) -> Result<NotificationRegistration<IMMNotificationClient>, AudioError> {
        unsafe {
            let client: IMMNotificationClient = self.into();
            enumerator
                .RegisterEndpointNotificationCallback(&client)
                .map_err(|e| AudioError::RegistrationFailed(e.into()))?;
            Ok(NotificationRegistration { interface: client })
        }
    }

    fn convert_flow(flow: EDataFlow) -> DataFlow {
        if flow == eRender {
            DataFlow::Render
        } else if flow == eCapture {
            DataFlow::Capture
        } else {
            DataFlow::All
        }
    }

    fn convert_role(role: ERole) -> DeviceRole {
        if role == eMultimedia {
            DeviceRole::Multimedia
        } else if role == eCommunications {
            DeviceRole::Communications
        } else {
            DeviceRole::Console
        }
    }
}

impl IMMNotificationClient_Impl for EndpointNotificationClient_Impl {
    fn OnDeviceStateChanged(
        &self,
        pwstrdeviceid: &PCWSTR,
        dwnewstate: DEVICE_STATE,
    ) -> windows::core::Result<()> {
        let id = unsafe { device_id_string(pwstrdeviceid) };
        self.observer
            .on_device_state_changed(&id, DeviceState::from_bits(dwnewstate.0));
        Ok(())
    }

    fn OnDeviceAdded(&self, pwstrdeviceid: &PCWSTR) -> windows::core::Result<()> {
        let id = unsafe { device_id_string(pwstrdeviceid) };
        self.observer.on_device_added(&id);
        Ok(())
    }

    fn OnDeviceRemoved(&self, pwstrdeviceid: &PCWSTR) -> windows::core::Result<()> {
        let id = unsafe { device_id_string(pwstrdeviceid) };
        self.observer.on_device_removed(&id);
        Ok(())
    }

    fn OnDefaultDeviceChanged(
        &self,
        flow: EDataFlow,
        role: ERole,
        pwstrdefaultdeviceid: &PCWSTR,
    ) -> windows::core::Result<()> {
        // Null when the last device for the flow/role went away
        let device_id = if pwstrdefaultdeviceid.is_null() {
            None
        } else {
            unsafe { pwstrdefaultdeviceid.to_string().ok() }
        };

        self.observer.on_default_device_changed(
            EndpointNotificationClient::convert_flow(flow),
            EndpointNotificationClient::convert_role(role),
            device_id.as_deref(),
        );
        Ok(())
    }

    fn OnPropertyValueChanged(
        &self,
        pwstrdeviceid: &PCWSTR,
        key: &PROPERTYKEY,
    ) -> windows::core::Result<()> {
        let id = unsafe { device_id_string(pwstrdeviceid) };
        self.observer.on_property_value_changed(
            &id,
            PropertyKey {
                fmtid: key.fmtid.to_u128(),
                pid: key.pid,
            },
        );
        Ok(())
    }
}

/// IAudioEndpointVolumeCallback forwarding to an [`EndpointVolumeObserver`].
#[implement(IAudioEndpointVolumeCallback)]
pub struct VolumeNotificationClient {
    observer: Arc<EndpointVolumeObserver>,
}

impl VolumeNotificationClient {
    pub fn new(observer: Arc<EndpointVolumeObserver>) -> Self {
        Self { observer }
    }

    pub fn register(
        self,
        endpoint_volume: &IAudioEndpointVolume,
    ) -> Result<NotificationRegistration<IAudioEndpointVolumeCallback>, AudioError> {
        unsafe {
            let callback: IAudioEndpointVolumeCallback = self.into();
            endpoint_volume
                .RegisterControlChangeNotify(&callback)
                .map_err(|e| AudioError::RegistrationFailed(e.into()))?;
            Ok(NotificationRegistration {
                interface: callback,
            })
        }
    }

    /// Copy the OS payload, including the trailing per-channel array.
    unsafe fn convert_notification(data: &AUDIO_VOLUME_NOTIFICATION_DATA) -> VolumeNotification {
        let channels = data.nChannels as usize;
        let channel_volumes = if channels == 0 {
            Vec::new()
        } else {
            std::slice::from_raw_parts(data.afChannelVolumes.as_ptr(), channels).to_vec()
        };

        VolumeNotification {
            event_context: data.guidEventContext.to_u128(),
            muted: data.bMuted.as_bool(),
            master_volume: data.fMasterVolume,
            channel_volumes,
        }
    }
}

impl IAudioEndpointVolumeCallback_Impl for VolumeNotificationClient_Impl {
    fn OnNotify(&self, pnotify: *mut AUDIO_VOLUME_NOTIFICATION_DATA) -> windows::core::Result<()> {
        let data = unsafe {
            pnotify
                .as_ref()
                .map(|d| VolumeNotificationClient::convert_notification(d))
                .unwrap_or_default()
        };
        self.observer.on_notify(&data);
        Ok(())
    }
}
