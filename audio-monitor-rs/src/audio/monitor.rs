//! The device monitor: owns the OS handles and republishes observer events.

use super::backend::{AudioBackend, AudioDevice, DeviceEnumerator, DeviceOf, EndpointOf, EndpointVolume};
use super::config::MonitorConfig;
use super::device::AudioError;
use super::observer::{DeviceNotificationObserver, EndpointVolumeObserver, MonitorListener};
use super::signal::Notification;
use std::sync::{Arc, Weak};
use std::thread;
use tracing::{debug, info, warn};

/// The two notifications a monitor publishes.
#[derive(Debug)]
pub struct MonitorSignals {
    device_state_changed: Notification,
    volume_state_changed: Notification,
}

impl MonitorSignals {
    fn new() -> Self {
        Self {
            device_state_changed: Notification::new("device_state_changed"),
            volume_state_changed: Notification::new("volume_state_changed"),
        }
    }
}

impl MonitorListener for MonitorSignals {
    fn device_state_changed(&self) {
        self.device_state_changed.emit();
    }

    fn volume_state_changed(&self) {
        self.volume_state_changed.emit();
    }
}

/// Type-erased set of acquired handles.
trait Session: Send {
    fn device_id(&self) -> Option<&str>;
}

/// Handles and registrations of an active monitor.
///
/// Field order is drop order: observers, then endpoint, device, enumerator,
/// and finally the threading context.
struct ActiveSession<B: AudioBackend> {
    device_observer: Arc<DeviceNotificationObserver>,
    volume_observer: Arc<EndpointVolumeObserver>,
    device_registration: Option<<B::Enumerator as DeviceEnumerator>::Registration>,
    volume_registration: Option<<EndpointOf<B> as EndpointVolume>::Registration>,
    endpoint: EndpointOf<B>,
    device: DeviceOf<B>,
    enumerator: B::Enumerator,
    device_id: Option<String>,
    _context: B::Context,
}

impl<B: AudioBackend> ActiveSession<B> {
    fn acquire(
        backend: &B,
        config: MonitorConfig,
        listener: Weak<dyn MonitorListener>,
    ) -> Result<Self, AudioError> {
        let context = backend.initialize_context()?;
        let enumerator = backend.create_enumerator()?;
        debug!("Device enumerator created");

        let device = enumerator.default_audio_endpoint(config.flow, config.role)?;
        let device_id = device.id();
        debug!(?device_id, flow = config.flow.as_str(), role = config.role.as_str(), "Default endpoint resolved");

        let endpoint = device.activate_endpoint_volume()?;
        debug!("Endpoint volume activated");

        let device_observer = DeviceNotificationObserver::new();
        device_observer.set_listener(listener.clone());
        let device_registration = enumerator.register_endpoint_notification(&device_observer)?;

        let volume_observer = EndpointVolumeObserver::new();
        volume_observer.set_listener(listener);
        let volume_registration = match endpoint.register_control_change_notify(&volume_observer) {
            Ok(registration) => registration,
            Err(e) => {
                device_observer.clear_listener();
                if let Err(err) = enumerator.unregister_endpoint_notification(device_registration) {
                    warn!("Failed to unregister endpoint notification: {}", err);
                }
                return Err(e);
            }
        };
        debug!("Notification callbacks registered");

        Ok(Self {
            device_observer,
            volume_observer,
            device_registration: Some(device_registration),
            volume_registration: Some(volume_registration),
            endpoint,
            device,
            enumerator,
            device_id,
            _context: context,
        })
    }
}

impl<B: AudioBackend> Session for ActiveSession<B> {
    fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }
}

impl<B: AudioBackend> Drop for ActiveSession<B> {
    fn drop(&mut self) {
        if let Some(registration) = self.volume_registration.take() {
            if let Err(e) = self.endpoint.unregister_control_change_notify(registration) {
                warn!("Failed to unregister volume notification: {}", e);
            }
        }
        if let Some(registration) = self.device_registration.take() {
            if let Err(e) = self.enumerator.unregister_endpoint_notification(registration) {
                warn!("Failed to unregister endpoint notification: {}", e);
            }
        }

        // The OS may still hold references to the observers
        self.device_observer.clear_listener();
        self.volume_observer.clear_listener();
        debug!(device_id = ?self.device.id(), "Releasing audio handles");
    }
}

/// Watches the default audio endpoint and publishes two notifications:
/// [`device_state_changed`](Self::device_state_changed) and
/// [`volume_state_changed`](Self::volume_state_changed).
///
/// Construction through [`with_backend`](Self::with_backend) or
/// [`create`](Self::create) never fails: if any handle cannot be acquired the
/// monitor is inert and simply never fires. Use
/// [`try_with_backend`](Self::try_with_backend) to see the failure, or
/// [`is_active`](Self::is_active) after the fact.
///
/// Subscribers run on the OS callback thread.
pub struct DeviceMonitor {
    session: Option<Box<dyn Session>>,
    signals: Arc<MonitorSignals>,
    config: MonitorConfig,
}

impl DeviceMonitor {
    /// Build a monitor on the calling thread, swallowing acquisition failures.
    pub fn with_backend<B>(backend: &B, config: MonitorConfig) -> Self
    where
        B: AudioBackend + 'static,
    {
        Self::try_with_backend(backend, config).unwrap_or_else(|e| {
            warn!("Audio device monitor is inactive: {}", e);
            Self::inert(config)
        })
    }

    /// Build a monitor on the calling thread.
    pub fn try_with_backend<B>(backend: &B, config: MonitorConfig) -> Result<Self, AudioError>
    where
        B: AudioBackend + 'static,
    {
        config.validate()?;
        let signals = Arc::new(MonitorSignals::new());
        let listener: Weak<dyn MonitorListener> = Arc::downgrade(&signals) as Weak<dyn MonitorListener>;
        let session = ActiveSession::acquire(backend, config, listener)?;
        info!(device_id = ?session.device_id(), "Audio device monitor started");

        Ok(Self {
            session: Some(Box::new(session)),
            signals,
            config,
        })
    }

    /// Build a monitor on a dedicated worker thread and block until it is ready.
    ///
    /// Failures, including a panicking backend, yield an inert monitor.
    pub fn create<B>(backend: B, config: MonitorConfig) -> Self
    where
        B: AudioBackend + Send + 'static,
    {
        Self::try_create(backend, config).unwrap_or_else(|e| {
            warn!("Audio device monitor is inactive: {}", e);
            Self::inert(config)
        })
    }

    /// Like [`create`](Self::create) but reports why construction failed.
    pub fn try_create<B>(backend: B, config: MonitorConfig) -> Result<Self, AudioError>
    where
        B: AudioBackend + Send + 'static,
    {
        let worker = thread::Builder::new()
            .name("audio-monitor-init".to_string())
            .spawn(move || Self::try_with_backend(&backend, config))
            .map_err(|e| AudioError::WorkerFailed(e.to_string()))?;

        worker
            .join()
            .map_err(|_| AudioError::WorkerFailed("construction panicked".to_string()))?
    }

    /// A monitor that holds no handles and never fires.
    pub fn inert(config: MonitorConfig) -> Self {
        Self {
            session: None,
            signals: Arc::new(MonitorSignals::new()),
            config,
        }
    }

    /// Fired when the OS reports a device state change.
    pub fn device_state_changed(&self) -> &Notification {
        &self.signals.device_state_changed
    }

    /// Fired when the tracked endpoint's volume or mute state changes.
    pub fn volume_state_changed(&self) -> &Notification {
        &self.signals.volume_state_changed
    }

    /// False if construction failed and no notification will ever fire.
    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Id of the endpoint resolved at construction.
    pub fn device_id(&self) -> Option<&str> {
        self.session.as_ref().and_then(|s| s.device_id())
    }

    pub fn config(&self) -> MonitorConfig {
        self.config
    }
}

#[cfg(windows)]
impl DeviceMonitor {
    /// Monitor the console playback device through WASAPI.
    pub fn new() -> Self {
        Self::with_backend(&super::enumerator::WasapiBackend, MonitorConfig::default())
    }

    /// [`create`](Self::create) with WASAPI and the default configuration.
    pub fn spawn_default() -> Self {
        Self::create(super::enumerator::WasapiBackend, MonitorConfig::default())
    }

    /// [`create`](Self::create) with WASAPI and the given configuration.
    pub fn create_wasapi(config: MonitorConfig) -> Self {
        Self::create(super::enumerator::WasapiBackend, config)
    }
}

#[cfg(windows)]
impl Default for DeviceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DeviceMonitor {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            info!(device_id = ?session.device_id(), "Stopping audio device monitor");
            drop(session);
        }

        // A callback already in flight may still hold the signals
        self.signals.device_state_changed.disconnect_all();
        self.signals.volume_state_changed.disconnect_all();
    }
}

impl std::fmt::Debug for DeviceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceMonitor")
            .field("active", &self.is_active())
            .field("device_id", &self.device_id())
            .field("config", &self.config)
            .finish()
    }
}
