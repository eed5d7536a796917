//! In-process stand-in for the OS audio subsystem.
//!
//! `MockBackend` hands out handles that journal their acquisition and
//! release, can be told to fail (or panic) at any acquisition stage, and lets
//! callers fire every callback the OS would deliver. Clones share state, so a
//! test can keep one clone while the monitor owns another.

use super::backend::{AudioBackend, AudioDevice, DeviceEnumerator, EndpointVolume};
use super::device::{
    AudioError, DataFlow, DeviceRole, DeviceState, OsError, PropertyKey, VolumeNotification,
};
use super::observer::{
    DeviceNotificationObserver, DeviceNotificationSink, EndpointVolumeObserver,
    VolumeNotificationSink,
};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, ThreadId};

const E_FAIL: i32 = 0x80004005u32 as i32;
const E_NOTFOUND: i32 = 0x80070490u32 as i32;

/// Acquisition stage at which a failure can be injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockStage {
    Context,
    Enumerator,
    DefaultDevice,
    EndpointVolume,
    EndpointNotification,
    ControlChangeNotify,
}

/// Every call the monitor makes into the backend, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockCall {
    InitializeContext,
    CreateEnumerator,
    DefaultAudioEndpoint(DataFlow, DeviceRole),
    ActivateEndpointVolume,
    RegisterEndpointNotification,
    RegisterControlChangeNotify,
    UnregisterControlChangeNotify,
    UnregisterEndpointNotification,
    ReleaseEndpointVolume,
    ReleaseDevice,
    ReleaseEnumerator,
    ReleaseContext,
}

#[derive(Debug, Clone, Copy)]
enum Failure {
    Error(MockStage),
    Panic(MockStage),
}

struct MockState {
    device_id: String,
    failure: Mutex<Option<Failure>>,
    retain_after_unregister: AtomicBool,
    calls: Mutex<Vec<MockCall>>,
    endpoint_clients: Mutex<Vec<(u64, Arc<DeviceNotificationObserver>)>>,
    volume_clients: Mutex<Vec<(u64, Arc<EndpointVolumeObserver>)>>,
    retained_endpoint_clients: Mutex<Vec<Arc<DeviceNotificationObserver>>>,
    retained_volume_clients: Mutex<Vec<Arc<EndpointVolumeObserver>>>,
    handed_device_observers: Mutex<Vec<Weak<DeviceNotificationObserver>>>,
    handed_volume_observers: Mutex<Vec<Weak<EndpointVolumeObserver>>>,
    /// Live observer count at each handle release.
    observers_at_release: Mutex<Vec<(MockCall, usize)>>,
    next_registration: AtomicU64,
    live_handles: AtomicUsize,
    context_thread: Mutex<Option<ThreadId>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockState {
    fn record(&self, call: MockCall) {
        lock(&self.calls).push(call);
    }

    /// Returns the injected error for `stage`, or panics if asked to.
    fn check(&self, stage: MockStage) -> Result<(), OsError> {
        let failure = *lock(&self.failure);
        match failure {
            Some(Failure::Error(s)) if s == stage => {
                let code = if stage == MockStage::DefaultDevice { E_NOTFOUND } else { E_FAIL };
                Err(OsError::new(code, format!("injected failure at {stage:?}")))
            }
            Some(Failure::Panic(s)) if s == stage => panic!("injected panic at {stage:?}"),
            _ => Ok(()),
        }
    }

    fn acquire_handle(&self) {
        self.live_handles.fetch_add(1, Ordering::SeqCst);
    }

    fn live_observers(&self) -> usize {
        let devices = lock(&self.handed_device_observers)
            .iter()
            .filter(|o| o.strong_count() > 0)
            .count();
        let volumes = lock(&self.handed_volume_observers)
            .iter()
            .filter(|o| o.strong_count() > 0)
            .count();
        devices + volumes
    }

    fn release_handle(&self, call: MockCall) {
        let live = self.live_observers();
        lock(&self.observers_at_release).push((call, live));
        self.record(call);
        self.live_handles.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A scripted audio subsystem.
#[derive(Clone)]
pub struct MockBackend {
    state: Arc<MockState>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub const DEFAULT_DEVICE_ID: &'static str = "{0.0.0.00000000}.{mock-speakers}";

    pub fn new() -> Self {
        Self::with_device_id(Self::DEFAULT_DEVICE_ID)
    }

    pub fn with_device_id(device_id: impl Into<String>) -> Self {
        Self {
            state: Arc::new(MockState {
                device_id: device_id.into(),
                failure: Mutex::new(None),
                retain_after_unregister: AtomicBool::new(false),
                calls: Mutex::new(Vec::new()),
                endpoint_clients: Mutex::new(Vec::new()),
                volume_clients: Mutex::new(Vec::new()),
                retained_endpoint_clients: Mutex::new(Vec::new()),
                retained_volume_clients: Mutex::new(Vec::new()),
                handed_device_observers: Mutex::new(Vec::new()),
                handed_volume_observers: Mutex::new(Vec::new()),
                observers_at_release: Mutex::new(Vec::new()),
                next_registration: AtomicU64::new(1),
                live_handles: AtomicUsize::new(0),
                context_thread: Mutex::new(None),
            }),
        }
    }

    /// Make the given stage return an OS error.
    pub fn fail_at(self, stage: MockStage) -> Self {
        *lock(&self.state.failure) = Some(Failure::Error(stage));
        self
    }

    /// Make the given stage panic.
    pub fn panic_at(self, stage: MockStage) -> Self {
        *lock(&self.state.failure) = Some(Failure::Panic(stage));
        self
    }

    /// Keep observer references after they are unregistered, like an OS that
    /// releases its callbacks late. Callbacks keep reaching retained observers
    /// until [`release_retained`](Self::release_retained).
    pub fn retain_after_unregister(self) -> Self {
        self.state.retain_after_unregister.store(true, Ordering::SeqCst);
        self
    }

    /// Drop every reference kept by [`retain_after_unregister`](Self::retain_after_unregister).
    pub fn release_retained(&self) {
        lock(&self.state.retained_endpoint_clients).clear();
        lock(&self.state.retained_volume_clients).clear();
    }

    pub fn calls(&self) -> Vec<MockCall> {
        lock(&self.state.calls).clone()
    }

    /// Number of context/enumerator/device/endpoint handles not yet released.
    pub fn live_handles(&self) -> usize {
        self.state.live_handles.load(Ordering::SeqCst)
    }

    pub fn registered_endpoint_notifications(&self) -> usize {
        lock(&self.state.endpoint_clients).len()
    }

    pub fn registered_volume_notifications(&self) -> usize {
        lock(&self.state.volume_clients).len()
    }

    /// Weak references to every device observer the backend has been handed.
    pub fn device_observers(&self) -> Vec<Weak<DeviceNotificationObserver>> {
        lock(&self.state.handed_device_observers).clone()
    }

    /// Weak references to every volume observer the backend has been handed.
    pub fn volume_observers(&self) -> Vec<Weak<EndpointVolumeObserver>> {
        lock(&self.state.handed_volume_observers).clone()
    }

    /// How many handed-over observers were still alive when `release`
    /// was journaled most recently.
    pub fn observers_alive_at(&self, release: MockCall) -> Option<usize> {
        lock(&self.state.observers_at_release)
            .iter()
            .rev()
            .find(|(call, _)| *call == release)
            .map(|(_, live)| *live)
    }

    /// Thread that initialized the most recent context.
    pub fn context_thread(&self) -> Option<ThreadId> {
        *lock(&self.state.context_thread)
    }

    fn endpoint_targets(&self) -> Vec<Arc<DeviceNotificationObserver>> {
        let mut targets: Vec<_> = lock(&self.state.endpoint_clients)
            .iter()
            .map(|(_, o)| o.clone())
            .collect();
        targets.extend(lock(&self.state.retained_endpoint_clients).iter().cloned());
        targets
    }

    fn volume_targets(&self) -> Vec<Arc<EndpointVolumeObserver>> {
        let mut targets: Vec<_> = lock(&self.state.volume_clients)
            .iter()
            .map(|(_, o)| o.clone())
            .collect();
        targets.extend(lock(&self.state.retained_volume_clients).iter().cloned());
        targets
    }

    pub fn notify_default_device_changed(&self, flow: DataFlow, role: DeviceRole, device_id: Option<&str>) {
        for client in self.endpoint_targets() {
            client.on_default_device_changed(flow, role, device_id);
        }
    }

    pub fn notify_device_added(&self, device_id: &str) {
        for client in self.endpoint_targets() {
            client.on_device_added(device_id);
        }
    }

    pub fn notify_device_removed(&self, device_id: &str) {
        for client in self.endpoint_targets() {
            client.on_device_removed(device_id);
        }
    }

    pub fn notify_device_state_changed(&self, device_id: &str, new_state: DeviceState) {
        for client in self.endpoint_targets() {
            client.on_device_state_changed(device_id, new_state);
        }
    }

    pub fn notify_property_value_changed(&self, device_id: &str, key: PropertyKey) {
        for client in self.endpoint_targets() {
            client.on_property_value_changed(device_id, key);
        }
    }

    pub fn notify_volume(&self, data: &VolumeNotification) {
        for client in self.volume_targets() {
            client.on_notify(data);
        }
    }
}

impl AudioBackend for MockBackend {
    type Context = MockContext;
    type Enumerator = MockEnumerator;

    fn initialize_context(&self) -> Result<MockContext, AudioError> {
        self.state.record(MockCall::InitializeContext);
        self.state.check(MockStage::Context).map_err(AudioError::ComInitFailed)?;
        *lock(&self.state.context_thread) = Some(thread::current().id());
        self.state.acquire_handle();
        Ok(MockContext {
            state: self.state.clone(),
        })
    }

    fn create_enumerator(&self) -> Result<MockEnumerator, AudioError> {
        self.state.record(MockCall::CreateEnumerator);
        self.state
            .check(MockStage::Enumerator)
            .map_err(AudioError::EnumeratorUnavailable)?;
        self.state.acquire_handle();
        Ok(MockEnumerator {
            state: self.state.clone(),
        })
    }
}

/// Threading context handed out by [`MockBackend`].
pub struct MockContext {
    state: Arc<MockState>,
}

impl Drop for MockContext {
    fn drop(&mut self) {
        self.state.release_handle(MockCall::ReleaseContext);
    }
}

/// Enumerator handed out by [`MockBackend`].
pub struct MockEnumerator {
    state: Arc<MockState>,
}

/// Registration token: the id the observer was registered under.
#[derive(Debug)]
pub struct MockRegistration(u64);

impl DeviceEnumerator for MockEnumerator {
    type Device = MockDevice;
    type Registration = MockRegistration;

    fn default_audio_endpoint(&self, flow: DataFlow, role: DeviceRole) -> Result<MockDevice, AudioError> {
        self.state.record(MockCall::DefaultAudioEndpoint(flow, role));
        self.state
            .check(MockStage::DefaultDevice)
            .map_err(AudioError::NoDefaultDevice)?;
        self.state.acquire_handle();
        Ok(MockDevice {
            state: self.state.clone(),
        })
    }

    fn register_endpoint_notification(
        &self,
        observer: &Arc<DeviceNotificationObserver>,
    ) -> Result<MockRegistration, AudioError> {
        self.state.record(MockCall::RegisterEndpointNotification);
        self.state
            .check(MockStage::EndpointNotification)
            .map_err(AudioError::RegistrationFailed)?;
        let id = self.state.next_registration.fetch_add(1, Ordering::SeqCst);
        lock(&self.state.endpoint_clients).push((id, observer.clone()));
        lock(&self.state.handed_device_observers).push(Arc::downgrade(observer));
        Ok(MockRegistration(id))
    }

    fn unregister_endpoint_notification(&self, registration: MockRegistration) -> Result<(), AudioError> {
        self.state.record(MockCall::UnregisterEndpointNotification);
        let mut clients = lock(&self.state.endpoint_clients);
        if let Some(pos) = clients.iter().position(|(id, _)| *id == registration.0) {
            let (_, observer) = clients.remove(pos);
            if self.state.retain_after_unregister.load(Ordering::SeqCst) {
                lock(&self.state.retained_endpoint_clients).push(observer);
            }
        }
        Ok(())
    }
}

impl Drop for MockEnumerator {
    fn drop(&mut self) {
        self.state.release_handle(MockCall::ReleaseEnumerator);
    }
}

/// Device handed out by [`MockEnumerator`].
pub struct MockDevice {
    state: Arc<MockState>,
}

impl AudioDevice for MockDevice {
    type EndpointVolume = MockEndpointVolume;

    fn id(&self) -> Option<String> {
        Some(self.state.device_id.clone())
    }

    fn activate_endpoint_volume(&self) -> Result<MockEndpointVolume, AudioError> {
        self.state.record(MockCall::ActivateEndpointVolume);
        self.state
            .check(MockStage::EndpointVolume)
            .map_err(AudioError::VolumeNotAvailable)?;
        self.state.acquire_handle();
        Ok(MockEndpointVolume {
            state: self.state.clone(),
        })
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.state.release_handle(MockCall::ReleaseDevice);
    }
}

/// Endpoint volume handed out by [`MockDevice`].
pub struct MockEndpointVolume {
    state: Arc<MockState>,
}

impl EndpointVolume for MockEndpointVolume {
    type Registration = MockRegistration;

    fn register_control_change_notify(
        &self,
        observer: &Arc<EndpointVolumeObserver>,
    ) -> Result<MockRegistration, AudioError> {
        self.state.record(MockCall::RegisterControlChangeNotify);
        self.state
            .check(MockStage::ControlChangeNotify)
            .map_err(AudioError::RegistrationFailed)?;
        let id = self.state.next_registration.fetch_add(1, Ordering::SeqCst);
        lock(&self.state.volume_clients).push((id, observer.clone()));
        lock(&self.state.handed_volume_observers).push(Arc::downgrade(observer));
        Ok(MockRegistration(id))
    }

    fn unregister_control_change_notify(&self, registration: MockRegistration) -> Result<(), AudioError> {
        self.state.record(MockCall::UnregisterControlChangeNotify);
        let mut clients = lock(&self.state.volume_clients);
        if let Some(pos) = clients.iter().position(|(id, _)| *id == registration.0) {
            let (_, observer) = clients.remove(pos);
            if self.state.retain_after_unregister.load(Ordering::SeqCst) {
                lock(&self.state.retained_volume_clients).push(observer);
            }
        }
        Ok(())
    }
}

impl Drop for MockEndpointVolume {
    fn drop(&mut self) {
        self.state.release_handle(MockCall::ReleaseEndpointVolume);
    }
}
