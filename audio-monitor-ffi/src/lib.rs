//! FFI bindings for the Windows Audio Device Monitor.
//!
//! This crate provides C ABI functions so native hosts (C, C#, ...) can
//! subscribe callbacks to the monitor's two notifications.
//! All functions use panic::catch_unwind to prevent Rust panics from
//! unwinding across the FFI boundary.

use audio_monitor_rs::{
    AudioBackend, AudioError, DataFlow, DeviceMonitor, DeviceRole, MonitorConfig, Notification,
    SubscriptionId,
};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::ffi::{c_char, c_void, CStr, CString};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

// ============================================================================
// Error Handling
// ============================================================================

/// Error codes returned by FFI functions.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Success = 0,
    InvalidHandle = -1,
    InvalidArgument = -2,
    DeviceNotFound = -3,
    ComError = -4,
    JsonError = -5,
    VolumeNotAvailable = -6,
    Unsupported = -7,
    Panic = -99,
}

impl From<&AudioError> for ErrorCode {
    fn from(err: &AudioError) -> Self {
        match err {
            AudioError::NoDefaultDevice(_) => ErrorCode::DeviceNotFound,
            AudioError::ComInitFailed(_) => ErrorCode::ComError,
            AudioError::EnumeratorUnavailable(_) => ErrorCode::ComError,
            AudioError::RegistrationFailed(_) => ErrorCode::ComError,
            AudioError::VolumeNotAvailable(_) => ErrorCode::VolumeNotAvailable,
            AudioError::InvalidConfig(_) => ErrorCode::InvalidArgument,
            AudioError::Unsupported => ErrorCode::Unsupported,
            AudioError::WorkerFailed(_) => ErrorCode::Panic,
            _ => ErrorCode::ComError,
        }
    }
}

/// Thread-local storage for the last error.
thread_local! {
    static LAST_ERROR: RefCell<Option<(ErrorCode, String)>> = const { RefCell::new(None) };
}

fn set_last_error(code: ErrorCode, message: impl Into<String>) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = Some((code, message.into()));
    });
}

fn set_last_audio_error(err: &AudioError) -> ErrorCode {
    let code = ErrorCode::from(err);
    set_last_error(code, err.to_string());
    code
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

// ============================================================================
// Data Types for JSON Serialization
// ============================================================================

/// Configuration for monitor creation. Every field is optional.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub log_level: Option<String>,
    #[serde(default)]
    pub flow: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

#[cfg_attr(not(windows), allow(dead_code))]
impl EngineConfig {
    fn monitor_config(&self) -> Result<MonitorConfig, AudioError> {
        let mut config = MonitorConfig::default();
        if let Some(flow) = &self.flow {
            config.flow = flow.parse::<DataFlow>()?;
        }
        if let Some(role) = &self.role {
            config.role = role.parse::<DeviceRole>()?;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Snapshot of a monitor.
#[derive(Debug, Serialize, Deserialize)]
pub struct MonitorStatus {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    pub flow: String,
    pub role: String,
    pub device_subscribers: usize,
    pub volume_subscribers: usize,
}

impl From<&DeviceMonitor> for MonitorStatus {
    fn from(monitor: &DeviceMonitor) -> Self {
        let config = monitor.config();
        Self {
            active: monitor.is_active(),
            device_id: monitor.device_id().map(str::to_string),
            flow: config.flow.as_str().to_string(),
            role: config.role.as_str().to_string(),
            device_subscribers: monitor.device_state_changed().subscriber_count(),
            volume_subscribers: monitor.volume_state_changed().subscriber_count(),
        }
    }
}

// ============================================================================
// Engine Handle Type
// ============================================================================

/// Opaque handle to a monitor. Actually points to a MonitorEngine struct.
pub type AudioMonitorHandle = *mut c_void;

/// Native callback invoked with the user data pointer passed at subscription.
pub type NotificationCallback = extern "C" fn(user_data: *mut c_void);

/// Which notification a subscription targets.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    DeviceStateChanged = 0,
    VolumeStateChanged = 1,
}

impl NotificationKind {
    fn from_raw(kind: u32) -> Option<Self> {
        match kind {
            0 => Some(NotificationKind::DeviceStateChanged),
            1 => Some(NotificationKind::VolumeStateChanged),
            _ => None,
        }
    }
}

/// Internal engine state.
struct MonitorEngine {
    monitor: DeviceMonitor,
}

impl MonitorEngine {
    fn notification(&self, kind: NotificationKind) -> &Notification {
        match kind {
            NotificationKind::DeviceStateChanged => self.monitor.device_state_changed(),
            NotificationKind::VolumeStateChanged => self.monitor.volume_state_changed(),
        }
    }
}

/// A native callback plus its user data.
struct NativeSubscriber {
    callback: NotificationCallback,
    user_data: *mut c_void,
}

// SAFETY: callers of audio_monitor_subscribe guarantee the callback and its
// user data may be used from the OS notification thread.
unsafe impl Send for NativeSubscriber {}
unsafe impl Sync for NativeSubscriber {}

impl NativeSubscriber {
    fn invoke(&self) {
        (self.callback)(self.user_data);
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Allocate a C string from a Rust string. Caller must free with audio_monitor_free_string.
fn alloc_c_string(s: &str) -> *mut c_char {
    // Interior nul bytes cannot cross the boundary; drop them
    let sanitized: String = s.chars().filter(|c| *c != '\0').collect();
    CString::new(sanitized).map_or(ptr::null_mut(), CString::into_raw)
}

/// Parse a C string to a Rust string slice.
unsafe fn parse_c_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok()
}

/// Borrow the engine behind a handle.
unsafe fn engine<'a>(handle: AudioMonitorHandle) -> Option<&'a MonitorEngine> {
    (handle as *const MonitorEngine).as_ref()
}

#[cfg_attr(not(windows), allow(dead_code))]
fn init_logging(level: &str) {
    // A host may create several monitors; only the first installs a subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(level))
        .try_init();
}

/// Build a monitor on a worker thread and box it behind a handle.
///
/// An inert monitor still yields a handle; the failure is recorded as the
/// last error and `audio_monitor_is_active` reports 0.
#[cfg_attr(not(windows), allow(dead_code))]
fn create_engine<B>(backend: B, config_json: *const c_char) -> AudioMonitorHandle
where
    B: AudioBackend + Send + 'static,
{
    clear_last_error();

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let engine_config = if config_json.is_null() {
            EngineConfig::default()
        } else {
            let json_str = match unsafe { parse_c_str(config_json) } {
                Some(s) => s,
                None => {
                    set_last_error(ErrorCode::InvalidArgument, "Config is not valid UTF-8");
                    return ptr::null_mut();
                }
            };
            match serde_json::from_str::<EngineConfig>(json_str) {
                Ok(config) => config,
                Err(e) => {
                    set_last_error(ErrorCode::JsonError, e.to_string());
                    return ptr::null_mut();
                }
            }
        };

        if let Some(level) = &engine_config.log_level {
            init_logging(level);
        }

        let config = match engine_config.monitor_config() {
            Ok(config) => config,
            Err(e) => {
                set_last_audio_error(&e);
                return ptr::null_mut();
            }
        };

        let monitor = DeviceMonitor::try_create(backend, config).unwrap_or_else(|e| {
            tracing::warn!("Audio device monitor is inactive: {}", e);
            set_last_audio_error(&e);
            DeviceMonitor::inert(config)
        });

        let engine = Box::new(MonitorEngine { monitor });
        Box::into_raw(engine) as AudioMonitorHandle
    }));

    match result {
        Ok(handle) => handle,
        Err(_) => {
            set_last_error(ErrorCode::Panic, "Panic during monitor creation");
            ptr::null_mut()
        }
    }
}

// ============================================================================
// FFI Functions - Lifecycle
// ============================================================================

/// Create a monitor for the default audio endpoint.
///
/// # Arguments
/// * `config_json` - JSON configuration string (can be null for defaults),
///   e.g. `{"flow": "render", "role": "console", "log_level": "debug"}`
///
/// # Returns
/// Handle to the monitor, or null on failure. Check audio_monitor_last_error_code() on failure.
///
/// # Safety
/// The returned handle must be freed with audio_monitor_destroy().
#[no_mangle]
pub extern "C" fn audio_monitor_create(config_json: *const c_char) -> AudioMonitorHandle {
    #[cfg(windows)]
    {
        create_engine(audio_monitor_rs::WasapiBackend, config_json)
    }

    #[cfg(not(windows))]
    {
        let _ = config_json;
        clear_last_error();
        set_last_audio_error(&AudioError::Unsupported);
        ptr::null_mut()
    }
}

/// Destroy a monitor. Subscribed callbacks are never invoked after this returns.
///
/// Blocks while a callback is running on another thread. Destroying the
/// monitor from inside one of its own callbacks does not wait for that
/// callback.
///
/// # Safety
/// The handle must have been created by audio_monitor_create() and must not be used after this call.
#[no_mangle]
pub extern "C" fn audio_monitor_destroy(handle: AudioMonitorHandle) {
    if handle.is_null() {
        return;
    }

    let _ = panic::catch_unwind(|| unsafe {
        let _ = Box::from_raw(handle as *mut MonitorEngine);
    });
}

/// Whether the monitor acquired its device and will deliver notifications.
///
/// # Returns
/// 1 if active, 0 if inert, negative error code on failure.
#[no_mangle]
pub extern "C" fn audio_monitor_is_active(handle: AudioMonitorHandle) -> i32 {
    clear_last_error();

    match unsafe { engine(handle) } {
        Some(engine) => engine.monitor.is_active() as i32,
        None => {
            set_last_error(ErrorCode::InvalidHandle, "Invalid monitor handle");
            ErrorCode::InvalidHandle as i32
        }
    }
}

// ============================================================================
// FFI Functions - Subscriptions
// ============================================================================

/// Subscribe a callback to one of the monitor's notifications.
///
/// # Arguments
/// * `handle` - Monitor handle
/// * `kind` - 0 = device state changed, 1 = volume state changed
/// * `callback` - Invoked once per notification, on an OS thread
/// * `user_data` - Passed back to `callback` unchanged
///
/// # Returns
/// A positive subscription id, or a negative error code on failure.
///
/// # Safety
/// `callback` and `user_data` must remain valid, and be safe to use from any
/// thread, until unsubscribed or the monitor is destroyed.
#[no_mangle]
pub extern "C" fn audio_monitor_subscribe(
    handle: AudioMonitorHandle,
    kind: u32,
    callback: Option<NotificationCallback>,
    user_data: *mut c_void,
) -> i64 {
    clear_last_error();

    let result = panic::catch_unwind(|| {
        let engine = match unsafe { engine(handle) } {
            Some(engine) => engine,
            None => {
                set_last_error(ErrorCode::InvalidHandle, "Invalid monitor handle");
                return ErrorCode::InvalidHandle as i64;
            }
        };

        let (kind, callback) = match (NotificationKind::from_raw(kind), callback) {
            (Some(kind), Some(callback)) => (kind, callback),
            (None, _) => {
                set_last_error(ErrorCode::InvalidArgument, "Invalid notification kind");
                return ErrorCode::InvalidArgument as i64;
            }
            (_, None) => {
                set_last_error(ErrorCode::InvalidArgument, "Callback is null");
                return ErrorCode::InvalidArgument as i64;
            }
        };

        let subscriber = NativeSubscriber {
            callback,
            user_data,
        };
        let id = engine
            .notification(kind)
            .connect(move || subscriber.invoke());
        id.as_u64() as i64
    });

    match result {
        Ok(id) => id,
        Err(_) => {
            set_last_error(ErrorCode::Panic, "Panic during subscribe");
            ErrorCode::Panic as i64
        }
    }
}

/// Remove a subscription. The callback is never invoked after this returns.
///
/// Blocks while the callback is running on another thread.
///
/// # Returns
/// 0 on success, negative error code on failure.
#[no_mangle]
pub extern "C" fn audio_monitor_unsubscribe(
    handle: AudioMonitorHandle,
    kind: u32,
    subscription_id: i64,
) -> i32 {
    clear_last_error();

    let result = panic::catch_unwind(|| {
        let engine = match unsafe { engine(handle) } {
            Some(engine) => engine,
            None => {
                set_last_error(ErrorCode::InvalidHandle, "Invalid monitor handle");
                return ErrorCode::InvalidHandle as i32;
            }
        };

        let kind = match NotificationKind::from_raw(kind) {
            Some(kind) => kind,
            None => {
                set_last_error(ErrorCode::InvalidArgument, "Invalid notification kind");
                return ErrorCode::InvalidArgument as i32;
            }
        };

        if subscription_id <= 0
            || !engine
                .notification(kind)
                .disconnect(SubscriptionId::from_u64(subscription_id as u64))
        {
            set_last_error(ErrorCode::InvalidArgument, "Unknown subscription id");
            return ErrorCode::InvalidArgument as i32;
        }

        ErrorCode::Success as i32
    });

    match result {
        Ok(code) => code,
        Err(_) => {
            set_last_error(ErrorCode::Panic, "Panic during unsubscribe");
            ErrorCode::Panic as i32
        }
    }
}

/// Get the monitor status.
///
/// # Returns
/// JSON string with the status. Caller must free with audio_monitor_free_string().
/// Returns null on failure.
#[no_mangle]
pub extern "C" fn audio_monitor_status(handle: AudioMonitorHandle) -> *mut c_char {
    clear_last_error();

    let result = panic::catch_unwind(|| {
        let engine = match unsafe { engine(handle) } {
            Some(engine) => engine,
            None => {
                set_last_error(ErrorCode::InvalidHandle, "Invalid monitor handle");
                return ptr::null_mut();
            }
        };

        match serde_json::to_string(&MonitorStatus::from(&engine.monitor)) {
            Ok(json) => alloc_c_string(&json),
            Err(e) => {
                set_last_error(ErrorCode::JsonError, e.to_string());
                ptr::null_mut()
            }
        }
    });

    match result {
        Ok(json) => json,
        Err(_) => {
            set_last_error(ErrorCode::Panic, "Panic during status");
            ptr::null_mut()
        }
    }
}

// ============================================================================
// FFI Functions - Memory Management
// ============================================================================

/// Free a string allocated by this library.
///
/// # Safety
/// The pointer must have been returned by one of the audio_monitor_* functions.
/// Do not call this on strings from other sources.
#[no_mangle]
pub extern "C" fn audio_monitor_free_string(ptr: *mut c_char) {
    if ptr.is_null() {
        return;
    }

    let _ = panic::catch_unwind(|| unsafe {
        let _ = CString::from_raw(ptr);
    });
}

// ============================================================================
// FFI Functions - Error Handling
// ============================================================================

/// Get the last error code.
///
/// # Returns
/// The error code from the last failed operation, or 0 if no error.
#[no_mangle]
pub extern "C" fn audio_monitor_last_error_code() -> i32 {
    LAST_ERROR.with(|e| {
        e.borrow()
            .as_ref()
            .map(|(code, _)| *code as i32)
            .unwrap_or(0)
    })
}

/// Get the last error message.
///
/// # Returns
/// Error message string. Caller must free with audio_monitor_free_string().
/// Returns null if no error.
#[no_mangle]
pub extern "C" fn audio_monitor_last_error_message() -> *mut c_char {
    LAST_ERROR.with(|e| {
        e.borrow()
            .as_ref()
            .map(|(_, msg)| alloc_c_string(msg))
            .unwrap_or(ptr::null_mut())
    })
}

// ============================================================================
// FFI Functions - Utility
// ============================================================================

/// Get the library version.
///
/// # Returns
/// Version string. Caller must free with audio_monitor_free_string().
#[no_mangle]
pub extern "C" fn audio_monitor_version() -> *mut c_char {
    alloc_c_string(env!("CARGO_PKG_VERSION"))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use audio_monitor_rs::audio::{MockStage, VolumeNotification};
    use audio_monitor_rs::{DeviceState, MockBackend};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::mpsc::{self, Receiver, Sender};
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    /// Shared by callbacks that hold up an OS callback thread.
    struct Gate {
        entered: Mutex<Sender<()>>,
        release: Mutex<Receiver<()>>,
        detached: AtomicBool,
        late_calls: AtomicUsize,
    }

    impl Gate {
        fn note_call(&self) {
            if self.detached.load(Ordering::SeqCst) {
                self.late_calls.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    extern "C" fn hold(user_data: *mut c_void) {
        let gate = unsafe { &*(user_data as *const Gate) };
        gate.note_call();
        let _ = gate.entered.lock().unwrap().send(());
        let _ = gate.release.lock().unwrap().recv();
    }

    extern "C" fn note(user_data: *mut c_void) {
        let gate = unsafe { &*(user_data as *const Gate) };
        gate.note_call();
    }

    extern "C" fn count(user_data: *mut c_void) {
        let counter = unsafe { &*(user_data as *const AtomicUsize) };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    fn take_string(ptr: *mut c_char) -> String {
        assert!(!ptr.is_null());
        let s = unsafe { CStr::from_ptr(ptr) }.to_str().unwrap().to_string();
        audio_monitor_free_string(ptr);
        s
    }

    #[test]
    fn test_error_code_conversion() {
        assert_eq!(
            ErrorCode::from(&AudioError::InvalidConfig("flow".to_string())),
            ErrorCode::InvalidArgument
        );
        assert_eq!(ErrorCode::from(&AudioError::Unsupported), ErrorCode::Unsupported);
    }

    #[test]
    fn test_engine_lifecycle() {
        let handle = create_engine(MockBackend::new(), ptr::null());
        assert!(!handle.is_null());
        assert_eq!(audio_monitor_is_active(handle), 1);
        assert_eq!(audio_monitor_last_error_code(), 0);
        audio_monitor_destroy(handle);
    }

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let backend = MockBackend::new();
        let handle = create_engine(backend.clone(), ptr::null());
        let volumes = AtomicUsize::new(0);
        let devices = AtomicUsize::new(0);

        let volume_id = audio_monitor_subscribe(
            handle,
            NotificationKind::VolumeStateChanged as u32,
            Some(count),
            &volumes as *const AtomicUsize as *mut c_void,
        );
        let device_id = audio_monitor_subscribe(
            handle,
            NotificationKind::DeviceStateChanged as u32,
            Some(count),
            &devices as *const AtomicUsize as *mut c_void,
        );
        assert!(volume_id > 0);
        assert!(device_id > 0);

        backend.notify_volume(&VolumeNotification::default());
        backend.notify_device_state_changed("usb-headset", DeviceState::Unplugged);
        assert_eq!(volumes.load(Ordering::SeqCst), 1);
        assert_eq!(devices.load(Ordering::SeqCst), 1);

        assert_eq!(
            audio_monitor_unsubscribe(handle, NotificationKind::VolumeStateChanged as u32, volume_id),
            0
        );
        assert_eq!(
            audio_monitor_unsubscribe(handle, NotificationKind::VolumeStateChanged as u32, volume_id),
            ErrorCode::InvalidArgument as i32
        );
        backend.notify_volume(&VolumeNotification::default());
        assert_eq!(volumes.load(Ordering::SeqCst), 1);

        audio_monitor_destroy(handle);
        backend.notify_device_state_changed("usb-headset", DeviceState::Active);
        assert_eq!(devices.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_destroy_waits_for_callback_in_flight() {
        let backend = MockBackend::new();
        let handle = create_engine(backend.clone(), ptr::null());
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let gate = Gate {
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
            detached: AtomicBool::new(false),
            late_calls: AtomicUsize::new(0),
        };
        let user_data = &gate as *const Gate as *mut c_void;
        let kind = NotificationKind::VolumeStateChanged as u32;
        assert!(audio_monitor_subscribe(handle, kind, Some(hold), user_data) > 0);
        assert!(audio_monitor_subscribe(handle, kind, Some(note), user_data) > 0);

        // Raw pointers are not Send
        let handle_addr = handle as usize;
        let gate = &gate;
        thread::scope(|s| {
            s.spawn(|| backend.notify_volume(&VolumeNotification::default()));
            entered_rx.recv().unwrap();

            let destroyer = s.spawn(move || {
                audio_monitor_destroy(handle_addr as AudioMonitorHandle);
                gate.detached.store(true, Ordering::SeqCst);
            });
            thread::sleep(Duration::from_millis(50));
            assert!(!gate.detached.load(Ordering::SeqCst));

            release_tx.send(()).unwrap();
            destroyer.join().unwrap();
        });

        assert!(gate.detached.load(Ordering::SeqCst));
        assert_eq!(gate.late_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unsubscribe_waits_for_callback_in_flight() {
        let backend = MockBackend::new();
        let handle = create_engine(backend.clone(), ptr::null());
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let gate = Gate {
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
            detached: AtomicBool::new(false),
            late_calls: AtomicUsize::new(0),
        };
        let user_data = &gate as *const Gate as *mut c_void;
        let kind = NotificationKind::DeviceStateChanged as u32;
        let id = audio_monitor_subscribe(handle, kind, Some(hold), user_data);
        assert!(id > 0);

        let handle_addr = handle as usize;
        let gate = &gate;
        thread::scope(|s| {
            s.spawn(|| backend.notify_device_state_changed("usb-headset", DeviceState::Active));
            entered_rx.recv().unwrap();

            let unsubscriber = s.spawn(move || {
                let code = audio_monitor_unsubscribe(handle_addr as AudioMonitorHandle, kind, id);
                gate.detached.store(true, Ordering::SeqCst);
                code
            });
            thread::sleep(Duration::from_millis(50));
            assert!(!gate.detached.load(Ordering::SeqCst));

            release_tx.send(()).unwrap();
            assert_eq!(unsubscriber.join().unwrap(), 0);
        });
        drop(release_tx);

        backend.notify_device_state_changed("usb-headset", DeviceState::Disabled);
        assert_eq!(gate.late_calls.load(Ordering::SeqCst), 0);
        audio_monitor_destroy(handle);
    }

    #[test]
    fn test_subscribe_rejects_bad_arguments() {
        let handle = create_engine(MockBackend::new(), ptr::null());
        assert_eq!(
            audio_monitor_subscribe(handle, 7, Some(count), ptr::null_mut()),
            ErrorCode::InvalidArgument as i64
        );
        assert_eq!(
            audio_monitor_subscribe(handle, 0, None, ptr::null_mut()),
            ErrorCode::InvalidArgument as i64
        );
        assert_eq!(
            audio_monitor_subscribe(ptr::null_mut(), 0, Some(count), ptr::null_mut()),
            ErrorCode::InvalidHandle as i64
        );
        assert_eq!(audio_monitor_last_error_code(), ErrorCode::InvalidHandle as i32);
        audio_monitor_destroy(handle);
    }

    #[test]
    fn test_status_json() {
        let backend = MockBackend::new();
        let config = std::ffi::CString::new(r#"{"flow": "capture", "role": "communications"}"#).unwrap();
        let handle = create_engine(backend, config.as_ptr());
        audio_monitor_subscribe(handle, 1, Some(count), ptr::null_mut());

        let status: MonitorStatus =
            serde_json::from_str(&take_string(audio_monitor_status(handle))).unwrap();
        assert!(status.active);
        assert_eq!(status.device_id.as_deref(), Some(MockBackend::DEFAULT_DEVICE_ID));
        assert_eq!(status.flow, "capture");
        assert_eq!(status.role, "communications");
        assert_eq!(status.device_subscribers, 0);
        assert_eq!(status.volume_subscribers, 1);
        audio_monitor_destroy(handle);
    }

    #[test]
    fn test_inert_monitor_still_returns_handle() {
        let backend = MockBackend::new().fail_at(MockStage::Enumerator);
        let handle = create_engine(backend, ptr::null());
        assert!(!handle.is_null());
        assert_eq!(audio_monitor_last_error_code(), ErrorCode::ComError as i32);
        let message = take_string(audio_monitor_last_error_message());
        assert!(message.starts_with("Failed to create device enumerator"));

        assert_eq!(audio_monitor_is_active(handle), 0);
        audio_monitor_destroy(handle);
    }

    #[test]
    fn test_invalid_config() {
        let bad_json = std::ffi::CString::new("{flow:").unwrap();
        assert!(create_engine(MockBackend::new(), bad_json.as_ptr()).is_null());
        assert_eq!(audio_monitor_last_error_code(), ErrorCode::JsonError as i32);

        let bad_role = std::ffi::CString::new(r#"{"role": "games"}"#).unwrap();
        assert!(create_engine(MockBackend::new(), bad_role.as_ptr()).is_null());
        assert_eq!(audio_monitor_last_error_code(), ErrorCode::InvalidArgument as i32);

        let all_flow = std::ffi::CString::new(r#"{"flow": "all"}"#).unwrap();
        assert!(create_engine(MockBackend::new(), all_flow.as_ptr()).is_null());
        assert_eq!(audio_monitor_last_error_code(), ErrorCode::InvalidArgument as i32);
    }

    #[test]
    fn test_null_handles() {
        assert_eq!(audio_monitor_is_active(ptr::null_mut()), ErrorCode::InvalidHandle as i32);
        assert!(audio_monitor_status(ptr::null_mut()).is_null());
        audio_monitor_destroy(ptr::null_mut());
        audio_monitor_free_string(ptr::null_mut());
    }

    #[test]
    fn test_version() {
        let version = take_string(audio_monitor_version());
        assert!(!version.is_empty());
    }
}
