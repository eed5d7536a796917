//! End-to-end behaviour of `DeviceMonitor` against the simulated backend.

use audio_monitor_rs::audio::{MockCall, MockStage, PropertyKey, VolumeNotification};
use audio_monitor_rs::{DataFlow, DeviceMonitor, DeviceRole, DeviceState, MockBackend, MonitorConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Counters {
    device: Arc<AtomicUsize>,
    volume: Arc<AtomicUsize>,
}

impl Counters {
    fn attach(monitor: &DeviceMonitor) -> Self {
        let device = Arc::new(AtomicUsize::new(0));
        let volume = Arc::new(AtomicUsize::new(0));
        let d = device.clone();
        monitor.device_state_changed().connect(move || {
            d.fetch_add(1, Ordering::SeqCst);
        });
        let v = volume.clone();
        monitor.volume_state_changed().connect(move || {
            v.fetch_add(1, Ordering::SeqCst);
        });
        Self { device, volume }
    }

    fn get(&self) -> (usize, usize) {
        (
            self.device.load(Ordering::SeqCst),
            self.volume.load(Ordering::SeqCst),
        )
    }
}

fn volume_change(level: f32) -> VolumeNotification {
    VolumeNotification {
        event_context: 0x1234,
        muted: false,
        master_volume: level,
        channel_volumes: vec![level; 2],
    }
}

fn fire_ignored_events(backend: &MockBackend) {
    backend.notify_default_device_changed(DataFlow::Render, DeviceRole::Console, Some("hdmi"));
    backend.notify_default_device_changed(DataFlow::Render, DeviceRole::Multimedia, None);
    backend.notify_device_added("usb-headset");
    backend.notify_device_removed("usb-headset");
    backend.notify_property_value_changed("usb-headset", PropertyKey { fmtid: 0xa45c254e, pid: 14 });
}

#[test]
fn single_volume_callback_fires_exactly_once() {
    let backend = MockBackend::new();
    let monitor = DeviceMonitor::with_backend(&backend, MonitorConfig::default());
    let counters = Counters::attach(&monitor);

    backend.notify_volume(&volume_change(0.3));

    assert_eq!(counters.get(), (0, 1));
}

#[test]
fn every_callback_forwards_once_without_cross_talk() {
    let backend = MockBackend::new();
    let monitor = DeviceMonitor::with_backend(&backend, MonitorConfig::default());
    let counters = Counters::attach(&monitor);

    for i in 0..4 {
        backend.notify_device_state_changed("usb-headset", DeviceState::from_bits(1 << i));
    }
    assert_eq!(counters.get(), (4, 0));

    for i in 0..7 {
        backend.notify_volume(&volume_change(i as f32 / 10.0));
    }
    assert_eq!(counters.get(), (4, 7));
}

#[test]
fn ignored_events_produce_silence() {
    let backend = MockBackend::new();
    let monitor = DeviceMonitor::with_backend(&backend, MonitorConfig::default());
    let counters = Counters::attach(&monitor);

    fire_ignored_events(&backend);

    assert_eq!(counters.get(), (0, 0));
}

#[test]
fn every_subscriber_is_notified() {
    let backend = MockBackend::new();
    let monitor = DeviceMonitor::with_backend(&backend, MonitorConfig::default());
    let first = Counters::attach(&monitor);
    let second = Counters::attach(&monitor);

    backend.notify_device_state_changed("usb-headset", DeviceState::Active);

    assert_eq!(first.get(), (1, 0));
    assert_eq!(second.get(), (1, 0));
}

#[test]
fn acquisition_failure_leaves_monitor_inert() {
    for stage in [
        MockStage::Context,
        MockStage::Enumerator,
        MockStage::DefaultDevice,
        MockStage::EndpointVolume,
        MockStage::EndpointNotification,
        MockStage::ControlChangeNotify,
    ] {
        let backend = MockBackend::new().fail_at(stage);
        let monitor = DeviceMonitor::with_backend(&backend, MonitorConfig::default());
        let counters = Counters::attach(&monitor);

        assert!(!monitor.is_active(), "{stage:?}");
        assert_eq!(monitor.device_id(), None, "{stage:?}");
        assert_eq!(backend.live_handles(), 0, "{stage:?}");
        assert_eq!(backend.registered_endpoint_notifications(), 0, "{stage:?}");
        assert_eq!(backend.registered_volume_notifications(), 0, "{stage:?}");

        backend.notify_device_state_changed("usb-headset", DeviceState::Active);
        backend.notify_volume(&volume_change(0.5));
        fire_ignored_events(&backend);
        assert_eq!(counters.get(), (0, 0), "{stage:?}");
    }
}

#[test]
fn enumerator_failure_acquires_nothing_further() {
    let backend = MockBackend::new().fail_at(MockStage::Enumerator);
    let monitor = DeviceMonitor::with_backend(&backend, MonitorConfig::default());
    assert!(!monitor.is_active());
    assert_eq!(
        backend.calls(),
        vec![
            MockCall::InitializeContext,
            MockCall::CreateEnumerator,
            MockCall::ReleaseContext,
        ]
    );
}

#[test]
fn default_device_failure_releases_enumerator_then_context() {
    let backend = MockBackend::new().fail_at(MockStage::DefaultDevice);
    let _monitor = DeviceMonitor::with_backend(&backend, MonitorConfig::default());
    assert_eq!(
        backend.calls(),
        vec![
            MockCall::InitializeContext,
            MockCall::CreateEnumerator,
            MockCall::DefaultAudioEndpoint(DataFlow::Render, DeviceRole::Console),
            MockCall::ReleaseEnumerator,
            MockCall::ReleaseContext,
        ]
    );
}

#[test]
fn teardown_unregisters_then_releases_in_reverse_order() {
    let backend = MockBackend::new();
    let monitor = DeviceMonitor::with_backend(&backend, MonitorConfig::default());
    assert_eq!(backend.live_handles(), 4);
    let device_observers = backend.device_observers();
    let volume_observers = backend.volume_observers();

    drop(monitor);

    let calls = backend.calls();
    assert_eq!(
        &calls[calls.len() - 6..],
        &[
            MockCall::UnregisterControlChangeNotify,
            MockCall::UnregisterEndpointNotification,
            MockCall::ReleaseEndpointVolume,
            MockCall::ReleaseDevice,
            MockCall::ReleaseEnumerator,
            MockCall::ReleaseContext,
        ]
    );
    assert_eq!(backend.live_handles(), 0);
    assert!(device_observers.iter().all(|o| o.upgrade().is_none()));
    assert!(volume_observers.iter().all(|o| o.upgrade().is_none()));

    // Observers were already freed when the first handle was released
    for release in [
        MockCall::ReleaseEndpointVolume,
        MockCall::ReleaseDevice,
        MockCall::ReleaseEnumerator,
        MockCall::ReleaseContext,
    ] {
        assert_eq!(backend.observers_alive_at(release), Some(0), "{release:?}");
    }
}

#[test]
fn observers_outlive_monitor_while_os_holds_references() {
    let backend = MockBackend::new().retain_after_unregister();
    let monitor = DeviceMonitor::with_backend(&backend, MonitorConfig::default());
    let counters = Counters::attach(&monitor);
    let device_observers = backend.device_observers();
    let volume_observers = backend.volume_observers();

    drop(monitor);
    assert_eq!(backend.observers_alive_at(MockCall::ReleaseEndpointVolume), Some(2));

    // Still referenced by the OS, but no longer bound to anything
    assert!(device_observers.iter().all(|o| o.upgrade().is_some()));
    assert!(volume_observers.iter().all(|o| o.upgrade().is_some()));
    assert!(device_observers
        .iter()
        .all(|o| o.upgrade().map_or(false, |o| !o.has_listener())));

    // Late callbacks are dropped silently
    backend.notify_device_state_changed("usb-headset", DeviceState::Unplugged);
    backend.notify_volume(&volume_change(0.1));
    assert_eq!(counters.get(), (0, 0));

    backend.release_retained();
    assert!(device_observers.iter().all(|o| o.upgrade().is_none()));
    assert!(volume_observers.iter().all(|o| o.upgrade().is_none()));
}

#[test]
fn factory_hands_back_working_monitor() {
    let backend = MockBackend::new();
    let monitor = DeviceMonitor::create(backend.clone(), MonitorConfig::default());
    let counters = Counters::attach(&monitor);

    assert!(monitor.is_active());
    assert_ne!(backend.context_thread(), Some(std::thread::current().id()));

    backend.notify_device_state_changed("usb-headset", DeviceState::Active);
    backend.notify_volume(&volume_change(0.9));
    assert_eq!(counters.get(), (1, 1));

    drop(monitor);
    assert_eq!(backend.live_handles(), 0);
}

#[test]
fn dropping_monitor_waits_for_subscriber_on_another_thread() {
    use std::sync::atomic::AtomicBool;
    use std::sync::{mpsc, Mutex};
    use std::time::Duration;

    let backend = MockBackend::new();
    let monitor = DeviceMonitor::with_backend(&backend, MonitorConfig::default());
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let release_rx = Mutex::new(release_rx);
    let dropped = Arc::new(AtomicBool::new(false));
    let late = Arc::new(AtomicUsize::new(0));

    monitor.volume_state_changed().connect(move || {
        let _ = entered_tx.send(());
        let _ = release_rx.lock().unwrap().recv();
    });
    {
        let dropped = dropped.clone();
        let late = late.clone();
        monitor.volume_state_changed().connect(move || {
            if dropped.load(Ordering::SeqCst) {
                late.fetch_add(1, Ordering::SeqCst);
            }
        });
    }

    std::thread::scope(|s| {
        s.spawn(|| backend.notify_volume(&volume_change(0.4)));
        entered_rx.recv().unwrap();

        let dropper = {
            let dropped = dropped.clone();
            s.spawn(move || {
                drop(monitor);
                dropped.store(true, Ordering::SeqCst);
            })
        };
        std::thread::sleep(Duration::from_millis(50));
        assert!(!dropped.load(Ordering::SeqCst));

        release_tx.send(()).unwrap();
        dropper.join().unwrap();
    });

    assert!(dropped.load(Ordering::SeqCst));
    assert_eq!(late.load(Ordering::SeqCst), 0);
    assert_eq!(backend.live_handles(), 0);
}

#[test]
fn flow_all_never_touches_the_backend() {
    let backend = MockBackend::new();
    let config = MonitorConfig::new(DataFlow::All, DeviceRole::Console);
    let monitor = DeviceMonitor::create(backend.clone(), config);
    assert!(!monitor.is_active());
    assert!(backend.calls().is_empty());
}

#[test]
fn factory_failure_is_silent() {
    let backend = MockBackend::new().fail_at(MockStage::DefaultDevice);
    let monitor = DeviceMonitor::create(backend.clone(), MonitorConfig::default());
    assert!(!monitor.is_active());
    assert_eq!(backend.live_handles(), 0);
}

#[test]
fn notifications_cross_threads() {
    let backend = MockBackend::new();
    let monitor = DeviceMonitor::with_backend(&backend, MonitorConfig::default());
    let counters = Counters::attach(&monitor);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let backend = backend.clone();
            std::thread::spawn(move || {
                for _ in 0..25 {
                    backend.notify_volume(&volume_change(0.5));
                    backend.notify_device_state_changed("usb-headset", DeviceState::Active);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(counters.get(), (100, 100));
}
