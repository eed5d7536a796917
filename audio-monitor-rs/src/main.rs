//! Audio device monitor - logs default endpoint device and volume changes.
//!
//! Configuration comes from the environment:
//! `AUDIO_MONITOR_FLOW`, `AUDIO_MONITOR_ROLE`, and `RUST_LOG` for log filtering.

use anyhow::Result;
use audio_monitor_rs::DeviceMonitor;
use std::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Notifications marshalled from the OS callback thread onto the main loop.
#[cfg_attr(not(windows), allow(dead_code))]
#[derive(Debug, Clone, Copy)]
enum LoopEvent {
    DeviceStateChanged,
    VolumeStateChanged,
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_thread_names(true)
        .init();
}

/// Subscribe to both notifications and dispatch them until the process exits.
#[cfg_attr(not(windows), allow(dead_code))]
fn run(monitor: DeviceMonitor) -> Result<()> {
    if !monitor.is_active() {
        tracing::warn!("No audio endpoint is being monitored; no events will be reported");
    }

    let (sender, receiver) = mpsc::channel();
    let device_sender = sender.clone();
    monitor.device_state_changed().connect(move || {
        let _ = device_sender.send(LoopEvent::DeviceStateChanged);
    });
    monitor.volume_state_changed().connect(move || {
        let _ = sender.send(LoopEvent::VolumeStateChanged);
    });

    info!(device_id = ?monitor.device_id(), "Watching for audio device changes");

    // The monitor owns both senders, so the channel never closes while it lives
    for event in receiver {
        match event {
            LoopEvent::DeviceStateChanged => info!("Device status changed!"),
            LoopEvent::VolumeStateChanged => info!("Volume changed!"),
        }
    }

    Ok(())
}

#[cfg(windows)]
fn main() -> Result<()> {
    use anyhow::Context;
    use audio_monitor_rs::MonitorConfig;

    init_logging();

    let config = MonitorConfig::from_env().context("Invalid monitor configuration")?;
    let monitor = DeviceMonitor::create_wasapi(config);
    run(monitor)
}

#[cfg(not(windows))]
fn main() -> Result<()> {
    init_logging();
    Err(audio_monitor_rs::AudioError::Unsupported.into())
}
