//! Audio device data models.
//!
//! Defines the values the OS hands to the notification callbacks and the
//! error type shared by every stage of monitor construction.

use thiserror::Error;

/// Direction of an audio endpoint (maps to Windows EDataFlow enum).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum DataFlow {
    /// Playback devices (speakers, headphones)
    #[default]
    Render = 0,

    /// Recording devices (microphones)
    Capture = 1,

    /// Either direction; only meaningful in callbacks
    All = 2,
}

impl DataFlow {
    /// Lower-case name used in configuration and status output.
    pub fn as_str(self) -> &'static str {
        match self {
            DataFlow::Render => "render",
            DataFlow::Capture => "capture",
            DataFlow::All => "all",
        }
    }
}

impl std::str::FromStr for DataFlow {
    type Err = AudioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "render" => Ok(DataFlow::Render),
            "capture" => Ok(DataFlow::Capture),
            "all" => Ok(DataFlow::All),
            other => Err(AudioError::InvalidConfig(format!("unknown data flow '{other}'"))),
        }
    }
}

/// Audio device role (maps to Windows ERole enum).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum DeviceRole {
    /// Used by games, system sounds, most general applications
    #[default]
    Console = 0,

    /// Used by music players, video players
    Multimedia = 1,

    /// Used by Teams, Zoom, Discord, and other VoIP applications
    Communications = 2,
}

impl DeviceRole {
    /// Lower-case name used in configuration and status output.
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceRole::Console => "console",
            DeviceRole::Multimedia => "multimedia",
            DeviceRole::Communications => "communications",
        }
    }
}

impl std::str::FromStr for DeviceRole {
    type Err = AudioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "console" => Ok(DeviceRole::Console),
            "multimedia" => Ok(DeviceRole::Multimedia),
            "communications" => Ok(DeviceRole::Communications),
            other => Err(AudioError::InvalidConfig(format!("unknown device role '{other}'"))),
        }
    }
}

/// Windows device state flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Device is active and available for use
    Active,

    /// Device is disabled in Windows Sound settings
    Disabled,

    /// Device is not present (driver issue)
    NotPresent,

    /// Device is unplugged (for pluggable devices)
    Unplugged,
}

impl DeviceState {
    /// Decode the DEVICE_STATE_XXX bit reported by the OS.
    ///
    /// Unknown values are treated as not present.
    pub fn from_bits(bits: u32) -> Self {
        match bits {
            1 => DeviceState::Active,
            2 => DeviceState::Disabled,
            4 => DeviceState::NotPresent,
            8 => DeviceState::Unplugged,
            _ => DeviceState::NotPresent,
        }
    }
}

/// Identifies a device property whose value changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyKey {
    pub fmtid: u128,
    pub pid: u32,
}

/// Payload of a volume/mute change on an endpoint.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VolumeNotification {
    /// Context GUID supplied by whoever changed the volume
    pub event_context: u128,

    /// New mute state
    pub muted: bool,

    /// Master volume as scalar (0.0 to 1.0)
    pub master_volume: f32,

    /// Per-channel volume scalars; the length is the channel count
    pub channel_volumes: Vec<f32>,
}

impl VolumeNotification {
    pub fn channel_count(&self) -> usize {
        self.channel_volumes.len()
    }
}

/// An OS-level failure: the raw status code plus its message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (0x{code:08X})")]
pub struct OsError {
    pub code: i32,
    pub message: String,
}

impl OsError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[cfg(windows)]
impl From<windows::core::Error> for OsError {
    fn from(err: windows::core::Error) -> Self {
        Self {
            code: err.code().0,
            message: err.message(),
        }
    }
}

/// Audio service error types.
///
/// OS failures are folded into the message rather than exposed as a
/// `source`, so error chains print each OS message once.
#[derive(Debug, Clone, Error)]
pub enum AudioError {
    #[error("COM initialization failed: {0}")]
    ComInitFailed(OsError),

    #[error("Failed to create device enumerator: {0}")]
    EnumeratorUnavailable(OsError),

    #[error("No default device available: {0}")]
    NoDefaultDevice(OsError),

    #[error("Volume control not available for device: {0}")]
    VolumeNotAvailable(OsError),

    #[error("Failed to register notification callback: {0}")]
    RegistrationFailed(OsError),

    #[error("Interface not supported: {{{iid:032X}}}")]
    NoInterface { iid: u128 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Monitor worker thread failed: {0}")]
    WorkerFailed(String),

    #[error("Audio device monitoring is not supported on this platform")]
    Unsupported,
}
