//! Monitor configuration.
//!
//! Selects which default endpoint the monitor tracks. The defaults track the
//! console playback device.

use super::device::{AudioError, DataFlow, DeviceRole};

/// Environment variable selecting the data flow (`render` or `capture`).
pub const FLOW_ENV: &str = "AUDIO_MONITOR_FLOW";

/// Environment variable selecting the role (`console`, `multimedia`, `communications`).
pub const ROLE_ENV: &str = "AUDIO_MONITOR_ROLE";

/// Which default endpoint to resolve at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MonitorConfig {
    pub flow: DataFlow,
    pub role: DeviceRole,
}

impl MonitorConfig {
    pub fn new(flow: DataFlow, role: DeviceRole) -> Self {
        Self { flow, role }
    }

    /// Reject settings that can never resolve a default endpoint.
    ///
    /// [`DataFlow::All`] only appears in callbacks; the OS has no default
    /// endpoint for it.
    pub fn validate(&self) -> Result<(), AudioError> {
        if self.flow == DataFlow::All {
            return Err(AudioError::InvalidConfig(
                "data flow 'all' has no default endpoint; use 'render' or 'capture'".to_string(),
            ));
        }
        Ok(())
    }

    /// Build a config from `AUDIO_MONITOR_FLOW` / `AUDIO_MONITOR_ROLE`.
    ///
    /// Unset variables keep their defaults; unparseable values are an error.
    pub fn from_env() -> Result<Self, AudioError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, AudioError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(flow) = lookup(FLOW_ENV) {
            config.flow = flow.parse()?;
        }
        if let Some(role) = lookup(ROLE_ENV) {
            config.role = role.parse()?;
        }
        config.validate()?;
        Ok(config)
    }
}
