use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Settings for one rig session
///
/// Defaults reproduce the deployed controller setup; a toml file can
/// override individual fields. Settings are read once at startup and never
/// written back.
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct RigSettings {
    /// Serial baud rate of the motor controller link
    pub baud_rate: u32,

    /// Per-axis displacement below which pointer motion classifies as stop
    ///
    /// Keeps pointer jitter around the surface center from commanding
    /// motion.
    pub dead_zone: f32,

    /// Inactivity window after which motion is force-stopped
    pub idle_timeout_ms: u64,

    /// Speed value presentation layers pre-fill; never transmitted
    /// implicitly
    pub default_speed: i64,
}

impl Default for RigSettings {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            dead_zone: 30.0,
            idle_timeout_ms: 200,
            default_speed: 60,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse settings file: {0}")]
    Parse(#[from] toml::de::Error),
}

impl RigSettings {
    /// Loads settings from a toml file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        let settings: RigSettings = toml::from_str(&raw)?;
        info!("Loaded settings from {}: {:?}", path.display(), settings);
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_deployed_rig() {
        let settings = RigSettings::default();
        assert_eq!(settings.baud_rate, 9600);
        assert_eq!(settings.dead_zone, 30.0);
        assert_eq!(settings.idle_timeout_ms, 200);
        assert_eq!(settings.default_speed, 60);
    }

    #[test]
    fn partial_toml_overrides_only_named_fields() {
        let settings: RigSettings = toml::from_str("idle_timeout_ms = 500").unwrap();
        assert_eq!(settings.idle_timeout_ms, 500);
        assert_eq!(settings.baud_rate, 9600);
        assert_eq!(settings.dead_zone, 30.0);
    }
}
