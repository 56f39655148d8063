//! User preferences
//!
//! Persisted as a JSON file; missing fields fall back to their defaults so
//! older files keep loading.

use crate::autostart::{AutoStartConfig, AutoStartMode, DEFAULT_DELAY_S};
use crate::recorder::{GpsParams, RecorderConfig};
use crate::utils::AppResult;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserPreferences {
    pub use_auto_pause: bool,
    /// Zero disables the auto-timeout
    pub auto_timeout_minutes: u32,
    pub auto_start_delay_seconds: u32,
    pub auto_start_mode: AutoStartMode,
    pub intervals_include_pauses: bool,
    pub auto_start_countdown_announcements: bool,
    pub use_average_for_current_speed: bool,
    pub current_speed_window_seconds: u32,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            use_auto_pause: true,
            auto_timeout_minutes: 20,
            auto_start_delay_seconds: DEFAULT_DELAY_S as u32,
            auto_start_mode: AutoStartMode::Instant,
            intervals_include_pauses: true,
            auto_start_countdown_announcements: true,
            use_average_for_current_speed: false,
            current_speed_window_seconds: 15,
        }
    }
}

impl UserPreferences {
    /// Load preferences from `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            tracing::debug!("No preferences at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let preferences = serde_json::from_str(&content)?;
        Ok(preferences)
    }

    pub fn save(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        tracing::debug!("Saved preferences to {:?}", path);
        Ok(())
    }

    pub fn auto_timeout(&self) -> Duration {
        Duration::from_secs(self.auto_timeout_minutes as u64 * 60)
    }

    pub fn recorder_config(&self) -> RecorderConfig {
        RecorderConfig {
            use_auto_pause: self.use_auto_pause,
            auto_timeout: self.auto_timeout(),
        }
    }

    pub fn default_auto_start_config(&self) -> AutoStartConfig {
        AutoStartConfig::new(
            self.auto_start_delay_seconds as i64 * 1_000,
            self.auto_start_mode,
        )
    }

    /// GPS parameters for a workout type with the given minimum sample distance
    pub fn gps_params(&self, min_distance_m: f64) -> GpsParams {
        GpsParams {
            min_distance_m,
            use_average_for_current_speed: self.use_average_for_current_speed,
            current_speed_window_ms: self.current_speed_window_seconds as i64 * 1_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let preferences = UserPreferences::default();
        assert_eq!(preferences.recorder_config(), RecorderConfig::default());
        assert_eq!(
            preferences.default_auto_start_config(),
            AutoStartConfig::new(20_000, AutoStartMode::Instant)
        );
        assert_eq!(preferences.gps_params(5.0), GpsParams::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.json");
        fs::write(&path, r#"{ "autoTimeoutMinutes": 0, "autoStartMode": "onMove" }"#).unwrap();

        let preferences = UserPreferences::load(&path).unwrap();
        assert_eq!(preferences.auto_timeout(), Duration::ZERO);
        assert_eq!(preferences.auto_start_mode, AutoStartMode::OnMove);
        assert!(preferences.use_auto_pause);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("preferences.json");
        let preferences = UserPreferences {
            use_auto_pause: false,
            intervals_include_pauses: false,
            ..UserPreferences::default()
        };
        preferences.save(&path).unwrap();
        assert_eq!(UserPreferences::load(&path).unwrap(), preferences);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let preferences = UserPreferences::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(preferences, UserPreferences::default());
    }
}
