use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_true")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_true")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_true(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_true(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "airpods_link".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

/// Tunables of the head-gesture detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureSettings {
    /// Samples beyond this magnitude on either axis are calibration noise
    pub max_valid_orientation: f64,
    /// Per-sample delta that triggers directional feedback
    pub immediate_feedback_threshold: f64,
    /// Upper clamp of the variance-scaled direction-change threshold
    pub direction_change_sensitivity: f64,
    /// Lower clamp of the variance-scaled direction-change threshold
    pub min_direction_change: f64,
    /// Extrema at or below this magnitude are ignored
    pub peak_threshold: f64,
    /// Mean extremum magnitude that saturates the amplitude factor
    pub amplitude_reference: f64,
    pub rhythm_consistency_threshold: f64,
    /// Average inter-extremum interval (ms) under which motion counts as fast
    pub fast_movement_threshold_ms: f64,
    pub min_required_extremes: usize,
    pub max_required_extremes: usize,
    pub min_confidence: f64,
    pub evaluation_interval_ms: u64,
    pub smoothing_window: usize,
    pub history_size: usize,
    pub interval_history: usize,
}

impl Default for GestureSettings {
    fn default() -> Self {
        Self {
            max_valid_orientation: 6000.0,
            immediate_feedback_threshold: 600.0,
            direction_change_sensitivity: 150.0,
            min_direction_change: 50.0,
            peak_threshold: 400.0,
            amplitude_reference: 600.0,
            rhythm_consistency_threshold: 0.5,
            fast_movement_threshold_ms: 300.0,
            min_required_extremes: 3,
            max_required_extremes: 4,
            min_confidence: 0.7,
            evaluation_interval_ms: 50,
            smoothing_window: 3,
            history_size: 100,
            interval_history: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadTrackingSettings {
    pub calibration_samples: usize,
    /// Added to every raw orientation value before calibration and normalization
    pub orientation_offset: i32,
    pub normalization_divisor: f32,
}

impl Default for HeadTrackingSettings {
    fn default() -> Self {
        Self {
            calibration_samples: 10,
            orientation_offset: 5500,
            normalization_divisor: 32000.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    // Logging Settings
    #[serde(default)]
    pub log_settings: LogSettings,

    #[serde(default)]
    pub gesture: GestureSettings,

    #[serde(default)]
    pub head_tracking: HeadTrackingSettings,

    // Debug Settings
    #[serde(default = "default_false")]
    pub debug_raw_frame_logging: bool,
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        let settings = Self::load_from_file(&settings_path).unwrap_or_default();

        Ok(Self {
            settings,
            settings_path,
        })
    }

    /// Service backed by an explicit file, used by tests and custom setups
    pub fn with_path(settings_path: PathBuf) -> Self {
        let settings = Self::load_from_file(&settings_path).unwrap_or_default();
        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("AirPodsLink");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &PathBuf) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn update_gesture(&mut self, gesture: GestureSettings) -> anyhow::Result<()> {
        self.settings.gesture = gesture;
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{ "gesture": { "min_confidence": 0.8 } }"#).unwrap();
        assert_eq!(settings.gesture.min_confidence, 0.8);
        assert_eq!(settings.gesture.peak_threshold, 400.0);
        assert_eq!(settings.head_tracking.orientation_offset, 5500);
        assert_eq!(settings.log_settings.level, "info");
        assert!(!settings.debug_raw_frame_logging);
    }

    #[test]
    fn test_save_and_reload() {
        let path = std::env::temp_dir().join(format!(
            "airpods_link_settings_{}.json",
            std::process::id()
        ));
        let mut service = SettingsService::with_path(path.clone());
        service.get_mut().debug_raw_frame_logging = true;
        let mut gesture = GestureSettings::default();
        gesture.max_required_extremes = 5;
        service.update_gesture(gesture).unwrap();

        let reloaded = SettingsService::with_path(path.clone());
        assert!(reloaded.get().debug_raw_frame_logging);
        assert_eq!(reloaded.get().gesture.max_required_extremes, 5);

        let _ = fs::remove_file(path);
    }
}
