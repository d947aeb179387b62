//! Persistence seams for calibration and environment settings

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::config::EnvironmentMode;
use crate::error::VisionError;

/// Key-value persistence for calibration multipliers.
pub trait CalibrationStore: Send + Sync {
    /// Load the stored scale for `key`, or `default` when absent.
    fn load_scale(&self, key: &str, default: f32) -> f32;

    /// Persist a scale for `key`.
    fn save_scale(&self, key: &str, scale: f32) -> Result<(), VisionError>;
}

/// Persistence for the active environment mode.
pub trait ModeStore: Send + Sync {
    /// Load the stored mode; defaults to Indoor when absent or unreadable.
    fn load_mode(&self) -> EnvironmentMode;

    /// Persist the active mode.
    fn save_mode(&self, mode: EnvironmentMode) -> Result<(), VisionError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    calibration: HashMap<String, f32>,
    #[serde(default)]
    environment: Option<String>,
}

/// JSON-file settings store implementing both persistence seams.
pub struct JsonSettingsStore {
    path: PathBuf,
    state: Mutex<SettingsFile>,
}

impl JsonSettingsStore {
    /// Open (or create) the settings file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, VisionError> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("Settings file unreadable, starting fresh: {}", e);
                SettingsFile::default()
            })
        } else {
            SettingsFile::default()
        };
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    fn persist(&self, state: &SettingsFile) -> Result<(), VisionError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let raw = serde_json::to_string_pretty(state)
            .map_err(|e| VisionError::Config(format!("Failed to encode settings: {}", e)))?;
        // Write to a temp file first, then rename, so a crash never truncates
        // the live settings.
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, raw)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl CalibrationStore for JsonSettingsStore {
    fn load_scale(&self, key: &str, default: f32) -> f32 {
        self.state
            .lock()
            .calibration
            .get(key)
            .copied()
            .unwrap_or(default)
    }

    fn save_scale(&self, key: &str, scale: f32) -> Result<(), VisionError> {
        let mut state = self.state.lock();
        state.calibration.insert(key.to_string(), scale);
        self.persist(&state)
    }
}

impl ModeStore for JsonSettingsStore {
    fn load_mode(&self) -> EnvironmentMode {
        self.state
            .lock()
            .environment
            .as_deref()
            .map(EnvironmentMode::from_str_or_default)
            .unwrap_or_default()
    }

    fn save_mode(&self, mode: EnvironmentMode) -> Result<(), VisionError> {
        let mut state = self.state.lock();
        state.environment = Some(mode.as_str().to_string());
        self.persist(&state)
    }
}
