//! Persistent Settings Management
//!
//! Handles saving/loading the equalizer state to disk.
//!
//! # Storage Locations
//! - Linux: `~/.config/eqnix/settings.json`
//! - Windows: `%APPDATA%\eqnix\settings.json`
//! - macOS: `~/Library/Application Support/com.eqnix.eqnix/settings.json`

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use eqnix_dsp::{ChainController, FilterParameters, FilterType};

use crate::config::EqualizerConfig;
use crate::error::{EngineError, EngineResult};

/// Stored state of one band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandSettings {
    pub id: String,
    pub filter_type: FilterType,
    pub frequency: f64,
    pub q: f64,
    pub gain_db: f64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// User-defined gain preset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPreset {
    pub name: String,
    pub gains: Vec<f64>,
    pub created_at: DateTime<Utc>,
}

/// Root settings structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EqSettings {
    /// Layout the bands were generated from
    #[serde(default)]
    pub equalizer: EqualizerConfig,
    /// Per-band state, in processing order
    #[serde(default)]
    pub bands: Vec<BandSettings>,
    pub active_preset: Option<String>,
    #[serde(default)]
    pub user_presets: Vec<UserPreset>,
}

impl Default for EqSettings {
    fn default() -> Self {
        Self {
            equalizer: EqualizerConfig::default(),
            bands: Vec::new(),
            active_preset: Some("Flat".to_string()),
            user_presets: Vec::new(),
        }
    }
}

impl EqSettings {
    /// Load settings from disk, or return default if missing/corrupt
    pub fn load() -> Self {
        if let Some(path) = Self::get_config_path() {
            if path.exists() {
                match Self::load_from(&path) {
                    Ok(settings) => return settings,
                    Err(e) => error!("Failed to load settings: {}", e),
                }
            }
        }

        info!("Using default settings");
        Self::default()
    }

    /// Save settings to the platform config directory
    pub fn save(&self) -> EngineResult<()> {
        let path = Self::get_config_path()
            .ok_or_else(|| EngineError::SettingsIo("Could not determine config path".to_string()))?;
        self.save_to(&path)
    }

    /// Load settings from an explicit path
    pub fn load_from(path: &Path) -> EngineResult<Self> {
        let file = fs::File::open(path).map_err(|e| EngineError::SettingsIo(e.to_string()))?;
        let settings =
            serde_json::from_reader(file).map_err(|e| EngineError::SettingsParse(e.to_string()))?;
        info!("Settings loaded from {:?}", path);
        Ok(settings)
    }

    /// Save settings to an explicit path, creating parent directories
    pub fn save_to(&self, path: &Path) -> EngineResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| EngineError::SettingsIo(e.to_string()))?;
        }

        let file = fs::File::create(path).map_err(|e| EngineError::SettingsIo(e.to_string()))?;
        serde_json::to_writer_pretty(file, self).map_err(|e| EngineError::SettingsIo(e.to_string()))?;

        info!("Settings saved to {:?}", path);
        Ok(())
    }

    /// Capture the current state of every band
    pub fn capture(&mut self, controller: &ChainController) {
        self.bands = controller
            .snapshots()
            .into_iter()
            .map(|(id, snapshot)| {
                let p = snapshot.parameters;
                BandSettings {
                    id: id.to_string(),
                    filter_type: p.filter_type,
                    frequency: p.frequency,
                    q: p.q,
                    gain_db: p.gain_db,
                    enabled: snapshot.enabled,
                }
            })
            .collect();
    }

    /// Push stored band state into a chain
    ///
    /// Bands the chain does not have are skipped with a warning. Returns the
    /// number of bands applied.
    pub fn apply(&self, controller: &ChainController) -> EngineResult<usize> {
        let mut applied = 0;
        for band in &self.bands {
            if !controller.contains(&band.id) {
                warn!("Stored band '{}' not present in chain, skipping", band.id);
                continue;
            }

            let parameters = FilterParameters::new(
                band.filter_type,
                band.frequency,
                band.q,
                band.gain_db,
                controller.sample_rate(),
            );
            controller.set_parameters(&band.id, parameters)?;
            controller.set_enabled(&band.id, band.enabled)?;
            applied += 1;
        }
        Ok(applied)
    }

    /// Store the given gains as a named preset, replacing one with the same name
    pub fn save_user_preset(&mut self, name: &str, gains: Vec<f64>) {
        self.user_presets.retain(|p| p.name != name);
        self.user_presets.push(UserPreset {
            name: name.to_string(),
            gains,
            created_at: Utc::now(),
        });
    }

    /// Store the chain's current gains as a named preset
    pub fn save_current_as_preset(&mut self, name: &str, controller: &ChainController) {
        let gains = controller
            .snapshots()
            .iter()
            .map(|(_, s)| s.parameters.gain_db)
            .collect();
        self.save_user_preset(name, gains);
    }

    pub fn user_preset(&self, name: &str) -> Option<&UserPreset> {
        self.user_presets.iter().find(|p| p.name == name)
    }

    pub fn remove_user_preset(&mut self, name: &str) -> bool {
        let before = self.user_presets.len();
        self.user_presets.retain(|p| p.name != name);
        self.user_presets.len() != before
    }

    /// Get the platform-specific configuration file path
    fn get_config_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "eqnix", "eqnix").map(|proj| proj.config_dir().join("settings.json"))
    }
}
