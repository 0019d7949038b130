//! Settings configuration
//!
//! Manages user-configurable settings for scoring.
//! Default values are defined in `config/default.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Default configuration TOML embedded from config/default.toml
const DEFAULT_CONFIG_TOML: &str = include_str!("../config/default.toml");

/// Environment variable overriding `model.model_dir`
pub const MODEL_DIR_ENV: &str = "EOU_MODEL_DIR";

/// Configuration settings for the detector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Model location settings
    pub model: ModelSettings,
    /// Detection settings
    pub detection: DetectionSettings,
}

/// Where to find the model and how to run it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Model variant id (optional, defaults to registry default)
    #[serde(default)]
    pub variant: Option<String>,
    /// Root directory of local model files (optional, defaults to data_dir/models)
    #[serde(default)]
    pub model_dir: Option<String>,
    /// Explicit ONNX file, used together with `tokenizer_path`
    #[serde(default)]
    pub onnx_path: Option<String>,
    /// Explicit tokenizer.json, used together with `onnx_path`
    #[serde(default)]
    pub tokenizer_path: Option<String>,
    /// ONNX Runtime intra-op threads (0 = runtime default)
    pub intra_threads: usize,
}

/// Scoring behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionSettings {
    /// Probability at or above which the turn is considered complete
    pub threshold: f64,
    /// Keep only this many of the most recent turns after flattening
    #[serde(default)]
    pub max_history_turns: Option<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG_TOML).expect("embedded default.toml must be valid")
    }
}

/// Recursively merge `overlay` TOML values on top of `base`.
fn merge_toml(base: &mut toml::Value, overlay: &toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                if let Some(base_value) = base_table.get_mut(key) {
                    merge_toml(base_value, value);
                } else {
                    base_table.insert(key.clone(), value.clone());
                }
            }
        }
        (base, _) => {
            *base = overlay.clone();
        }
    }
}

/// Parse user TOML content merged on top of default.toml.
fn parse_with_defaults(user_content: &str) -> Result<Settings> {
    let mut base: toml::Value = toml::from_str(DEFAULT_CONFIG_TOML)?;
    let user: toml::Value = toml::from_str(user_content)?;
    merge_toml(&mut base, &user);
    let settings: Settings = base.try_into()?;
    settings.validate()?;
    Ok(settings)
}

/// Get the project directories for eou-score.
fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "eou-score", "eou-score")
}

impl Settings {
    /// Get the data directory path
    pub fn data_dir() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.data_dir().to_path_buf())
    }

    /// Get the configuration directory path
    pub fn config_dir() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the configuration file path
    pub fn config_file() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Root directory for local model files.
    ///
    /// Resolution order: `EOU_MODEL_DIR`, `model.model_dir`, then
    /// `~/.local/share/eou-score/models`.
    pub fn model_dir(&self) -> Option<PathBuf> {
        if let Ok(dir) = std::env::var(MODEL_DIR_ENV)
            && !dir.is_empty()
        {
            return Some(PathBuf::from(dir));
        }
        if let Some(dir) = &self.model.model_dir {
            return Some(PathBuf::from(dir));
        }
        Self::data_dir().map(|dir| dir.join("models"))
    }

    /// Reject values the detector cannot use.
    pub fn validate(&self) -> Result<()> {
        let threshold = self.detection.threshold;
        if !(0.0..=1.0).contains(&threshold) {
            anyhow::bail!("detection.threshold must be within [0, 1], got {}", threshold);
        }
        if self.model.onnx_path.is_some() != self.model.tokenizer_path.is_some() {
            anyhow::bail!("model.onnx_path and model.tokenizer_path must be set together");
        }
        Ok(())
    }

    /// Load settings from the default configuration file.
    /// Falls back to embedded default.toml if the config file does not exist.
    pub fn load() -> Result<Self> {
        let Some(config_file) = Self::config_file() else {
            warn!("Could not determine config directory, using defaults");
            return Ok(Self::default());
        };

        if !config_file.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        debug!("Loading config from {:?}", config_file);
        let content = fs::read_to_string(&config_file)?;
        parse_with_defaults(&content)
    }

    /// Load settings from a specific file, merged on top of defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        parse_with_defaults(&content)
    }

    /// Save settings to the default configuration file
    pub fn save(&self) -> Result<()> {
        let Some(config_file) = Self::config_file() else {
            anyhow::bail!("Could not determine config directory");
        };

        debug!("Saving config to {:?}", config_file);
        self.save_to(&config_file)
    }

    /// Save settings to a specific file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}
