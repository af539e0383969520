//! Worker configuration
//!
//! Lookup order: the file named by `POISE_CONFIG`, then
//! `<data_local_dir>/poise/config.json`, then built-in defaults.

use anyhow::{Context, Result};
use poise_types::AnalysisConfig;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "POISE_CONFIG";

/// Application data directory
pub fn data_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|p| p.join("poise"))
}

/// Load the analysis settings for this process
pub fn load_config() -> Result<AnalysisConfig> {
    let mut config = match std::env::var_os(CONFIG_ENV) {
        // An explicitly named file must be readable
        Some(path) => read_config(Path::new(&path))?,
        None => load_default_location(),
    };

    if config.calibration_path.is_none() {
        config.calibration_path = data_dir().map(|p| p.join("calibration.json"));
    }

    Ok(config)
}

/// Read and parse one config file
pub fn read_config(path: &Path) -> Result<AnalysisConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {:?}", path))?;
    let config = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config {:?}", path))?;
    tracing::info!("Loaded settings from {:?}", path);
    Ok(config)
}

fn load_default_location() -> AnalysisConfig {
    let path = match data_dir() {
        Some(dir) => dir.join("config.json"),
        None => return AnalysisConfig::default(),
    };

    if !path.exists() {
        tracing::debug!("config.json not found at {:?}, using defaults", path);
        return AnalysisConfig::default();
    }

    match read_config(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("{:#}, using defaults", e);
            AnalysisConfig::default()
        }
    }
}
