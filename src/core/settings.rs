// src/core/settings.rs

use crate::constants::MAX_CONCURRENCY;
use crate::core::paths::{self, PathError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error(transparent)]
    Path(#[from] PathError),
    #[error("I/O error on settings file '{path}'")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse settings file '{path}'")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Invalid setting '{key}': {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Launcher-wide defaults from `settings.toml`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Used when the configuration has no `concurrency` value.
    pub default_concurrency: usize,
    /// Used when neither the test nor its suite declares a timeout.
    pub default_timeout_secs: u64,
    /// Remember the last work directory of each suite and reuse it.
    pub remember_work_dirs: bool,
}

impl Default for Settings {
    fn default() -> Self {
        let cores = std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);
        Self {
            default_concurrency: cores.min(MAX_CONCURRENCY),
            default_timeout_secs: 600,
            remember_work_dirs: true,
        }
    }
}

impl Settings {
    fn validate(&self) -> Result<(), SettingsError> {
        if !(1..=MAX_CONCURRENCY).contains(&self.default_concurrency) {
            return Err(SettingsError::Invalid {
                key: "default_concurrency",
                reason: format!("expected 1..={}", MAX_CONCURRENCY),
            });
        }
        if self.default_timeout_secs == 0 {
            return Err(SettingsError::Invalid {
                key: "default_timeout_secs",
                reason: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Loads `settings.toml` from the launcher config directory, writing the defaults on
/// first use.
pub fn load_settings() -> Result<Settings, SettingsError> {
    load_settings_from(&paths::get_settings_path()?)
}

pub fn load_settings_from(path: &Path) -> Result<Settings, SettingsError> {
    if !path.exists() {
        let defaults = Settings::default();
        let toml_string = toml::to_string_pretty(&defaults)?;
        fs::write(path, toml_string).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("Wrote default settings to '{}'", path.display());
        return Ok(defaults);
    }

    let content = fs::read_to_string(path).map_err(|source| SettingsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let settings: Settings = toml::from_str(&content).map_err(|source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    settings.validate()?;
    Ok(settings)
}
