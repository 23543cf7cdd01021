use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::photo::ImageLimits;
use crate::store::BackendKind;

const APP_DIR: &str = "stitch-book";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine user data directory")]
    NoDataDir,

    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// User settings, stored as JSON next to the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub backend: BackendKind,
    /// SQLite file of the local backend
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    /// Folder of the realtime hub used by the remote backend
    #[serde(default)]
    pub remote_root: Option<PathBuf>,
    #[serde(default)]
    pub image: ImageLimits,
}

/// Application data directory
/// - Linux: ~/.local/share/stitch-book
/// - macOS: ~/Library/Application Support/stitch-book
/// - Windows: %APPDATA%\stitch-book
pub fn app_data_dir() -> Result<PathBuf, ConfigError> {
    let mut path = dirs::data_dir()
        .or_else(dirs::home_dir)
        .ok_or(ConfigError::NoDataDir)?;
    path.push(APP_DIR);
    Ok(path)
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    Ok(app_data_dir()?.join("config.json"))
}

impl Config {
    /// Load from the default location; a missing file means defaults
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&default_config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).map_err(write_err)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.image.validate().map_err(ConfigError::Invalid)
    }

    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(app_data_dir()?.join("stitch_book.db")),
        }
    }

    pub fn remote_root(&self) -> Result<PathBuf, ConfigError> {
        match &self.remote_root {
            Some(path) => Ok(path.clone()),
            None => Ok(app_data_dir()?.join("remote")),
        }
    }
}
