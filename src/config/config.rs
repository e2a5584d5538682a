use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::{LoggingConfig, StorageAreaConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("No storage areas configured")]
    MissingStorage,
    #[error("Invalid AE title '{0}': must be 1 to 16 characters")]
    InvalidAeTitle(String),
    #[error("Storage area '{0}' has an empty path")]
    EmptyStoragePath(String),
    #[error("Storage area '{0}' has an empty index file name")]
    EmptyIndexFile(String),
    #[error("Storage area '{0}' must allow at least one study")]
    InvalidMaxStudies(String),
    #[error("Storage area '{0}' must have a positive per-study quota")]
    InvalidQuota(String),
    #[error("Unknown storage area '{0}'")]
    UnknownArea(String),
    #[error("Several storage areas configured, select one of: {0}")]
    AmbiguousArea(String),
}

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub storage: HashMap<String, StorageAreaConfig>,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&text)?;

        // Relative storage paths are resolved against the config file's directory
        if let Some(base) = path.parent() {
            for area in config.storage.values_mut() {
                if area.path.is_relative() {
                    area.path = base.join(&area.path);
                }
            }
        }
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.is_empty() {
            return Err(ConfigError::MissingStorage);
        }
        for (ae_title, area) in &self.storage {
            area.validate(ae_title)?;
        }
        Ok(())
    }

    /// The named storage area, or the only one when no name is given
    pub fn area(&self, name: Option<&str>) -> Result<&StorageAreaConfig, ConfigError> {
        match name {
            Some(name) => self
                .storage
                .get(name)
                .ok_or_else(|| ConfigError::UnknownArea(name.to_string())),
            None if self.storage.len() == 1 => self
                .storage
                .values()
                .next()
                .ok_or(ConfigError::MissingStorage),
            None if self.storage.is_empty() => Err(ConfigError::MissingStorage),
            None => {
                let mut names: Vec<&str> = self.storage.keys().map(String::as_str).collect();
                names.sort_unstable();
                Err(ConfigError::AmbiguousArea(names.join(", ")))
            }
        }
    }
}
