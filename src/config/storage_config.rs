use serde::{Deserialize, Deserializer};
use std::path::PathBuf;

use crate::config::config::ConfigError;

/// Configuration of one storage area, keyed by AE title in `[storage.<ae>]`
#[derive(Debug, Clone, Deserialize)]
pub struct StorageAreaConfig {
    /// Directory holding the stored objects and the index file
    pub path: PathBuf,
    #[serde(default = "default_index_file")]
    pub index_file: String,
    /// Capacity of the study descriptor table; fixed for the life of an index file
    #[serde(default = "default_max_studies")]
    pub max_studies: usize,
    #[serde(
        default = "default_max_bytes_per_study",
        deserialize_with = "deserialize_byte_size"
    )]
    pub max_bytes_per_study: u64,
    #[serde(default = "default_strict_key_checking")]
    pub strict_key_checking: bool,
}

fn default_index_file() -> String {
    "index.dat".to_string()
}

fn default_max_studies() -> usize {
    200
}

fn default_max_bytes_per_study() -> u64 {
    1024 * 1024 * 1024
}

fn default_strict_key_checking() -> bool {
    true
}

impl StorageAreaConfig {
    /// A storage area at `path` with default limits
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            index_file: default_index_file(),
            max_studies: default_max_studies(),
            max_bytes_per_study: default_max_bytes_per_study(),
            strict_key_checking: default_strict_key_checking(),
        }
    }

    pub fn with_limits(mut self, max_studies: usize, max_bytes_per_study: u64) -> Self {
        self.max_studies = max_studies;
        self.max_bytes_per_study = max_bytes_per_study;
        self
    }

    pub fn with_strict_key_checking(mut self, strict: bool) -> Self {
        self.strict_key_checking = strict;
        self
    }

    pub fn validate(&self, ae_title: &str) -> Result<(), ConfigError> {
        if ae_title.trim().is_empty() || ae_title.len() > 16 {
            return Err(ConfigError::InvalidAeTitle(ae_title.to_string()));
        }
        if self.path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyStoragePath(ae_title.to_string()));
        }
        if self.index_file.trim().is_empty() {
            return Err(ConfigError::EmptyIndexFile(ae_title.to_string()));
        }
        if self.max_studies == 0 {
            return Err(ConfigError::InvalidMaxStudies(ae_title.to_string()));
        }
        if self.max_bytes_per_study == 0 {
            return Err(ConfigError::InvalidQuota(ae_title.to_string()));
        }
        Ok(())
    }
}

/// Parse sizes like `1048576`, `"512kb"`, `"1024mb"` or `"2gb"` (binary multiples)
pub fn parse_byte_size(value: &str) -> Option<u64> {
    let value = value.trim().to_ascii_lowercase();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (digits, unit) = value.split_at(split);
    let number: u64 = digits.parse().ok()?;
    let multiplier: u64 = match unit.trim() {
        "" | "b" => 1,
        "k" | "kb" => 1024,
        "m" | "mb" => 1024 * 1024,
        "g" | "gb" => 1024 * 1024 * 1024,
        _ => return None,
    };
    number.checked_mul(multiplier)
}

fn deserialize_byte_size<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ByteSize {
        Bytes(u64),
        Text(String),
    }

    match ByteSize::deserialize(deserializer)? {
        ByteSize::Bytes(bytes) => Ok(bytes),
        ByteSize::Text(text) => parse_byte_size(&text).ok_or_else(|| {
            serde::de::Error::custom(format!("invalid byte size '{}'", text))
        }),
    }
}
