//! Configuration loading helpers.

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::epoch::EpochConfig;
use crate::index::IndexConfig;

/// Environment variable naming a TOML config file.
pub const CONFIG_PATH_ENV: &str = "TINYKV_FASTER_CONFIG";

/// Prefix for `section__field` environment overrides.
pub const ENV_OVERRIDE_PREFIX: &str = "TINYKV_FASTER__";

/// Errors returned by configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error while reading config files.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parse error.
    #[error("toml parse error: {0}")]
    Toml(#[from] toml::de::Error),
    /// Invalid value for a key.
    #[error("invalid value for {key}: {value}")]
    InvalidValue {
        /// Configuration key.
        key: String,
        /// Raw value string.
        value: String,
    },
    /// Unknown configuration key.
    #[error("unknown config key: {0}")]
    UnknownKey(String),
}

/// Top-level configuration schema.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FasterConfig {
    /// Epoch framework configuration.
    pub epoch: Option<EpochConfigSpec>,
    /// Hash index configuration.
    pub index: Option<IndexConfigSpec>,
}

impl FasterConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Load configuration from the `TINYKV_FASTER_CONFIG` env var (if set),
    /// then apply `TINYKV_FASTER__section__field` overrides.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        let mut config = match env::var(CONFIG_PATH_ENV).ok() {
            Some(path) => Self::load_from_path(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply environment overrides in-place.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(env::vars())
    }

    /// Apply `(key, value)` overrides; keys without the override prefix are ignored.
    pub fn apply_overrides<I>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(path) = key.strip_prefix(ENV_OVERRIDE_PREFIX) else {
                continue;
            };
            let path = path.to_ascii_lowercase();
            let parts: Vec<&str> = path.split("__").collect();
            let value = value.trim();

            match parts.as_slice() {
                ["epoch", "table_size"] => {
                    self.epoch_mut().table_size = Some(parse_value(&key, value)?);
                }
                ["epoch", "saturation_passes"] => {
                    self.epoch_mut().saturation_passes = Some(parse_value(&key, value)?);
                }
                ["epoch", "saturation_backoff_ms"] => {
                    self.epoch_mut().saturation_backoff_ms = Some(parse_value(&key, value)?);
                }
                ["index", "table_size"] => {
                    self.index_mut().table_size = Some(parse_value(&key, value)?);
                }
                _ => return Err(ConfigError::UnknownKey(key)),
            }
        }

        Ok(())
    }

    /// Build an `EpochConfig` using defaults plus overrides.
    pub fn epoch_config(&self) -> EpochConfig {
        let mut config = EpochConfig::default();
        if let Some(epoch) = &self.epoch {
            epoch.apply_to(&mut config);
        }
        config
    }

    /// Build an `IndexConfig` using defaults plus overrides.
    pub fn index_config(&self) -> IndexConfig {
        let mut config = IndexConfig::default();
        if let Some(index) = &self.index {
            index.apply_to(&mut config);
        }
        config
    }

    fn epoch_mut(&mut self) -> &mut EpochConfigSpec {
        self.epoch.get_or_insert_with(EpochConfigSpec::default)
    }

    fn index_mut(&mut self) -> &mut IndexConfigSpec {
        self.index.get_or_insert_with(IndexConfigSpec::default)
    }
}

/// Epoch framework overrides.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EpochConfigSpec {
    /// Number of usable epoch table slots.
    pub table_size: Option<usize>,
    /// Full drain-list passes before a saturation warning.
    pub saturation_passes: Option<u32>,
    /// Sleep after a saturation warning, in milliseconds.
    pub saturation_backoff_ms: Option<u64>,
}

impl EpochConfigSpec {
    fn apply_to(&self, config: &mut EpochConfig) {
        if let Some(value) = self.table_size {
            config.table_size = value;
        }
        if let Some(value) = self.saturation_passes {
            config.saturation_passes = value.max(1);
        }
        if let Some(value) = self.saturation_backoff_ms {
            config.saturation_backoff = Duration::from_millis(value);
        }
    }
}

/// Hash index overrides.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexConfigSpec {
    /// Number of hash buckets (must be a power of two).
    pub table_size: Option<u64>,
}

impl IndexConfigSpec {
    fn apply_to(&self, config: &mut IndexConfig) {
        if let Some(value) = self.table_size {
            config.table_size = value;
        }
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}
