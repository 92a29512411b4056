use crate::error::{Result, TabulaError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILENAME: &str = "config.json";
const DEFAULT_SCHEMA: &str = "tasks";
const DEFAULT_LOG_LEVEL: &str = "warn";
const LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

/// Keys accepted by [`TabulaConfig::get`] and [`TabulaConfig::set`].
pub const KEYS: &[&str] = &["data-dir", "default-schema", "log-level"];

/// User settings, stored as `config.json` in the tabula home directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TabulaConfig {
    /// Where collections are kept. `None` means the tabula home directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Built-in schema used when `--schema` is not given.
    #[serde(default = "default_schema")]
    pub default_schema: String,

    /// Log filter used when neither `TABULA_LOG` nor `--verbose` is set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_schema() -> String {
    DEFAULT_SCHEMA.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for TabulaConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            default_schema: default_schema(),
            log_level: default_log_level(),
        }
    }
}

impl TabulaConfig {
    /// Load config from the given directory, or return defaults if not found
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join(CONFIG_FILENAME);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)?;
        let config: TabulaConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save config to the given directory
    pub fn save<P: AsRef<Path>>(&self, config_dir: P) -> Result<()> {
        let config_dir = config_dir.as_ref();

        if !config_dir.exists() {
            fs::create_dir_all(config_dir)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(config_dir.join(CONFIG_FILENAME), content)?;
        Ok(())
    }

    /// Data directory, falling back to `home` when unset.
    pub fn data_dir_or(&self, home: &Path) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| home.to_path_buf())
    }

    pub fn get(&self, key: &str) -> Result<String> {
        match key {
            "data-dir" => Ok(self
                .data_dir
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default()),
            "default-schema" => Ok(self.default_schema.clone()),
            "log-level" => Ok(self.log_level.clone()),
            other => Err(unknown_key(other)),
        }
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "data-dir" if value.is_empty() => self.data_dir = None,
            "data-dir" => self.data_dir = Some(PathBuf::from(value)),
            "default-schema" => {
                if !crate::schema::builtin::NAMES.contains(&value) {
                    return Err(TabulaError::Config(format!(
                        "unknown schema `{}` (expected one of: {})",
                        value,
                        crate::schema::builtin::NAMES.join(", ")
                    )));
                }
                self.default_schema = value.to_string();
            }
            "log-level" => {
                let level = value.to_ascii_lowercase();
                if !LOG_LEVELS.contains(&level.as_str()) {
                    return Err(TabulaError::Config(format!(
                        "invalid log level `{}` (expected one of: {})",
                        value,
                        LOG_LEVELS.join(", ")
                    )));
                }
                self.log_level = level;
            }
            other => return Err(unknown_key(other)),
        }
        Ok(())
    }
}

fn unknown_key(key: &str) -> TabulaError {
    TabulaError::Config(format!(
        "unknown config key `{}` (expected one of: {})",
        key,
        KEYS.join(", ")
    ))
}
