use crate::storage::{FileSink, SinkOptions, DEFAULT_SINK_MODE};
use crate::util::config::{config_base_dir, resolve_relative};
use crate::util::error::{ConfigError, OpenError};
use crate::writer::CoalescingWriter;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_LATENCY_MS: u64 = 1;

/// File-backed writer settings, usually loaded from YAML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterConfig {
    pub path: PathBuf,
    #[serde(default = "default_latency_ms")]
    pub latency_ms: u64,
    /// Overrides `latency_ms` when set, for sub-millisecond windows.
    #[serde(default)]
    pub latency_us: Option<u64>,
    #[serde(default = "default_true")]
    pub create: bool,
    #[serde(default)]
    pub create_new: bool,
    #[serde(default)]
    pub truncate: bool,
    #[serde(default = "default_true")]
    pub append: bool,
    #[serde(default = "default_mode")]
    pub mode: u32,
}

fn default_latency_ms() -> u64 {
    DEFAULT_LATENCY_MS
}

fn default_true() -> bool {
    true
}

fn default_mode() -> u32 {
    DEFAULT_SINK_MODE
}

impl WriterConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let options = SinkOptions::default();
        Self {
            path: path.into(),
            latency_ms: DEFAULT_LATENCY_MS,
            latency_us: None,
            create: options.create,
            create_new: options.create_new,
            truncate: options.truncate,
            append: options.append,
            mode: options.mode,
        }
    }

    /// Reads a YAML config file. A relative `path` is taken relative to the
    /// directory holding the config file.
    pub fn load(config_path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(config_path).map_err(|source| ConfigError::Io {
            path: config_path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml(&raw)?;
        config.path = resolve_relative(&config_base_dir(config_path), &config.path);
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("path must not be empty".into()));
        }
        if self.truncate && self.append {
            return Err(ConfigError::Invalid(
                "truncate and append are mutually exclusive".into(),
            ));
        }
        if self.create_new && self.truncate {
            return Err(ConfigError::Invalid(
                "create_new already implies an empty file; drop truncate".into(),
            ));
        }
        if self.mode > 0o7777 {
            return Err(ConfigError::Invalid(format!(
                "mode {:o} is not a permission mask",
                self.mode
            )));
        }
        Ok(())
    }

    pub fn latency(&self) -> Duration {
        match self.latency_us {
            Some(micros) => Duration::from_micros(micros),
            None => Duration::from_millis(self.latency_ms),
        }
    }

    pub fn sink_options(&self) -> SinkOptions {
        SinkOptions {
            create: self.create,
            create_new: self.create_new,
            truncate: self.truncate,
            append: self.append,
            mode: self.mode,
        }
    }

    pub fn open(&self) -> Result<CoalescingWriter<FileSink>, OpenError> {
        CoalescingWriter::open(&self.path, self.sink_options(), self.latency())
    }
}
