use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::params::DEFAULT_FREQUENCY;

pub const CONFIG_FILE_NAME: &str = "serial-wave.json";

/// How the incoming byte stream is cut into record candidates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    /// Split on `\n`, carrying partial lines across reads.
    #[default]
    Line,
    /// Every read is one record, however the driver happened to chunk it.
    Chunk,
}

impl fmt::Display for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Framing::Line => write!(f, "line"),
            Framing::Chunk => write!(f, "chunk"),
        }
    }
}

impl std::str::FromStr for Framing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "line" => Ok(Framing::Line),
            "chunk" => Ok(Framing::Chunk),
            other => Err(format!("unknown framing: {}", other)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub port: Option<String>,
    pub baud_rate: u32,
    pub framing: Framing,
    pub fallback_ms: u64,
    pub read_timeout_ms: u64,
    pub queue_capacity: usize,
    pub frequency: f64,
    pub max_lines: u32,
    pub snapshot_width: u32,
    pub snapshot_height: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            port: None,
            baud_rate: 9600,
            framing: Framing::Line,
            fallback_ms: 1000,
            read_timeout_ms: 100,
            queue_capacity: 256,
            frequency: DEFAULT_FREQUENCY,
            max_lines: 64,
            snapshot_width: 1280,
            snapshot_height: 720,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid setting: {0}")]
    Invalid(String),
}

impl Settings {
    pub fn fallback_window(&self) -> Duration {
        Duration::from_millis(self.fallback_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms.max(1))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.baud_rate == 0 {
            return Err(ConfigError::Invalid("baud_rate must be positive".to_string()));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid("queue_capacity must be positive".to_string()));
        }
        if self.max_lines == 0 {
            return Err(ConfigError::Invalid("max_lines must be at least 1".to_string()));
        }
        if !self.frequency.is_finite() {
            return Err(ConfigError::Invalid("frequency must be finite".to_string()));
        }
        Ok(())
    }

    /// Reads settings from `path`. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Settings, ConfigError> {
        if !path.exists() {
            return Ok(Settings::default());
        }
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings = serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        settings.validate()?;
        Ok(settings)
    }
}

pub fn settings_path() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(CONFIG_FILE_NAME)
}
