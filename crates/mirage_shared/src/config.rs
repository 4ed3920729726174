//! # Startup Configuration
//!
//! Loaded once from TOML before either loop starts. Every section is
//! optional; missing keys fall back to the defaults in [`crate::constants`].
//!
//! ```toml
//! [simulation]
//! tick_rate = 60
//!
//! [render]
//! frame_rate = 144
//! initial_width = 1920
//! initial_height = 1080
//!
//! [logging]
//! filter = "mirage=debug"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    DEFAULT_FRAME_RATE, DEFAULT_TICK_RATE, DEFAULT_VIEWPORT_HEIGHT, DEFAULT_VIEWPORT_WIDTH,
};

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Game-loop settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    /// Simulation ticks per second.
    pub tick_rate: u32,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            tick_rate: DEFAULT_TICK_RATE,
        }
    }
}

/// Render-loop settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Render frames per second.
    pub frame_rate: u32,
    /// Initial viewport width when the surface reports no size of its own.
    pub initial_width: u32,
    /// Initial viewport height when the surface reports no size of its own.
    pub initial_height: u32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            frame_rate: DEFAULT_FRAME_RATE,
            initial_width: DEFAULT_VIEWPORT_WIDTH,
            initial_height: DEFAULT_VIEWPORT_HEIGHT,
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `tracing` filter directive, overridden by `RUST_LOG`.
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_owned(),
        }
    }
}

/// Complete startup configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirageConfig {
    /// Game loop.
    pub simulation: SimulationSettings,
    /// Render loop.
    pub render: RenderSettings,
    /// Logging.
    pub logging: LoggingSettings,
}

impl MirageConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] or [`ConfigError::Invalid`].
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`MirageConfig::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.simulation.tick_rate == 0 {
            return Err(ConfigError::Invalid("simulation.tick_rate must be > 0".into()));
        }
        if self.render.frame_rate == 0 {
            return Err(ConfigError::Invalid("render.frame_rate must be > 0".into()));
        }
        if self.render.initial_width == 0 || self.render.initial_height == 0 {
            return Err(ConfigError::Invalid("render viewport must be non-empty".into()));
        }
        if self.render.initial_width > u32::from(u16::MAX)
            || self.render.initial_height > u32::from(u16::MAX)
        {
            return Err(ConfigError::Invalid("render viewport exceeds 65535 pixels".into()));
        }
        Ok(())
    }

    /// Duration of one simulation tick.
    #[must_use]
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs(1) / self.simulation.tick_rate.max(1)
    }

    /// Duration of one render frame.
    #[must_use]
    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs(1) / self.render.frame_rate.max(1)
    }
}
