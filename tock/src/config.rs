//! Engine configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// How firings discovered in one evaluating pass are dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// One firing at a time, in discovery order
    Sequential,
    /// Up to `max_concurrent_firings` firings in flight at once
    #[default]
    Concurrent,
}

/// Engine settings, usually the `engine:` section of `bodymap.yml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of dispatching rounds per tick before it is aborted
    pub max_iterations: usize,

    pub dispatch: DispatchMode,

    /// Bound on in-flight firings per pass in concurrent mode
    pub max_concurrent_firings: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 64,
            dispatch: DispatchMode::Concurrent,
            max_concurrent_firings: 16,
        }
    }
}

impl EngineConfig {
    /// Parse and validate configuration from YAML
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Check that every bound is at least 1
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iterations == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_iterations",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_concurrent_firings == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_concurrent_firings",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Number of firings allowed in flight at once
    pub fn dispatch_limit(&self) -> usize {
        match self.dispatch {
            DispatchMode::Sequential => 1,
            DispatchMode::Concurrent => self.max_concurrent_firings.max(1),
        }
    }
}
