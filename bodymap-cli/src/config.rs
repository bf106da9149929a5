//! `bodymap.yml` handling

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tock::{ConfigError, EngineConfig, SyncTable};

/// CLI configuration. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub engine: EngineConfig,

    /// Sync table to load instead of the bundled authentication syncs
    pub syncs: Option<PathBuf>,

    /// Path the configuration was loaded from, for resolving relative paths
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl CliConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let mut config: CliConfig = serde_yaml::from_str(&contents)?;
        config.engine.validate()?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Load `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))
        } else {
            tracing::debug!(path = %path.display(), "no configuration file, using defaults");
            Ok(Self::default())
        }
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            return path.to_path_buf();
        }
        match self.config_path.as_ref().and_then(|p| p.parent()) {
            Some(dir) => dir.join(path),
            None => path.to_path_buf(),
        }
    }

    /// The sync table to run: the configured file, or the bundled one.
    pub fn sync_table(&self) -> Result<SyncTable> {
        match &self.syncs {
            Some(path) => {
                let path = self.resolve_path(path);
                SyncTable::load(&path)
                    .with_context(|| format!("Failed to load sync table {}", path.display()))
            }
            None => bodymap_concepts::auth_syncs().context("Failed to parse bundled sync table"),
        }
    }

    /// Apply command-line overrides.
    pub fn with_overrides(mut self, max_iterations: Option<usize>, sequential: bool) -> Self {
        if let Some(max) = max_iterations {
            self.engine.max_iterations = max;
        }
        if sequential {
            self.engine.dispatch = tock::DispatchMode::Sequential;
        }
        self
    }
}
