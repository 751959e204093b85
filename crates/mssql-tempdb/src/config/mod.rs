//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use std::path::{Path, PathBuf};

use crate::error::{HarnessError, Result};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "tempdb.yaml";

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Resolve both endpoints, defaulting file paths next to the running
    /// executable.
    pub fn resolve(&self) -> Result<SessionSettings> {
        let dir = runtime_dir()?;
        Ok(self.resolve_in(&dir))
    }

    /// Resolve both endpoints, defaulting file paths into `dir`.
    pub fn resolve_in(&self, dir: &Path) -> SessionSettings {
        SessionSettings {
            source: self.source.resolve(dir),
            target: self.target.resolve(dir),
        }
    }
}

/// Directory containing the running executable.
pub fn runtime_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe()?;
    exe.parent().map(Path::to_path_buf).ok_or_else(|| {
        HarnessError::Config(format!(
            "cannot determine directory of executable {}",
            exe.display()
        ))
    })
}
