//! Configuration for tplus

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::delims::Delims;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory holding the templates
    #[serde(default = "default_directory")]
    pub directory: PathBuf,

    /// Extension a file must end with to be loaded, including the dot
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Expression delimiters
    #[serde(default)]
    pub delims: Delims,

    /// Rebuild the registry before every render
    #[serde(default)]
    pub reload: bool,

    /// Report registered template names
    #[serde(default)]
    pub debug: bool,

    /// Fail renders that reference missing fields
    #[serde(default)]
    pub strict: bool,
}

fn default_directory() -> PathBuf {
    PathBuf::from("./templates")
}

fn default_extension() -> String {
    crate::DEFAULT_EXTENSION.to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            extension: default_extension(),
            delims: Delims::default(),
            reload: false,
            debug: false,
            strict: false,
        }
    }
}

impl EngineConfig {
    /// Load config from file, or use defaults
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        if let Some(config_path) = path {
            debug!(?config_path, "EngineConfig::load: explicit path");
            return Self::from_file(config_path);
        }

        // Try default locations
        let default_paths = [
            dirs::config_dir().map(|p| p.join("tplus").join("config.yml")),
            Some(PathBuf::from("tplus.yml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                debug!(?path, "EngineConfig::load: found default config");
                return Self::from_file(path);
            }
        }

        debug!("EngineConfig::load: using defaults");
        Ok(EngineConfig::default())
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: EngineConfig =
            serde_yaml::from_str(&content).with_context(|| format!("Failed to parse config: {}", path.display()))?;
        Ok(config)
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
