use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    magic::{DEFAULT_MAX_TEMPLATE_DEPTH, DEFAULT_MEMORY_CAPACITY, ENV_ENGINE_CONFIG_PATH},
    utils::error::{ErrorKind, ReteError, ReteResult},
};

/// Tunables of an [`crate::base::Engine`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Guard on ancestor walks; a deeper chain is reported as an error.
    pub max_template_depth: usize,

    /// When false, node invocations never reach the event bus.
    pub broadcast_events: bool,

    /// When true, the network builder asks the registered accelerator to compile
    /// call criteria.
    pub use_accelerator: bool,

    /// Initial capacity of memory sinks.
    pub memory_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_template_depth: DEFAULT_MAX_TEMPLATE_DEPTH,
            broadcast_events: true,
            use_accelerator: true,
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Get the default path to the engine configuration file.
    pub fn default_path() -> PathBuf {
        if let Ok(config_path) = std::env::var(ENV_ENGINE_CONFIG_PATH) {
            return config_path.into();
        }

        let mut path = PathBuf::new();

        #[cfg(target_os = "windows")]
        {
            if let Ok(appdata) = std::env::var("APPDATA") {
                path.push(appdata);
            }
        }
        #[cfg(not(target_os = "windows"))]
        {
            if let Ok(xdg_config_home) = std::env::var("XDG_CONFIG_HOME") {
                path.push(xdg_config_home);
            } else if let Ok(home) = std::env::var("HOME") {
                path.push(home);
                path.push(".config");
            }
        }

        path.push("retecore");
        path.push("engine.toml");
        path
    }

    /// Parse a configuration from TOML text. `origin` only names the source in errors.
    pub fn from_toml_str(text: &str, origin: &str) -> ReteResult<Self> {
        toml::from_str(text).map_err(|e| {
            ReteError::new(ErrorKind::Config {
                file: origin.to_string(),
                message: e.to_string(),
            })
        })
    }

    /// Load a configuration from a TOML file.
    pub fn load_from_toml(path: &Path) -> ReteResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text, &path.display().to_string())
    }

    /// Load the configuration at [`Self::default_path`], or the defaults if no file exists there.
    pub fn load_or_default() -> ReteResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            log::debug!("Loading engine configuration from `{}`", path.display());
            Self::load_from_toml(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save the configuration to a TOML file, creating parent directories as needed.
    pub fn save_to_toml(&self, path: &Path) -> ReteResult<()> {
        let text = toml::to_string(self).map_err(|e| {
            ReteError::new(ErrorKind::Config {
                file: path.display().to_string(),
                message: e.to_string(),
            })
        })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, text)?;
        Ok(())
    }
}
