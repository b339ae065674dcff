//! Configuration - `config.json` in LEDBLE_HOME

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = "config.json";

pub const DEFAULT_ADDRESS: &str = "24:71:89:1D:64:52";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Hardware address of the light controller
    pub address: String,
    /// Give up on discovery and connect after this many seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Fallback log filter when RUST_LOG is not set
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            timeout_secs: None,
            log_level: "warn".to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine home directory, set LEDBLE_HOME")]
    NoHome,
    #[error("failed to access {}: {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),
    #[error("invalid config file {}: {}", .0.display(), .1)]
    Parse(PathBuf, #[source] serde_json::Error),
}

/// LEDBLE_HOME, or `~/.ledble`
pub fn ledble_home() -> Result<PathBuf, ConfigError> {
    match std::env::var_os("LEDBLE_HOME") {
        Some(home) => Ok(PathBuf::from(home)),
        None => dirs::home_dir()
            .map(|home| home.join(".ledble"))
            .ok_or(ConfigError::NoHome),
    }
}

impl Config {
    /// Load `config.json` from `home`. A missing file yields the defaults.
    pub fn load(home: &Path) -> Result<Self, ConfigError> {
        let path = home.join(CONFIG_FILE);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(path, e)),
        };
        serde_json::from_str(&content).map_err(|e| ConfigError::Parse(path, e))
    }

    pub fn save(&self, home: &Path) -> Result<PathBuf, ConfigError> {
        std::fs::create_dir_all(home).map_err(|e| ConfigError::Io(home.to_path_buf(), e))?;

        let path = home.join(CONFIG_FILE);
        let content =
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(path.clone(), e))?;
        std::fs::write(&path, content).map_err(|e| ConfigError::Io(path.clone(), e))?;
        Ok(path)
    }
}
