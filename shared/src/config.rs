//! JSON configuration files layered over built-in defaults

use log::{info, warn};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("unable to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Parses a JSON config file. Fields missing from the file keep their defaults
/// as long as the target type is annotated with `#[serde(default)]`.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads `path` if given, falling back to defaults when it is absent or broken
pub fn load_or_default<T: DeserializeOwned + Default>(path: Option<&Path>) -> T {
    let Some(path) = path else {
        info!("Loaded default config");
        return T::default();
    };

    match load_json(path) {
        Ok(config) => {
            info!("Loaded config from file: {}", path.display());
            config
        }
        Err(e) => {
            warn!("Error while loading config: {}", e);
            info!("Loaded default config");
            T::default()
        }
    }
}
