use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{error::ConfigError, schema::MurmurConfig};

/// Standard config file name.
pub const CONFIG_FILENAME: &str = "murmur.toml";

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", "murmur")
}

/// Load config from an explicit path.
pub fn load_config(path: &Path) -> Result<MurmurConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./murmur.toml` (project-local)
/// 2. `<user config dir>/murmur/murmur.toml` (user-global)
///
/// Returns `MurmurConfig::default()` if no file is found or the file found
/// cannot be loaded.
pub fn discover_and_load() -> MurmurConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    MurmurConfig::default()
}

fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILENAME);
    if local.exists() {
        return Some(local);
    }

    config_dir()
        .map(|dir| dir.join(CONFIG_FILENAME))
        .filter(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/murmur/` on Linux).
pub fn config_dir() -> Option<PathBuf> {
    project_dirs().map(|d| d.config_dir().to_path_buf())
}

/// Returns the platform data directory (`~/.local/share/murmur/` on Linux).
pub fn default_data_dir() -> Option<PathBuf> {
    project_dirs().map(|d| d.data_dir().to_path_buf())
}
