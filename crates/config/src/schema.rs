//! Config schema types.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, loader::default_data_dir};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MurmurConfig {
    pub storage: StorageConfig,
    pub vault: VaultConfig,
    pub paging: PagingConfig,
}

/// Where the two databases live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Base directory. Defaults to the platform data directory.
    pub data_dir: Option<PathBuf>,
    /// Encrypted messages, relative to `data_dir` unless absolute.
    pub messages_db: PathBuf,
    /// Wrapped data key, relative to `data_dir` unless absolute.
    pub keys_db: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            messages_db: PathBuf::from("messages.db"),
            keys_db: PathBuf::from("keys.db"),
        }
    }
}

impl StorageConfig {
    pub fn resolved_data_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => default_data_dir().ok_or(ConfigError::NoDataDir),
        }
    }

    pub fn messages_db_path(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.resolved_data_dir()?.join(&self.messages_db))
    }

    pub fn keys_db_path(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.resolved_data_dir()?.join(&self.keys_db))
    }
}

/// Which facility holds the root key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VaultBackend {
    /// OS credential store.
    #[default]
    Keyring,
    /// Key file with owner-only permissions.
    File,
    /// Process memory; nothing survives a restart.
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub backend: VaultBackend,
    /// Keychain service name (keyring backend).
    pub service: String,
    /// Keychain account under `service` (keyring backend).
    pub account: String,
    /// Root key file (file backend), relative to the data directory unless absolute.
    pub root_key_file: PathBuf,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            backend: VaultBackend::default(),
            service: "murmur".into(),
            account: "root-key".into(),
            root_key_file: PathBuf::from("root.key"),
        }
    }
}

impl VaultConfig {
    pub fn root_key_path(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(&self.root_key_file)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PagingConfig {
    pub page_size: usize,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self { page_size: 20 }
    }
}
