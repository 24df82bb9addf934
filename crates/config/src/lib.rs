//! Configuration loading for murmur.
//!
//! Config file: `murmur.toml`, searched in `./` then the user config directory
//! (`~/.config/murmur/` on Linux). Every field has a default, so a missing file
//! is not an error.

pub mod error;
pub mod loader;
pub mod schema;

pub use {
    error::ConfigError,
    loader::{CONFIG_FILENAME, config_dir, default_data_dir, discover_and_load, load_config},
    schema::{MurmurConfig, PagingConfig, StorageConfig, VaultBackend, VaultConfig},
};
