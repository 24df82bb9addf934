//! Wiring from configuration to a ready [`EncryptedRepository`].

use std::{path::Path, sync::Arc};

use {
    anyhow::Context,
    murmur_config::{MurmurConfig, VaultBackend},
    murmur_messages::{EncryptedRepository, SqliteMessageStore},
    murmur_vault::{
        DataKeyManager, FileKeyVault, KeyVault, KeyringVault, MemoryKeyVault,
        SqliteKeyMaterialStore,
    },
    tracing::info,
};

pub fn sqlite_url(path: &Path) -> String {
    format!("sqlite:{}?mode=rwc", path.display())
}

fn create_parent(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    Ok(())
}

pub fn open_vault(config: &MurmurConfig, data_dir: &Path) -> Arc<dyn KeyVault> {
    let vault = &config.vault;
    match vault.backend {
        VaultBackend::Keyring => Arc::new(KeyringVault::new(&vault.service, &vault.account)),
        VaultBackend::File => Arc::new(FileKeyVault::new(vault.root_key_path(data_dir))),
        VaultBackend::Memory => Arc::new(MemoryKeyVault::new()),
    }
}

/// Opens the key database and builds the data key manager. Does not touch
/// the root key yet.
pub async fn key_manager(config: &MurmurConfig) -> anyhow::Result<Arc<DataKeyManager>> {
    let data_dir = config.storage.resolved_data_dir()?;
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

    let keys_db = config.storage.keys_db_path()?;
    create_parent(&keys_db)?;
    let key_store = SqliteKeyMaterialStore::connect(&sqlite_url(&keys_db))
        .await
        .with_context(|| format!("failed to open {}", keys_db.display()))?;

    Ok(Arc::new(DataKeyManager::new(
        open_vault(config, &data_dir),
        Arc::new(key_store),
    )))
}

/// Loads (or on first run creates) the data key and opens the message store.
pub async fn open_repository(config: &MurmurConfig) -> anyhow::Result<EncryptedRepository> {
    let keys = key_manager(config).await?;
    let engine = keys
        .cipher_engine()
        .await
        .context("data key unavailable")?;

    let messages_db = config.storage.messages_db_path()?;
    create_parent(&messages_db)?;
    let store = SqliteMessageStore::connect(&sqlite_url(&messages_db))
        .await
        .with_context(|| format!("failed to open {}", messages_db.display()))?;

    info!(
        backend = keys.vault_backend(),
        db = %messages_db.display(),
        "message store ready"
    );
    Ok(EncryptedRepository::new(Arc::new(store), Arc::new(engine)))
}
